/// 16-bit message id, scoped to the sending endpoint.
///
/// Used for CON retransmission matching and server-side duplicate detection;
/// unrelated to [`Token`](crate::Token), which correlates request/response pairs.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Id(pub u16);

impl Id {
  pub(crate) fn parse(bytes: &[u8]) -> Result<(Self, &[u8]), crate::MessageParseError> {
    match bytes {
      | [a, b, rest @ ..] => Ok((Id(u16::from_be_bytes([*a, *b])), rest)),
      | _ => Err(crate::MessageParseError::Eof),
    }
  }
}

impl From<Id> for [u8; 2] {
  fn from(id: Id) -> [u8; 2] {
    id.0.to_be_bytes()
  }
}
