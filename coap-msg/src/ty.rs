/// The four CoAP message types (RFC 7252 section 3).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Type {
  /// Confirmable: retransmitted until ACKed or RST, or until `MAX_RETRANSMIT` is exceeded.
  Con,
  /// Non-confirmable: fire and forget.
  Non,
  /// Acknowledgement of a Confirmable message.
  Ack,
  /// Rejection of a Confirmable or Non-confirmable message.
  Reset,
}

impl From<Type> for u8 {
  fn from(t: Type) -> u8 {
    match t {
      | Type::Con => 0,
      | Type::Non => 1,
      | Type::Ack => 2,
      | Type::Reset => 3,
    }
  }
}

impl TryFrom<u8> for Type {
  type Error = crate::MessageParseError;

  fn try_from(b: u8) -> Result<Self, Self::Error> {
    match b {
      | 0 => Ok(Type::Con),
      | 1 => Ok(Type::Non),
      | 2 => Ok(Type::Ack),
      | 3 => Ok(Type::Reset),
      | n => Err(Self::Error::InvalidType(n)),
    }
  }
}
