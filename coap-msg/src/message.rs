use crate::{Code, Id, Options, Token, Type};

/// A parsed CoAP message, independent of which transport it arrived over.
///
/// UDP framing carries `id` on every message; TCP framing (RFC 8323) has no
/// message ID or type at all, since TCP's own ordering removes the need for
/// CON/ACK retransmission. Callers that build messages for TCP should leave
/// `id` as `Id(0)` and `ty` as `Type::Con` -- both are ignored by the TCP
/// encoder.
#[derive(Clone, Debug, PartialEq)]
pub struct Message {
  pub ty: Type,
  pub code: Code,
  pub id: Id,
  pub token: Token,
  pub options: Options,
  pub payload: Option<Vec<u8>>,
}

impl Message {
  pub fn new(ty: Type, code: Code, id: Id, token: Token) -> Self {
    Message { ty, code, id, token, options: Options::new(), payload: None }
  }

  /// An empty ACK/RST with no token, per RFC 7252 section 4.2/4.3.
  pub fn empty(ty: Type, id: Id) -> Self {
    Message::new(ty, Code::EMPTY, id, Token::empty())
  }

  pub fn ack(id: Id) -> Self {
    Message::empty(Type::Ack, id)
  }

  pub fn reset(id: Id) -> Self {
    Message::empty(Type::Reset, id)
  }

  pub fn is_empty(&self) -> bool {
    self.code == Code::EMPTY
  }

  pub fn with_payload(mut self, payload: impl Into<Vec<u8>>) -> Self {
    self.payload = Some(payload.into());
    self
  }
}
