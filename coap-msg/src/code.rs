/// A CoAP code, encoded on the wire as `(class << 5) | detail` (RFC 7252 section 3).
///
/// Request codes live in class 0 (`0.01`-`0.04`), success/error responses in classes
/// 2/4/5, and TCP signaling codes (RFC 8323 section 5) in class 7.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Code {
  pub class: u8,
  pub detail: u8,
}

impl Code {
  pub const fn new(class: u8, detail: u8) -> Self {
    Code { class, detail }
  }

  pub const EMPTY: Code = Code::new(0, 0);
  pub const GET: Code = Code::new(0, 1);
  pub const POST: Code = Code::new(0, 2);
  pub const PUT: Code = Code::new(0, 3);
  pub const DELETE: Code = Code::new(0, 4);
  pub const FETCH: Code = Code::new(0, 5);

  pub const CREATED: Code = Code::new(2, 1);
  pub const DELETED: Code = Code::new(2, 2);
  pub const VALID: Code = Code::new(2, 3);
  pub const CHANGED: Code = Code::new(2, 4);
  pub const CONTENT: Code = Code::new(2, 5);

  pub const BAD_REQUEST: Code = Code::new(4, 0);
  pub const UNAUTHORIZED: Code = Code::new(4, 1);
  pub const BAD_OPTION: Code = Code::new(4, 2);
  pub const FORBIDDEN: Code = Code::new(4, 3);
  pub const NOT_FOUND: Code = Code::new(4, 4);
  pub const METHOD_NOT_ALLOWED: Code = Code::new(4, 5);
  pub const NOT_ACCEPTABLE: Code = Code::new(4, 6);
  pub const PRECONDITION_FAILED: Code = Code::new(4, 12);
  pub const REQUEST_ENTITY_TOO_LARGE: Code = Code::new(4, 13);
  pub const UNSUPPORTED_CONTENT_FORMAT: Code = Code::new(4, 15);

  pub const INTERNAL_SERVER_ERROR: Code = Code::new(5, 0);
  pub const NOT_IMPLEMENTED: Code = Code::new(5, 1);
  pub const SERVICE_UNAVAILABLE: Code = Code::new(5, 3);

  /// RFC 8323 CSM (Capabilities and Settings Message).
  pub const CSM: Code = Code::new(7, 1);
  pub const PING: Code = Code::new(7, 2);
  pub const PONG: Code = Code::new(7, 3);
  pub const RELEASE: Code = Code::new(7, 4);
  pub const ABORT: Code = Code::new(7, 5);

  pub fn kind(&self) -> CodeKind {
    match (self.class, self.detail) {
      | (0, 0) => CodeKind::Empty,
      | (0, _) => CodeKind::Request,
      | (7, _) => CodeKind::Signaling,
      | _ => CodeKind::Response,
    }
  }

  pub fn is_success(&self) -> bool {
    self.class == 2
  }
}

/// Which of the four code families a [`Code`] falls into.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CodeKind {
  Empty,
  Request,
  Response,
  Signaling,
}

impl From<Code> for u8 {
  fn from(c: Code) -> u8 {
    (c.class << 5) | (c.detail & 0b0001_1111)
  }
}

impl From<u8> for Code {
  fn from(b: u8) -> Code {
    Code { class: b >> 5, detail: b & 0b0001_1111 }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn request_codes_match_rfc7252() {
    assert_eq!(u8::from(Code::GET), 0b000_00001);
    assert_eq!(u8::from(Code::POST), 0b000_00010);
    assert_eq!(u8::from(Code::PUT), 0b000_00011);
    assert_eq!(u8::from(Code::DELETE), 0b000_00100);
  }

  #[test]
  fn round_trips_through_u8() {
    for code in [Code::GET, Code::NOT_FOUND, Code::CONTENT, Code::CSM] {
      assert_eq!(Code::from(u8::from(code)), code);
    }
  }

  #[test]
  fn kind_classifies_correctly() {
    assert_eq!(Code::EMPTY.kind(), CodeKind::Empty);
    assert_eq!(Code::GET.kind(), CodeKind::Request);
    assert_eq!(Code::CONTENT.kind(), CodeKind::Response);
    assert_eq!(Code::CSM.kind(), CodeKind::Signaling);
  }
}
