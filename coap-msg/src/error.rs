use core::fmt;

/// Failures that can occur while parsing bytes off the wire into a [`Message`](crate::Message).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MessageParseError {
  /// Ran out of bytes while a field was still expected.
  Eof,
  /// The 2-bit type field held a value other than 0-3 (unreachable in practice, kept for
  /// symmetry with the rest of the header decode).
  InvalidType(u8),
  /// Token length nibble (or explicit token byte count) exceeded the 8-byte maximum.
  InvalidTokenLength(usize),
  /// An option's delta or length used the reserved nibble value `0b1111` outside of the
  /// payload marker position.
  ReservedOptionNibble,
  /// A TCP length field used the reserved 4-byte extended-length escape incorrectly.
  ReservedLengthNibble,
  /// The declared option or payload length ran past the end of the buffer.
  Truncated,
}

impl fmt::Display for MessageParseError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      | Self::Eof => write!(f, "unexpected end of input"),
      | Self::InvalidType(n) => write!(f, "invalid message type {}", n),
      | Self::InvalidTokenLength(n) => write!(f, "token length {} exceeds maximum of 8", n),
      | Self::ReservedOptionNibble => write!(f, "option used reserved nibble value 15"),
      | Self::ReservedLengthNibble => write!(f, "tcp length field used reserved nibble value 15"),
      | Self::Truncated => write!(f, "declared length runs past end of input"),
    }
  }
}

impl std::error::Error for MessageParseError {}

/// Failures that can occur while serializing a [`Message`](crate::Message) to bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MessageToBytesError {
  /// The message, once encoded, would not fit in the caller-supplied buffer.
  TooLong { capacity: usize, size: usize },
  /// An option value's length exceeds what the delta/length encoding can represent.
  OptionValueTooLong { number: u32, size: usize },
}

impl fmt::Display for MessageToBytesError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      | Self::TooLong { capacity, size } => {
        write!(f, "message of {} bytes does not fit in buffer of {} bytes", size, capacity)
      },
      | Self::OptionValueTooLong { number, size } => {
        write!(f, "value of option {} is {} bytes, too long to encode", number, size)
      },
    }
  }
}

impl std::error::Error for MessageToBytesError {}
