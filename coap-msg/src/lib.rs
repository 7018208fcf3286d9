//! Bit-exact CoAP message parsing & serialization.
//!
//! This crate is concerned **only** with the wire representation of a CoAP
//! message: [RFC 7252](https://www.rfc-editor.org/rfc/rfc7252) for UDP and the
//! variable-length framing of [RFC 8323](https://www.rfc-editor.org/rfc/rfc8323)
//! for TCP. It knows nothing about sockets, retransmission, or routing -- see
//! the `coap` crate for a runtime built on top of this codec.

#![deny(unsafe_code)]

mod code;
mod content_format;
mod error;
mod id;
mod message;
mod option;
mod parse;
mod token;
mod ty;

pub use code::{Code, CodeKind};
pub use content_format::ContentFormat;
pub use error::{MessageParseError, MessageToBytesError};
pub use id::Id;
pub use message::Message;
pub use option::{OptNumber, OptValue, Options, Processing};
pub use parse::{decode_tcp, decode_udp, encode_tcp, encode_udp};
pub use token::Token;
pub use ty::Type;

#[cfg(test)]
pub(crate) fn test_msg() -> (Message, Vec<u8>) {
  let mut msg = Message::new(Type::Con, Code::GET, Id(1), Token::try_from(&[254][..]).unwrap());
  msg.options.add(OptNumber::URI_PATH.0, b"hello".to_vec());
  msg.payload = Some(b"world".to_vec());

  let mut bytes = vec![0b_01_00_0001, Code::GET.into(), 0, 1, 254];
  bytes.extend([0b_1011_0101]);
  bytes.extend(b"hello");
  bytes.push(0xFF);
  bytes.extend(b"world");

  (msg, bytes)
}
