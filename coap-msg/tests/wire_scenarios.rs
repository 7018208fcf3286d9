//! Wire-level assertions tied to concrete byte layouts rather than just
//! round-trip structural equality.

use coap_msg::{decode_udp, Code, Id, Token, Type};

#[test]
fn empty_con_decodes_with_code_zero() {
  let bytes = [0x40, 0x00, 0x42, 0x42];
  let msg = decode_udp(&bytes).unwrap();
  assert_eq!(msg.ty, Type::Con);
  assert_eq!(msg.code, Code::EMPTY);
  assert_eq!(msg.id, Id(0x4242));
  assert_eq!(msg.token, Token::empty());
}

#[test]
fn empty_non_decodes_with_type_non() {
  let bytes = [0x50, 0x00, 0x51, 0x51];
  let msg = decode_udp(&bytes).unwrap();
  assert_eq!(msg.ty, Type::Non);
  assert_eq!(msg.code, Code::EMPTY);
  assert_eq!(msg.id, Id(0x5151));
}

#[test]
fn content_response_code_is_69() {
  assert_eq!(u8::from(Code::CONTENT), 69);
}

#[test]
fn not_found_response_code_is_132() {
  assert_eq!(u8::from(Code::NOT_FOUND), 132);
}
