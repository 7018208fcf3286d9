use crate::option::{encode_nibble_ext, parse_nibble_ext};
use crate::{Code, Id, Message, MessageParseError, MessageToBytesError, Options, Token, Type};

const COAP_VERSION: u8 = 1;

/// Decodes a single UDP datagram (RFC 7252 section 3) into a [`Message`].
///
/// A UDP datagram carries exactly one message; trailing bytes after the
/// payload (there shouldn't be any -- the payload runs to the end of the
/// datagram) are ignored rather than rejected, matching the RFC's "ignore
/// trailing garbage" guidance for forward compatibility.
pub fn decode_udp(bytes: &[u8]) -> Result<Message, MessageParseError> {
  let &byte0 = bytes.first().ok_or(MessageParseError::Eof)?;
  let ty = Type::try_from((byte0 >> 4) & 0b11)?;
  let tkl = (byte0 & 0b0000_1111) as usize;
  if tkl > 8 {
    return Err(MessageParseError::InvalidTokenLength(tkl));
  }

  let rest = bytes.get(1..).ok_or(MessageParseError::Eof)?;
  let &code_byte = rest.first().ok_or(MessageParseError::Eof)?;
  let code = Code::from(code_byte);

  let (id, rest) = Id::parse(rest.get(1..).ok_or(MessageParseError::Eof)?)?;

  if rest.len() < tkl {
    return Err(MessageParseError::Eof);
  }
  let (token_bytes, rest) = rest.split_at(tkl);
  let token = Token::try_from(token_bytes)?;

  let (options, payload) = parse_options_and_payload(rest)?;

  Ok(Message { ty, code, id, token, options, payload })
}

/// Encodes a [`Message`] as a single UDP datagram.
pub fn encode_udp(msg: &Message) -> Result<Vec<u8>, MessageToBytesError> {
  let tkl = msg.token.len();
  let mut out = Vec::new();
  out.push((COAP_VERSION << 6) | (u8::from(msg.ty) << 4) | tkl as u8);
  out.push(msg.code.into());
  out.extend(<[u8; 2]>::from(msg.id));
  out.extend(msg.token.as_bytes());

  encode_options(msg, &mut out)?;

  Ok(out)
}

/// Decodes one framed message off an RFC 8323 TCP byte stream.
///
/// Returns the message plus whatever bytes in `bytes` followed it, so callers
/// reading off a socket can feed the remainder back in once more data has
/// arrived. `Err(MessageParseError::Eof)` means the buffer holds an
/// incomplete frame, not a malformed one -- callers should read more and
/// retry rather than treat it as a protocol error.
pub fn decode_tcp(bytes: &[u8]) -> Result<(Message, &[u8]), MessageParseError> {
  let &byte0 = bytes.first().ok_or(MessageParseError::Eof)?;
  let len_nibble = byte0 >> 4;
  let tkl = (byte0 & 0b0000_1111) as usize;
  if tkl > 8 {
    return Err(MessageParseError::InvalidTokenLength(tkl));
  }

  let rest = bytes.get(1..).ok_or(MessageParseError::Eof)?;
  let (body_len, rest) = parse_tcp_length_ext(len_nibble, rest)?;

  let &code_byte = rest.first().ok_or(MessageParseError::Eof)?;
  let code = Code::from(code_byte);
  let rest = rest.get(1..).ok_or(MessageParseError::Eof)?;

  if rest.len() < tkl {
    return Err(MessageParseError::Eof);
  }
  let (token_bytes, rest) = rest.split_at(tkl);
  let token = Token::try_from(token_bytes)?;

  let body_len = body_len as usize;
  if rest.len() < body_len {
    return Err(MessageParseError::Eof);
  }
  let (body, after_frame) = rest.split_at(body_len);

  let (options, payload) = parse_options_and_payload(body)?;

  let msg = Message { ty: Type::Con, code, id: Id(0), token, options, payload };
  Ok((msg, after_frame))
}

/// Encodes a [`Message`] as one RFC 8323 TCP frame (length prefix + code +
/// token + options + optional payload). TCP framing has no message ID or
/// type field -- `msg.id` and `msg.ty` are ignored.
pub fn encode_tcp(msg: &Message) -> Result<Vec<u8>, MessageToBytesError> {
  let tkl = msg.token.len();

  let mut body = Vec::new();
  encode_options(msg, &mut body)?;
  let body_len = body.len() as u32;

  let mut out = Vec::new();
  let (len_nibble, len_ext) = encode_tcp_length_ext(body_len);
  out.push((len_nibble << 4) | tkl as u8);
  out.extend(len_ext);
  out.push(msg.code.into());
  out.extend(msg.token.as_bytes());
  out.extend(body);

  Ok(out)
}

fn encode_options(msg: &Message, out: &mut Vec<u8>) -> Result<(), MessageToBytesError> {
  let mut prev = 0u32;
  for (number, value) in msg.options.iter() {
    let delta = number - prev;
    prev = number;

    let (delta_nibble, delta_ext) = encode_nibble_ext(delta);
    let (len_nibble, len_ext) = encode_nibble_ext(value.as_bytes().len() as u32);

    out.push((delta_nibble << 4) | len_nibble);
    out.extend(delta_ext);
    out.extend(len_ext);
    out.extend(value.as_bytes());
  }

  if let Some(payload) = &msg.payload {
    if !payload.is_empty() {
      out.push(0xFF);
      out.extend(payload);
    }
  }

  Ok(())
}

fn parse_options_and_payload(mut rest: &[u8]) -> Result<(Options, Option<Vec<u8>>), MessageParseError> {
  let mut options = Options::new();
  let mut prev = 0u32;

  loop {
    let Some(&head) = rest.first() else {
      return Ok((options, None));
    };

    if head == 0xFF {
      let payload = rest.get(1..).ok_or(MessageParseError::Eof)?;
      return Ok((options, Some(payload.to_vec())));
    }

    let delta_nibble = head >> 4;
    let len_nibble = head & 0x0F;
    rest = &rest[1..];

    let (delta, after_delta) = parse_nibble_ext(delta_nibble, rest)?;
    let (len, after_len) = parse_nibble_ext(len_nibble, after_delta)?;
    rest = after_len;

    let number = prev + delta;
    prev = number;

    let len = len as usize;
    if rest.len() < len {
      return Err(MessageParseError::Truncated);
    }
    let (value, after_value) = rest.split_at(len);
    options.add(number, value.to_vec());
    rest = after_value;
  }
}

fn parse_tcp_length_ext(nibble: u8, bytes: &[u8]) -> Result<(u32, &[u8]), MessageParseError> {
  match nibble {
    | 0..=12 => Ok((nibble as u32, bytes)),
    | 13 => match bytes {
      | [b, rest @ ..] => Ok((*b as u32 + 13, rest)),
      | [] => Err(MessageParseError::Eof),
    },
    | 14 => match bytes {
      | [a, b, rest @ ..] => Ok((u16::from_be_bytes([*a, *b]) as u32 + 269, rest)),
      | _ => Err(MessageParseError::Eof),
    },
    | 15 => match bytes {
      | [a, b, c, d, rest @ ..] => Ok((u32::from_be_bytes([*a, *b, *c, *d]) + 65805, rest)),
      | _ => Err(MessageParseError::Eof),
    },
    | _ => unreachable!("nibble is 4 bits"),
  }
}

fn encode_tcp_length_ext(len: u32) -> (u8, Vec<u8>) {
  if len < 13 {
    (len as u8, Vec::new())
  } else if len < 269 {
    (13, vec![(len - 13) as u8])
  } else if len < 65805 {
    let ext = (len - 269) as u16;
    (14, ext.to_be_bytes().to_vec())
  } else {
    let ext = len - 65805;
    (15, ext.to_be_bytes().to_vec())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn udp_round_trips() {
    let (msg, bytes) = crate::test_msg();
    assert_eq!(encode_udp(&msg).unwrap(), bytes);
    assert_eq!(decode_udp(&bytes).unwrap(), msg);
  }

  #[test]
  fn udp_empty_payload_omits_marker() {
    let msg = Message::ack(Id(42));
    let bytes = encode_udp(&msg).unwrap();
    assert!(!bytes.contains(&0xFF));
    assert_eq!(decode_udp(&bytes).unwrap(), msg);
  }

  #[test]
  fn tcp_round_trips_at_edge_frame_sizes() {
    for body_len in [0usize, 12, 13, 268, 269, 65804, 65805] {
      let mut msg = Message::new(Type::Con, Code::GET, Id(0), Token::empty());
      if body_len > 0 {
        msg.payload = Some(vec![b'a'; body_len - 1]);
      }
      let bytes = encode_tcp(&msg).unwrap();
      let (decoded, rest) = decode_tcp(&bytes).unwrap();
      assert!(rest.is_empty());
      assert_eq!(decoded.code, msg.code);
      assert_eq!(decoded.token, msg.token);
      assert_eq!(decoded.payload, msg.payload);
    }
  }

  #[test]
  fn tcp_stream_yields_remaining_bytes() {
    let a = Message::new(Type::Con, Code::GET, Id(0), Token::empty());
    let b = Message::new(Type::Con, Code::CONTENT, Id(0), Token::empty());
    let mut stream = encode_tcp(&a).unwrap();
    stream.extend(encode_tcp(&b).unwrap());

    let (first, rest) = decode_tcp(&stream).unwrap();
    assert_eq!(first.code, Code::GET);
    let (second, rest) = decode_tcp(rest).unwrap();
    assert_eq!(second.code, Code::CONTENT);
    assert!(rest.is_empty());
  }

  #[test]
  fn tcp_incomplete_frame_reports_eof() {
    let msg = Message::new(Type::Con, Code::GET, Id(0), Token::empty());
    let bytes = encode_tcp(&msg).unwrap();
    assert_eq!(decode_tcp(&bytes[..bytes.len() - 1]), Err(MessageParseError::Eof));
  }
}
