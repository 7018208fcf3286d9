//! Content-Format aware (de)serialization (RFC 7252 section 12.3), built on
//! the same serde stack the rest of the ecosystem uses for CoAP payloads:
//! `serde_json` for `application/json` and `ciborium` for `application/cbor`.

use std::collections::HashMap;
use std::fmt;

use coap_msg::ContentFormat;
use serde::de::DeserializeOwned;
use serde::Serialize;

#[derive(Debug)]
pub enum CodecError {
  UnsupportedFormat(ContentFormat),
  NotUtf8,
  Json(serde_json::Error),
  CborEncode(ciborium::ser::Error<std::io::Error>),
  CborDecode(ciborium::de::Error<std::io::Error>),
}

impl fmt::Display for CodecError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      | Self::UnsupportedFormat(fmt_) => write!(f, "no codec registered for content-format {:?}", fmt_),
      | Self::NotUtf8 => write!(f, "payload is not valid utf-8"),
      | Self::Json(e) => write!(f, "json error: {}", e),
      | Self::CborEncode(e) => write!(f, "cbor encode error: {}", e),
      | Self::CborDecode(e) => write!(f, "cbor decode error: {}", e),
    }
  }
}

impl std::error::Error for CodecError {}

pub fn encode_json<T: Serialize>(value: &T) -> Result<Vec<u8>, CodecError> {
  serde_json::to_vec(value).map_err(CodecError::Json)
}

pub fn decode_json<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CodecError> {
  serde_json::from_slice(bytes).map_err(CodecError::Json)
}

pub fn encode_cbor<T: Serialize>(value: &T) -> Result<Vec<u8>, CodecError> {
  let mut buf = Vec::new();
  ciborium::ser::into_writer(value, &mut buf).map_err(CodecError::CborEncode)?;
  Ok(buf)
}

pub fn decode_cbor<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CodecError> {
  ciborium::de::from_reader(bytes).map_err(CodecError::CborDecode)
}

pub fn encode_plain(s: &str) -> Vec<u8> {
  s.as_bytes().to_vec()
}

pub fn decode_plain(bytes: &[u8]) -> Result<&str, CodecError> {
  std::str::from_utf8(bytes).map_err(|_| CodecError::NotUtf8)
}

/// A dynamically-dispatchable codec for handlers that negotiate
/// Content-Format at runtime rather than knowing a concrete Rust type ahead
/// of time (the CoRE Link Format resource listing is one such caller).
/// `serde_json::Value` is the shared currency between formats.
pub trait Codec: Send + Sync {
  fn format(&self) -> ContentFormat;
  fn encode(&self, value: &serde_json::Value) -> Result<Vec<u8>, CodecError>;
  fn decode(&self, bytes: &[u8]) -> Result<serde_json::Value, CodecError>;
}

struct JsonCodec;
impl Codec for JsonCodec {
  fn format(&self) -> ContentFormat {
    ContentFormat::Json
  }

  fn encode(&self, value: &serde_json::Value) -> Result<Vec<u8>, CodecError> {
    encode_json(value)
  }

  fn decode(&self, bytes: &[u8]) -> Result<serde_json::Value, CodecError> {
    decode_json(bytes)
  }
}

struct CborCodec;
impl Codec for CborCodec {
  fn format(&self) -> ContentFormat {
    ContentFormat::Cbor
  }

  fn encode(&self, value: &serde_json::Value) -> Result<Vec<u8>, CodecError> {
    encode_cbor(value)
  }

  fn decode(&self, bytes: &[u8]) -> Result<serde_json::Value, CodecError> {
    decode_cbor(bytes)
  }
}

struct PlainCodec;
impl Codec for PlainCodec {
  fn format(&self) -> ContentFormat {
    ContentFormat::TextPlain
  }

  fn encode(&self, value: &serde_json::Value) -> Result<Vec<u8>, CodecError> {
    match value {
      | serde_json::Value::String(s) => Ok(encode_plain(s)),
      | other => Ok(encode_plain(&other.to_string())),
    }
  }

  fn decode(&self, bytes: &[u8]) -> Result<serde_json::Value, CodecError> {
    decode_plain(bytes).map(|s| serde_json::Value::String(s.to_owned()))
  }
}

struct OctetStreamCodec;
impl Codec for OctetStreamCodec {
  fn format(&self) -> ContentFormat {
    ContentFormat::OctetStream
  }

  fn encode(&self, value: &serde_json::Value) -> Result<Vec<u8>, CodecError> {
    match value {
      | serde_json::Value::Array(items) => {
        items.iter()
             .map(|v| v.as_u64().map(|n| n as u8).ok_or(CodecError::UnsupportedFormat(ContentFormat::OctetStream)))
             .collect()
      },
      | _ => Err(CodecError::UnsupportedFormat(ContentFormat::OctetStream)),
    }
  }

  fn decode(&self, bytes: &[u8]) -> Result<serde_json::Value, CodecError> {
    Ok(serde_json::Value::Array(bytes.iter().map(|&b| serde_json::Value::from(b)).collect()))
  }
}

/// A lookup table from [`ContentFormat`] to the [`Codec`] that handles it.
/// Starts populated with text/plain, octet-stream, json and cbor; callers
/// may register additional formats with [`Registry::register`].
pub struct Registry {
  codecs: HashMap<u16, Box<dyn Codec>>,
}

impl Registry {
  pub fn new() -> Self {
    let mut codecs: HashMap<u16, Box<dyn Codec>> = HashMap::new();
    codecs.insert(u16::from(ContentFormat::TextPlain), Box::new(PlainCodec));
    codecs.insert(u16::from(ContentFormat::OctetStream), Box::new(OctetStreamCodec));
    codecs.insert(u16::from(ContentFormat::Json), Box::new(JsonCodec));
    codecs.insert(u16::from(ContentFormat::Cbor), Box::new(CborCodec));
    Registry { codecs }
  }

  pub fn register(&mut self, codec: Box<dyn Codec>) {
    self.codecs.insert(u16::from(codec.format()), codec);
  }

  pub fn get(&self, format: ContentFormat) -> Option<&dyn Codec> {
    self.codecs.get(&u16::from(format)).map(Box::as_ref)
  }
}

impl Default for Registry {
  fn default() -> Self {
    Self::new()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn json_round_trips_through_registry() {
    let registry = Registry::new();
    let codec = registry.get(ContentFormat::Json).unwrap();
    let value = serde_json::json!({"hello": "world"});
    let bytes = codec.encode(&value).unwrap();
    assert_eq!(codec.decode(&bytes).unwrap(), value);
  }

  #[test]
  fn cbor_round_trips_through_registry() {
    let registry = Registry::new();
    let codec = registry.get(ContentFormat::Cbor).unwrap();
    let value = serde_json::json!({"n": 42});
    let bytes = codec.encode(&value).unwrap();
    assert_eq!(codec.decode(&bytes).unwrap(), value);
  }

  #[test]
  fn unregistered_format_is_absent() {
    let registry = Registry::new();
    assert!(registry.get(ContentFormat::Xml).is_none());
  }
}
