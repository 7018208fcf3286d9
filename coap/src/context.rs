use std::collections::HashMap;
use std::net::SocketAddr;

use coap_msg::{Code, ContentFormat, Id, Message, OptNumber, Token, Type};

/// An inbound request handed to a route, with the path already split into
/// segments and query parameters already decoded -- the wire-level
/// `Message` is kept around for anything a handler needs that this doesn't
/// surface directly (less-common options, the raw token).
#[derive(Clone, Debug)]
pub struct Request {
  pub peer: SocketAddr,
  pub message: Message,
  pub path: Vec<String>,
  pub params: HashMap<String, String>,
  pub query: HashMap<String, String>,
}

impl Request {
  pub fn method(&self) -> Code {
    self.message.code
  }

  pub fn is_confirmable(&self) -> bool {
    self.message.ty == Type::Con
  }

  pub fn token(&self) -> &Token {
    &self.message.token
  }

  pub fn id(&self) -> Id {
    self.message.id
  }

  pub fn content_format(&self) -> Option<ContentFormat> {
    self.message
        .options
        .get_first(OptNumber::CONTENT_FORMAT.0)
        .and_then(|v| v.as_uint())
        .map(|n| ContentFormat::from(n as u16))
  }

  /// The request's declared Content-Format, defaulting to `application/json`
  /// when the option is absent (the registry always carries a JSON codec).
  pub fn content_format_or_default(&self) -> ContentFormat {
    self.content_format().unwrap_or(ContentFormat::Json)
  }

  pub fn accept(&self) -> Option<ContentFormat> {
    self.message
        .options
        .get_first(OptNumber::ACCEPT.0)
        .and_then(|v| v.as_uint())
        .map(|n| ContentFormat::from(n as u16))
  }

  /// The value of the Observe option on a GET request: `Some(0)` to
  /// register, `Some(n)` on a notification, `None` if absent.
  pub fn observe(&self) -> Option<u32> {
    self.message.options.get_first(OptNumber::OBSERVE.0).and_then(|v| v.as_uint())
  }

  pub fn payload(&self) -> &[u8] {
    self.message.payload.as_deref().unwrap_or(&[])
  }
}

/// A response being built by a handler, addressed back to the request it
/// answers. Transport code fills in `id`/`ty`/`token` from the request before
/// sending; handlers only need to set `code`, options, and `payload`.
#[derive(Clone, Debug)]
pub struct Response {
  pub code: Code,
  pub message: Message,
}

impl Response {
  pub fn for_request(req: &Request, code: Code) -> Self {
    let ty = match req.message.ty {
      | Type::Con => Type::Ack,
      | other => other,
    };
    let message = Message::new(ty, code, req.message.id, req.message.token.clone());
    Response { code, message }
  }

  pub fn with_payload(mut self, payload: impl Into<Vec<u8>>) -> Self {
    self.message.payload = Some(payload.into());
    self
  }

  pub fn with_content_format(mut self, format: ContentFormat) -> Self {
    self.message.options.set(OptNumber::CONTENT_FORMAT.0, coap_msg::OptValue::from_uint(u16::from(format) as u32));
    self
  }

  pub fn not_found(req: &Request) -> Self {
    Response::for_request(req, Code::NOT_FOUND)
  }

  pub fn method_not_allowed(req: &Request) -> Self {
    Response::for_request(req, Code::METHOD_NOT_ALLOWED)
  }

  pub fn bad_option(req: &Request) -> Self {
    Response::for_request(req, Code::BAD_OPTION)
  }

  pub fn internal_server_error(req: &Request) -> Self {
    Response::for_request(req, Code::INTERNAL_SERVER_ERROR)
  }

  pub fn unsupported_content_format(req: &Request) -> Self {
    Response::for_request(req, Code::UNSUPPORTED_CONTENT_FORMAT)
  }
}

/// Splits a `Uri-Path`-derived path into segments, and `Uri-Query` pairs into
/// a map, the way every route match and the Link Format listing needs them.
pub fn parse_path(message: &Message) -> Vec<String> {
  message.options
         .get_all(OptNumber::URI_PATH.0)
         .iter()
         .filter_map(|v| v.as_str().map(str::to_owned))
         .collect()
}

pub fn parse_query(message: &Message) -> HashMap<String, String> {
  message.options
         .get_all(OptNumber::URI_QUERY.0)
         .iter()
         .filter_map(|v| v.as_str())
         .map(|pair| match pair.split_once('=') {
           | Some((k, v)) => (k.to_owned(), v.to_owned()),
           | None => (pair.to_owned(), String::new()),
         })
         .collect()
}
