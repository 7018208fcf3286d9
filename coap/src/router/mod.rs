//! Request dispatch: exact and `:param` path matching, mountable
//! sub-routers, and `.well-known/core` resource discovery (RFC 6690).

mod path;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use coap_msg::{Code, ContentFormat};

use crate::context::{Request, Response};
pub use path::Segment;

pub type Handler = Box<dyn Fn(&Request) -> Response + Send + Sync>;

/// The link-format attributes advertised for a resource at `.well-known/core`.
#[derive(Clone, Debug, Default)]
pub struct LinkAttributes {
  pub resource_type: Option<String>,
  pub interface: Option<String>,
  pub content_formats: Vec<ContentFormat>,
  pub observable: bool,
  pub title: Option<String>,
  pub size1: Option<u32>,
}

impl LinkAttributes {
  fn render(&self) -> String {
    let mut s = String::new();
    if let Some(rt) = &self.resource_type {
      s.push_str(&format!(";rt=\"{}\"", rt));
    }
    if let Some(if_) = &self.interface {
      s.push_str(&format!(";if=\"{}\"", if_));
    }
    if !self.content_formats.is_empty() {
      let cts = self.content_formats
                    .iter()
                    .map(|f| u16::from(*f).to_string())
                    .collect::<Vec<_>>()
                    .join(" ");
      s.push_str(&format!(";ct=\"{}\"", cts));
    }
    if let Some(title) = &self.title {
      s.push_str(&format!(";title=\"{}\"", title));
    }
    if let Some(sz) = self.size1 {
      s.push_str(&format!(";sz={}", sz));
    }
    if self.observable {
      s.push_str(";obs");
    }
    s
  }
}

struct Resource {
  pattern: Vec<Segment>,
  raw_path: String,
  handlers: HashMap<u8, Handler>,
  attributes: LinkAttributes,
}

fn code_key(code: Code) -> u8 {
  code.detail
}

/// Builder for a single resource's method handlers and link-format
/// attributes, returned by [`Router::resource`].
pub struct ResourceBuilder<'a> {
  router: &'a mut Router,
  index: usize,
}

impl<'a> ResourceBuilder<'a> {
  fn set(&mut self, code: Code, handler: Handler) -> &mut Self {
    self.router.resources[self.index].handlers.insert(code_key(code), handler);
    self
  }

  pub fn get(&mut self, handler: impl Fn(&Request) -> Response + Send + Sync + 'static) -> &mut Self {
    self.set(Code::GET, Box::new(handler))
  }

  pub fn post(&mut self, handler: impl Fn(&Request) -> Response + Send + Sync + 'static) -> &mut Self {
    self.set(Code::POST, Box::new(handler))
  }

  pub fn put(&mut self, handler: impl Fn(&Request) -> Response + Send + Sync + 'static) -> &mut Self {
    self.set(Code::PUT, Box::new(handler))
  }

  pub fn delete(&mut self, handler: impl Fn(&Request) -> Response + Send + Sync + 'static) -> &mut Self {
    self.set(Code::DELETE, Box::new(handler))
  }

  pub fn resource_type(&mut self, rt: impl Into<String>) -> &mut Self {
    self.router.resources[self.index].attributes.resource_type = Some(rt.into());
    self
  }

  pub fn interface(&mut self, if_: impl Into<String>) -> &mut Self {
    self.router.resources[self.index].attributes.interface = Some(if_.into());
    self
  }

  pub fn content_format(&mut self, ct: ContentFormat) -> &mut Self {
    self.router.resources[self.index].attributes.content_formats.push(ct);
    self
  }

  pub fn observable(&mut self) -> &mut Self {
    self.router.resources[self.index].attributes.observable = true;
    self
  }

  pub fn title(&mut self, title: impl Into<String>) -> &mut Self {
    self.router.resources[self.index].attributes.title = Some(title.into());
    self
  }

  pub fn size1(&mut self, size: u32) -> &mut Self {
    self.router.resources[self.index].attributes.size1 = Some(size);
    self
  }
}

/// A configuration-time routing error, returned by [`Router::resource`] or
/// [`Router::mount`] rather than discovered at dispatch time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RouteError {
  /// Attempting to mount a router that (directly or transitively) already
  /// mounts the router it's being attached to.
  CyclicMount,
  /// Two resources were registered against the same exact-match path.
  DuplicateRoute(String),
  /// The prefix passed to [`Router::mount`] was empty (or all slashes).
  MissingMountPath,
}

impl std::fmt::Display for RouteError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      | Self::CyclicMount => write!(f, "mounting this router would create a cycle"),
      | Self::DuplicateRoute(path) => write!(f, "a resource is already registered at {:?}", path),
      | Self::MissingMountPath => write!(f, "mount path must not be empty"),
    }
  }
}

impl std::error::Error for RouteError {}

struct Mount {
  prefix: Vec<String>,
  router: Router,
}

static NEXT_ROUTER_ID: AtomicU64 = AtomicU64::new(1);

/// A table of routes plus any sub-routers mounted under a path prefix.
///
/// Lookup tries an exact match in this router first (an O(1) hash lookup for
/// purely-literal patterns, falling back to a linear scan over patterns with
/// `:name` segments), then falls through to whichever mount has the longest
/// matching prefix.
pub struct Router {
  id: u64,
  resources: Vec<Resource>,
  literal_index: HashMap<Vec<String>, usize>,
  dynamic_index: Vec<usize>,
  mounts: Vec<Mount>,
}

impl Router {
  pub fn new() -> Self {
    Router { id: NEXT_ROUTER_ID.fetch_add(1, Ordering::Relaxed),
             resources: Vec::new(),
             literal_index: HashMap::new(),
             dynamic_index: Vec::new(),
             mounts: Vec::new() }
  }

  /// Registers a resource pattern (`/hello`, `/sensors/:id`, ...) and returns
  /// a builder for its method handlers and link-format attributes.
  ///
  /// Panics if `pattern` duplicates an already-registered exact-match path --
  /// this is a configuration mistake, caught once at startup rather than
  /// something a caller is expected to recover from at runtime.
  pub fn resource(&mut self, pattern: &str) -> ResourceBuilder<'_> {
    let segments = path::parse_pattern(pattern);
    let raw_path = pattern.trim_matches('/').to_owned();

    if let Some(key) = path::literal_key(&segments) {
      if self.literal_index.contains_key(&key) {
        panic!("{}", RouteError::DuplicateRoute(raw_path));
      }
    }

    let index = self.resources.len();
    self.resources.push(Resource { pattern: segments.clone(), raw_path, handlers: HashMap::new(), attributes: LinkAttributes::default() });

    match path::literal_key(&segments) {
      | Some(key) => {
        self.literal_index.insert(key, index);
      },
      | None => self.dynamic_index.push(index),
    }

    ResourceBuilder { router: self, index }
  }

  /// Attaches `sub` under `prefix`. Fails if `prefix` is empty, or if `sub`
  /// already (transitively) mounts `self`, which would make dispatch loop
  /// forever.
  pub fn mount(&mut self, prefix: &str, sub: Router) -> Result<(), RouteError> {
    let prefix_segments: Vec<String> = prefix.trim_matches('/').split('/').filter(|s| !s.is_empty()).map(str::to_owned).collect();
    if prefix_segments.is_empty() {
      return Err(RouteError::MissingMountPath);
    }
    if sub.contains_id(self.id) {
      return Err(RouteError::CyclicMount);
    }
    self.mounts.push(Mount { prefix: prefix_segments, router: sub });
    Ok(())
  }

  fn contains_id(&self, id: u64) -> bool {
    self.id == id || self.mounts.iter().any(|m| m.router.contains_id(id))
  }

  /// Resolves `path` to a resource and its bound params, searching this
  /// router's own resources before falling through to the mount with the
  /// longest matching prefix.
  fn resolve(&self, path: &[String]) -> Option<(&Resource, HashMap<String, String>)> {
    if let Some(&index) = self.literal_index.get(path) {
      return Some((&self.resources[index], HashMap::new()));
    }

    for &index in &self.dynamic_index {
      if let Some(params) = path::match_path(&self.resources[index].pattern, path) {
        return Some((&self.resources[index], params));
      }
    }

    let best = self.mounts
                   .iter()
                   .filter_map(|m| path::prefix_len(&m.prefix, path).map(|len| (len, m)))
                   .max_by_key(|(len, _)| *len);

    best.and_then(|(len, m)| m.router.resolve(&path[len..]))
  }

  /// Dispatches a request to its matching handler, producing 4.04/4.05 when
  /// nothing matches or the matched resource doesn't support the method.
  pub fn dispatch(&self, req: &Request) -> Response {
    match self.resolve(&req.path) {
      | Some((resource, params)) => match resource.handlers.get(&code_key(req.method())) {
        | Some(handler) => {
          let mut req = req.clone();
          req.params = params;
          handler(&req)
        },
        | None => Response::method_not_allowed(req),
      },
      | None => Response::not_found(req),
    }
  }

  /// Whether `path` resolves to a resource that supports `method` -- used by
  /// the Observe registry to validate a subscription request before
  /// accepting it.
  pub fn supports(&self, path: &[String], method: Code) -> bool {
    self.resolve(path).map(|(r, _)| r.handlers.contains_key(&code_key(method))).unwrap_or(false)
  }

  /// Renders the CoRE Link Format body for `.well-known/core` (RFC 6690),
  /// applying any `rt=`/`if=`/`ct=` filters present in the request query.
  pub fn link_format(&self, query: &HashMap<String, String>) -> String {
    let mut links = Vec::new();
    self.collect_links(&[], query, &mut links);
    links.join(",")
  }

  fn collect_links(&self, prefix: &[String], query: &HashMap<String, String>, out: &mut Vec<String>) {
    for resource in &self.resources {
      if !link_matches_filter(&resource.attributes, query) {
        continue;
      }
      let full_path = if prefix.is_empty() {
        resource.raw_path.clone()
      } else {
        format!("{}/{}", prefix.join("/"), resource.raw_path)
      };
      out.push(format!("</{}>{}", full_path, resource.attributes.render()));
    }

    for mount in &self.mounts {
      let mut nested_prefix = prefix.to_vec();
      nested_prefix.extend(mount.prefix.iter().cloned());
      mount.router.collect_links(&nested_prefix, query, out);
    }
  }
}

impl Default for Router {
  fn default() -> Self {
    Self::new()
  }
}

fn link_matches_filter(attrs: &LinkAttributes, query: &HashMap<String, String>) -> bool {
  if let Some(rt) = query.get("rt") {
    if attrs.resource_type.as_deref() != Some(rt.as_str()) {
      return false;
    }
  }
  if let Some(if_) = query.get("if") {
    if attrs.interface.as_deref() != Some(if_.as_str()) {
      return false;
    }
  }
  if let Some(ct) = query.get("ct") {
    let ct: u16 = match ct.parse() {
      | Ok(n) => n,
      | Err(_) => return false,
    };
    if !attrs.content_formats.iter().any(|f| u16::from(*f) == ct) {
      return false;
    }
  }
  if let Some(title) = query.get("title") {
    if attrs.title.as_deref() != Some(title.as_str()) {
      return false;
    }
  }
  if let Some(sz) = query.get("sz") {
    let sz: u32 = match sz.parse() {
      | Ok(n) => n,
      | Err(_) => return false,
    };
    if attrs.size1 != Some(sz) {
      return false;
    }
  }
  if let Some(obs) = query.get("obs") {
    if obs != "1" && !obs.is_empty() {
      return false;
    }
    if !attrs.observable {
      return false;
    }
  }
  true
}

#[cfg(test)]
mod tests {
  use std::net::{IpAddr, Ipv4Addr, SocketAddr};

  use coap_msg::{Id, Message, Token, Type};

  use super::*;

  fn req(path: &[&str], method: Code) -> Request {
    Request { peer: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 1),
              message: Message::new(Type::Con, method, Id(1), Token::empty()),
              path: path.iter().map(|s| s.to_string()).collect(),
              params: HashMap::new(),
              query: HashMap::new() }
  }

  #[test]
  fn exact_match_dispatches() {
    let mut router = Router::new();
    router.resource("/hello").get(|r| Response::for_request(r, Code::CONTENT).with_payload("hi"));

    let resp = router.dispatch(&req(&["hello"], Code::GET));
    assert_eq!(resp.code, Code::CONTENT);
  }

  #[test]
  fn dynamic_segment_binds_param() {
    let mut router = Router::new();
    router.resource("/sensors/:id").get(|r| {
                                       let id = r.params.get("id").cloned().unwrap_or_default();
                                       Response::for_request(r, Code::CONTENT).with_payload(id)
                                     });

    let resp = router.dispatch(&req(&["sensors", "7"], Code::GET));
    assert_eq!(resp.code, Code::CONTENT);
  }

  #[test]
  fn unmatched_path_is_not_found() {
    let router = Router::new();
    let resp = router.dispatch(&req(&["nope"], Code::GET));
    assert_eq!(resp.code, Code::NOT_FOUND);
  }

  #[test]
  fn wrong_method_is_method_not_allowed() {
    let mut router = Router::new();
    router.resource("/hello").get(|r| Response::for_request(r, Code::CONTENT));
    let resp = router.dispatch(&req(&["hello"], Code::POST));
    assert_eq!(resp.code, Code::METHOD_NOT_ALLOWED);
  }

  #[test]
  #[should_panic(expected = "already registered")]
  fn duplicate_literal_route_panics() {
    let mut router = Router::new();
    router.resource("/hello").get(|r| Response::for_request(r, Code::CONTENT));
    router.resource("/hello").get(|r| Response::for_request(r, Code::CONTENT));
  }

  #[test]
  fn mount_with_empty_prefix_is_rejected() {
    let mut router = Router::new();
    assert_eq!(router.mount("/", Router::new()), Err(RouteError::MissingMountPath));
    assert_eq!(router.mount("", Router::new()), Err(RouteError::MissingMountPath));
  }

  #[test]
  fn mounted_router_uses_longest_prefix() {
    let mut inner = Router::new();
    inner.resource("/value").get(|r| Response::for_request(r, Code::CONTENT).with_payload("42"));

    let mut outer = Router::new();
    outer.mount("/sensors", inner).unwrap();

    let resp = outer.dispatch(&req(&["sensors", "value"], Code::GET));
    assert_eq!(resp.code, Code::CONTENT);
  }

  #[test]
  fn link_format_lists_registered_resources_with_attributes() {
    let mut router = Router::new();
    router.resource("/temp").get(|r| Response::for_request(r, Code::CONTENT)).resource_type("temperature-c").observable();

    let links = router.link_format(&HashMap::new());
    assert_eq!(links, "</temp>;rt=\"temperature-c\";obs");
  }

  #[test]
  fn link_format_respects_rt_filter() {
    let mut router = Router::new();
    router.resource("/a").get(|r| Response::for_request(r, Code::CONTENT)).resource_type("x");
    router.resource("/b").get(|r| Response::for_request(r, Code::CONTENT)).resource_type("y");

    let mut query = HashMap::new();
    query.insert("rt".to_string(), "y".to_string());
    assert_eq!(router.link_format(&query), "</b>;rt=\"y\"");
  }
}
