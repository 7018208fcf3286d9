//! Optional request middleware, run in registration order before routing.
//! The first middleware to return `Some` short-circuits the chain (and the
//! router is never consulted); returning `None` passes the request on.

use crate::context::{Request, Response};

pub type Middleware = Box<dyn Fn(&Request) -> Option<Response> + Send + Sync>;

#[derive(Default)]
pub struct Chain {
  fns: Vec<Middleware>,
}

impl Chain {
  pub fn new() -> Self {
    Chain { fns: Vec::new() }
  }

  pub fn push(&mut self, f: impl Fn(&Request) -> Option<Response> + Send + Sync + 'static) {
    self.fns.push(Box::new(f));
  }

  pub fn run(&self, req: &Request) -> Option<Response> {
    self.fns.iter().find_map(|f| f(req))
  }
}

#[cfg(test)]
mod tests {
  use std::collections::HashMap;
  use std::net::{IpAddr, Ipv4Addr, SocketAddr};

  use coap_msg::{Code, Id, Message, Token, Type};

  use super::*;

  fn req() -> Request {
    Request { peer: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 1),
              message: Message::new(Type::Con, Code::GET, Id(1), Token::empty()),
              path: vec![],
              params: HashMap::new(),
              query: HashMap::new() }
  }

  #[test]
  fn first_match_short_circuits() {
    let mut chain = Chain::new();
    chain.push(|_| None);
    chain.push(|r| Some(Response::for_request(r, Code::CONTENT)));
    chain.push(|_| panic!("should not run"));

    let resp = chain.run(&req()).unwrap();
    assert_eq!(resp.code, Code::CONTENT);
  }

  #[test]
  fn no_match_falls_through() {
    let mut chain = Chain::new();
    chain.push(|_| None);
    assert!(chain.run(&req()).is_none());
  }
}
