//! Top-level server builder: assemble routes and middleware, then boot the
//! UDP and (optionally) TCP listeners.

use std::net::ToSocketAddrs;
use std::sync::{Arc, OnceLock};

use crate::config::Config;
use crate::context::{Request, Response};
use crate::error::Error;
use crate::middleware::Chain;
use crate::net::{tcp, udp};
use crate::reactor::Reactor;
use crate::router::Router;

/// Builds up routes and middleware, then boots listeners that run for the
/// remainder of the process -- there is deliberately no `shutdown()`: a
/// CoAP endpoint that needs graceful teardown should drop the process
/// instead, same as the one-thread-per-core-resource `kwap`/`toad` runtimes
/// this is descended from.
pub struct Server {
  config: Config,
  router: Router,
  middleware: Chain,
  /// Filled in with the fully-assembled router once [`Self::run`] wraps it
  /// in an `Arc`, so the `.well-known/core` handler registered by
  /// [`Self::with_discovery`] can render a fresh, query-filtered listing
  /// against the real route table on every request instead of a listing
  /// baked in at registration time.
  discovery: Option<Arc<OnceLock<Arc<Router>>>>,
}

impl Server {
  pub fn new(config: Config) -> Self {
    Server { config, router: Router::new(), middleware: Chain::new(), discovery: None }
  }

  pub fn router(&mut self) -> &mut Router {
    &mut self.router
  }

  pub fn middleware(&mut self, f: impl Fn(&Request) -> Option<Response> + Send + Sync + 'static) -> &mut Self {
    self.middleware.push(f);
    self
  }

  /// Auto-registers `.well-known/core` (RFC 6690) against whatever routes
  /// exist by the time [`Self::run`] assembles the final router -- call
  /// this last. Each request re-renders the listing against the live route
  /// table, applying that request's `rt=`/`if=`/`ct=`/`sz=`/`title=`/`obs`
  /// filters, so routes mounted between this call and `run` still show up.
  pub fn with_discovery(mut self) -> Self {
    let cell: Arc<OnceLock<Arc<Router>>> = Arc::new(OnceLock::new());
    let handler_cell = cell.clone();

    let mut well_known = Router::new();
    well_known.resource("core").get(move |r| {
                                    let listing = handler_cell.get().map(|router| router.link_format(&r.query)).unwrap_or_default();
                                    Response::for_request(r, coap_msg::Code::CONTENT)
                                      .with_content_format(coap_msg::ContentFormat::LinkFormat)
                                      .with_payload(listing)
                                  });

    self.router.mount("/.well-known", well_known).expect("a fresh router cannot cycle against an existing one");
    self.discovery = Some(cell);
    self
  }

  /// Binds a UDP listener (always) and, if `tcp_addr` is given, a TCP
  /// listener too, then returns a [`Reactor`] handle the caller can use to
  /// push Observe notifications for server-initiated state changes.
  pub fn run(self, udp_addr: impl ToSocketAddrs, tcp_addr: Option<impl ToSocketAddrs>) -> Result<Reactor, Error> {
    let router = Arc::new(self.router);
    if let Some(cell) = &self.discovery {
      let _ = cell.set(router.clone());
    }

    let reactor = Reactor::new(self.config, router).with_middleware(self.middleware);

    udp::spawn(udp_addr, reactor.clone())?;
    if let Some(tcp_addr) = tcp_addr {
      tcp::spawn(tcp_addr, reactor.clone())?;
    }

    Ok(reactor)
  }
}
