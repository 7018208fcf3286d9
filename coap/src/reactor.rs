//! Ties the router, Observe registry, retransmission tracker and dedup cache
//! together into the logic a transport calls on every inbound datagram or
//! frame. Nothing in here touches a socket -- see `net::udp` and `net::tcp`
//! for the threads that own the actual listeners.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use coap_msg::{Code, ContentFormat, Id, Message, OptNumber, Type};

use crate::config::Config;
use crate::content;
use crate::context::{parse_path, parse_query, Request, Response};
use crate::middleware::Chain;
use crate::observe::ObserveRegistry;
use crate::reliability::dedup::{DedupCache, Seen};
use crate::reliability::PendingRequests;
use crate::router::Router;

/// One message a transport should send as a result of processing an inbound
/// message.
pub struct Outbound {
  pub peer: SocketAddr,
  pub message: Message,
}

/// Handed to the `setup` closure passed to [`Reactor::observable`]; pushing a
/// value here publishes it to the path's observers.
pub struct Emitter {
  tx: mpsc::Sender<f64>,
}

impl Emitter {
  pub fn notify(&self, value: f64) {
    let _ = self.tx.send(value);
  }
}

/// The request/response engine shared by the UDP and TCP listener threads.
///
/// Cheaply `Clone`-able (everything inside is an `Arc`) so each connection
/// handler thread (TCP) or worker in the pool (UDP) can hold its own handle.
#[derive(Clone)]
pub struct Reactor {
  pub config: Config,
  pub router: Arc<Router>,
  pub observe: Arc<ObserveRegistry>,
  pub pending: Arc<PendingRequests>,
  pub dedup: Arc<DedupCache>,
  pub content: Arc<content::Registry>,
  pub middleware: Arc<Chain>,
  /// Notifications produced by [`Self::observable`]/[`Self::observable_polling`]
  /// emitters, waiting for a transport to drain and send them -- the
  /// equivalent of the work queue a route handler's return value rides on,
  /// but for server-initiated traffic nobody is polling for a response to.
  push_queue: Arc<Mutex<VecDeque<Outbound>>>,
}

impl Reactor {
  pub fn new(config: Config, router: Arc<Router>) -> Self {
    Reactor { config,
              router,
              observe: Arc::new(ObserveRegistry::new()),
              pending: Arc::new(PendingRequests::new()),
              dedup: Arc::new(DedupCache::new()),
              content: Arc::new(content::Registry::new()),
              middleware: Arc::new(Chain::new()),
              push_queue: Arc::new(Mutex::new(VecDeque::new())) }
  }

  pub fn with_middleware(mut self, chain: Chain) -> Self {
    self.middleware = Arc::new(chain);
    self
  }

  /// Processes one inbound message from `peer`, returning whatever
  /// responses (zero or more) should be sent back. Never panics: a route
  /// handler panic is caught and turned into a 5.00.
  pub fn handle(&self, peer: SocketAddr, msg: Message) -> Vec<Outbound> {
    if msg.is_empty() {
      return self.handle_empty(peer, msg);
    }

    match msg.code.kind() {
      | coap_msg::CodeKind::Request => self.handle_request(peer, msg),
      | coap_msg::CodeKind::Response => self.handle_response(peer, msg),
      | coap_msg::CodeKind::Signaling | coap_msg::CodeKind::Empty => Vec::new(),
    }
  }

  fn handle_empty(&self, peer: SocketAddr, msg: Message) -> Vec<Outbound> {
    match msg.ty {
      // Every Confirmable message, empty or not, must be acknowledged.
      | Type::Con => vec![Outbound { peer, message: Message::ack(msg.id) }],
      | Type::Ack | Type::Reset => {
        self.pending.acknowledge(peer, msg.id);
        Vec::new()
      },
      // An unsolicited empty Non-confirmable carries no request this endpoint
      // can act on; reject it.
      | Type::Non => vec![Outbound { peer, message: Message::reset(msg.id) }],
    }
  }

  fn handle_request(&self, peer: SocketAddr, msg: Message) -> Vec<Outbound> {
    if msg.ty == Type::Con {
      match self.dedup.check_or_insert(peer, msg.id) {
        | Seen::Duplicate(Some(resp)) => return vec![Outbound { peer, message: resp }],
        | Seen::Duplicate(None) => return Vec::new(),
        | Seen::New => {},
      }
    }

    if let Some(number) = msg.options.unknown_critical(is_known_option) {
      log::debug!("rejecting message with unrecognized critical option {}", number);
      let path = parse_path(&msg);
      let query = parse_query(&msg);
      let id = msg.id;
      let is_con = msg.ty == Type::Con;
      let req = Request { peer, message: msg, path, params: Default::default(), query };
      let response = Response::bad_option(&req);
      if is_con {
        self.dedup.store_response(peer, id, response.message.clone());
      }
      return vec![Outbound { peer, message: response.message }];
    }

    let path = parse_path(&msg);
    let query = parse_query(&msg);
    let id = msg.id;
    let is_con = msg.ty == Type::Con;
    let token = msg.token.clone();
    let observe_requested = msg.options.get_first(coap_msg::OptNumber::OBSERVE.0).and_then(|v| v.as_uint());

    let req = Request { peer, message: msg, path: path.clone(), params: Default::default(), query };

    let response = if !req.payload().is_empty() && self.content.get(req.content_format_or_default()).is_none() {
      Response::unsupported_content_format(&req)
    } else {
      self.middleware.run(&req).unwrap_or_else(|| {
        std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| self.router.dispatch(&req))).unwrap_or_else(|_| {
          log::error!("route handler panicked for {:?}", path);
          Response::internal_server_error(&req)
        })
      })
    };

    if req.method() == Code::GET {
      match observe_requested {
        | Some(0) => self.observe.register(path.clone(), peer, token.clone(), None),
        | Some(1) => self.observe.cancel(&path, peer, &token),
        | _ => {},
      }
    }

    if is_con {
      self.dedup.store_response(peer, id, response.message.clone());
    }

    vec![Outbound { peer, message: response.message }]
  }

  fn handle_response(&self, peer: SocketAddr, msg: Message) -> Vec<Outbound> {
    self.pending.acknowledge(peer, msg.id);
    if msg.ty == Type::Con {
      return vec![Outbound { peer, message: Message::ack(msg.id) }];
    }
    Vec::new()
  }

  /// Pushes a fresh representation of `path` out to every current observer,
  /// returning the notifications for a transport to send.
  pub fn notify_observers(&self, path: &[String], code: Code, payload: Vec<u8>, content_format: Option<u16>) -> Vec<Outbound> {
    self.observe
        .notify(path, code, payload, content_format)
        .into_iter()
        .map(|(peer, message)| Outbound { peer, message })
        .collect()
  }

  /// Like [`Self::notify_observers`], but subject to each observer's
  /// delta-threshold suppression (see [`ObserveRegistry::notify_numeric`]).
  fn notify_observers_numeric(&self, path: &[String], code: Code, value: f64, payload: Vec<u8>, content_format: Option<u16>) -> Vec<Outbound> {
    self.observe
        .notify_numeric(path, code, value, payload, content_format)
        .into_iter()
        .map(|(peer, message)| Outbound { peer, message })
        .collect()
  }

  /// Schedules `producer` to run every `interval`, publishing its result to
  /// `path`'s observers each time -- `observable_polling(path, interval,
  /// producer)`. Runs for as long as the `Reactor` (and thus the process) does.
  pub fn observable_polling(&self, path: Vec<String>, interval: Duration, producer: impl Fn() -> f64 + Send + 'static) {
    let reactor = self.clone();
    thread::spawn(move || loop {
      thread::sleep(interval);
      let value = producer();
      reactor.publish_numeric(&path, value);
    });
  }

  /// Calls `setup(emitter)` once, handing it an [`Emitter`] it can push
  /// values into from anywhere (another thread, a hardware interrupt
  /// callback, ...) -- `observable(path, setup)`. Every value pushed is
  /// published to `path`'s observers on a dedicated background thread.
  pub fn observable(&self, path: Vec<String>, setup: impl FnOnce(Emitter)) {
    let (tx, rx) = mpsc::channel::<f64>();
    let reactor = self.clone();
    thread::spawn(move || {
      while let Ok(value) = rx.recv() {
        reactor.publish_numeric(&path, value);
      }
    });
    setup(Emitter { tx });
  }

  /// Notifies `path`'s observers of `value`, queuing the resulting
  /// notifications for a transport to drain with [`Self::drain_pushed`].
  fn publish_numeric(&self, path: &[String], value: f64) {
    let payload = value.to_string().into_bytes();
    let outbound = self.notify_observers_numeric(path, Code::CONTENT, value, payload, Some(u16::from(ContentFormat::TextPlain)));
    self.push_queue.lock().unwrap().extend(outbound);
  }

  /// Drains notifications queued by emitters since the last call -- a
  /// transport should call this on the same cadence it calls
  /// [`Self::poll_retransmissions`].
  pub fn drain_pushed(&self) -> Vec<Outbound> {
    self.push_queue.lock().unwrap().drain(..).collect()
  }

  /// Runs one tick of the retransmission timer, returning retransmissions to
  /// send and logging anything that gave up entirely.
  pub fn poll_retransmissions(&self, now: std::time::Instant) -> Vec<Outbound> {
    let mut out = Vec::new();
    for outcome in self.pending.poll(now) {
      match outcome {
        | crate::reliability::Outcome::Retransmit { peer, message } => out.push(Outbound { peer, message }),
        | crate::reliability::Outcome::GaveUp { peer, id } => {
          log::warn!("giving up on message {:?} to {}", id, peer);
        },
      }
    }
    out
  }

  pub fn sweep(&self) {
    self.dedup.sweep(self.config.msg.exchange_lifetime());
    self.observe.sweep(self.config.observe.max_staleness);
  }
}

/// Every option number this endpoint understands (RFC 7252 section 12.2
/// subset it implements), used to reject messages carrying an unrecognized
/// critical option (RFC 7252 section 5.4.1) instead of silently dispatching
/// them.
fn is_known_option(number: u32) -> bool {
  matches!(number,
           n if n == OptNumber::IF_MATCH.0
                || n == OptNumber::URI_HOST.0
                || n == OptNumber::ETAG.0
                || n == OptNumber::IF_NONE_MATCH.0
                || n == OptNumber::OBSERVE.0
                || n == OptNumber::URI_PORT.0
                || n == OptNumber::LOCATION_PATH.0
                || n == OptNumber::URI_PATH.0
                || n == OptNumber::CONTENT_FORMAT.0
                || n == OptNumber::MAX_AGE.0
                || n == OptNumber::URI_QUERY.0
                || n == OptNumber::ACCEPT.0
                || n == OptNumber::LOCATION_QUERY.0
                || n == OptNumber::PROXY_URI.0
                || n == OptNumber::PROXY_SCHEME.0
                || n == OptNumber::SIZE1.0)
}
