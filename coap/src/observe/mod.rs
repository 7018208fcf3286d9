//! RFC 7641 Observe: resource subscriptions and notification fan-out.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use coap_msg::{Code, Id, Message, OptNumber, OptValue, Token, Type};

const SEQUENCE_MODULUS: u32 = 1 << 24;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct SubKey {
  path: Vec<String>,
  peer: SocketAddr,
  token: Token,
}

struct Subscription {
  seq: u32,
  last_notified: Instant,
  /// Subscriptions registered via [`ObserveRegistry::register_local`] model
  /// an in-process observer (e.g. another module watching a resource) rather
  /// than a network peer, and are never swept for staleness.
  local: bool,
  /// If set, [`ObserveRegistry::notify_numeric`] skips this subscriber
  /// unless the new value differs from `last_value` by at least this much.
  delta_threshold: Option<f64>,
  last_value: Option<f64>,
}

impl Subscription {
  fn new(local: bool, delta_threshold: Option<f64>) -> Self {
    Subscription { seq: 0, last_notified: Instant::now(), local, delta_threshold, last_value: None }
  }
}

/// Tracks who is observing which resources and hands back the messages a
/// transport should send on notification; it never touches a socket itself.
pub struct ObserveRegistry {
  subs: Mutex<HashMap<SubKey, Subscription>>,
}

impl ObserveRegistry {
  pub fn new() -> Self {
    ObserveRegistry { subs: Mutex::new(HashMap::new()) }
  }

  /// Registers (or refreshes) a peer's subscription to `path`. Call this when
  /// a GET carries `Observe: 0`. `delta_threshold`, if set, suppresses
  /// notifications from [`Self::notify_numeric`] whose value hasn't moved
  /// enough to matter.
  pub fn register(&self, path: Vec<String>, peer: SocketAddr, token: Token, delta_threshold: Option<f64>) {
    let key = SubKey { path, peer, token };
    let mut subs = self.subs.lock().unwrap();
    subs.entry(key).or_insert_with(|| Subscription::new(false, delta_threshold));
  }

  /// Registers an in-process observer that isn't a network peer and so is
  /// never evicted by [`Self::sweep`].
  pub fn register_local(&self, path: Vec<String>, token: Token) {
    let key = SubKey { path, peer: LOCAL_ADDR, token };
    self.subs.lock().unwrap().insert(key, Subscription::new(true, None));
  }

  /// Removes a subscription, e.g. on receiving a GET without `Observe`, or an
  /// RST/deregistration for a previous notification's token.
  pub fn cancel(&self, path: &[String], peer: SocketAddr, token: &Token) {
    let key = SubKey { path: path.to_vec(), peer, token: token.clone() };
    self.subs.lock().unwrap().remove(&key);
  }

  pub fn cancel_local(&self, path: &[String], token: &Token) {
    self.cancel(path, LOCAL_ADDR, token);
  }

  /// Removes every subscription held by `peer`, regardless of path or token
  /// -- an RST on any notification cancels all of that peer's observations.
  pub fn cancel_peer(&self, peer: SocketAddr) {
    self.subs.lock().unwrap().retain(|k, _| k.peer != peer);
  }

  pub fn is_observed(&self, path: &[String]) -> bool {
    self.subs.lock().unwrap().keys().any(|k| k.path == path)
  }

  /// Builds one notification message per current subscriber of `path`,
  /// bumping each subscriber's sequence number. `payload` and `content_format`
  /// are computed once and shared across every notification.
  pub fn notify(&self, path: &[String], code: Code, payload: Vec<u8>, content_format: Option<u16>) -> Vec<(SocketAddr, Message)> {
    let mut subs = self.subs.lock().unwrap();
    subs.iter_mut()
        .filter(|(k, _)| k.path == path)
        .map(|(key, sub)| build_notification(key, sub, code, &payload, content_format))
        .collect()
  }

  /// Like [`Self::notify`], but skips subscribers whose `delta_threshold`
  /// hasn't been crossed by `value` (RFC 7641 allows but does not require
  /// this; it's a common enough producer-side optimization that the registry
  /// supports it directly rather than leaving every caller to reimplement it).
  pub fn notify_numeric(&self,
                         path: &[String],
                         code: Code,
                         value: f64,
                         payload: Vec<u8>,
                         content_format: Option<u16>)
                         -> Vec<(SocketAddr, Message)> {
    let mut subs = self.subs.lock().unwrap();
    subs.iter_mut()
        .filter(|(k, _)| k.path == path)
        .filter(|(_, sub)| match (sub.delta_threshold, sub.last_value) {
          | (Some(threshold), Some(last)) => (value - last).abs() >= threshold,
          | _ => true,
        })
        .map(|(key, sub)| {
          sub.last_value = Some(value);
          build_notification(key, sub, code, &payload, content_format)
        })
        .collect()
  }

  /// Drops subscriptions (other than local ones) that haven't been notified
  /// in `max_staleness` -- guards against peers that silently went away
  /// without sending RST.
  pub fn sweep(&self, max_staleness: Duration) {
    let now = Instant::now();
    self.subs.lock().unwrap().retain(|_, sub| sub.local || now.duration_since(sub.last_notified) < max_staleness);
  }

  pub fn subscriber_count(&self, path: &[String]) -> usize {
    self.subs.lock().unwrap().keys().filter(|k| k.path == path).count()
  }
}

fn build_notification(key: &SubKey, sub: &mut Subscription, code: Code, payload: &[u8], content_format: Option<u16>) -> (SocketAddr, Message) {
  sub.seq = (sub.seq + 1) % SEQUENCE_MODULUS;
  sub.last_notified = Instant::now();

  let mut msg = Message::new(Type::Non, code, Id(0), key.token.clone());
  msg.options.set(OptNumber::OBSERVE.0, OptValue::from_uint(sub.seq));
  if let Some(ct) = content_format {
    msg.options.set(OptNumber::CONTENT_FORMAT.0, OptValue::from_uint(ct as u32));
  }
  msg.payload = Some(payload.to_vec());

  (key.peer, msg)
}

impl Default for ObserveRegistry {
  fn default() -> Self {
    Self::new()
  }
}

const LOCAL_ADDR: SocketAddr = SocketAddr::new(std::net::IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED), 0);
