use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use coap_msg::{Id, Message};

/// Entries beyond this count are evicted oldest-first, independent of `sweep`.
/// Bounds memory use under a peer that churns through message IDs faster than
/// `EXCHANGE_LIFETIME` would otherwise let them expire.
const DEFAULT_CAPACITY: usize = 1024;

struct Entry {
  inserted: Instant,
  response: Option<Message>,
}

/// Remembers recently-seen `(peer, message id)` pairs so a retransmitted CON
/// doesn't get processed twice. RFC 7252 section 4.5 says a duplicate should
/// get the same response as the original rather than being re-dispatched to
/// the handler -- [`DedupCache::store_response`] is how the transport
/// remembers what that response was.
///
/// Bounded two ways: a TTL sweep (see [`Self::sweep`]) and an LRU-ish
/// insertion-order capacity cap.
struct Inner {
  entries: HashMap<(SocketAddr, Id), Entry>,
  order: VecDeque<(SocketAddr, Id)>,
  capacity: usize,
}

pub struct DedupCache {
  inner: Mutex<Inner>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum Seen {
  /// First time seeing this message; caller should process it normally.
  New,
  /// A duplicate. Carries the stored response to resend, if the original
  /// had finished processing by the time this arrived.
  Duplicate(Option<Message>),
}

impl DedupCache {
  pub fn new() -> Self {
    Self::with_capacity(DEFAULT_CAPACITY)
  }

  pub fn with_capacity(capacity: usize) -> Self {
    DedupCache { inner: Mutex::new(Inner { entries: HashMap::new(), order: VecDeque::new(), capacity }) }
  }

  pub fn check_or_insert(&self, peer: SocketAddr, id: Id) -> Seen {
    let mut inner = self.inner.lock().unwrap();
    if let Some(entry) = inner.entries.get(&(peer, id)) {
      return Seen::Duplicate(entry.response.clone());
    }

    inner.entries.insert((peer, id), Entry { inserted: Instant::now(), response: None });
    inner.order.push_back((peer, id));

    while inner.order.len() > inner.capacity {
      if let Some(oldest) = inner.order.pop_front() {
        inner.entries.remove(&oldest);
      }
    }

    Seen::New
  }

  pub fn store_response(&self, peer: SocketAddr, id: Id, response: Message) {
    if let Some(entry) = self.inner.lock().unwrap().entries.get_mut(&(peer, id)) {
      entry.response = Some(response);
    }
  }

  /// Evicts entries older than `ttl` (typically `Config::msg.exchange_lifetime`),
  /// past which RFC 7252 guarantees the original sender has given up on the
  /// exchange and wouldn't retransmit it anyway.
  pub fn sweep(&self, ttl: Duration) {
    let now = Instant::now();
    let mut inner = self.inner.lock().unwrap();
    inner.entries.retain(|_, e| now.duration_since(e.inserted) < ttl);
    inner.order.retain(|key| inner.entries.contains_key(key));
  }
}

impl Default for DedupCache {
  fn default() -> Self {
    Self::new()
  }
}

#[cfg(test)]
mod tests {
  use std::net::{IpAddr, Ipv4Addr};

  use super::*;

  fn peer() -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 5683)
  }

  #[test]
  fn first_sighting_is_new_then_duplicate() {
    let cache = DedupCache::new();
    assert_eq!(cache.check_or_insert(peer(), Id(1)), Seen::New);
    assert_eq!(cache.check_or_insert(peer(), Id(1)), Seen::Duplicate(None));
  }

  #[test]
  fn duplicate_carries_stored_response() {
    let cache = DedupCache::new();
    cache.check_or_insert(peer(), Id(2));
    let resp = Message::ack(Id(2));
    cache.store_response(peer(), Id(2), resp.clone());
    assert_eq!(cache.check_or_insert(peer(), Id(2)), Seen::Duplicate(Some(resp)));
  }

  #[test]
  fn sweep_evicts_expired_entries() {
    let cache = DedupCache::new();
    cache.check_or_insert(peer(), Id(3));
    std::thread::sleep(Duration::from_millis(5));
    cache.sweep(Duration::from_millis(1));
    assert_eq!(cache.check_or_insert(peer(), Id(3)), Seen::New);
  }

  #[test]
  fn capacity_evicts_oldest_entry_first() {
    let cache = DedupCache::with_capacity(2);
    cache.check_or_insert(peer(), Id(1));
    cache.check_or_insert(peer(), Id(2));
    cache.check_or_insert(peer(), Id(3));

    assert_eq!(cache.check_or_insert(peer(), Id(1)), Seen::New);
    assert_eq!(cache.check_or_insert(peer(), Id(3)), Seen::Duplicate(None));
  }
}
