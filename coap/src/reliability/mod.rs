//! Confirmable-message retransmission and duplicate detection (RFC 7252
//! section 4).

pub mod dedup;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Mutex;
use std::time::Instant;

use coap_msg::{Id, Message};

use crate::retry::{Attempts, RetryTimer, Strategy, YouShould};

struct Pending {
  peer: SocketAddr,
  message: Message,
  timer: RetryTimer,
}

/// Tracks every Confirmable message this endpoint is still waiting on an
/// ACK/RST for, and tells a timer thread when to retransmit or give up.
pub struct PendingRequests {
  pending: Mutex<HashMap<(SocketAddr, Id), Pending>>,
}

/// What happened to a pending exchange on a timer tick.
pub enum Outcome {
  Retransmit { peer: SocketAddr, message: Message },
  GaveUp { peer: SocketAddr, id: Id },
}

impl PendingRequests {
  pub fn new() -> Self {
    PendingRequests { pending: Mutex::new(HashMap::new()) }
  }

  /// Starts tracking a CON that was just sent, so it gets retransmitted if
  /// unacknowledged.
  pub fn track(&self, peer: SocketAddr, message: Message, strategy: Strategy, max_attempts: Attempts) {
    let id = message.id;
    let timer = RetryTimer::new(Instant::now(), strategy, max_attempts);
    self.pending.lock().unwrap().insert((peer, id), Pending { peer, message, timer });
  }

  /// Call when an ACK or RST for `(peer, id)` arrives. Returns `true` if it
  /// matched a tracked exchange (and is now untracked), `false` if it was
  /// unexpected.
  pub fn acknowledge(&self, peer: SocketAddr, id: Id) -> bool {
    self.pending.lock().unwrap().remove(&(peer, id)).is_some()
  }

  pub fn is_pending(&self, peer: SocketAddr, id: Id) -> bool {
    self.pending.lock().unwrap().contains_key(&(peer, id))
  }

  /// Called periodically by the retransmission timer thread. Advances every
  /// tracked exchange's backoff, returning a retransmission for anything
  /// whose deadline passed and dropping (while reporting) anything that hit
  /// `max_attempts`.
  pub fn poll(&self, now: Instant) -> Vec<Outcome> {
    let mut pending = self.pending.lock().unwrap();
    let mut outcomes = Vec::new();
    let mut dead = Vec::new();

    for (key, entry) in pending.iter_mut() {
      match entry.timer.poll(now) {
        | Some(YouShould::Retry) => {
          outcomes.push(Outcome::Retransmit { peer: entry.peer, message: entry.message.clone() });
        },
        | Some(YouShould::Cry) => {
          outcomes.push(Outcome::GaveUp { peer: entry.peer, id: key.1 });
          dead.push(*key);
        },
        | None => {},
      }
    }

    for key in dead {
      pending.remove(&key);
    }

    outcomes
  }

  pub fn len(&self) -> usize {
    self.pending.lock().unwrap().len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

impl Default for PendingRequests {
  fn default() -> Self {
    Self::new()
  }
}

#[cfg(test)]
mod tests {
  use std::net::{IpAddr, Ipv4Addr};
  use std::time::Duration;

  use coap_msg::{Code, Token, Type};

  use super::*;

  fn peer() -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 5683)
  }

  #[test]
  fn acknowledge_stops_tracking() {
    let pending = PendingRequests::new();
    let msg = Message::new(Type::Con, Code::GET, Id(1), Token::empty());
    pending.track(peer(), msg, Strategy::new(100, 100), Attempts(4));

    assert!(pending.is_pending(peer(), Id(1)));
    assert!(pending.acknowledge(peer(), Id(1)));
    assert!(!pending.is_pending(peer(), Id(1)));
  }

  #[test]
  fn unacked_message_eventually_gives_up() {
    let pending = PendingRequests::new();
    let msg = Message::new(Type::Con, Code::GET, Id(2), Token::empty());
    let start = Instant::now();
    pending.track(peer(), msg, Strategy::new(10, 10), Attempts(2));

    let mut gave_up = false;
    for ms in [10, 20, 30, 1000] {
      for outcome in pending.poll(start + Duration::from_millis(ms)) {
        if matches!(outcome, Outcome::GaveUp { .. }) {
          gave_up = true;
        }
      }
    }
    assert!(gave_up);
    assert!(!pending.is_pending(peer(), Id(2)));
  }
}
