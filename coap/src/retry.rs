use std::time::{Duration, Instant};

use rand::Rng;

/// How many times a confirmable message has been retransmitted.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Attempts(pub u16);

/// What a [`RetryTimer`] wants the caller to do with a message right now.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum YouShould {
  /// Retransmit it, bumping the attempt counter.
  Retry,
  /// Give up -- `max_attempts` retransmissions happened with no response.
  Cry,
}

/// RFC 7252 section 4.8's retransmission backoff: an initial timeout drawn
/// uniformly from `[min, max]`, doubling on every retry, capped at
/// `max_attempts` retries total.
#[derive(Copy, Clone, Debug)]
pub struct Strategy {
  pub init_min: Duration,
  pub init_max: Duration,
}

impl Strategy {
  pub const fn new(init_min_ms: u64, init_max_ms: u64) -> Self {
    Strategy { init_min: Duration::from_millis(init_min_ms), init_max: Duration::from_millis(init_max_ms) }
  }

  /// Total elapsed time since the first send before attempt `n` (1-indexed)
  /// is allowed to fire, given an initial timeout of `init`.
  fn total_delay(init: Duration, attempt: u16) -> Duration {
    init * 2u32.pow((attempt.saturating_sub(1)) as u32)
  }

  /// The worst-case time a message sent under this strategy can remain
  /// unacknowledged before the caller gives up, per RFC 7252's
  /// MAX_TRANSMIT_SPAN definition.
  pub fn max_transmit_span(&self, max_attempts: Attempts) -> Duration {
    Self::total_delay(self.init_max, max_attempts.0)
  }
}

/// Tracks retransmission attempts and timing for a single in-flight message.
pub struct RetryTimer {
  start: Instant,
  init: Duration,
  strategy: Strategy,
  attempts: Attempts,
  max_attempts: Attempts,
}

impl RetryTimer {
  pub fn new(now: Instant, strategy: Strategy, max_attempts: Attempts) -> Self {
    let init = if strategy.init_min == strategy.init_max {
      strategy.init_min
    } else {
      let lo = strategy.init_min.as_millis() as u64;
      let hi = strategy.init_max.as_millis() as u64;
      Duration::from_millis(rand::thread_rng().gen_range(lo..=hi))
    };

    RetryTimer { start: now, init, strategy, attempts: Attempts(0), max_attempts }
  }

  pub fn attempts(&self) -> Attempts {
    self.attempts
  }

  /// Call on every tick of the retransmission timer thread. Returns
  /// `Some(YouShould::Retry)` the instant a backoff deadline passes (bumping
  /// the internal attempt counter as a side effect), `Some(YouShould::Cry)`
  /// once `max_attempts` is exhausted, or `None` if it isn't time yet.
  pub fn poll(&mut self, now: Instant) -> Option<YouShould> {
    if self.attempts.0 >= self.max_attempts.0 {
      return Some(YouShould::Cry);
    }

    let deadline = self.start + Strategy::total_delay(self.init, self.attempts.0 + 1);
    if now >= deadline {
      self.attempts.0 += 1;
      Some(YouShould::Retry)
    } else {
      None
    }
  }

  pub fn strategy(&self) -> Strategy {
    self.strategy
  }
}
