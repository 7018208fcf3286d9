use std::time::Duration;

use crate::retry::{Attempts, Strategy};

/// Retransmission behavior for Confirmable messages (RFC 7252 section 4.8).
#[derive(Copy, Clone, Debug)]
pub struct Con {
  pub retry_strategy: Strategy,
  pub max_attempts: Attempts,
}

impl Default for Con {
  fn default() -> Self {
    Con { retry_strategy: Strategy::new(2000, 3000), max_attempts: Attempts(4) }
  }
}

/// There is no retransmission for Non-confirmable messages, but the same
/// backoff shape governs how long the dedup cache should remember one.
#[derive(Copy, Clone, Debug)]
pub struct Non {
  pub retry_strategy: Strategy,
  pub max_attempts: Attempts,
}

impl Default for Non {
  fn default() -> Self {
    Non { retry_strategy: Strategy::new(2000, 3000), max_attempts: Attempts(1) }
  }
}

/// RFC 7252 section 4 message-layer timing.
#[derive(Copy, Clone, Debug)]
pub struct Msg {
  pub con: Con,
  pub non: Non,
  /// How long a multicast request should wait for responses to trickle in.
  pub multicast_response_leisure: Duration,
}

impl Default for Msg {
  fn default() -> Self {
    Msg { con: Con::default(), non: Non::default(), multicast_response_leisure: Duration::from_millis(5000) }
  }
}

impl Msg {
  pub fn max_transmit_span(&self) -> Duration {
    self.con.retry_strategy.max_transmit_span(self.con.max_attempts)
  }

  /// Worst case, how long it can take the network plus a buggy peer to make
  /// a Confirmable message's fate known -- used to size the dedup cache TTL.
  pub fn exchange_lifetime(&self) -> Duration {
    const MAX_LATENCY: Duration = Duration::from_secs(100);
    const PROCESSING_DELAY: Duration = Duration::from_secs(2);
    self.max_transmit_span() + MAX_LATENCY * 2 + PROCESSING_DELAY
  }
}

/// How many requests a single worker is allowed to have outstanding before
/// the reactor stops handing it new work.
#[derive(Copy, Clone, Debug)]
pub struct Concurrency {
  pub workers: usize,
  pub max_queued_requests: usize,
}

impl Default for Concurrency {
  fn default() -> Self {
    Concurrency { workers: 4, max_queued_requests: 256 }
  }
}

/// How long an Observe subscription may go without a successful notification
/// before the registry evicts it as stale. Local in-process handlers (those
/// registered via [`crate::observe::ObserveRegistry::register_local`]) are
/// never swept: their lifecycle is owned by the caller, not the network.
#[derive(Copy, Clone, Debug)]
pub struct Observe {
  pub max_staleness: Duration,
  pub sweep_interval: Duration,
}

impl Default for Observe {
  fn default() -> Self {
    Observe { max_staleness: Duration::from_secs(60 * 5), sweep_interval: Duration::from_secs(30) }
  }
}

/// Top-level runtime configuration.
#[derive(Copy, Clone, Debug, Default)]
pub struct Config {
  pub msg: Msg,
  pub concurrency: Concurrency,
  pub observe: Observe,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn exchange_lifetime_accounts_for_full_transmit_span() {
    let cfg = Config::default();
    assert!(cfg.msg.exchange_lifetime() > cfg.msg.max_transmit_span());
  }
}
