//! A threaded CoAP server runtime: UDP and TCP transport (RFC 7252 / RFC
//! 8323), Confirmable retransmission, a path router with CoRE Link Format
//! discovery (RFC 6690), and Observe subscriptions (RFC 7641).
//!
//! Message parsing and wire encoding live in the separate `coap-msg` crate;
//! this crate is the runtime built on top of it.

pub mod client;
pub mod config;
pub mod content;
pub mod context;
pub mod error;
pub mod logging;
pub mod middleware;
pub mod net;
pub mod observe;
pub mod reactor;
pub mod reliability;
pub mod retry;
pub mod router;
pub mod server;

pub use client::{observe, ObserveHandle};
pub use config::Config;
pub use context::{Request, Response};
pub use error::Error;
pub use reactor::Reactor;
pub use router::Router;
pub use server::Server;
