//! Transport-specific listener loops. Both modules are thin: all protocol
//! logic lives in [`crate::reactor::Reactor`], which knows nothing about
//! sockets.

pub mod tcp;
pub mod udp;
