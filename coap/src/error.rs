use std::fmt;
use std::net::SocketAddr;

use coap_msg::{Id, MessageParseError, MessageToBytesError};

/// What the runtime was doing when an [`Error`] occurred.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum When {
  ReceivingDatagram,
  AcceptingConnection,
  SendingMessage { addr: SocketAddr, id: Option<Id> },
  DispatchingToHandler,
  WaitingForAck,
  None,
}

/// The specific failure, independent of when it happened.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum What {
  Io(String),
  FromBytes(MessageParseError),
  ToBytes(MessageToBytesError),
  /// A CON was retransmitted `MAX_RETRANSMIT` times with no ACK or RST.
  MessageNeverAcked,
  /// A request named a route whose handler panicked; recovered via `catch_unwind`.
  HandlerPanicked,
  /// Peer named a resource that has no route and no ancestor willing to claim it.
  NoMatchingRoute,
}

impl fmt::Display for What {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      | Self::Io(msg) => write!(f, "io error: {}", msg),
      | Self::FromBytes(e) => write!(f, "malformed message: {}", e),
      | Self::ToBytes(e) => write!(f, "could not encode message: {}", e),
      | Self::MessageNeverAcked => write!(f, "message was never acked"),
      | Self::HandlerPanicked => write!(f, "route handler panicked"),
      | Self::NoMatchingRoute => write!(f, "no route matched"),
    }
  }
}

/// A runtime-level error, carrying both what went wrong and what the runtime
/// was doing at the time -- mirrors the [`What`]/[`When`] split the rest of
/// this codebase uses for everything that isn't a pure parse failure.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Error {
  pub what: What,
  pub when: When,
}

impl Error {
  pub fn new(what: What, when: When) -> Self {
    Error { what, when }
  }
}

impl fmt::Display for Error {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match &self.when {
      | When::None => write!(f, "{}", self.what),
      | When::ReceivingDatagram => write!(f, "while receiving a datagram: {}", self.what),
      | When::AcceptingConnection => write!(f, "while accepting a tcp connection: {}", self.what),
      | When::SendingMessage { addr, id } => {
        write!(f, "while sending to {} (id {:?}): {}", addr, id, self.what)
      },
      | When::DispatchingToHandler => write!(f, "while dispatching to a handler: {}", self.what),
      | When::WaitingForAck => write!(f, "while waiting for an ack: {}", self.what),
    }
  }
}

impl std::error::Error for Error {}

impl From<MessageParseError> for What {
  fn from(e: MessageParseError) -> Self {
    What::FromBytes(e)
  }
}

impl From<MessageToBytesError> for What {
  fn from(e: MessageToBytesError) -> Self {
    What::ToBytes(e)
  }
}

impl From<std::io::Error> for What {
  fn from(e: std::io::Error) -> Self {
    What::Io(e.to_string())
  }
}
