use std::fmt::Write;
use std::net::SocketAddr;

use coap_msg::Message;

/// A short one-line summary of a message, suitable for `log::trace!`/`debug!`
/// call sites that would otherwise have to spell out `{:?}` on a whole
/// [`Message`] and its options.
pub fn msg_summary(peer: SocketAddr, msg: &Message) -> String {
  let mut s = String::with_capacity(64);
  let _ = write!(s,
                  "{:?} {:?} id={} tkl={} peer={}",
                  msg.ty,
                  msg.code,
                  msg.id.0,
                  msg.token.len(),
                  peer);
  s
}
