//! A minimal CoAP client for the one piece of outbound traffic this runtime
//! originates itself: subscribing to another endpoint's Observe-able
//! resource (RFC 7641 section 2) and handing the caller every notification.

use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use coap_msg::{decode_tcp, decode_udp, encode_tcp, encode_udp, Code, Id, Message, OptNumber, OptValue, Token, Type};
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::error::{Error, What, When};

const MAX_DATAGRAM: usize = 1152;
const READER_POLL: Duration = Duration::from_millis(200);

/// Which transport an `observe` URI names.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Scheme {
  Udp,
  Tcp,
}

/// Generates tokens for requests this runtime originates itself, as opposed
/// to echoing a token carried by an inbound request it's answering. Seeded
/// once from OS entropy via `rand`, then run as a plain CSPRNG so minting a
/// token never itself blocks on system entropy.
struct TokenGenerator(Mutex<ChaCha8Rng>);

impl TokenGenerator {
  fn new() -> Self {
    let mut seed = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut seed);
    TokenGenerator(Mutex::new(ChaCha8Rng::from_seed(seed)))
  }

  fn next(&self) -> Token {
    let mut bytes = [0u8; 4];
    self.0.lock().unwrap().fill_bytes(&mut bytes);
    Token::try_from(&bytes[..]).expect("4 bytes is always a valid token length")
  }
}

/// Splits a `coap://host:port/a/b/c` or `coap+tcp://host:port/a/b/c` URI
/// (scheme optional, defaulting to `coap://`; port defaulting to 5683) into
/// its transport, a resolvable authority and path segments. This is not a
/// general-purpose URI parser -- it understands exactly as much as
/// [`observe`] needs.
fn parse_coap_uri(uri: &str) -> Result<(Scheme, String, Vec<String>), Error> {
  let (scheme, rest) = if let Some(rest) = uri.strip_prefix("coap+tcp://") {
    (Scheme::Tcp, rest)
  } else if let Some(rest) = uri.strip_prefix("coap://") {
    (Scheme::Udp, rest)
  } else {
    (Scheme::Udp, uri)
  };
  let (authority, path) = rest.split_once('/').unwrap_or((rest, ""));
  if authority.is_empty() {
    return Err(Error::new(What::Io("observe uri is missing a host".to_string()), When::None));
  }
  let authority = if authority.contains(':') { authority.to_string() } else { format!("{authority}:5683") };
  let segments = path.split('/').filter(|s| !s.is_empty()).map(str::to_owned).collect();
  Ok((scheme, authority, segments))
}

/// A live subscription started by [`observe`]. Cancel it explicitly with
/// [`Self::cancel`] -- dropping it also cancels, so it's safe to let a handle
/// fall out of scope when the caller no longer needs it.
pub struct ObserveHandle {
  stop: Arc<AtomicBool>,
  join: Option<thread::JoinHandle<()>>,
}

impl ObserveHandle {
  /// Stops the background reader and waits for it to exit. Calling this more
  /// than once is a no-op.
  pub fn cancel(&mut self) {
    self.stop.store(true, Ordering::SeqCst);
    if let Some(join) = self.join.take() {
      let _ = join.join();
    }
  }
}

impl Drop for ObserveHandle {
  fn drop(&mut self) {
    self.cancel();
  }
}

/// Sends an `Observe: 0` GET to `uri` over whichever transport its scheme
/// names (`coap://` for UDP, `coap+tcp://` for RFC 8323 framed TCP), and
/// runs a background thread that calls `handler` with the payload of every
/// subsequent notification whose token matches this request. There is no
/// default timeout -- per RFC 7641 the subscription lasts as long as the
/// caller wants it to, bounded only by [`ObserveHandle::cancel`] or dropping
/// the handle.
pub fn observe(uri: &str, handler: impl Fn(Vec<u8>) + Send + 'static) -> Result<ObserveHandle, Error> {
  let (scheme, authority, path) = parse_coap_uri(uri)?;
  let peer = authority.to_socket_addrs()
                       .map_err(|e| Error::new(What::from(e), When::None))?
                       .next()
                       .ok_or_else(|| Error::new(What::Io(format!("could not resolve {authority}")), When::None))?;

  let token = TokenGenerator::new().next();

  match scheme {
    | Scheme::Udp => observe_udp(peer, path, token, handler),
    | Scheme::Tcp => observe_tcp(peer, path, token, handler),
  }
}

fn observe_udp(peer: std::net::SocketAddr, path: Vec<String>, token: Token, handler: impl Fn(Vec<u8>) + Send + 'static) -> Result<ObserveHandle, Error> {
  let socket = UdpSocket::bind(("0.0.0.0", 0)).map_err(|e| Error::new(What::from(e), When::SendingMessage { addr: peer, id: None }))?;
  socket.set_read_timeout(Some(READER_POLL)).map_err(|e| Error::new(What::from(e), When::SendingMessage { addr: peer, id: None }))?;

  let mut req = Message::new(Type::Non, Code::GET, Id(0), token.clone());
  for segment in &path {
    req.options.add(OptNumber::URI_PATH.0, segment.as_bytes().to_vec());
  }
  req.options.set(OptNumber::OBSERVE.0, OptValue::from_uint(0));

  let bytes = encode_udp(&req).map_err(|e| Error::new(What::from(e), When::SendingMessage { addr: peer, id: Some(req.id) }))?;
  socket.send_to(&bytes, peer).map_err(|e| Error::new(What::from(e), When::SendingMessage { addr: peer, id: Some(req.id) }))?;

  let stop = Arc::new(AtomicBool::new(false));
  let reader_stop = stop.clone();
  let join = thread::spawn(move || udp_reader_loop(socket, peer, token, reader_stop, handler));

  Ok(ObserveHandle { stop, join: Some(join) })
}

fn udp_reader_loop(socket: UdpSocket, peer: std::net::SocketAddr, token: Token, stop: Arc<AtomicBool>, handler: impl Fn(Vec<u8>)) {
  let mut buf = [0u8; MAX_DATAGRAM];
  while !stop.load(Ordering::SeqCst) {
    match socket.recv_from(&mut buf) {
      | Ok((n, from)) if from == peer => match decode_udp(&buf[..n]) {
        | Ok(msg) if msg.token == token && msg.options.get_first(OptNumber::OBSERVE.0).is_some() => {
          handler(msg.payload.unwrap_or_default());
        },
        | Ok(_) => {},
        | Err(e) => log::debug!("dropping malformed observe notification from {}: {}", peer, e),
      },
      | Ok(_) => {}, // datagram from someone other than the subscribed peer
      | Err(e) if e.kind() == std::io::ErrorKind::WouldBlock || e.kind() == std::io::ErrorKind::TimedOut => {},
      | Err(e) => {
        log::warn!("observe reader for {} stopping after io error: {}", peer, e);
        return;
      },
    }
  }
}

/// Opens a framed TCP connection, completes the RFC 8323 CSM handshake (this
/// endpoint's CSM first, then consumes the peer's), sends a framed
/// `Observe: 0` GET, and runs a reader thread over the same connection.
fn observe_tcp(peer: std::net::SocketAddr, path: Vec<String>, token: Token, handler: impl Fn(Vec<u8>) + Send + 'static) -> Result<ObserveHandle, Error> {
  let mut stream = TcpStream::connect(peer).map_err(|e| Error::new(What::from(e), When::SendingMessage { addr: peer, id: None }))?;
  stream.set_read_timeout(Some(READER_POLL))
        .map_err(|e| Error::new(What::from(e), When::SendingMessage { addr: peer, id: None }))?;

  let csm = Message::new(Type::Con, Code::CSM, Id(0), Token::empty());
  write_tcp_frame(&mut stream, &csm, peer)?;

  let mut req = Message::new(Type::Con, Code::GET, Id(0), token.clone());
  for segment in &path {
    req.options.add(OptNumber::URI_PATH.0, segment.as_bytes().to_vec());
  }
  req.options.set(OptNumber::OBSERVE.0, OptValue::from_uint(0));
  write_tcp_frame(&mut stream, &req, peer)?;

  let stop = Arc::new(AtomicBool::new(false));
  let reader_stop = stop.clone();
  let join = thread::spawn(move || tcp_reader_loop(stream, peer, token, reader_stop, handler));

  Ok(ObserveHandle { stop, join: Some(join) })
}

fn write_tcp_frame(stream: &mut TcpStream, msg: &Message, peer: std::net::SocketAddr) -> Result<(), Error> {
  let bytes = encode_tcp(msg).map_err(|e| Error::new(What::from(e), When::SendingMessage { addr: peer, id: Some(msg.id) }))?;
  stream.write_all(&bytes).map_err(|e| Error::new(What::from(e), When::SendingMessage { addr: peer, id: Some(msg.id) }))
}

fn tcp_reader_loop(mut stream: TcpStream, peer: std::net::SocketAddr, token: Token, stop: Arc<AtomicBool>, handler: impl Fn(Vec<u8>)) {
  let mut buf = Vec::new();
  let mut chunk = [0u8; MAX_DATAGRAM];
  let mut seen_csm = false;

  while !stop.load(Ordering::SeqCst) {
    loop {
      match decode_tcp(&buf) {
        | Ok((msg, rest)) => {
          let consumed = buf.len() - rest.len();
          if !seen_csm {
            seen_csm = true;
          } else if msg.token == token && msg.options.get_first(OptNumber::OBSERVE.0).is_some() {
            handler(msg.payload.unwrap_or_default());
          }
          buf.drain(..consumed);
        },
        | Err(coap_msg::MessageParseError::Eof) => break,
        | Err(e) => {
          log::debug!("dropping malformed observe frame from {}: {}", peer, e);
          buf.clear();
          break;
        },
      }
    }

    match stream.read(&mut chunk) {
      | Ok(0) => return,
      | Ok(n) => buf.extend_from_slice(&chunk[..n]),
      | Err(e) if e.kind() == std::io::ErrorKind::WouldBlock || e.kind() == std::io::ErrorKind::TimedOut => {},
      | Err(e) => {
        log::warn!("observe reader for {} stopping after io error: {}", peer, e);
        return;
      },
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_authority_and_path() {
    let (scheme, authority, path) = parse_coap_uri("coap://sensors.local:5683/temp/living-room").unwrap();
    assert_eq!(scheme, Scheme::Udp);
    assert_eq!(authority, "sensors.local:5683");
    assert_eq!(path, vec!["temp".to_string(), "living-room".to_string()]);
  }

  #[test]
  fn defaults_port_when_absent() {
    let (_, authority, _) = parse_coap_uri("coap://sensors.local/temp").unwrap();
    assert_eq!(authority, "sensors.local:5683");
  }

  #[test]
  fn rejects_missing_host() {
    assert!(parse_coap_uri("coap:///temp").is_err());
  }

  #[test]
  fn parses_tcp_scheme() {
    let (scheme, authority, path) = parse_coap_uri("coap+tcp://sensors.local:5684/temp").unwrap();
    assert_eq!(scheme, Scheme::Tcp);
    assert_eq!(authority, "sensors.local:5684");
    assert_eq!(path, vec!["temp".to_string()]);
  }

  #[test]
  fn defaults_to_udp_when_scheme_absent() {
    let (scheme, _, _) = parse_coap_uri("sensors.local/temp").unwrap();
    assert_eq!(scheme, Scheme::Udp);
  }

  #[test]
  fn token_generator_varies_output() {
    let gen = TokenGenerator::new();
    let a = gen.next();
    let b = gen.next();
    assert_ne!(a, b);
  }
}
