//! RFC 8323 TCP transport: one thread per connection, each starting with a
//! CSM (Capabilities and Settings Message) handshake before any CoAP
//! request/response traffic flows.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream, ToSocketAddrs};
use std::thread;
use std::time::Duration;

use coap_msg::{decode_tcp, encode_tcp, Code, Id, Message, Token};

use crate::error::{Error, What, When};
use crate::reactor::Reactor;

const READ_CHUNK: usize = 2048;
/// Bounds how long a connection's read loop blocks on a half-sent frame. A
/// timeout with nothing buffered is just an idle, healthy connection and is
/// not an error; a timeout with a partial frame already buffered means the
/// peer stalled mid-transmission and the connection is dropped.
const FRAME_READ_TIMEOUT: Duration = Duration::from_secs(5);

pub fn spawn(addr: impl ToSocketAddrs, reactor: Reactor) -> Result<(), Error> {
  let listener = TcpListener::bind(addr).map_err(|e| Error::new(What::from(e), When::AcceptingConnection))?;

  thread::spawn(move || {
    for conn in listener.incoming() {
      match conn {
        | Ok(stream) => {
          let reactor = reactor.clone();
          thread::spawn(move || handle_connection(stream, reactor));
        },
        | Err(e) => log::error!("tcp accept error: {}", e),
      }
    }
  });

  Ok(())
}

fn csm() -> Message {
  Message::new(coap_msg::Type::Con, Code::CSM, Id(0), Token::empty())
}

fn handle_connection(mut stream: TcpStream, reactor: Reactor) {
  let peer = match stream.peer_addr() {
    | Ok(addr) => addr,
    | Err(e) => {
      log::error!("could not read peer addr: {}", e);
      return;
    },
  };

  if let Err(e) = write_frame(&mut stream, &csm()) {
    log::error!("csm handshake to {} failed: {}", peer, e);
    return;
  }

  if let Err(e) = stream.set_read_timeout(Some(FRAME_READ_TIMEOUT)) {
    log::warn!("could not set read timeout for {}: {}", peer, e);
  }

  let mut buf = Vec::new();
  let mut chunk = [0u8; READ_CHUNK];
  let mut seen_csm = false;

  loop {
    let n = match stream.read(&mut chunk) {
      | Ok(0) => return,
      | Ok(n) => n,
      | Err(e)
        if (e.kind() == std::io::ErrorKind::WouldBlock || e.kind() == std::io::ErrorKind::TimedOut) && buf.is_empty() =>
      {
        continue
      },
      | Err(e) => {
        log::debug!("tcp read from {} ended: {}", peer, e);
        return;
      },
    };
    buf.extend_from_slice(&chunk[..n]);

    loop {
      match decode_tcp(&buf) {
        | Ok((msg, rest)) => {
          let consumed = buf.len() - rest.len();

          if !seen_csm {
            seen_csm = true;
            if msg.code != Code::CSM {
              log::warn!("{} sent {:?} before completing the csm handshake", peer, msg.code);
            }
            buf.drain(..consumed);
            continue;
          }

          if msg.code.kind() == coap_msg::CodeKind::Signaling {
            handle_signaling(&mut stream, peer, msg);
          } else {
            for outbound in reactor.handle(peer, msg) {
              if let Err(e) = write_frame(&mut stream, &outbound.message) {
                log::warn!("tcp send to {} failed: {}", peer, e);
                return;
              }
            }
          }

          buf.drain(..consumed);
        },
        | Err(coap_msg::MessageParseError::Eof) => break,
        | Err(e) => {
          log::warn!("dropping connection to {} after malformed frame: {}", peer, e);
          return;
        },
      }
    }
  }
}

fn handle_signaling(stream: &mut TcpStream, peer: std::net::SocketAddr, msg: Message) {
  match msg.code {
    | Code::PING => {
      let pong = Message::new(coap_msg::Type::Con, Code::PONG, Id(0), msg.token);
      if let Err(e) = write_frame(stream, &pong) {
        log::warn!("pong to {} failed: {}", peer, e);
      }
    },
    | Code::RELEASE | Code::ABORT => {
      log::info!("{} requested connection teardown", peer);
    },
    | _ => {},
  }
}

fn write_frame(stream: &mut TcpStream, msg: &Message) -> std::io::Result<()> {
  let bytes = encode_tcp(msg).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;
  stream.write_all(&bytes)
}
