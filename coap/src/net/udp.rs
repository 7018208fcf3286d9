//! UDP listener: receive loop feeding a worker pool, single send path shared
//! by responses, notifications and retransmissions.

use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use coap_msg::{decode_udp, encode_udp};

use crate::error::{Error, What, When};
use crate::reactor::{Outbound, Reactor};

const MAX_DATAGRAM: usize = 1152;

/// Spawns the receive loop and a fixed-size worker pool to process datagrams
/// off it, plus a background thread driving retransmission and sweep ticks.
/// Returns once the sockets are bound; the threads run until the process
/// exits (there's no graceful-shutdown handle here, matching the span of a
/// `Server`'s lifetime: for as long as the `Server` exists, its listeners do
/// too).
pub fn spawn(addr: impl ToSocketAddrs, reactor: Reactor) -> Result<(), Error> {
  let socket = UdpSocket::bind(addr).map_err(|e| Error::new(What::from(e), When::ReceivingDatagram))?;
  socket.set_read_timeout(Some(Duration::from_millis(100)))
        .map_err(|e| Error::new(What::from(e), When::ReceivingDatagram))?;

  let (tx, rx) = mpsc::channel::<(SocketAddr, Vec<u8>)>();
  let rx = std::sync::Arc::new(std::sync::Mutex::new(rx));

  for _ in 0..reactor.config.concurrency.workers {
    let rx = rx.clone();
    let reactor = reactor.clone();
    let send_socket = socket.try_clone().map_err(|e| Error::new(What::from(e), When::ReceivingDatagram))?;
    thread::spawn(move || worker_loop(rx, reactor, send_socket));
  }

  {
    let reactor = reactor.clone();
    let timer_socket = socket.try_clone().map_err(|e| Error::new(What::from(e), When::ReceivingDatagram))?;
    thread::spawn(move || timer_loop(reactor, timer_socket));
  }

  thread::spawn(move || receive_loop(socket, tx));

  Ok(())
}

fn receive_loop(socket: UdpSocket, tx: mpsc::Sender<(SocketAddr, Vec<u8>)>) {
  let mut buf = [0u8; MAX_DATAGRAM];
  loop {
    match socket.recv_from(&mut buf) {
      | Ok((n, peer)) => {
        if tx.send((peer, buf[..n].to_vec())).is_err() {
          return;
        }
      },
      | Err(e) if e.kind() == std::io::ErrorKind::WouldBlock || e.kind() == std::io::ErrorKind::TimedOut => {},
      | Err(e) => log::error!("udp recv error: {}", e),
    }
  }
}

fn worker_loop(rx: std::sync::Arc<std::sync::Mutex<mpsc::Receiver<(SocketAddr, Vec<u8>)>>>, reactor: Reactor, socket: UdpSocket) {
  loop {
    let received = rx.lock().unwrap().recv();
    let Ok((peer, bytes)) = received else { return };

    match decode_udp(&bytes) {
      | Ok(msg) => {
        log::trace!("{}", crate::logging::msg_summary(peer, &msg));
        for outbound in reactor.handle(peer, msg) {
          send(&socket, outbound);
        }
      },
      | Err(e) => log::debug!("dropping malformed datagram from {}: {}", peer, e),
    }
  }
}

fn timer_loop(reactor: Reactor, socket: UdpSocket) {
  loop {
    thread::sleep(Duration::from_millis(200));
    for outbound in reactor.poll_retransmissions(Instant::now()) {
      send(&socket, outbound);
    }
    for outbound in reactor.drain_pushed() {
      send(&socket, outbound);
    }
    reactor.sweep();
  }
}

fn send(socket: &UdpSocket, outbound: Outbound) {
  match encode_udp(&outbound.message) {
    | Ok(bytes) => {
      if let Err(e) = socket.send_to(&bytes, outbound.peer) {
        log::warn!("udp send to {} failed: {}", outbound.peer, e);
      }
    },
    | Err(e) => log::error!("failed to encode outbound message to {}: {}", outbound.peer, e),
  }
}
