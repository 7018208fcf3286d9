//! End-to-end coverage of the concrete request/response scenarios the
//! framework is expected to satisfy, exercised against a [`Reactor`]
//! directly (no sockets) except for the TCP round trip, which needs a real
//! connection to exercise the CSM handshake and framing.

use std::io::{Read, Write};
use std::net::{IpAddr, Ipv4Addr, SocketAddr, TcpStream};
use std::sync::Arc;
use std::time::Duration;

use coap::{Config, Reactor, Response, Router, Server};
use coap_msg::{decode_tcp, encode_tcp, Code, ContentFormat, Id, Message, OptNumber, Token, Type};

fn peer() -> SocketAddr {
  SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 9999)
}

fn router_with_ping() -> Router {
  let mut router = Router::new();
  router.resource("/ping").get(|r| {
                                Response::for_request(r, Code::CONTENT).with_content_format(ContentFormat::Json)
                                                                        .with_payload(br#"{"message":"Pong"}"#.to_vec())
                              });
  router
}

fn get(path: &str, id: u16, token: &[u8]) -> Message {
  let mut msg = Message::new(Type::Con, Code::GET, Id(id), Token::try_from(token).unwrap());
  for segment in path.split('/').filter(|s| !s.is_empty()) {
    msg.options.add(OptNumber::URI_PATH.0, segment.as_bytes().to_vec());
  }
  msg
}

#[test]
fn scenario_1_ping_get() {
  let reactor = Reactor::new(Config::default(), Arc::new(router_with_ping()));
  let out = reactor.handle(peer(), get("ping", 0x4242, &[0xAA, 0xBB]));

  assert_eq!(out.len(), 1);
  let msg = &out[0].message;
  assert_eq!(msg.ty, Type::Ack);
  assert_eq!(msg.id, Id(0x4242));
  assert_eq!(msg.token.as_bytes(), [0xAA, 0xBB]);
  assert_eq!(u8::from(msg.code), 69);

  let value: serde_json::Value = serde_json::from_slice(msg.payload.as_deref().unwrap()).unwrap();
  assert_eq!(value["message"], "Pong");
}

#[test]
fn scenario_2_not_found() {
  let reactor = Reactor::new(Config::default(), Arc::new(Router::new()));
  let out = reactor.handle(peer(), get("nonexistent", 0x5151, &[0x10]));

  assert_eq!(out.len(), 1);
  let msg = &out[0].message;
  assert_eq!(msg.id, Id(0x5151));
  assert_eq!(msg.token.as_bytes(), [0x10]);
  assert_eq!(u8::from(msg.code), 132);
}

#[test]
fn scenario_5_duplicate_con_invokes_handler_once() {
  let reactor = Reactor::new(Config::default(), Arc::new(router_with_ping()));
  let req = get("ping", 7, &[0x01]);

  let first = reactor.handle(peer(), req.clone());
  let second = reactor.handle(peer(), req);
  assert_eq!(first[0].message, second[0].message);
}

#[test]
fn scenario_6_observe_fan_out_strictly_increasing_sequence() {
  let reactor = Reactor::new(Config::default(), Arc::new(Router::new()));
  let path = vec!["temp".to_string()];
  let token = Token::try_from(&[0x54][..]).unwrap();
  reactor.observe.register(path.clone(), peer(), token.clone(), None);

  let first = reactor.notify_observers(&path, Code::CONTENT, b"22.5".to_vec(), Some(u16::from(ContentFormat::TextPlain)));
  let second = reactor.notify_observers(&path, Code::CONTENT, b"23.0".to_vec(), Some(u16::from(ContentFormat::TextPlain)));

  assert_eq!(first.len(), 1);
  assert_eq!(second.len(), 1);
  assert_eq!(first[0].message.token, token);
  assert_eq!(second[0].message.token, token);

  let seq1 = first[0].message.options.get_first(OptNumber::OBSERVE.0).and_then(|v| v.as_uint()).unwrap();
  let seq2 = second[0].message.options.get_first(OptNumber::OBSERVE.0).and_then(|v| v.as_uint()).unwrap();
  assert!(seq2 > seq1);

  assert_eq!(first[0].message.payload.as_deref(), Some("22.5".as_bytes()));
  assert_eq!(second[0].message.payload.as_deref(), Some("23.0".as_bytes()));
}

#[test]
fn scenario_7_longest_prefix_mount_wins() {
  let mut sensors_ctl = Router::new();
  sensors_ctl.resource("/value").get(|r| Response::for_request(r, Code::CONTENT).with_payload("generic"));

  let mut special_ctl = Router::new();
  special_ctl.resource("/value").get(|r| Response::for_request(r, Code::CONTENT).with_payload("special"));

  let mut outer = Router::new();
  outer.mount("/sensors", sensors_ctl).unwrap();
  outer.mount("/sensors/special", special_ctl).unwrap();

  let reactor = Reactor::new(Config::default(), Arc::new(outer));

  let generic = reactor.handle(peer(), get("sensors/value", 1, &[]));
  assert_eq!(generic[0].message.payload.as_deref(), Some("generic".as_bytes()));

  // "/sensors/special" is the longer matching prefix and must win over the
  // shorter "/sensors" mount for paths under it.
  let special = reactor.handle(peer(), get("sensors/special/value", 2, &[]));
  assert_eq!(special[0].message.payload.as_deref(), Some("special".as_bytes()));
}

#[test]
fn scenario_8_core_link_format_rt_filter() {
  let mut router = Router::new();
  router.resource("/temp").get(|r| Response::for_request(r, Code::CONTENT)).resource_type("sensor.temp").observable();
  router.resource("/humidity").get(|r| Response::for_request(r, Code::CONTENT)).resource_type("sensor.humidity").observable();

  let mut query = std::collections::HashMap::new();
  query.insert("rt".to_string(), "sensor.temp".to_string());

  let links = router.link_format(&query);
  assert_eq!(links, "</temp>;rt=\"sensor.temp\";obs");
}

#[test]
fn scenario_8b_well_known_core_filters_per_request_through_server() {
  let mut server = Server::new(Config::default());
  server.router().resource("/temp").get(|r| Response::for_request(r, Code::CONTENT)).resource_type("sensor.temp").observable();
  server.router().resource("/humidity").get(|r| Response::for_request(r, Code::CONTENT)).resource_type("sensor.humidity").observable();
  let server = server.with_discovery();

  let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
  let probe = std::net::UdpSocket::bind(addr).unwrap();
  let bound = probe.local_addr().unwrap();
  drop(probe);

  let reactor = server.run(bound, None::<SocketAddr>).unwrap();

  let mut filtered = get(".well-known/core", 1, &[0x01]);
  filtered.options.add(OptNumber::URI_QUERY.0, b"rt=sensor.temp".to_vec());
  let out = reactor.handle(peer(), filtered);
  assert_eq!(out.len(), 1);
  let payload = out[0].message.payload.clone().unwrap_or_default();
  let body = String::from_utf8(payload).unwrap();
  assert_eq!(body, "</temp>;rt=\"sensor.temp\";obs");

  let unfiltered = get(".well-known/core", 2, &[0x02]);
  let out = reactor.handle(peer(), unfiltered);
  let body = String::from_utf8(out[0].message.payload.clone().unwrap_or_default()).unwrap();
  assert!(body.contains("</temp>"));
  assert!(body.contains("</humidity>"));
}

#[test]
fn scenario_9_tcp_round_trip_with_csm() {
  let mut server = Server::new(Config::default());
  server.router().resource("/ping").get(|r| Response::for_request(r, Code::CONTENT).with_payload("Pong"));

  let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
  // Bind our own listener to learn a free port, then hand that exact address
  // to the server so the test doesn't race another process for a fixed port.
  let probe = std::net::TcpListener::bind(addr).unwrap();
  let bound = probe.local_addr().unwrap();
  drop(probe);

  server.run(bound, Some(bound)).unwrap();
  std::thread::sleep(Duration::from_millis(100));

  let mut stream = TcpStream::connect(bound).unwrap();
  stream.set_read_timeout(Some(Duration::from_secs(2))).unwrap();

  // Server's CSM arrives first.
  let server_csm = read_one_frame(&mut stream);
  assert_eq!(server_csm.code, Code::CSM);

  // Client sends its own CSM, per RFC 8323's requirement that it be the
  // first message on the connection, then the actual request.
  let client_csm = Message::new(Type::Con, Code::CSM, Id(0), Token::empty());
  stream.write_all(&encode_tcp(&client_csm).unwrap()).unwrap();

  let req = get("ping", 0, &[]);
  stream.write_all(&encode_tcp(&req).unwrap()).unwrap();

  let response = read_one_frame(&mut stream);
  assert_eq!(response.code, Code::CONTENT);
  assert_eq!(response.payload.as_deref(), Some("Pong".as_bytes()));
}

fn read_one_frame(stream: &mut TcpStream) -> Message {
  let mut buf = Vec::new();
  let mut chunk = [0u8; 256];
  loop {
    match decode_tcp(&buf) {
      | Ok((msg, _rest)) => return msg,
      | Err(coap_msg::MessageParseError::Eof) => {
        let n = stream.read(&mut chunk).unwrap();
        assert!(n > 0, "connection closed before a full frame arrived");
        buf.extend_from_slice(&chunk[..n]);
      },
      | Err(e) => panic!("malformed tcp frame: {}", e),
    }
  }
}
