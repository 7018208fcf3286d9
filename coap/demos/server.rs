use coap::{Config, Response, Server};
use coap_msg::Code;

const PORT: u16 = 5683;

fn main() {
  simple_logger::SimpleLogger::new().init().unwrap();

  let mut server = Server::new(Config::default());

  server.router().resource("/hello").get(|r| {
                                        log::info!("a client said hello");
                                        Response::for_request(r, Code::CONTENT).with_payload("hello, world!")
                                      });

  let _reactor = server.with_discovery()
                        .run(("0.0.0.0", PORT), Some(("0.0.0.0", PORT)))
                        .unwrap();

  loop {
    std::thread::sleep(std::time::Duration::from_secs(3600));
  }
}
