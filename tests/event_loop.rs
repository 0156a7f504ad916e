use pollserver::{EventLoop, ServerBuilder, Shutdown, StaticResponse};
use std::io::{Read, Write};
use std::net::{Shutdown as Half, SocketAddr, TcpStream};
use std::thread::{self, JoinHandle};
use std::time::Duration;

const BODY: &str = "Hello world!";

struct Server {
    addr: SocketAddr,
    shutdown: Shutdown,
    handle: Option<JoinHandle<pollserver::Result<()>>>,
}

impl Server {
    fn start() -> Self {
        Self::start_with(|builder| builder)
    }

    fn start_with(
        configure: impl FnOnce(ServerBuilder) -> ServerBuilder,
    ) -> Self {
        tracing_subscriber::fmt().with_target(false).try_init().ok();

        let builder = ServerBuilder::new()
            .address("127.0.0.1:0".parse().unwrap())
            .poll_timeout(Duration::from_millis(50))
            .responder(StaticResponse::new(BODY));
        let event_loop: EventLoop<StaticResponse> =
            configure(builder).build().expect("bind listener");

        let addr = event_loop.local_addr().expect("local addr");
        let shutdown = event_loop.shutdown_handle();
        let handle = thread::spawn(move || event_loop.run());

        Self {
            addr,
            shutdown,
            handle: Some(handle),
        }
    }

    fn connect(&self) -> TcpStream {
        let stream = TcpStream::connect(self.addr).expect("connect");
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        stream
    }

    fn stop(mut self) -> pollserver::Result<()> {
        self.shutdown.request();
        self.handle
            .take()
            .expect("server running")
            .join()
            .expect("server thread panicked")
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.shutdown.request();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn read_response(stream: &mut TcpStream) -> String {
    let mut response = String::new();
    stream.read_to_string(&mut response).expect("read response");
    response
}

#[test]
fn get_request_gets_ok_response_then_close() {
    let server = Server::start();
    let mut client = server.connect();

    client.write_all(b"GET / HTTP/1.1\r\n\r\n").unwrap();
    let response = read_response(&mut client);

    assert!(response.starts_with("HTTP/1.1 200"), "got {response:?}");
    assert!(response.contains("Connection: close\r\n"));
    assert!(response.ends_with(&format!("\r\n\r\n{BODY}")));

    server.stop().expect("clean shutdown");
}

#[test]
fn fifty_simultaneous_clients_all_get_answers() {
    let server = Server::start();
    let mut clients: Vec<TcpStream> = (0..50).map(|_| server.connect()).collect();

    for client in &mut clients {
        client.write_all(b"x").unwrap();
    }

    for client in &mut clients {
        let response = read_response(client);
        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.ends_with(BODY));
    }

    server.stop().expect("clean shutdown");
}

#[test]
fn silent_client_does_not_block_others() {
    let server = Server::start();
    let silent = server.connect();
    let mut garbage = server.connect();
    let mut talker = server.connect();

    garbage.write_all(&[0xff, 0x00, 0xfe]).unwrap();
    talker.write_all(b"GET /a HTTP/1.1\r\n\r\n").unwrap();

    assert!(read_response(&mut talker).starts_with("HTTP/1.1 200"));
    assert!(read_response(&mut garbage).starts_with("HTTP/1.1 200"));

    // The silent client is still connected and still gets served later.
    let mut silent = silent;
    silent.write_all(b"late").unwrap();
    assert!(read_response(&mut silent).starts_with("HTTP/1.1 200"));

    server.stop().expect("clean shutdown");
}

#[test]
fn second_request_on_same_connection_is_not_answered() {
    let server = Server::start();
    let mut client = server.connect();

    client.write_all(b"GET / HTTP/1.1\r\n\r\n").unwrap();
    let mut first = vec![0u8; 4096];
    let n = client.read(&mut first).unwrap();
    assert!(first[..n].starts_with(b"HTTP/1.1 200"));

    // Drain to EOF: the server closed after the first response.
    let mut rest = Vec::new();
    client.read_to_end(&mut rest).unwrap();

    let second = client.write_all(b"GET / HTTP/1.1\r\n\r\n");
    let mut after = Vec::new();
    let read = client.read_to_end(&mut after);
    // Either the write or the read fails, or the read hits EOF with nothing.
    assert!(second.is_err() || read.is_err() || after.is_empty());

    server.stop().expect("clean shutdown");
}

#[test]
fn half_closed_client_still_gets_response() {
    let server = Server::start();
    let mut client = server.connect();

    client.write_all(b"GET / HTTP/1.1\r\n\r\n").unwrap();
    client.shutdown(Half::Write).unwrap();

    assert!(read_response(&mut client).starts_with("HTTP/1.1 200"));

    server.stop().expect("clean shutdown");
}

#[test]
fn connect_and_close_does_not_disturb_the_server() {
    let server = Server::start();

    for _ in 0..10 {
        drop(server.connect());
    }

    let mut client = server.connect();
    client.write_all(b"ping").unwrap();
    assert!(read_response(&mut client).ends_with(BODY));

    server.stop().expect("clean shutdown");
}

#[test]
fn shutdown_releases_tracked_clients() {
    let server = Server::start();
    let mut idle = server.connect();
    thread::sleep(Duration::from_millis(150));

    server.stop().expect("clean shutdown");

    // Closed by the server without a response.
    let mut buf = Vec::new();
    assert_eq!(idle.read_to_end(&mut buf).unwrap(), 0);
}

#[test]
fn connection_cap_defers_but_still_serves() {
    let server = Server::start_with(|builder| builder.max_connections(2));
    let mut clients: Vec<TcpStream> = (0..6).map(|_| server.connect()).collect();

    for client in &mut clients {
        client.write_all(b"GET / HTTP/1.1\r\n\r\n").unwrap();
    }
    for client in &mut clients {
        assert!(read_response(client).starts_with("HTTP/1.1 200"));
    }

    server.stop().expect("clean shutdown");
}

#[test]
fn oversized_requests_end_in_clean_eof() {
    let server = Server::start();
    let mut clients: Vec<TcpStream> = (0..20).map(|_| server.connect()).collect();

    for client in &mut clients {
        client.write_all(&[b'a'; 32 * 1024]).unwrap();
    }
    for client in &mut clients {
        let mut response = Vec::new();
        client
            .read_to_end(&mut response)
            .expect("end of stream, not a reset");
        assert!(response.starts_with(b"HTTP/1.1 200"));
        assert!(response.ends_with(BODY.as_bytes()));
    }

    server.stop().expect("clean shutdown");
}
