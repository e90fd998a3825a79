// Integration test utilities
use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use kurt::{Dispatcher, ServerHandle};

/// How long to wait for the server port to become available.
const PORT_READY_TIMEOUT: Duration = Duration::from_secs(5);

/// How often to check if the port is available.
const PORT_CHECK_INTERVAL: Duration = Duration::from_millis(50);

/// Timeout for socket read/write operations.
const SOCKET_TIMEOUT: Duration = Duration::from_secs(5);

/// Wait for a port to become available within timeout
fn wait_for_port(port: u16) -> bool {
    let start = std::time::Instant::now();
    loop {
        match TcpStream::connect(("127.0.0.1", port)) {
            Ok(_) => return true,
            Err(_) => {
                if start.elapsed() > PORT_READY_TIMEOUT {
                    return false;
                }
                thread::sleep(PORT_CHECK_INTERVAL);
            }
        }
    }
}

/// A parsed HTTP response as seen by a client
#[derive(Debug)]
pub struct TestResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl TestResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Test server wrapping a ServerHandle on a dynamic port.
/// Provides convenience methods for sending test requests.
pub struct TestServer {
    server: ServerHandle,
}

impl TestServer {
    /// Launch `dispatcher` and serve it on a free port
    pub fn start(dispatcher: Arc<Dispatcher>) -> Self {
        let server =
            ServerHandle::start_with_dynamic_port(dispatcher).expect("Failed to start test server");

        assert!(wait_for_port(server.port()), "Test server never came up");

        TestServer { server }
    }

    /// Send a raw HTTP request on a fresh connection
    pub fn send_request(&self, request: &str) -> TestResponse {
        self.send_requests(&[request])
            .pop()
            .expect("No response received")
    }

    /// Send multiple HTTP requests over a single persistent connection.
    /// Returns a response for each request.
    pub fn send_requests(&self, requests: &[&str]) -> Vec<TestResponse> {
        let stream = self.connect();
        let mut reader = BufReader::new(stream);

        let mut responses = Vec::with_capacity(requests.len());

        for request in requests {
            reader
                .get_mut()
                .write_all(request.as_bytes())
                .expect("Failed to write request");

            responses.push(Self::read_single_response(&mut reader));
        }

        responses
    }

    /// Write raw bytes and read everything until the server closes the
    /// connection.
    pub fn send_raw(&self, request: &[u8]) -> String {
        let mut stream = self.connect();
        stream.write_all(request).expect("Failed to write request");

        let mut response = Vec::new();
        stream
            .read_to_end(&mut response)
            .expect("Failed to read response");
        String::from_utf8_lossy(&response).into_owned()
    }

    fn connect(&self) -> TcpStream {
        let stream =
            TcpStream::connect(self.server.addr()).expect("Failed to connect to test server");
        stream
            .set_read_timeout(Some(SOCKET_TIMEOUT))
            .expect("Failed to set read timeout");
        stream
            .set_write_timeout(Some(SOCKET_TIMEOUT))
            .expect("Failed to set write timeout");
        stream
    }

    /// Read a single HTTP response by parsing headers for Content-Length
    fn read_single_response<R: BufRead>(reader: &mut R) -> TestResponse {
        // Read status line (e.g., "HTTP/1.1 200 OK\r\n")
        let mut status_line = String::new();
        reader
            .read_line(&mut status_line)
            .expect("Failed to read status line");
        let status = status_line
            .split_whitespace()
            .nth(1)
            .and_then(|code| code.parse().ok())
            .unwrap_or_else(|| panic!("Malformed status line: {:?}", status_line));

        // Read headers until empty line
        let mut headers = Vec::new();
        loop {
            let mut line = String::new();
            reader
                .read_line(&mut line)
                .expect("Failed to read header line");
            if line == "\r\n" || line.is_empty() {
                break;
            }
            if let Some((key, value)) = line.split_once(':') {
                headers.push((key.trim().to_string(), value.trim().to_string()));
            }
        }

        let content_length: usize = headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case("Content-Length"))
            .map(|(_, value)| value.parse().expect("Invalid Content-Length"))
            .unwrap_or(0);

        // Read body based on Content-Length
        let mut body = vec![0u8; content_length];
        if content_length > 0 {
            reader.read_exact(&mut body).expect("Failed to read body");
        }

        TestResponse {
            status,
            headers,
            body,
        }
    }
}
