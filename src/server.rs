//! HTTP server lifecycle: bind, accept, serve connections.
//!
//! A [`Server`] pairs a listening socket with a shared [`Dispatcher`]. Each
//! accepted connection is served on its own thread; requests on a
//! connection are handled one after another until the client closes it,
//! asks for `Connection: close`, or stays idle past the read timeout.
//!
//! One server per process is the normal setup, available through
//! [`Server::instance`]. Tests and embedders can build their own with
//! [`Server::new`] and pass it around by reference.

use std::io::{BufReader, ErrorKind, Write};
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result};

use crate::delegate::Delegate;
use crate::dispatcher::Dispatcher;
use crate::error::ServerError;
use crate::http::{parse_request, HttpMethod, HttpResponse};

/// How long to wait for in-flight requests to complete during shutdown.
const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_millis(50);

/// How often to poll for new connections in non-blocking accept loop.
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(10);

const PERSISTENT_CONNECTION_READ_TIMEOUT: Duration = Duration::from_secs(5);

pub struct Server {
    dispatcher: Arc<Dispatcher>,
    listener: Mutex<Option<TcpListener>>,
    local_addr: Mutex<Option<SocketAddr>>,
}

impl Server {
    /// The process-wide server, created on first use
    pub fn instance() -> &'static Server {
        static INSTANCE: OnceLock<Server> = OnceLock::new();
        INSTANCE.get_or_init(|| Server::new(Arc::new(Dispatcher::new())))
    }

    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Server {
            dispatcher,
            listener: Mutex::new(None),
            local_addr: Mutex::new(None),
        }
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn set_delegate(&self, delegate: Arc<dyn Delegate>) {
        self.dispatcher.set_delegate(delegate);
    }

    pub fn delegate(&self) -> Option<Arc<dyn Delegate>> {
        self.dispatcher.delegate()
    }

    /// Bind to `address:port`. Returns 0 on success or an errno-like code.
    pub fn bind(&self, address: &str, port: u16) -> i32 {
        match self.try_bind(address, port) {
            Ok(_) => 0,
            Err(e) => {
                log::error!("{}", e);
                e.code()
            }
        }
    }

    /// Bind to `address:port`, replacing any earlier binding.
    pub fn try_bind(&self, address: &str, port: u16) -> Result<SocketAddr, ServerError> {
        let candidates: Vec<SocketAddr> = (address, port)
            .to_socket_addrs()
            .map_err(|_| ServerError::InvalidAddress(address.to_string()))?
            .collect();
        if candidates.is_empty() {
            return Err(ServerError::InvalidAddress(address.to_string()));
        }

        let bind_error = |source| ServerError::Bind {
            address: address.to_string(),
            port,
            source,
        };
        let listener = TcpListener::bind(&candidates[..]).map_err(bind_error)?;
        let local_addr = listener.local_addr().map_err(bind_error)?;

        *self.listener.lock().unwrap_or_else(PoisonError::into_inner) = Some(listener);
        *self.local_addr.lock().unwrap_or_else(PoisonError::into_inner) = Some(local_addr);
        log::info!("Server bound to {}", local_addr);
        Ok(local_addr)
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Launch the delegate and serve until the accept loop hits an error it
    /// cannot recover from. Does not return under normal operation.
    pub fn run(&self) -> Result<(), ServerError> {
        let listener = self
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(ServerError::NotBound)?;

        self.dispatcher.launch()?;

        log::info!(
            "Server listening on {}",
            listener
                .local_addr()
                .map(|addr| addr.to_string())
                .unwrap_or_else(|_| "unknown address".to_string())
        );
        let never = AtomicBool::new(false);
        run_accept_loop(&listener, &self.dispatcher, &never)
    }
}

/// A server running on a background thread that can be stopped.
///
/// Mostly useful for tests, which need dynamic ports and a way to stop the
/// server when they are done.
pub struct ServerHandle {
    /// The address the server is bound to
    addr: SocketAddr,
    /// Shutdown flag shared with the server thread
    shutdown_flag: Arc<AtomicBool>,
    /// Handle to the server thread (None after shutdown)
    thread_handle: Option<JoinHandle<()>>,
}

impl ServerHandle {
    /// Launch the dispatcher's delegate, bind and start serving.
    pub fn start<A: ToSocketAddrs>(addr: A, dispatcher: Arc<Dispatcher>) -> Result<Self> {
        dispatcher.launch()?;

        let listener = TcpListener::bind(&addr).context("Failed to bind to address")?;

        let local_addr = listener
            .local_addr()
            .context("Failed to get local address")?;

        listener
            .set_nonblocking(true)
            .context("Failed to set non-blocking mode")?;

        let shutdown_flag = Arc::new(AtomicBool::new(false));

        let shutdown_clone = Arc::clone(&shutdown_flag);
        let thread_handle = thread::spawn(move || {
            if let Err(e) = run_accept_loop(&listener, &dispatcher, &shutdown_clone) {
                log::error!("{}", e);
            }
        });

        log::info!("Server listening on {}", local_addr);

        Ok(ServerHandle {
            addr: local_addr,
            shutdown_flag,
            thread_handle: Some(thread_handle),
        })
    }

    /// Start a server that binds to an OS-assigned free port.
    pub fn start_with_dynamic_port(dispatcher: Arc<Dispatcher>) -> Result<Self> {
        Self::start("127.0.0.1:0", dispatcher)
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Stop accepting connections and wait for the accept loop to exit.
    /// Safe to call multiple times.
    pub fn shutdown(&mut self) {
        self.shutdown_flag.store(true, Ordering::SeqCst);

        if let Some(handle) = self.thread_handle.take() {
            thread::sleep(SHUTDOWN_GRACE_PERIOD);
            let _ = handle.join();
        }
    }

    pub fn is_running(&self) -> bool {
        !self.shutdown_flag.load(Ordering::SeqCst)
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Errors from `accept` that concern a single connection, not the listener
fn is_transient(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        ErrorKind::ConnectionAborted
            | ErrorKind::ConnectionReset
            | ErrorKind::Interrupted
            | ErrorKind::TimedOut
    )
}

fn run_accept_loop(
    listener: &TcpListener,
    dispatcher: &Arc<Dispatcher>,
    shutdown_flag: &AtomicBool,
) -> Result<(), ServerError> {
    loop {
        if shutdown_flag.load(Ordering::SeqCst) {
            log::debug!("Server shutdown requested");
            break;
        }

        match listener.accept() {
            Ok((stream, peer_addr)) => {
                log::debug!("Accepted connection from {}", peer_addr);
                let dispatcher = Arc::clone(dispatcher);
                thread::spawn(move || {
                    handle_connection(stream, peer_addr, &dispatcher);
                });
            }
            Err(ref e) if e.kind() == ErrorKind::WouldBlock => {
                thread::sleep(ACCEPT_POLL_INTERVAL);
            }
            Err(e) if is_transient(&e) => {
                log::warn!("Dropped incoming connection: {}", e);
            }
            Err(e) => {
                log::error!("Accept error: {}", e);
                return Err(ServerError::Accept(e));
            }
        }
    }
    log::debug!("Server accept loop terminated");
    Ok(())
}

fn handle_connection(stream: TcpStream, peer_addr: SocketAddr, dispatcher: &Dispatcher) {
    if let Err(e) = process_requests(stream, dispatcher) {
        log::error!("Error handling connection from {}: {:#}", peer_addr, e);
    }
}

fn process_requests(stream: TcpStream, dispatcher: &Dispatcher) -> Result<()> {
    // Accepted sockets inherit non-blocking mode on some platforms
    stream.set_nonblocking(false)?;
    stream.set_read_timeout(Some(PERSISTENT_CONNECTION_READ_TIMEOUT))?;

    let mut writer = stream.try_clone().context("Failed to clone stream")?;
    let mut reader = BufReader::new(stream);

    loop {
        let request = match parse_request(&mut reader) {
            Ok(Some(request)) => request,
            Ok(None) => break,
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                log::debug!("Closing idle connection");
                break;
            }
            Err(e) if e.kind() == ErrorKind::InvalidData => {
                log::warn!("Bad request: {}", e);
                let mut response = HttpResponse::bad_request();
                let length = response.body.len().to_string();
                response.headers.insert("Content-Length", length);
                response.headers.insert("Connection", "close");
                writer
                    .write_all(&response.to_bytes())
                    .context("Failed to write response")?;
                break;
            }
            Err(e) => return Err(e).context("Failed to parse request"),
        };

        let mut response = dispatcher.handle(&request);
        log::debug!("{} {} -> {}", request.method, request.uri, response.status);

        // Either side may end the connection
        let keep_alive = request.keep_alive() && !response.closes_connection();

        if !keep_alive {
            response.headers.insert("Connection", "close");
        }

        let bytes = if request.method == HttpMethod::Head {
            response.serialize()
        } else {
            response.to_bytes()
        };
        writer
            .write_all(&bytes)
            .context("Failed to write response")?;

        if !keep_alive {
            break;
        }
    }
    Ok(())
}
