use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::service::AppService;

/// Blocking listener around `tiny_http`.
///
/// A single loop receives, handles and answers one request at a time; a slow
/// handler holds up every other client.
pub struct HttpServer(pub AppService);

/// Handle to a running HTTP server
///
/// Provides methods for waiting until the server is ready, stopping it, or
/// joining the server thread.
pub struct ServerHandle {
    addr: SocketAddr,
    server: Arc<tiny_http::Server>,
    stopping: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl ServerHandle {
    /// Address the listener is bound to (with the real port when `0` was
    /// requested).
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Wait for the server to be ready to accept connections
    ///
    /// # Errors
    ///
    /// Returns `TimedOut` if the server doesn't accept a connection within
    /// ~250ms (50 attempts × 5ms).
    pub fn wait_ready(&self) -> io::Result<()> {
        for _ in 0..50 {
            if TcpStream::connect(self.addr).is_ok() {
                return Ok(());
            }
            thread::sleep(Duration::from_millis(5));
        }
        Err(io::Error::new(io::ErrorKind::TimedOut, "server not ready"))
    }

    /// Stop accepting requests and wait for the loop to exit.
    ///
    /// A request already being handled is finished first.
    pub fn stop(self) {
        self.stopping.store(true, Ordering::SeqCst);
        self.server.unblock();
        if self.handle.join().is_err() {
            warn!(addr = %self.addr, "Server thread panicked during shutdown");
        }
    }

    /// Wait for the server thread to complete
    ///
    /// # Errors
    ///
    /// Returns an error if the server thread panicked.
    pub fn join(self) -> thread::Result<()> {
        self.handle.join()
    }
}

impl HttpServer {
    /// Bind `addr` and start serving on a background thread.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is invalid or cannot be bound.
    pub fn start<A: ToSocketAddrs>(self, addr: A) -> io::Result<ServerHandle> {
        let addr = addr
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "invalid address"))?;
        let server = tiny_http::Server::http(addr).map_err(io::Error::other)?;
        let addr = server.server_addr().to_ip().unwrap_or(addr);
        let server = Arc::new(server);
        let stopping = Arc::new(AtomicBool::new(false));

        let service = self.0;
        let handle = {
            let server = Arc::clone(&server);
            let stopping = Arc::clone(&stopping);
            thread::Builder::new()
                .name("nkapi-listener".to_string())
                .spawn(move || serve(&server, &service, &stopping))?
        };

        info!(addr = %addr, "Listening");
        Ok(ServerHandle {
            addr,
            server,
            stopping,
            handle,
        })
    }
}

fn serve(server: &tiny_http::Server, service: &AppService, stopping: &AtomicBool) {
    loop {
        match server.recv() {
            Ok(request) => service.serve_connection(request),
            Err(_) if stopping.load(Ordering::SeqCst) => break,
            Err(e) => warn!(error = %e, "Failed to receive request"),
        }
    }
    debug!("Listener loop stopped");
}

/// Ask the OS for a currently free TCP port on `host`.
///
/// The port is released again before returning, so another process may
/// claim it first.
pub fn allocate_ephemeral_port(host: &str) -> io::Result<u16> {
    let listener = TcpListener::bind((host, 0))?;
    Ok(listener.local_addr()?.port())
}
