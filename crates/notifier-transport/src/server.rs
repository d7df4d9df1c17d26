//! Session-driver side of the transport.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use notifier_core::{HostPort, NotificationCall};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::wire::{RpcRequest, RpcResponse, INVALID_REQUEST, PARSE_ERROR};

/// A driver's refusal of a call, reported back as `success: false`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Rejection {
    pub code: String,
    pub message: String,
}

impl Rejection {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Receives decoded notifications on the driver side.
#[async_trait]
pub trait SessionDriverHandler: Send + Sync + 'static {
    async fn handle(&self, call: NotificationCall) -> Result<(), Rejection>;
}

/// Listens for notifier connections and answers each request line.
pub struct DriverServer {
    local_addr: SocketAddr,
    task: JoinHandle<()>,
}

impl DriverServer {
    /// Bind `addr` and start accepting. The server and every open
    /// connection stop when `cancel` fires.
    pub async fn bind(
        addr: &str,
        handler: Arc<dyn SessionDriverHandler>,
        cancel: CancellationToken,
    ) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        info!(%local_addr, "session driver listening");

        let task = tokio::spawn(accept_loop(listener, handler, cancel));
        Ok(Self { local_addr, task })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Address the notifier should use for sessions served here.
    pub fn host_port(&self) -> HostPort {
        HostPort::new(self.local_addr.ip().to_string(), self.local_addr.port())
    }

    /// Wait for the accept loop to exit after cancellation.
    pub async fn wait(self) {
        let _ = self.task.await;
    }
}

async fn accept_loop(
    listener: TcpListener,
    handler: Arc<dyn SessionDriverHandler>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    debug!(%peer, "notifier connected");
                    tokio::spawn(serve_connection(
                        stream,
                        Arc::clone(&handler),
                        cancel.child_token(),
                    ));
                }
                Err(e) => warn!(error = %e, "accept failed"),
            },
        }
    }
    info!("session driver stopped");
}

async fn serve_connection(
    stream: TcpStream,
    handler: Arc<dyn SessionDriverHandler>,
    cancel: CancellationToken,
) {
    let (read, mut write) = stream.into_split();
    let mut lines = BufReader::new(read).lines();
    loop {
        let line = tokio::select! {
            () = cancel.cancelled() => break,
            line = lines.next_line() => line,
        };
        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                debug!(error = %e, "connection read failed");
                break;
            }
        };

        let response = respond(&line, handler.as_ref()).await;
        let mut out = match serde_json::to_string(&response) {
            Ok(out) => out,
            Err(e) => {
                warn!(error = %e, "failed to encode response");
                break;
            }
        };
        out.push('\n');
        if let Err(e) = write.write_all(out.as_bytes()).await {
            debug!(error = %e, "connection write failed");
            break;
        }
    }
}

async fn respond(line: &str, handler: &dyn SessionDriverHandler) -> RpcResponse {
    let request: RpcRequest = match serde_json::from_str(line) {
        Ok(r) => r,
        Err(e) => return RpcResponse::error(None, PARSE_ERROR, e.to_string()),
    };
    let id = request.id;
    let method = request.method.clone();
    let call = match request.into_call() {
        Ok(call) => call,
        Err(e) => {
            return RpcResponse::error(Some(id), INVALID_REQUEST, format!("{method}: {e}"));
        }
    };
    match handler.handle(call).await {
        Ok(()) => RpcResponse::success(id),
        Err(rejection) => RpcResponse::error(Some(id), rejection.code, rejection.message),
    }
}
