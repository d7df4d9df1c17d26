use std::time::Duration;

use async_trait::async_trait;
use notifier_core::{
    DriverClient, DriverConnector, HostPort, NotificationCall, TransportError, TransportSettings,
};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, trace};

use crate::wire::{RpcRequest, RpcResponse};

/// Longest acknowledgement line accepted from a driver, newline included.
pub const MAX_REPLY_BYTES: u64 = 64 * 1024;

/// Opens line-delimited JSON connections to session drivers.
#[derive(Clone, Debug)]
pub struct TcpDriverConnector {
    connect_timeout: Duration,
    call_timeout: Duration,
}

impl TcpDriverConnector {
    pub fn new(connect_timeout: Duration, call_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            call_timeout,
        }
    }

    pub fn from_settings(settings: &TransportSettings) -> Self {
        Self::new(settings.connect_timeout(), settings.call_timeout())
    }
}

#[async_trait]
impl DriverConnector for TcpDriverConnector {
    async fn connect(&self, address: &HostPort) -> Result<Box<dyn DriverClient>, TransportError> {
        let target = address.to_string();
        let stream = match timeout(self.connect_timeout, TcpStream::connect(&target)).await {
            Err(_) => return Err(TransportError::Timeout(self.connect_timeout)),
            Ok(Err(e)) => {
                return Err(TransportError::Connect {
                    address: target,
                    reason: e.to_string(),
                })
            }
            Ok(Ok(stream)) => stream,
        };
        stream.set_nodelay(true)?;
        debug!(address = %target, "connected to session driver");
        Ok(Box::new(TcpDriverClient::new(stream, self.call_timeout)))
    }
}

struct Connection {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

/// One open connection to a session driver. Calls are strictly
/// request/response; the next call is written only after the previous
/// acknowledgement has been read.
pub struct TcpDriverClient {
    conn: Option<Connection>,
    call_timeout: Duration,
    next_id: u64,
}

impl TcpDriverClient {
    pub fn new(stream: TcpStream, call_timeout: Duration) -> Self {
        let (read, writer) = stream.into_split();
        Self {
            conn: Some(Connection {
                reader: BufReader::new(read),
                writer,
            }),
            call_timeout,
            next_id: 0,
        }
    }
}

#[async_trait]
impl DriverClient for TcpDriverClient {
    async fn invoke(&mut self, call: &NotificationCall) -> Result<(), TransportError> {
        let Some(conn) = self.conn.as_mut() else {
            return Err(TransportError::Closed);
        };
        self.next_id += 1;
        let id = self.next_id;

        let mut line = serde_json::to_string(&RpcRequest::new(id, call)?)?;
        line.push('\n');

        let exchange = async {
            conn.writer.write_all(line.as_bytes()).await?;
            conn.writer.flush().await?;
            let mut buf = String::new();
            let read = (&mut conn.reader)
                .take(MAX_REPLY_BYTES + 1)
                .read_line(&mut buf)
                .await?;
            if read == 0 {
                return Err(TransportError::Closed);
            }
            if read as u64 > MAX_REPLY_BYTES {
                return Err(TransportError::Protocol(format!(
                    "reply exceeds {MAX_REPLY_BYTES} bytes"
                )));
            }
            Ok::<_, TransportError>(buf)
        };
        let reply = timeout(self.call_timeout, exchange)
            .await
            .map_err(|_| TransportError::Timeout(self.call_timeout))??;

        trace!(id, method = call.method(), "driver replied");
        let response: RpcResponse = serde_json::from_str(reply.trim_end())?;
        response.into_result(id)
    }

    async fn close(&mut self) {
        if let Some(mut conn) = self.conn.take() {
            let _ = conn.writer.shutdown().await;
        }
    }
}
