//! TCP transport speaking the node's RPC socket protocol: JSON envelopes
//! delimited by a form feed byte, one multiplexed connection per client.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;

use super::RpcTransport;
use crate::error::RpcError;

pub const MESSAGE_DELIMITER: u8 = b'\x0c';

pub struct TcpTransport {
    conn: Mutex<Conn>,
    next_mid: AtomicU64,
}

struct Conn {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl TcpTransport {
    /// Establish the connection up front so "node not reachable" is
    /// distinguishable from a failing query.
    pub async fn connect(addr: SocketAddr) -> Result<Self, RpcError> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|source| RpcError::Connect { addr: addr.to_string(), source })?;
        let (reader, writer) = stream.into_split();
        Ok(Self {
            conn: Mutex::new(Conn { reader: BufReader::new(reader), writer }),
            next_mid: AtomicU64::new(1),
        })
    }
}

#[derive(Debug, Deserialize)]
struct ResponseEnvelope {
    #[serde(rename = "type")]
    kind: String,
    data: ResponseBody,
}

#[derive(Debug, Deserialize)]
struct ResponseBody {
    #[serde(default)]
    id: u64,
    #[serde(default)]
    status: u16,
    #[serde(default)]
    data: Option<Value>,
}

#[async_trait]
impl RpcTransport for TcpTransport {
    async fn request(&self, route: &str, params: Value) -> Result<Value, RpcError> {
        let mid = self.next_mid.fetch_add(1, Ordering::SeqCst);
        let envelope = json!({
            "type": "message",
            "data": { "mid": mid, "type": route, "data": params },
        });
        let mut frame =
            serde_json::to_vec(&envelope).map_err(|e| RpcError::Codec(e.to_string()))?;
        frame.push(MESSAGE_DELIMITER);

        let mut conn = self.conn.lock().await;
        conn.writer.write_all(&frame).await?;
        conn.writer.flush().await?;

        loop {
            let mut buf = Vec::new();
            let read = conn.reader.read_until(MESSAGE_DELIMITER, &mut buf).await?;
            if read == 0 {
                return Err(RpcError::ConnectionClosed);
            }
            if buf.last() == Some(&MESSAGE_DELIMITER) {
                buf.pop();
            }

            let envelope: ResponseEnvelope = serde_json::from_slice(&buf)
                .map_err(|e| RpcError::Codec(format!("unparseable RPC frame: {e}")))?;
            // Stream frames and responses to other in-flight requests are
            // skipped; only the reply to this request terminates the loop.
            if envelope.kind != "message" || envelope.data.id != mid {
                continue;
            }

            let body = envelope.data;
            if (200..300).contains(&body.status) {
                return Ok(body.data.unwrap_or(Value::Null));
            }
            return Err(RpcError::Response {
                route: route.to_string(),
                status: body.status,
                message: error_message(body.data.as_ref()),
            });
        }
    }
}

fn error_message(data: Option<&Value>) -> String {
    match data {
        Some(Value::Object(object)) => match object.get("message") {
            Some(Value::String(message)) => message.clone(),
            _ => Value::Object(object.clone()).to_string(),
        },
        Some(other) => other.to_string(),
        None => String::new(),
    }
}
