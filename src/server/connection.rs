//! WebSocket connection handling
//!
//! Performs the handshake, then runs a read loop feeding the coordinator
//! and a writer task draining the connection's outbound channel.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_KEY;
use tokio_tungstenite::tungstenite::{self, Message};

use crate::error::{Error, Result};
use crate::server::config::ServerConfig;
use crate::server::coordinator::Bridge;
use crate::subscription::ChannelSink;

/// A single accepted TCP connection
pub(crate) struct Connection {
    socket: TcpStream,
    peer_addr: SocketAddr,
    fallback_id: String,
    config: ServerConfig,
    bridge: Arc<Bridge>,
}

impl Connection {
    pub(crate) fn new(
        socket: TcpStream,
        peer_addr: SocketAddr,
        fallback_id: String,
        config: ServerConfig,
        bridge: Arc<Bridge>,
    ) -> Self {
        Self {
            socket,
            peer_addr,
            fallback_id,
            config,
            bridge,
        }
    }

    /// Run the connection until the client goes away
    pub(crate) async fn run(self) -> Result<()> {
        let Connection {
            socket,
            peer_addr,
            fallback_id,
            config,
            bridge,
        } = self;

        let mut handshake_key: Option<String> = None;
        let capture_key = |req: &Request, response: Response| -> std::result::Result<Response, ErrorResponse> {
            handshake_key = req
                .headers()
                .get(SEC_WEBSOCKET_KEY)
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned);
            Ok(response)
        };

        let ws = tokio::time::timeout(
            config.handshake_timeout,
            tokio_tungstenite::accept_hdr_async(socket, capture_key),
        )
        .await
        .map_err(|_| {
            Error::Io(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "WebSocket handshake timed out",
            ))
        })??;

        let id = handshake_key.unwrap_or(fallback_id);
        tracing::debug!(conn_id = %id, peer = %peer_addr, "WebSocket handshake complete");

        let (mut ws_tx, mut ws_rx) = ws.split();
        let (sink, mut outbound) = ChannelSink::new(config.outbound_buffer);
        let connection = bridge.on_connect(&id, Arc::new(sink)).await;

        let writer_id = id.clone();
        let writer = tokio::spawn(async move {
            while let Some(payload) = outbound.recv().await {
                if let Err(e) = ws_tx.send(to_frame(payload)).await {
                    tracing::debug!(conn_id = %writer_id, error = %e, "WebSocket write failed");
                    break;
                }
            }
            if let Err(e) = ws_tx.close().await {
                tracing::debug!(conn_id = %writer_id, error = %e, "WebSocket close failed");
            }
        });

        let mut failure: Option<tungstenite::Error> = None;
        while let Some(frame) = ws_rx.next().await {
            match frame {
                Ok(message @ (Message::Text(_) | Message::Binary(_))) => {
                    bridge.on_message(&connection, &message.into_data()).await;
                }
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(tungstenite::Error::ConnectionClosed) => break,
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }

        // Dropping the receiver marks the sink unwritable
        writer.abort();

        bridge
            .on_close(
                &connection,
                failure
                    .as_ref()
                    .map(|e| e as &(dyn std::error::Error + Send + Sync)),
            )
            .await;

        Ok(())
    }
}

/// Payloads that are valid UTF-8 go out as text frames, anything else as binary
fn to_frame(payload: Bytes) -> Message {
    match std::str::from_utf8(&payload) {
        Ok(text) => Message::text(text.to_owned()),
        Err(_) => Message::binary(payload),
    }
}
