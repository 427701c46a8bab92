// Blocking WebSocket transport backed by tokio-tungstenite.
//
// The agent is synchronous so it can be driven from any loop; this
// transport owns a private current-thread runtime and blocks on it for
// each socket operation.

use anyhow::{anyhow, Context, Result};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::runtime::Runtime;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::debug;

use corkboard_common::protocol::ws::{
    decode_server_message, encode_client_message, ClientMessage, ServerDecoded,
};

use crate::{BoardTransport, Incoming};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct WsTransport {
    runtime: Runtime,
    socket: Option<Socket>,
}

impl WsTransport {
    pub fn new() -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("failed to build the client runtime")?;
        Ok(Self { runtime, socket: None })
    }
}

impl BoardTransport for WsTransport {
    fn connect(&mut self, ws_url: &str) -> Result<()> {
        // The URL carries the access token; keep it out of error output.
        let (socket, _response) = self
            .runtime
            .block_on(connect_async(ws_url))
            .context("failed to open the board socket")?;
        self.socket = Some(socket);
        Ok(())
    }

    fn send(&mut self, message: &ClientMessage) -> Result<()> {
        let frame = encode_client_message(message)?;
        let socket = self.socket.as_mut().ok_or_else(|| anyhow!("socket is not open"))?;
        self.runtime
            .block_on(socket.send(Message::Text(frame.into())))
            .context("failed to send over the board socket")
    }

    fn recv(&mut self) -> Result<Incoming> {
        loop {
            let item = match self.socket.as_mut() {
                Some(socket) => self.runtime.block_on(socket.next()),
                None => return Err(anyhow!("socket is not open")),
            };

            match item {
                Some(Ok(Message::Text(frame))) => match decode_server_message(frame.as_str()) {
                    Ok(ServerDecoded::Message(message)) => return Ok(Incoming::Message(message)),
                    Ok(ServerDecoded::Unknown { message_type }) => {
                        debug!(message_type, "skipping unknown server frame");
                    }
                    Err(error) => return Err(anyhow!("undecodable server frame: {error}")),
                },
                Some(Ok(Message::Close(frame))) => {
                    self.socket = None;
                    let (code, reason) = match frame {
                        Some(frame) => (Some(u16::from(frame.code)), frame.reason.to_string()),
                        None => (None, String::new()),
                    };
                    return Ok(Incoming::Closed { code, reason });
                }
                // Tungstenite answers pings on our behalf.
                Some(Ok(_)) => {}
                Some(Err(error)) => {
                    self.socket = None;
                    return Ok(Incoming::Closed { code: None, reason: error.to_string() });
                }
                None => {
                    self.socket = None;
                    return Ok(Incoming::Closed {
                        code: None,
                        reason: "socket closed".to_string(),
                    });
                }
            }
        }
    }

    fn close(&mut self) {
        if let Some(mut socket) = self.socket.take() {
            let _ = self.runtime.block_on(socket.close(None));
        }
    }
}
