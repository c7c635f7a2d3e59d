//! Blocking client for the push-notification WebSocket.

use crate::config::ClientConfig;
use crate::errors::ApiClientError;
use serde_json::Value;
use std::io;
use std::net::{SocketAddr, TcpStream};
use std::time::Duration;
use tracing::debug;
use tungstenite::client::IntoClientRequest;
use tungstenite::handshake::HandshakeError;
use tungstenite::http::header::COOKIE;
use tungstenite::http::HeaderValue;
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{Message, WebSocket};
use url::Url;

/// Cookie carrying the session cookie value on the socket handshake.
pub const AUTH_COOKIE: &str = "async_auth";

/// One persistent notification connection. No reconnects: a dropped
/// connection surfaces as an error and reconnecting is up to the caller.
pub struct WebsocketClient {
    socket: WebSocket<MaybeTlsStream<TcpStream>>,
    // Handle on the same socket, used to adjust read timeouts.
    control: TcpStream,
}

impl WebsocketClient {
    /// Connects to the `ws_endpoint` of `config`.
    pub fn from_config(
        config: &ClientConfig,
        cookie: &str,
        timeout: Duration,
    ) -> Result<Self, ApiClientError> {
        let endpoint = config
            .ws_endpoint
            .as_deref()
            .ok_or(ApiClientError::MissingWsEndpoint)?;
        Self::connect(endpoint, cookie, timeout)
    }

    /// Connects to `endpoint`. `timeout` bounds the TCP connect and becomes
    /// the default read timeout.
    pub fn connect(endpoint: &str, cookie: &str, timeout: Duration) -> Result<Self, ApiClientError> {
        let url = Url::parse(endpoint)?;
        let addrs = url.socket_addrs(|| None)?;
        let stream = connect_any(&addrs, timeout)?;
        stream.set_read_timeout(Some(timeout))?;
        stream.set_write_timeout(Some(timeout))?;
        let control = stream.try_clone()?;

        let mut request = url.as_str().into_client_request()?;
        let cookie = HeaderValue::from_str(&format!("{AUTH_COOKIE}={cookie}"))
            .map_err(|e| ApiClientError::InvalidHeader(format!("Cookie: {e}")))?;
        request.headers_mut().insert(COOKIE, cookie);

        let (socket, response) = tungstenite::client_tls(request, stream).map_err(|e| match e {
            HandshakeError::Failure(err) => ApiClientError::WebSocket(err),
            HandshakeError::Interrupted(_) => {
                ApiClientError::WebSocketHandshake("handshake interrupted".to_string())
            }
        })?;
        debug!(endpoint = %url, status = %response.status(), "WebSocket connected");

        Ok(Self { socket, control })
    }

    /// Current read timeout of the connection.
    pub fn timeout(&self) -> Result<Option<Duration>, ApiClientError> {
        Ok(self.control.read_timeout()?)
    }

    /// Waits for the next message and decodes it as JSON.
    ///
    /// `timeout` replaces the connection's read timeout for this call only.
    pub fn recv(&mut self, timeout: Option<Duration>) -> Result<Value, ApiClientError> {
        let frame = self.recv_raw(timeout)?;
        Ok(serde_json::from_slice(&frame)?)
    }

    /// Waits for the next message and returns its payload undecoded.
    pub fn recv_raw(&mut self, timeout: Option<Duration>) -> Result<Vec<u8>, ApiClientError> {
        let Some(timeout) = timeout else {
            return self.read_frame();
        };

        let previous = self.control.read_timeout()?;
        self.control.set_read_timeout(Some(timeout))?;
        let result = self.read_frame();
        self.control.set_read_timeout(previous)?;
        result
    }

    pub fn close(&mut self) -> Result<(), ApiClientError> {
        match self.socket.close(None) {
            Ok(()) | Err(tungstenite::Error::ConnectionClosed) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn read_frame(&mut self) -> Result<Vec<u8>, ApiClientError> {
        loop {
            match self.socket.read() {
                Ok(Message::Text(text)) => return Ok(text.into_bytes()),
                Ok(Message::Binary(data)) => return Ok(data),
                Ok(Message::Close(_)) => return Err(ApiClientError::WebSocketClosed),
                // ping, pong and raw frames
                Ok(_) => continue,
                Err(tungstenite::Error::Io(e))
                    if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) =>
                {
                    let waited = self.control.read_timeout()?.unwrap_or_default();
                    return Err(ApiClientError::Timeout(waited));
                }
                Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                    return Err(ApiClientError::WebSocketClosed)
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

fn connect_any(addrs: &[SocketAddr], timeout: Duration) -> Result<TcpStream, ApiClientError> {
    let mut last_err = None;
    for addr in addrs {
        match TcpStream::connect_timeout(addr, timeout) {
            Ok(stream) => return Ok(stream),
            Err(e) => last_err = Some(e),
        }
    }
    Err(last_err
        .unwrap_or_else(|| io::Error::new(io::ErrorKind::AddrNotAvailable, "no address resolved"))
        .into())
}
