//! Shared WebSocket plumbing for the streaming providers: connection
//! helpers with header support, error mapping that surfaces the HTTP
//! status and a body snippet when the handshake is rejected, and the
//! streaming-client state machine.

use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::debug;

use crate::core::error::ProviderError;

pub(crate) type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Explicit state for a streaming client. A single mutex guards
/// transitions; the reader task publishes only through bounded channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ClientState {
    /// Created; transport may not be established yet.
    Init,
    /// Transport established; `send` accepted.
    Open,
    /// `finalize` was called; no more `send` accepted, `receive` drains.
    Draining,
    /// Terminal state.
    Closed,
}

/// Opens a WebSocket connection with extra request headers.
pub(crate) async fn connect(
    url: &str,
    headers: &[(&'static str, String)],
) -> Result<WsStream, ProviderError> {
    let mut request = url
        .into_client_request()
        .map_err(|e| ProviderError::Configuration(format!("invalid WebSocket URL {url}: {e}")))?;

    for (name, value) in headers {
        let value = HeaderValue::from_str(value)
            .map_err(|e| ProviderError::Configuration(format!("invalid header {name}: {e}")))?;
        request.headers_mut().insert(*name, value);
    }

    let (stream, response) = connect_async(request).await.map_err(connect_error)?;
    debug!(url = %url, status = %response.status(), "WebSocket connected");
    Ok(stream)
}

/// Maps a handshake failure onto the taxonomy, carrying the HTTP status
/// and a body snippet when the server rejected the upgrade.
pub(crate) fn connect_error(err: tokio_tungstenite::tungstenite::Error) -> ProviderError {
    use tokio_tungstenite::tungstenite::Error;

    match err {
        Error::Http(response) => {
            let status = response.status();
            let snippet = response
                .body()
                .as_ref()
                .map(|body| {
                    String::from_utf8_lossy(body)
                        .chars()
                        .take(1024)
                        .collect::<String>()
                })
                .unwrap_or_default();
            if status.as_u16() == 401 || status.as_u16() == 403 {
                ProviderError::AuthenticationFailed(format!("status {status}: {snippet}"))
            } else {
                ProviderError::ConnectionFailed(format!("status {status}: {snippet}"))
            }
        }
        Error::Io(e) => ProviderError::ConnectionFailed(e.to_string()),
        Error::Tls(e) => ProviderError::ConnectionFailed(e.to_string()),
        other => ProviderError::ConnectionFailed(other.to_string()),
    }
}
