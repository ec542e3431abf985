//! Detection feed connection: Kismet session auth + device monitor stream

use crate::fields::FieldMap;
use async_trait::async_trait;
use futures_util::{SinkExt, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::time::Duration;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// Credentials were rejected. Fatal: retrying with the same bad
    /// credentials cannot succeed.
    #[error("detection feed denied the credentials (HTTP {status})")]
    AuthDenied { status: u16 },

    #[error("session request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("session response did not set a KISMET cookie")]
    MissingSessionCookie,

    #[error("session cookie is not usable as a header value")]
    InvalidCookie,

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("connection attempt timed out after {0:?}")]
    Timeout(Duration),
}

impl SourceError {
    /// Fatal errors terminate the process instead of entering the retry
    /// loop; everything else is a transient condition.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SourceError::AuthDenied { .. })
    }
}

/// One JSON text message per detection.
pub type DetectionStream = Pin<Box<dyn Stream<Item = Result<String, SourceError>> + Send>>;

/// Seam between the ingestion loop and the concrete feed, so the loop's
/// retry and mapping behavior is testable without a live Kismet server.
#[async_trait]
pub trait DetectionSource: Send {
    /// Authenticate, subscribe, and return the live detection stream.
    async fn connect(&mut self) -> Result<DetectionStream, SourceError>;
}

/// Connection settings for a Kismet server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KismetConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    /// Device monitor poll rate, in seconds between reports
    pub rate: u32,
    pub connect_timeout_secs: u64,
}

impl Default for KismetConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 2501,
            username: String::new(),
            password: String::new(),
            rate: 1,
            connect_timeout_secs: 10,
        }
    }
}

impl KismetConfig {
    fn session_url(&self) -> String {
        format!("http://{}:{}/session/check_session", self.host, self.port)
    }

    fn monitor_url(&self) -> String {
        format!("ws://{}:{}/devices/monitor.ws", self.host, self.port)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Detection source backed by a Kismet server's session and device
/// monitor endpoints.
pub struct KismetSource {
    config: KismetConfig,
    field_map: FieldMap,
    http: reqwest::Client,
}

impl KismetSource {
    pub fn new(config: KismetConfig, field_map: FieldMap) -> Self {
        Self {
            config,
            field_map,
            http: reqwest::Client::new(),
        }
    }

    /// HTTP Basic auth against the session endpoint; yields the session
    /// cookie the websocket handshake must carry.
    async fn authenticate(&self) -> Result<String, SourceError> {
        let connect_timeout = self.config.connect_timeout();
        let response = timeout(
            connect_timeout,
            self.http
                .get(self.config.session_url())
                .basic_auth(&self.config.username, Some(&self.config.password))
                .send(),
        )
        .await
        .map_err(|_| SourceError::Timeout(connect_timeout))??;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED
            || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(SourceError::AuthDenied {
                status: status.as_u16(),
            });
        }
        let response = response.error_for_status()?;

        session_cookie(response.headers()).ok_or(SourceError::MissingSessionCookie)
    }
}

#[async_trait]
impl DetectionSource for KismetSource {
    async fn connect(&mut self) -> Result<DetectionStream, SourceError> {
        let cookie = self.authenticate().await?;
        debug!("authenticated with detection feed");

        let mut request = self
            .config
            .monitor_url()
            .into_client_request()?;
        request.headers_mut().insert(
            http::header::COOKIE,
            http::HeaderValue::from_str(&format!("KISMET={cookie}"))
                .map_err(|_| SourceError::InvalidCookie)?,
        );

        let connect_timeout = self.config.connect_timeout();
        let (mut ws, _response) = timeout(connect_timeout, connect_async(request))
            .await
            .map_err(|_| SourceError::Timeout(connect_timeout))??;

        // One subscription naming the filtered field subset and poll rate.
        let subscription = self
            .field_map
            .subscription_request(self.config.rate)
            .to_string();
        ws.send(Message::Text(subscription.into())).await?;
        debug!("subscribed to device monitor");

        let stream = ws.filter_map(|message| async move {
            match message {
                Ok(Message::Text(text)) => Some(Ok(text.to_string())),
                // pings/pongs and the close handshake carry no detections
                Ok(_) => None,
                Err(e) => Some(Err(SourceError::WebSocket(e))),
            }
        });

        Ok(Box::pin(stream) as DetectionStream)
    }
}

fn session_cookie(headers: &http::HeaderMap) -> Option<String> {
    headers
        .get_all(http::header::SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find_map(|cookie| {
            let rest = cookie.strip_prefix("KISMET=")?;
            Some(rest.split(';').next().unwrap_or(rest).to_string())
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_cookie_is_extracted_from_set_cookie() {
        let mut headers = http::HeaderMap::new();
        headers.append(
            http::header::SET_COOKIE,
            "OTHER=nope; Path=/".parse().unwrap(),
        );
        headers.append(
            http::header::SET_COOKIE,
            "KISMET=abc123; Path=/; HttpOnly".parse().unwrap(),
        );

        assert_eq!(session_cookie(&headers).as_deref(), Some("abc123"));
    }

    #[test]
    fn missing_session_cookie_is_none() {
        let headers = http::HeaderMap::new();
        assert_eq!(session_cookie(&headers), None);
    }

    #[test]
    fn auth_denied_is_the_only_fatal_error() {
        assert!(SourceError::AuthDenied { status: 401 }.is_fatal());
        assert!(!SourceError::MissingSessionCookie.is_fatal());
        assert!(!SourceError::Timeout(Duration::from_secs(10)).is_fatal());
    }

    #[test]
    fn endpoint_urls_follow_the_configured_address() {
        let config = KismetConfig {
            host: "10.0.0.5".to_string(),
            port: 3501,
            ..Default::default()
        };
        assert_eq!(
            config.session_url(),
            "http://10.0.0.5:3501/session/check_session"
        );
        assert_eq!(config.monitor_url(), "ws://10.0.0.5:3501/devices/monitor.ws");
    }
}
