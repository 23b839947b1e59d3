//! Webhook delivery over HTTP(S).
//!
//! The transport for [`lookout_core::notify::NotificationDispatcher`]: one
//! request per dispatch, bearer auth when configured, and a JSON body for
//! methods that carry one. The endpoint's 2xx answer is the only definition
//! of delivered.

use std::time::Duration;

use lookout_core::config::NotifyConfig;
use lookout_core::notify::{Notification, Notifier, NotifyError};
use reqwest::Method;
use serde::Serialize;

/// Event name carried in the payload, fixed for this system's one trigger.
const EVENT_NAME: &str = "trigger-seen";

/// JSON body for non-GET deliveries.
#[derive(Debug, Serialize)]
struct WebhookPayload {
    event: &'static str,
    event_id: uuid::Uuid,
    fired_at: chrono::DateTime<chrono::Utc>,
}

/// [`Notifier`] over an HTTP webhook endpoint.
#[derive(Debug)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    config: NotifyConfig,
}

impl WebhookNotifier {
    /// Build the transport for `config`. The request ceiling applies to the
    /// whole exchange, connect included.
    ///
    /// # Errors
    ///
    /// [`NotifyError::BuildRequest`] when the HTTP client cannot be
    /// constructed.
    pub fn new(config: NotifyConfig) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|err| NotifyError::BuildRequest {
                message: err.to_string(),
            })?;
        Ok(Self { client, config })
    }
}

impl Notifier for WebhookNotifier {
    async fn notify(&mut self, notice: &Notification) -> Result<(), NotifyError> {
        let method = Method::from_bytes(self.config.method.as_bytes()).map_err(|err| {
            NotifyError::BuildRequest {
                message: format!("method '{}': {err}", self.config.method),
            }
        })?;

        let mut request = self
            .client
            .request(method.clone(), self.config.url.clone());
        if let Some(token) = &self.config.bearer_token {
            request = request.bearer_auth(token);
        }
        if method != Method::GET {
            request = request.json(&WebhookPayload {
                event: EVENT_NAME,
                event_id: notice.event_id,
                fired_at: notice.fired_at,
            });
        }

        let response = request.send().await.map_err(|err| {
            if err.is_timeout() {
                NotifyError::Timeout {
                    seconds: self.config.timeout_secs,
                }
            } else {
                NotifyError::Transport {
                    message: err.to_string(),
                }
            }
        })?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(NotifyError::Rejected {
                status: status.as_u16(),
            })
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::net::SocketAddr;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    /// Accept one connection, read one full request, answer with `response`,
    /// and hand the raw request back.
    async fn serve_once(response: &'static str) -> (SocketAddr, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 1024];
            loop {
                let n = stream.read(&mut chunk).await.unwrap();
                buf.extend_from_slice(&chunk[..n]);
                if request_complete(&buf) || n == 0 {
                    break;
                }
            }
            stream.write_all(response.as_bytes()).await.unwrap();
            stream.flush().await.unwrap();
            String::from_utf8(buf).unwrap()
        });
        (addr, handle)
    }

    fn request_complete(buf: &[u8]) -> bool {
        let Some(split) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
            return false;
        };
        let head = String::from_utf8_lossy(&buf[..split]);
        let content_length = head
            .lines()
            .find_map(|line| {
                let (name, value) = line.split_once(':')?;
                name.eq_ignore_ascii_case("content-length")
                    .then(|| value.trim().parse::<usize>().ok())?
            })
            .unwrap_or(0);
        buf.len() - (split + 4) >= content_length
    }

    fn config(addr: SocketAddr, method: &str, bearer_token: Option<&str>) -> NotifyConfig {
        NotifyConfig {
            url: format!("http://{addr}/hook").parse().unwrap(),
            method: method.to_string(),
            bearer_token: bearer_token.map(String::from),
            timeout_secs: 5,
        }
    }

    const NO_CONTENT: &str =
        "HTTP/1.1 204 No Content\r\ncontent-length: 0\r\nconnection: close\r\n\r\n";

    #[tokio::test]
    async fn test_post_delivery_with_bearer_and_payload() {
        let (addr, handle) = serve_once(NO_CONTENT).await;
        let mut notifier = WebhookNotifier::new(config(addr, "POST", Some("s3cr3t"))).unwrap();
        let notice = Notification::stamp();

        notifier.notify(&notice).await.unwrap();

        let request = handle.await.unwrap();
        assert!(request.starts_with("POST /hook HTTP/1.1\r\n"));
        let lower = request.to_lowercase();
        assert!(lower.contains("authorization: bearer s3cr3t"));
        assert!(lower.contains("content-type: application/json"));

        let body = &request[request.find("\r\n\r\n").unwrap() + 4..];
        let payload: serde_json::Value = serde_json::from_str(body).unwrap();
        assert_eq!(payload["event"], "trigger-seen");
        assert_eq!(payload["event_id"], notice.event_id.to_string());
        assert!(payload["fired_at"].is_string());
    }

    #[tokio::test]
    async fn test_get_delivery_has_no_body() {
        let (addr, handle) = serve_once(NO_CONTENT).await;
        let mut notifier = WebhookNotifier::new(config(addr, "GET", None)).unwrap();

        notifier.notify(&Notification::stamp()).await.unwrap();

        let request = handle.await.unwrap();
        assert!(request.starts_with("GET /hook HTTP/1.1\r\n"));
        let lower = request.to_lowercase();
        assert!(!lower.contains("content-type: application/json"));
        assert!(!lower.contains("authorization:"));
    }

    #[tokio::test]
    async fn test_server_error_surfaces_as_rejected() {
        let (addr, handle) = serve_once(
            "HTTP/1.1 503 Service Unavailable\r\ncontent-length: 0\r\nconnection: close\r\n\r\n",
        )
        .await;
        let mut notifier = WebhookNotifier::new(config(addr, "POST", None)).unwrap();

        let err = notifier.notify(&Notification::stamp()).await.unwrap_err();
        assert_eq!(err, NotifyError::Rejected { status: 503 });
        handle.await.unwrap();
    }
}
