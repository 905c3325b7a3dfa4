use crate::config::BubbleServiceConfig;
use crate::error::PipelineError;
use anyhow::Context;
use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use serde::Serialize;
use serde_json::{Value, json};
use std::time::Duration;

/// One suggested reply. `id` is its position in the result set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplySuggestion {
    pub id: usize,
    pub text: String,
}

impl ReplySuggestion {
    pub fn from_texts<I, S>(texts: I) -> Vec<ReplySuggestion>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        texts
            .into_iter()
            .enumerate()
            .map(|(id, text)| ReplySuggestion {
                id,
                text: text.into(),
            })
            .collect()
    }
}

#[async_trait]
pub trait ReplyFetcher: Send + Sync {
    async fn fetch(
        &self,
        text: &str,
        config: &BubbleServiceConfig,
    ) -> Result<Vec<ReplySuggestion>, PipelineError>;
}

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Calls the remote reply-generation function over HTTPS. No retries.
#[derive(Debug, Clone)]
pub struct HttpReplyClient {
    client: Client,
}

impl HttpReplyClient {
    pub fn new() -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed to build reply service HTTP client")?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ReplyFetcher for HttpReplyClient {
    async fn fetch(
        &self,
        text: &str,
        config: &BubbleServiceConfig,
    ) -> Result<Vec<ReplySuggestion>, PipelineError> {
        let (Some(url), Some(credential), true) = (
            config.replies_url(),
            config.credential.as_deref(),
            config.is_configured(),
        ) else {
            return Err(PipelineError::NotConfigured);
        };

        let body = json!({ "text": text, "tone": config.tone.as_str() });
        let response = self
            .client
            .post(&url)
            .bearer_auth(credential.trim())
            .json(&body)
            .send()
            .await
            .map_err(|err| PipelineError::Network(err.to_string()))?;

        let status = response.status();
        let payload = response
            .text()
            .await
            .map_err(|err| PipelineError::Network(err.to_string()))?;
        debug!("reply service answered {status} ({} bytes)", payload.len());

        if !status.is_success() {
            return Err(server_error(status.as_u16(), &payload));
        }
        parse_replies(&payload)
    }
}

/// Prefers the server's `{error}` message, falling back to the status code.
fn server_error(status: u16, payload: &str) -> PipelineError {
    let message = serde_json::from_str::<Value>(payload)
        .ok()
        .and_then(|value| {
            value
                .get("error")
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|message| !message.is_empty())
                .map(ToOwned::to_owned)
        })
        .unwrap_or_else(|| format!("reply service error: HTTP {status}"));
    PipelineError::Server { status, message }
}

fn parse_replies(payload: &str) -> Result<Vec<ReplySuggestion>, PipelineError> {
    let value: Value = serde_json::from_str(payload)
        .map_err(|err| PipelineError::MalformedResponse(err.to_string()))?;
    let replies = value
        .get("replies")
        .and_then(Value::as_array)
        .ok_or_else(|| PipelineError::MalformedResponse("missing replies array".to_string()))?;

    let texts = replies
        .iter()
        .map(|reply| {
            reply.as_str().map(ToOwned::to_owned).ok_or_else(|| {
                PipelineError::MalformedResponse(format!("reply is not a string: {reply}"))
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ReplySuggestion::from_texts(texts))
}

#[cfg(test)]
mod tests {
    use super::{HttpReplyClient, ReplyFetcher, ReplySuggestion, parse_replies, server_error};
    use crate::config::{BubbleServiceConfig, Tone};
    use crate::error::PipelineError;
    use serde_json::{Value, json};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    /// Serves a single HTTP response and hands back the raw request.
    async fn serve_once(status: &str, body: &str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let base = format!("http://{}", listener.local_addr().expect("addr"));
        let response = format!(
            "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.expect("accept");
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let read = socket.read(&mut buf).await.expect("read");
                if read == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..read]);
                let text = String::from_utf8_lossy(&request).to_string();
                if let Some(split) = text.find("\r\n\r\n") {
                    let length = text[..split]
                        .lines()
                        .find_map(|line| {
                            let lower = line.to_ascii_lowercase();
                            lower
                                .strip_prefix("content-length:")
                                .and_then(|value| value.trim().parse::<usize>().ok())
                        })
                        .unwrap_or(0);
                    if request.len() >= split + 4 + length {
                        break;
                    }
                }
            }
            socket
                .write_all(response.as_bytes())
                .await
                .expect("write");
            socket.shutdown().await.ok();
            String::from_utf8_lossy(&request).to_string()
        });
        (base, handle)
    }

    fn config(base: &str) -> BubbleServiceConfig {
        BubbleServiceConfig::new(base, "anon-key", Tone::Friendly)
    }

    #[tokio::test]
    async fn posts_text_and_tone_with_bearer_credential() {
        let (base, server) = serve_once(
            "200 OK",
            r#"{"replies":["Yeah, free after 5!","Not today, how about Thu?","What time were you thinking?"]}"#,
        )
        .await;

        let replies = HttpReplyClient::new()
            .expect("client")
            .fetch("Hey are you free tomorrow?", &config(&base))
            .await
            .expect("replies");
        assert_eq!(
            replies,
            ReplySuggestion::from_texts([
                "Yeah, free after 5!",
                "Not today, how about Thu?",
                "What time were you thinking?"
            ])
        );

        let request = server.await.expect("server");
        let (head, body) = request.split_once("\r\n\r\n").expect("request body");
        let head = head.to_ascii_lowercase();
        assert!(head.starts_with("post /functions/v1/generate-replies "));
        assert!(head.contains("authorization: bearer anon-key"));
        assert!(head.contains("content-type: application/json"));
        let body: Value = serde_json::from_str(body).expect("json body");
        assert_eq!(
            body,
            json!({"text": "Hey are you free tomorrow?", "tone": "friendly"})
        );
    }

    #[tokio::test]
    async fn server_error_message_is_preferred() {
        let (base, _server) = serve_once(
            "429 Too Many Requests",
            r#"{"error":"Monthly scan limit of 50 reached."}"#,
        )
        .await;

        let err = HttpReplyClient::new()
            .expect("client")
            .fetch("hi", &config(&base))
            .await
            .expect_err("limit reached");
        assert_eq!(
            err,
            PipelineError::Server {
                status: 429,
                message: "Monthly scan limit of 50 reached.".to_string()
            }
        );
        assert_eq!(err.to_string(), "Monthly scan limit of 50 reached.");
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_a_network_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        let base = format!("http://{}", listener.local_addr().expect("addr"));
        drop(listener);

        let err = HttpReplyClient::new()
            .expect("client")
            .fetch("hi", &config(&base))
            .await
            .expect_err("connection refused");
        assert!(matches!(err, PipelineError::Network(_)));
    }

    #[tokio::test]
    async fn unconfigured_client_makes_no_request() {
        let err = HttpReplyClient::new()
            .expect("client")
            .fetch("hi", &BubbleServiceConfig::default())
            .await
            .expect_err("not configured");
        assert_eq!(err, PipelineError::NotConfigured);
    }

    #[test]
    fn status_code_is_the_fallback_message() {
        assert_eq!(
            server_error(502, "<html>bad gateway</html>").to_string(),
            "reply service error: HTTP 502"
        );
        assert_eq!(
            server_error(500, r#"{"error":"  "}"#).to_string(),
            "reply service error: HTTP 500"
        );
    }

    #[test]
    fn tolerates_any_number_of_replies() {
        assert_eq!(parse_replies(r#"{"replies":[]}"#), Ok(Vec::new()));
        let five = parse_replies(r#"{"replies":["a","b","c","d","e"]}"#).expect("five");
        assert_eq!(five.len(), 5);
        assert_eq!(five[4], ReplySuggestion { id: 4, text: "e".to_string() });
    }

    #[test]
    fn malformed_payloads_are_rejected() {
        assert!(matches!(
            parse_replies("not json"),
            Err(PipelineError::MalformedResponse(_))
        ));
        assert!(matches!(
            parse_replies(r#"{"answers":[]}"#),
            Err(PipelineError::MalformedResponse(_))
        ));
        assert!(matches!(
            parse_replies(r#"{"replies":["ok", 3]}"#),
            Err(PipelineError::MalformedResponse(_))
        ));
    }
}
