use async_trait::async_trait;
use reqwest::{Client, header};
use serde::{Deserialize, Serialize};

use super::{MailSender, SendReceipt, SenderError, validate_recipients};
use crate::notifications::models::RenderedMessage;

/// Sends mail through a JSON HTTP provider API (`POST` with a bearer key).
pub struct HttpMailSender {
    client: Client,
    endpoint: String,
    api_key: String,
    from: String,
}

#[derive(Serialize)]
struct OutgoingMail<'a> {
    from: &'a str,
    to: &'a [String],
    subject: &'a str,
    text: &'a str,
}

#[derive(Deserialize)]
struct ProviderResponse {
    id: Option<String>,
}

impl HttpMailSender {
    pub fn new(endpoint: &str, api_key: &str, from: &str) -> Result<Self, SenderError> {
        if endpoint.is_empty() {
            return Err(SenderError::InvalidConfiguration(
                "mail provider URL is empty".to_string(),
            ));
        }
        validate_recipients(&[from.to_string()])
            .map_err(|_| SenderError::InvalidConfiguration(format!("invalid sender address: {from}")))?;
        Ok(Self {
            client: Client::new(),
            endpoint: endpoint.to_string(),
            api_key: api_key.to_string(),
            from: from.to_string(),
        })
    }
}

#[async_trait]
impl MailSender for HttpMailSender {
    async fn send(
        &self,
        recipients: &[String],
        message: &RenderedMessage,
    ) -> Result<SendReceipt, SenderError> {
        validate_recipients(recipients)?;

        let payload = OutgoingMail {
            from: &self.from,
            to: recipients,
            subject: &message.subject,
            text: &message.text_body,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header(header::AUTHORIZATION, format!("Bearer {}", self.api_key))
            .json(&payload)
            .send()
            .await?;
        let status = response.status();

        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            return Err(SenderError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        // Providers that answer without a JSON id still accepted the message.
        let message_id = response
            .json::<ProviderResponse>()
            .await
            .ok()
            .and_then(|r| r.id);
        Ok(SendReceipt { message_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        Json, Router,
        http::{HeaderMap, StatusCode},
        routing::post,
    };
    use serde_json::{Value, json};

    async fn spawn_provider(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}/emails")
    }

    fn message() -> RenderedMessage {
        RenderedMessage {
            subject: "[Lease reminder] vm expires in 3 days".to_string(),
            text_body: "Hello,".to_string(),
        }
    }

    #[tokio::test]
    async fn test_send_posts_json_with_bearer_key() {
        async fn accept(headers: HeaderMap, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
            let authorized = headers
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                == Some("Bearer key-123");
            if !authorized || body["to"] != json!(["owner@example.com"]) || body["from"] != "noreply@example.com" {
                return (StatusCode::BAD_REQUEST, Json(json!({ "error": "unexpected request" })));
            }
            (StatusCode::OK, Json(json!({ "id": "msg-1" })))
        }
        let url = spawn_provider(Router::new().route("/emails", post(accept))).await;
        let sender = HttpMailSender::new(&url, "key-123", "noreply@example.com").unwrap();

        let receipt = sender
            .send(&["owner@example.com".to_string()], &message())
            .await
            .unwrap();
        assert_eq!(receipt.message_id.as_deref(), Some("msg-1"));
    }

    #[tokio::test]
    async fn test_non_success_status_is_rejection() {
        async fn reject() -> (StatusCode, &'static str) {
            (StatusCode::UNPROCESSABLE_ENTITY, "domain not verified")
        }
        let url = spawn_provider(Router::new().route("/emails", post(reject))).await;
        let sender = HttpMailSender::new(&url, "key", "noreply@example.com").unwrap();

        let err = sender
            .send(&["owner@example.com".to_string()], &message())
            .await
            .unwrap_err();
        match err {
            SenderError::Rejected { status, body } => {
                assert_eq!(status, 422);
                assert_eq!(body, "domain not verified");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_invalid_recipient_never_reaches_provider() {
        let sender = HttpMailSender::new("http://127.0.0.1:9/emails", "key", "noreply@example.com").unwrap();
        let err = sender.send(&["not-an-address".to_string()], &message()).await.unwrap_err();
        assert!(matches!(err, SenderError::InvalidRecipient(_)));
    }

    #[test]
    fn test_new_rejects_bad_configuration() {
        assert!(HttpMailSender::new("", "key", "noreply@example.com").is_err());
        assert!(HttpMailSender::new("http://mail", "key", "noreply").is_err());
    }
}
