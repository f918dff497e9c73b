//! Telegram Bot API client for outbound messages.
//!
//! One `sendMessage` POST per call, form-encoded, Markdown parse mode.
//! The bot token is part of the URL path and is never logged.

use super::{MessageSink, NotifyError};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info};

const PARSE_MODE: &str = "Markdown";

pub struct TelegramClient {
    api_url: String,
    bot_token: String,
    chat_id: String,
    client: reqwest::Client,
}

impl TelegramClient {
    pub fn new(
        api_url: String,
        bot_token: String,
        chat_id: String,
        timeout: Option<Duration>,
    ) -> Result<Self, NotifyError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            api_url: api_url.trim_end_matches('/').to_string(),
            bot_token,
            chat_id,
            client: builder.build()?,
        })
    }

    fn send_url(&self) -> String {
        format!("{}/bot{}/sendMessage", self.api_url, self.bot_token)
    }
}

#[async_trait]
impl MessageSink for TelegramClient {
    async fn send(&self, text: &str) -> Result<(), NotifyError> {
        let params = [
            ("chat_id", self.chat_id.as_str()),
            ("text", text),
            ("parse_mode", PARSE_MODE),
        ];

        let resp = self
            .client
            .post(self.send_url())
            .form(&params)
            .send()
            .await
            // reqwest errors carry the URL, which embeds the token.
            .map_err(|e| NotifyError::Request(e.without_url()))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(NotifyError::Api { status, body });
        }

        debug!(chat_id = %self.chat_id, "telegram accepted message");
        info!("message sent successfully");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    #[tokio::test]
    async fn test_send_posts_form() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/bot123:abc/sendMessage")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("chat_id".into(), "-1001".into()),
                Matcher::UrlEncoded("text".into(), "*hello* `world`".into()),
                Matcher::UrlEncoded("parse_mode".into(), "Markdown".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"ok":true,"result":{"message_id":1}}"#)
            .create_async()
            .await;

        let client = TelegramClient::new(
            format!("{}/", server.url()),
            "123:abc".to_string(),
            "-1001".to_string(),
            None,
        )
        .unwrap();
        client.send("*hello* `world`").await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_send_reports_api_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/bot123:abc/sendMessage")
            .with_status(400)
            .with_body(r#"{"ok":false,"error_code":400,"description":"Bad Request: chat not found"}"#)
            .create_async()
            .await;

        let client = TelegramClient::new(
            server.url(),
            "123:abc".to_string(),
            "-1001".to_string(),
            None,
        )
        .unwrap();
        match client.send("hi").await {
            Err(NotifyError::Api { status, body }) => {
                assert_eq!(status, 400);
                assert!(body.contains("chat not found"));
            }
            other => panic!("expected API error, got {:?}", other),
        }
    }
}
