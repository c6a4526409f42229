use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{ChatSummary, MessageReceipt, MessagingClient, SendError};
use crate::config::GatewayConfig;
use crate::session::ClientEvent;

#[derive(Debug, Serialize)]
struct SendRequest<'a> {
    to: &'a str,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    state: String,
    #[serde(default)]
    qr: Option<String>,
    #[serde(default)]
    reason: Option<String>,
}

impl StatusResponse {
    fn into_event(self) -> Result<ClientEvent, SendError> {
        match self.state.as_str() {
            "ready" => Ok(ClientEvent::Ready),
            "authenticated" => Ok(ClientEvent::Authenticated),
            "auth_failure" => Ok(ClientEvent::AuthFailure),
            "qr" => self
                .qr
                .map(ClientEvent::Qr)
                .ok_or_else(|| SendError::InvalidResponse("state 'qr' without code".into())),
            "disconnected" => Ok(ClientEvent::Disconnected(
                self.reason.unwrap_or_else(|| "unknown".to_string()),
            )),
            other => Err(SendError::InvalidResponse(format!("unknown state '{other}'"))),
        }
    }
}

/// HTTP client for a WhatsApp gateway process that owns the paired session.
pub struct GatewayClient {
    client: reqwest::Client,
    config: GatewayConfig,
}

impl GatewayClient {
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.api_key {
            Some(key) => request.header("Authorization", format!("Bearer {}", key)),
            None => request,
        }
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, SendError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SendError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl MessagingClient for GatewayClient {
    async fn send_message(&self, address: &str, text: &str) -> Result<MessageReceipt, SendError> {
        let url = self.url("messages");
        debug!("Sending message via gateway: {} -> {}", url, address);

        let response = self
            .authorize(self.client.post(&url))
            .json(&SendRequest { to: address, text })
            .send()
            .await
            .map_err(|e| SendError::Transport(e.to_string()))?;

        Self::check(response)
            .await?
            .json::<MessageReceipt>()
            .await
            .map_err(|e| SendError::InvalidResponse(e.to_string()))
    }

    async fn list_chats(&self) -> Result<Vec<ChatSummary>, SendError> {
        let response = self
            .authorize(self.client.get(self.url("chats")))
            .send()
            .await
            .map_err(|e| SendError::Transport(e.to_string()))?;

        Self::check(response)
            .await?
            .json::<Vec<ChatSummary>>()
            .await
            .map_err(|e| SendError::InvalidResponse(e.to_string()))
    }

    async fn connection_state(&self) -> Result<ClientEvent, SendError> {
        let response = self
            .authorize(self.client.get(self.url("status")))
            .send()
            .await
            .map_err(|e| SendError::Transport(e.to_string()))?;

        Self::check(response)
            .await?
            .json::<StatusResponse>()
            .await
            .map_err(|e| SendError::InvalidResponse(e.to_string()))?
            .into_event()
    }
}
