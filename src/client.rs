use crate::gateway::{ChatRequest, ImageRequest};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

// Decoded gateway bodies. Both success and error responses decode into the
// same shape; the controller picks the first usable field. Unknown fields
// (the image endpoint's disclaimer) are ignored.
#[derive(Deserialize, Debug, Default)]
pub struct ChatReply {
    #[serde(default)]
    pub response: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
pub struct ImageReply {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

// Trait defining the interface to the gateway endpoints.
#[async_trait]
pub trait GatewayClient: Send + Sync {
    async fn chat(&self, request: ChatRequest) -> Result<ChatReply>;
    async fn image(&self, request: ImageRequest) -> Result<ImageReply>;
}

pub struct HttpGatewayClient {
    client: Client,
    base_url: String,
    bearer_token: Option<String>,
}

impl HttpGatewayClient {
    pub fn new(base_url: impl Into<String>, bearer_token: Option<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            bearer_token,
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }

    // The gateway encodes its failures in the body, so the status code is
    // deliberately not checked here; only send/decode failures are errors.
    async fn post_json<Req, Reply>(&self, path: &str, request: &Req) -> Result<Reply>
    where
        Req: serde::Serialize + Sync,
        Reply: for<'de> Deserialize<'de>,
    {
        let url = self.endpoint(path);
        log::debug!("POST {}", url);

        let mut builder = self.client.post(&url).json(request);
        if let Some(token) = &self.bearer_token {
            builder = builder.bearer_auth(token);
        }

        let response = builder
            .send()
            .await
            .with_context(|| format!("Failed to reach gateway at {}", url))?;

        response
            .json::<Reply>()
            .await
            .context("Failed to decode gateway response")
    }
}

#[async_trait]
impl GatewayClient for HttpGatewayClient {
    async fn chat(&self, request: ChatRequest) -> Result<ChatReply> {
        self.post_json("gemini-chat", &request).await
    }

    async fn image(&self, request: ImageRequest) -> Result<ImageReply> {
        self.post_json("gemini-image", &request).await
    }
}
