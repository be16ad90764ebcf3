use crate::api::{GenerativeProvider, Part, ProviderError};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

// Substituted when a successful provider body carries no extractable text.
const CHAT_EXTRACTION_FALLBACK: &str = "I couldn't generate a response.";
const DESCRIPTION_FALLBACK: &str = "Unable to generate description.";

// Substituted when a provider error body carries no message of its own.
const CHAT_PROVIDER_FALLBACK: &str = "Failed to get response from Gemini";
const IMAGE_PROVIDER_FALLBACK: &str = "Failed to generate image description";

// Appended after a source image so the model describes a derived image
// instead of the input.
const EDIT_INSTRUCTION: &str =
    "Based on this image, generate a detailed description for creating a similar or modified image.";

// The image endpoint never returns pixel data; it is description-only.
pub const IMAGE_DISCLAIMER: &str = "Image generation simulated. In production, this would connect to an image generation API like DALL-E or Imagen.";

// --- Wire contract (shared with the client side) ---

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ChatResponse {
    pub response: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ImageRequest {
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_image: Option<String>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ImageResponse {
    pub description: String,
    pub message: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ErrorResponse {
    pub error: String,
}

// Shared state for the gateway handlers
#[derive(Clone)]
pub struct GatewayState {
    pub provider: Arc<dyn GenerativeProvider>,
}

/// Builds the gateway router: the two proxy endpoints behind permissive CORS.
pub fn router(provider: Arc<dyn GenerativeProvider>) -> Router {
    let state = GatewayState { provider };

    Router::new()
        .route("/gemini-chat", post(chat).options(preflight))
        .route("/gemini-image", post(image).options(preflight))
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

async fn preflight() -> StatusCode {
    StatusCode::OK
}

/// `POST /gemini-chat`: forwards a text (+ optional image) prompt.
async fn chat(State(state): State<GatewayState>, Json(request): Json<ChatRequest>) -> Response {
    let mut parts = vec![Part::text(request.message)];
    if let Some(image) = request.image {
        parts.push(Part::inline_jpeg(image));
    }

    match state.provider.generate_content(parts).await {
        Ok(response) => {
            let text = response
                .first_text()
                .unwrap_or(CHAT_EXTRACTION_FALLBACK)
                .to_string();
            Json(ChatResponse { response: text }).into_response()
        }
        Err(err) => provider_error_response(err, CHAT_PROVIDER_FALLBACK),
    }
}

/// `POST /gemini-image`: returns a generated description plus a fixed
/// disclaimer; no image synthesis is performed.
async fn image(State(state): State<GatewayState>, Json(request): Json<ImageRequest>) -> Response {
    let mut parts = vec![Part::text(request.prompt)];
    if let Some(source) = request.source_image {
        parts.push(Part::inline_jpeg(source));
        parts.push(Part::text(EDIT_INSTRUCTION));
    }

    match state.provider.generate_content(parts).await {
        Ok(response) => {
            let description = response
                .first_text()
                .unwrap_or(DESCRIPTION_FALLBACK)
                .to_string();
            Json(ImageResponse {
                description,
                message: IMAGE_DISCLAIMER.to_string(),
            })
            .into_response()
        }
        Err(err) => provider_error_response(err, IMAGE_PROVIDER_FALLBACK),
    }
}

fn provider_error_response(err: ProviderError, fallback: &str) -> Response {
    log::error!("Provider call failed: {}", err);
    let message = match err {
        ProviderError::Api { message, .. } => message.unwrap_or_else(|| fallback.to_string()),
        other => other.to_string(),
    };
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse { error: message }),
    )
        .into_response()
}
