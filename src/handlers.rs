// HTTP handlers exposed to the chat page and other clients

use axum::extract::multipart::{Multipart, MultipartRejection};
use axum::extract::{DefaultBodyLimit, State};
use axum::response::Html;
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::cors::CorsLayer;
use uuid::Uuid;

use crate::api::InlineImage;
use crate::error::AppError;
use crate::models::{ExchangeRequest, ExchangeResponse, HealthResponse, ImagePayload};
use crate::state::AppState;

const INDEX_HTML: &str = include_str!("../assets/index.html");
const FALLBACK_MEDIA_TYPE: &str = "application/octet-stream";

pub const CHAT_ROUTE: &str = "/api/chat";

/// Builds the application router around an already constructed state.
pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route(CHAT_ROUTE, post(submit_exchange))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        model: state.model_name().to_string(),
    })
}

// Reads the first `prompt` and `image` parts. Later duplicates are skipped even
// when the first one was empty, and empty values count as absent.
async fn read_exchange_form(mut multipart: Multipart) -> Result<ExchangeRequest, AppError> {
    let mut prompt: Option<String> = None;
    let mut image: Option<ImagePayload> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::MalformedForm(e.to_string()))?
    {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some("prompt") if prompt.is_none() => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| AppError::MalformedForm(e.to_string()))?;
                prompt = Some(text);
            }
            Some("image") if image.is_none() => {
                let media_type = field
                    .content_type()
                    .filter(|ct| !ct.is_empty())
                    .unwrap_or(FALLBACK_MEDIA_TYPE)
                    .to_string();
                let file_name = field.file_name().unwrap_or_default().to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::MalformedForm(e.to_string()))?;
                image = Some(ImagePayload::new(bytes.to_vec(), media_type, file_name));
            }
            other => log::debug!("Skipping form field {:?}", other),
        }
    }

    let prompt = prompt.filter(|text| !text.is_empty());
    let image = image.filter(|payload| !payload.bytes.is_empty());

    match (prompt, image) {
        (Some(prompt), Some(image)) => Ok(ExchangeRequest { prompt, image }),
        (None, _) => Err(AppError::MissingField("prompt")),
        (_, None) => Err(AppError::MissingField("image")),
    }
}

// POST /api/chat: forwards one prompt + image to the model and relays its text
pub async fn submit_exchange(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<ExchangeResponse>, AppError> {
    let exchange_id = Uuid::new_v4();

    let multipart = multipart.map_err(|rejection| {
        log::warn!("[{}] Rejected non-multipart request: {}", exchange_id, rejection);
        AppError::MalformedForm(rejection.to_string())
    })?;

    let request = read_exchange_form(multipart).await.map_err(|e| {
        log::warn!("[{}] Invalid exchange form: {}", exchange_id, e);
        e
    })?;

    log::info!(
        "[{}] Exchange received: {} prompt chars, image {} ({}, {} bytes)",
        exchange_id,
        request.prompt.chars().count(),
        request.image.file_name,
        request.image.media_type,
        request.image.bytes.len()
    );

    let inline = InlineImage::from_bytes(&request.image.bytes, request.image.media_type.as_str());

    match state.api_provider.generate(&request.prompt, &inline).await {
        Ok(response) => {
            log::info!("[{}] Exchange completed ({} chars)", exchange_id, response.len());
            Ok(Json(ExchangeResponse { response }))
        }
        Err(e) => {
            log::error!("[{}] Error processing request: {:?}", exchange_id, e);
            Err(AppError::UpstreamFailure(e))
        }
    }
}
