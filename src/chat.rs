//! Client-side chat surface: the in-memory message log, image staging and the
//! single-exchange state machine
//! (`Idle -> Staged -> Submitting -> Idle`).
//!
//! Image loads are two-phase. Each load is stamped with a sequence number when
//! it starts, and a completion is only accepted if no newer load (or a
//! submission) started in the meantime, so overlapping picker, drop and paste
//! events cannot leave a stale preview behind.

use std::path::Path;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use thiserror::Error;

use crate::handlers::CHAT_ROUTE;
use crate::models::{
    ErrorBody, ExchangeRequest, ExchangeResponse, ImagePayload, Message, MessageId, Role, APOLOGY_TEXT,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImageSource {
    FilePicker,
    DragDrop,
    Clipboard,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExchangePhase {
    Idle,
    Staged,
    Submitting,
}

/// Handed out when an image load starts; redeemed when the bytes are ready.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImageLoadTicket {
    seq: u64,
    source: ImageSource,
}

impl ImageLoadTicket {
    pub fn source(&self) -> ImageSource {
        self.source
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct StagedImage {
    pub payload: ImagePayload,
    pub preview: String,
    pub source: ImageSource,
}

#[derive(Error, Debug)]
pub enum ExchangeError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("server returned {status}: {message}")]
    Server { status: u16, message: String },

    #[error("unexpected response body: {0}")]
    Decode(String),
}

/// An exchange that has been submitted but not settled. Consumed by
/// [`ChatSession::settle`], so each exchange settles exactly once.
#[must_use]
#[derive(Debug)]
pub struct PendingExchange {
    request: ExchangeRequest,
    user_message_id: MessageId,
}

impl PendingExchange {
    pub fn request(&self) -> &ExchangeRequest {
        &self.request
    }

    pub fn user_message_id(&self) -> MessageId {
        self.user_message_id
    }
}

// Anything that can carry one exchange to the server
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    async fn send(&self, request: &ExchangeRequest) -> Result<String, ExchangeError>;
}

pub struct HttpExchangeClient {
    client: Client,
    endpoint: String,
}

impl HttpExchangeClient {
    /// `server` is the base URL, e.g. `http://127.0.0.1:3000`.
    pub fn new(server: &str) -> Self {
        Self {
            client: Client::new(),
            endpoint: format!("{}{}", server.trim_end_matches('/'), CHAT_ROUTE),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl ExchangeClient for HttpExchangeClient {
    async fn send(&self, request: &ExchangeRequest) -> Result<String, ExchangeError> {
        let file_name = if request.image.file_name.is_empty() {
            "image".to_string()
        } else {
            request.image.file_name.clone()
        };
        let part = Part::bytes(request.image.bytes.clone())
            .file_name(file_name)
            .mime_str(&request.image.media_type)?;
        let form = Form::new()
            .text("prompt", request.prompt.clone())
            .part("image", part);

        log::debug!("Posting exchange to {}", self.endpoint);
        let response = self.client.post(&self.endpoint).multipart(form).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if status.is_success() {
            serde_json::from_str::<ExchangeResponse>(&body)
                .map(|parsed| parsed.response)
                .map_err(|e| ExchangeError::Decode(e.to_string()))
        } else {
            let message = serde_json::from_str::<ErrorBody>(&body)
                .map(|parsed| parsed.error)
                .unwrap_or(body);
            Err(ExchangeError::Server {
                status: status.as_u16(),
                message,
            })
        }
    }
}

/// Media type for an image file, judged by its extension.
pub fn media_type_for_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "heic" => "image/heic",
        "heif" => "image/heif",
        "svg" => "image/svg+xml",
        _ => "application/octet-stream",
    }
}

/// Reads an image from disk the way the file picker would hand it over.
pub async fn load_image_file(path: &Path) -> anyhow::Result<ImagePayload> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read image file {}", path.display()))?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok(ImagePayload::new(bytes, media_type_for_path(path), file_name))
}

#[derive(Debug, Default)]
pub struct ChatSession {
    messages: Vec<Message>,
    prompt: String,
    staged: Option<StagedImage>,
    loading: bool,
    load_seq: u64,
}

impl ChatSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn staged_image(&self) -> Option<&StagedImage> {
        self.staged.as_ref()
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn phase(&self) -> ExchangePhase {
        if self.loading {
            ExchangePhase::Submitting
        } else if self.staged.is_some() {
            ExchangePhase::Staged
        } else {
            ExchangePhase::Idle
        }
    }

    /// Ignored while an exchange is in flight.
    pub fn set_prompt(&mut self, prompt: impl Into<String>) {
        if !self.loading {
            self.prompt = prompt.into();
        }
    }

    pub fn can_submit(&self) -> bool {
        !self.loading && self.staged.is_some() && !self.prompt.trim().is_empty()
    }

    // --- Image staging ---

    /// Starts an image load. Returns `None` while an exchange is in flight.
    pub fn begin_image_load(&mut self, source: ImageSource) -> Option<ImageLoadTicket> {
        if self.loading {
            return None;
        }
        self.load_seq += 1;
        Some(ImageLoadTicket {
            seq: self.load_seq,
            source,
        })
    }

    /// Stages the loaded image unless a newer load or a submission started
    /// after `ticket` was issued. Returns whether the image was staged.
    pub fn complete_image_load(&mut self, ticket: ImageLoadTicket, image: ImagePayload) -> bool {
        if self.loading || ticket.seq != self.load_seq {
            log::debug!(
                "Discarding stale {:?} image load (#{}, latest #{})",
                ticket.source,
                ticket.seq,
                self.load_seq
            );
            return false;
        }
        let preview = image.data_url();
        self.staged = Some(StagedImage {
            payload: image,
            preview,
            source: ticket.source,
        });
        true
    }

    pub fn stage_image(&mut self, source: ImageSource, image: ImagePayload) -> bool {
        match self.begin_image_load(source) {
            Some(ticket) => self.complete_image_load(ticket, image),
            None => false,
        }
    }

    /// First image among the dropped files wins.
    pub fn stage_dropped<I>(&mut self, files: I) -> bool
    where
        I: IntoIterator<Item = ImagePayload>,
    {
        match files.into_iter().find(ImagePayload::is_image) {
            Some(image) => self.stage_image(ImageSource::DragDrop, image),
            None => false,
        }
    }

    /// First image item in the clipboard wins; other items are ignored.
    pub fn stage_from_clipboard<I>(&mut self, items: I) -> bool
    where
        I: IntoIterator<Item = ImagePayload>,
    {
        match items.into_iter().find(ImagePayload::is_image) {
            Some(image) => self.stage_image(ImageSource::Clipboard, image),
            None => false,
        }
    }

    /// Discards the staged image and any load still in progress.
    pub fn clear_image(&mut self) {
        if self.loading {
            return;
        }
        self.load_seq += 1;
        self.staged = None;
    }

    // --- Exchange ---

    fn push_message(&mut self, role: Role, text: String, image: Option<String>) -> &Message {
        let id = MessageId::next_after(self.messages.last().map(|m| m.id));
        let index = self.messages.len();
        self.messages.push(Message { id, role, text, image });
        &self.messages[index]
    }

    /// Appends the user message and enters `Submitting`. No-op (returns
    /// `None`) unless a prompt and an image are present and nothing is in flight.
    pub fn begin_submit(&mut self) -> Option<PendingExchange> {
        if !self.can_submit() {
            return None;
        }
        let staged = self.staged.as_ref()?;
        let request = ExchangeRequest {
            prompt: self.prompt.clone(),
            image: staged.payload.clone(),
        };
        let preview = Some(staged.preview.clone());

        let user_message_id = self.push_message(Role::User, request.prompt.clone(), preview).id;
        self.loading = true;
        // Loads started before submission must not land on the next exchange
        self.load_seq += 1;

        Some(PendingExchange {
            request,
            user_message_id,
        })
    }

    /// Appends exactly one bot message for `pending` and returns to `Idle`.
    pub fn settle(&mut self, pending: PendingExchange, outcome: Result<String, ExchangeError>) -> &Message {
        let text = match outcome {
            Ok(text) => text,
            Err(e) => {
                log::error!("Exchange for message {:?} failed: {}", pending.user_message_id, e);
                APOLOGY_TEXT.to_string()
            }
        };
        self.loading = false;
        self.prompt.clear();
        self.staged = None;
        self.push_message(Role::Bot, text, None)
    }

    /// Runs one full exchange through `client`. Returns the bot message, or
    /// `None` when the submission guard refused.
    pub async fn submit(&mut self, client: &dyn ExchangeClient) -> Option<&Message> {
        let pending = self.begin_submit()?;
        let outcome = client.send(pending.request()).await;
        Some(self.settle(pending, outcome))
    }
}
