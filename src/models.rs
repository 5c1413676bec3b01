use chrono::Utc;
use serde::{Deserialize, Serialize};

// Fixed bodies returned by the exchange endpoint
pub const MISSING_FIELD_ERROR: &str = "Image and prompt are required";
pub const MALFORMED_FORM_ERROR: &str = "Invalid multipart form data";
pub const UPSTREAM_FAILURE_ERROR: &str = "Failed to process the request";

// Shown to the user in place of any failed exchange
pub const APOLOGY_TEXT: &str = "Sorry, there was an error processing your request. Please try again.";

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Bot,
}

// Creation-time derived id, strictly increasing within one session
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(transparent)]
pub struct MessageId(pub i64);

impl MessageId {
    /// Returns an id derived from the current time that is strictly greater than `last`.
    pub fn next_after(last: Option<MessageId>) -> Self {
        let now = Utc::now().timestamp_millis();
        match last {
            Some(MessageId(prev)) if prev >= now => MessageId(prev + 1),
            _ => MessageId(now),
        }
    }
}

// Represents a single message in the chat log
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Message {
    pub id: MessageId,
    pub role: Role,
    pub text: String,
    // Data URL preview, only on user messages that carried an upload
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

// Raw image bytes plus what the sender declared about them
#[derive(Clone, Debug, PartialEq)]
pub struct ImagePayload {
    pub bytes: Vec<u8>,
    pub media_type: String,
    pub file_name: String,
}

impl ImagePayload {
    pub fn new(bytes: Vec<u8>, media_type: impl Into<String>, file_name: impl Into<String>) -> Self {
        Self {
            bytes,
            media_type: media_type.into(),
            file_name: file_name.into(),
        }
    }

    pub fn is_image(&self) -> bool {
        self.media_type.starts_with("image/")
    }

    /// `data:` URL used for previews.
    pub fn data_url(&self) -> String {
        use base64::Engine as _;
        let encoded = base64::engine::general_purpose::STANDARD.encode(&self.bytes);
        format!("data:{};base64,{}", self.media_type, encoded)
    }
}

// One submission: prompt plus the image it is about
#[derive(Clone, Debug, PartialEq)]
pub struct ExchangeRequest {
    pub prompt: String,
    pub image: ImagePayload,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ExchangeResponse {
    pub response: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct HealthResponse {
    pub status: String,
    pub model: String,
}
