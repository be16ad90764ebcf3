use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// Who authored a message.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    pub fn parse(s: &str) -> Option<Role> {
        match s {
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            _ => None,
        }
    }
}

// Which dispatch path produced (or will consume) a message.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum MessageType {
    Text,
    Image,
    ImageToImage,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Text => "text",
            MessageType::Image => "image",
            MessageType::ImageToImage => "image-to-image",
        }
    }

    pub fn parse(s: &str) -> Option<MessageType> {
        match s {
            "text" => Some(MessageType::Text),
            "image" => Some(MessageType::Image),
            "image-to-image" => Some(MessageType::ImageToImage),
            _ => None,
        }
    }
}

// Represents a single message in the conversation log. Messages are
// immutable once created; the log only grows.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Message {
    #[serde(default = "Uuid::new_v4")] // Generate a new UUID if missing during deserialization
    pub id: Uuid,
    pub role: Role,
    pub content: String,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    // Inline base64 image data attached to the message. The column/field
    // name is historical; it is never an actual URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub message_type: MessageType,
}

impl Message {
    /// Builds a user-authored message with a fresh id and current timestamp.
    pub fn user(content: String, image: Option<String>, message_type: MessageType) -> Self {
        Self {
            id: Uuid::new_v4(),
            role: Role::User,
            content,
            timestamp: Utc::now(),
            image_url: image,
            message_type,
        }
    }

    /// Builds an assistant reply with a fresh id and current timestamp.
    pub fn assistant(content: String, message_type: MessageType) -> Self {
        Self {
            id: Uuid::new_v4(),
            role: Role::Assistant,
            content,
            timestamp: Utc::now(),
            image_url: None,
            message_type,
        }
    }
}
