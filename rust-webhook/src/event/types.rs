//! Webhook event types for the Messaging API.
//!
//! Every field except `events` is optional on the wire. Absent or `null`
//! fields take their type's zero value and unknown fields are ignored.

use serde::{Deserialize, Deserializer};

// =============================================================================
// Batch and Event
// =============================================================================

/// One webhook delivery: the events in the order LINE sent them.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventBatch {
    /// User ID of the bot that should receive the events
    #[serde(default)]
    #[serde(deserialize_with = "null_as_default")]
    pub destination: String,
    /// Events in delivery order
    pub events: Vec<Event>,
}

/// A single webhook event.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Event {
    /// Token for replying to this event
    #[serde(deserialize_with = "null_as_default")]
    pub reply_token: String,
    /// Event type tag, e.g. `message`, `follow`, `postback`
    #[serde(rename = "type")]
    #[serde(deserialize_with = "null_as_default")]
    pub event_type: String,
    /// Who triggered the event
    #[serde(deserialize_with = "null_as_default")]
    pub source: Source,
    /// Milliseconds since the epoch
    #[serde(deserialize_with = "null_as_default")]
    pub timestamp: f64,
    /// Message payload, present on `message` events
    pub message: Option<Message>,
    /// `active` or `standby`
    #[serde(deserialize_with = "null_as_default")]
    pub mode: String,
    /// Unique delivery identifier
    #[serde(deserialize_with = "null_as_default")]
    pub webhook_event_id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub delivery_context: DeliveryContext,
}

impl Event {
    /// Message identifier, if the event carries one.
    pub fn message_id(&self) -> Option<&str> {
        self.message
            .as_ref()
            .map(Message::id)
            .filter(|id| !id.is_empty())
    }
}

/// Event source: a user, a group chat, or a multi-person room.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Source {
    /// `user`, `group` or `room`
    #[serde(rename = "type")]
    #[serde(deserialize_with = "null_as_default")]
    pub source_type: String,
    #[serde(deserialize_with = "null_as_default")]
    pub user_id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub group_id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub room_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeliveryContext {
    /// Whether this event was sent again after a failed delivery
    #[serde(deserialize_with = "null_as_default")]
    pub is_redelivery: bool,
}

// =============================================================================
// Message Payload
// =============================================================================

/// Message payload keyed by its `type` tag.
///
/// Only the fields meaningful for each kind are exposed. Tags this crate
/// does not know, or a missing tag, decode to [`Message::Unknown`].
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "RawMessage")]
pub enum Message {
    Text {
        id: String,
        text: String,
    },
    Image {
        id: String,
        content_provider: ContentProvider,
        image_set: Option<ImageSet>,
    },
    Video {
        id: String,
        /// Length in milliseconds
        duration: i64,
        content_provider: ContentProvider,
    },
    Audio {
        id: String,
        /// Length in milliseconds
        duration: i64,
        content_provider: ContentProvider,
    },
    File {
        id: String,
        file_name: String,
        /// Size in bytes
        file_size: i64,
    },
    Location {
        id: String,
        title: String,
        address: String,
        latitude: f64,
        longitude: f64,
    },
    Sticker {
        id: String,
        package_id: String,
        sticker_id: String,
        sticker_resource_type: String,
        keywords: Vec<String>,
    },
    Unknown {
        id: String,
        /// The tag as sent, empty when missing
        kind: String,
    },
}

impl Message {
    pub fn id(&self) -> &str {
        match self {
            Message::Text { id, .. }
            | Message::Image { id, .. }
            | Message::Video { id, .. }
            | Message::Audio { id, .. }
            | Message::File { id, .. }
            | Message::Location { id, .. }
            | Message::Sticker { id, .. }
            | Message::Unknown { id, .. } => id,
        }
    }

    /// The wire `type` tag of this message.
    pub fn kind(&self) -> &str {
        match self {
            Message::Text { .. } => "text",
            Message::Image { .. } => "image",
            Message::Video { .. } => "video",
            Message::Audio { .. } => "audio",
            Message::File { .. } => "file",
            Message::Location { .. } => "location",
            Message::Sticker { .. } => "sticker",
            Message::Unknown { kind, .. } => kind,
        }
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            Message::Text { text, .. } => Some(text.as_str()),
            _ => None,
        }
    }

    /// Where the binary content of this message lives, if it has any.
    pub fn content_source(&self) -> Option<&ContentProvider> {
        match self {
            Message::Image {
                content_provider, ..
            }
            | Message::Video {
                content_provider, ..
            }
            | Message::Audio {
                content_provider, ..
            } => Some(content_provider),
            _ => None,
        }
    }
}

/// Where media content is hosted.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContentProvider {
    /// `line` for platform-hosted content, `external` otherwise
    #[serde(rename = "type")]
    #[serde(deserialize_with = "null_as_default")]
    pub provider_type: String,
    #[serde(deserialize_with = "null_as_default")]
    pub original_content_url: String,
    #[serde(deserialize_with = "null_as_default")]
    pub preview_image_url: String,
}

impl ContentProvider {
    /// Whether the content can be downloaded from the content API.
    pub fn is_line_hosted(&self) -> bool {
        self.provider_type.is_empty() || self.provider_type == "line"
    }
}

/// Position of an image sent as part of a multi-image message.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ImageSet {
    #[serde(deserialize_with = "null_as_default")]
    pub id: String,
    /// 1-based position within the set
    #[serde(deserialize_with = "null_as_default")]
    pub index: f64,
    /// Number of images in the set
    #[serde(deserialize_with = "null_as_default")]
    pub total: f64,
}

// =============================================================================
// Wire Representation
// =============================================================================

/// Read a field that may be `null`, treating `null` like an absent field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Flat wire shape of a message; every field is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawMessage {
    #[serde(rename = "type")]
    #[serde(deserialize_with = "null_as_default")]
    kind: String,
    #[serde(deserialize_with = "null_as_default")]
    id: String,
    #[serde(deserialize_with = "null_as_default")]
    text: String,
    #[serde(deserialize_with = "null_as_default")]
    duration: i64,
    #[serde(deserialize_with = "null_as_default")]
    file_name: String,
    #[serde(deserialize_with = "null_as_default")]
    file_size: i64,
    #[serde(deserialize_with = "null_as_default")]
    title: String,
    #[serde(deserialize_with = "null_as_default")]
    address: String,
    #[serde(deserialize_with = "null_as_default")]
    latitude: f64,
    #[serde(deserialize_with = "null_as_default")]
    longitude: f64,
    #[serde(deserialize_with = "null_as_default")]
    package_id: String,
    #[serde(deserialize_with = "null_as_default")]
    sticker_id: String,
    #[serde(deserialize_with = "null_as_default")]
    sticker_resource_type: String,
    #[serde(deserialize_with = "null_as_default")]
    keywords: Vec<String>,
    image_set: Option<ImageSet>,
    #[serde(deserialize_with = "null_as_default")]
    content_provider: ContentProvider,
}

impl From<RawMessage> for Message {
    fn from(raw: RawMessage) -> Self {
        let RawMessage {
            kind,
            id,
            text,
            duration,
            file_name,
            file_size,
            title,
            address,
            latitude,
            longitude,
            package_id,
            sticker_id,
            sticker_resource_type,
            keywords,
            image_set,
            content_provider,
        } = raw;

        match kind.as_str() {
            "text" => Message::Text { id, text },
            "image" => Message::Image {
                id,
                content_provider,
                image_set,
            },
            "video" => Message::Video {
                id,
                duration,
                content_provider,
            },
            "audio" => Message::Audio {
                id,
                duration,
                content_provider,
            },
            "file" => Message::File {
                id,
                file_name,
                file_size,
            },
            "location" => Message::Location {
                id,
                title,
                address,
                latitude,
                longitude,
            },
            "sticker" => Message::Sticker {
                id,
                package_id,
                sticker_id,
                sticker_resource_type,
                keywords,
            },
            _ => Message::Unknown { id, kind },
        }
    }
}
