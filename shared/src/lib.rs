use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::de::{Deserializer, Error as _};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

pub mod codec;

pub const MOVE_BUDGET: i32 = 6;
pub const MOVE_COOLDOWN_MS: u64 = 100;
pub const DEFAULT_GRID_WIDTH: u32 = 20;
pub const DEFAULT_GRID_HEIGHT: u32 = 20;
pub const SPAWN_POSITION: Position = Position { x: 0, y: 0 };
pub const GUEST_POSITION: Position = Position { x: -1, y: -1 };
pub const MAX_MESSAGE_BYTES: usize = 1 << 20;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn manhattan_distance(&self, other: &Position) -> i32 {
        (self.x - other.x).abs() + (self.y - other.y).abs()
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct GridSize {
    pub width: u32,
    pub height: u32,
}

impl GridSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// True if the position lies within `[0, width) x [0, height)`.
    pub fn contains(&self, position: &Position) -> bool {
        position.x >= 0
            && position.y >= 0
            && (position.x as u32) < self.width
            && (position.y as u32) < self.height
    }
}

impl Default for GridSize {
    fn default() -> Self {
        Self {
            width: DEFAULT_GRID_WIDTH,
            height: DEFAULT_GRID_HEIGHT,
        }
    }
}

/// Visual representation of a participant. Emoji tokens are unique across
/// the session; guests have no board presence at all.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum Appearance {
    Emoji(String),
    Image(String),
    Guest,
}

impl Appearance {
    pub fn is_guest(&self) -> bool {
        matches!(self, Appearance::Guest)
    }

    pub fn emoji_token(&self) -> Option<&str> {
        match self {
            Appearance::Emoji(token) => Some(token),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub name: String,
    pub appearance: Appearance,
    pub position: Position,
}

/// Codec output embedded in a wire event. Serialized as base64 so the
/// envelope stays plain JSON while the payload bytes remain opaque.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedPayload(pub Vec<u8>);

impl Serialize for EncodedPayload {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64.encode(&self.0))
    }
}

impl<'de> Deserialize<'de> for EncodedPayload {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        BASE64
            .decode(text.as_bytes())
            .map(EncodedPayload)
            .map_err(D::Error::custom)
    }
}

/// Client-to-server wire events, one JSON object per text frame.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ClientEvent {
    #[serde(rename_all = "camelCase")]
    PickUser {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        emoji: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        image: Option<String>,
    },
    JoinAsGuest,
    ChatMessage(String),
    Move(Position),
    #[serde(rename_all = "camelCase")]
    DmMove { user_id: u32, position: Position },
    UpdateGridSize(GridSize),
    ChangeBackgroundImage(String),
}

/// Server-to-client wire events. Structured payloads pass through the
/// payload codec; chat lines and error reasons are sent as plain strings.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerEvent {
    EmojiList(EncodedPayload),
    UsersUpdate(EncodedPayload),
    GridSizeUpdate(EncodedPayload),
    BackgroundImageUpdate(EncodedPayload),
    EmojiError(String),
    ChatMessage(String),
}
