//! Sample fish definitions shared by tests.

use pond::{Fish, FishId};
use serde::{Deserialize, Serialize};

pub const CHAT_ROOM: &str = "com.example.chatRoom";
pub const CHANNEL_LIST: &str = "com.example.channelList";
pub const GOOD: &str = "ax.goodFish";
pub const GOOD_REGISTRY: &str = "ax.goodFish.registry";

/// Commands accepted by a chat room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ChatCommand {
    PostMessage { sender: String, message: String },
}

/// A chat room: its state is the list of rendered messages, newest first.
pub fn chat_room(channel: &str) -> Fish<Vec<String>, ChatCommand> {
    Fish::new(FishId::of(CHAT_ROOM, channel, 0), Vec::new())
}

/// Registry of known chat channels.
pub fn channel_list() -> Fish<Vec<String>, ()> {
    Fish::new(FishId::of(CHANNEL_LIST, "channels", 0), Vec::new())
}

/// State of a tracked good.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum GoodState {
    Unknown,
    Set { pos: String },
    Deleted {
        #[serde(rename = "lastPos")]
        last_pos: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum GoodCommand {
    MoveTo { pos: String },
    Delete,
}

pub fn good(name: &str) -> Fish<GoodState, GoodCommand> {
    Fish::new(FishId::of(GOOD, name, 0), GoodState::Unknown)
}

/// Registry state of goods, keyed by name with the last known position.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GoodRegistryState {
    pub goods: Vec<(String, String)>,
}

pub fn good_registry() -> Fish<GoodRegistryState, ()> {
    Fish::new(FishId::of(GOOD_REGISTRY, "reg", 0), GoodRegistryState::default())
}
