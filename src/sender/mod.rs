//! Sender capability: resolve a chat channel by id and post to it.
//!
//! The delivery engine only sees the [`Sender`] trait. [`DiscordSender`] is
//! the REST implementation used by the binary.

mod discord;

use async_trait::async_trait;
use thiserror::Error;

use crate::present::RenderedMessage;

pub use discord::{DiscordSender, DEFAULT_API_BASE};

/// A resolved channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    pub id: String,
    pub kind: ChannelKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    Text,
    Announcement,
    /// Any other platform channel type (voice, category, forum, ...)
    Other(u8),
}

impl ChannelKind {
    pub fn from_type_code(code: u8) -> Self {
        match code {
            0 => ChannelKind::Text,
            5 => ChannelKind::Announcement,
            other => ChannelKind::Other(other),
        }
    }
}

impl Channel {
    /// True if messages can be posted to this channel.
    pub fn is_sendable(&self) -> bool {
        matches!(self.kind, ChannelKind::Text | ChannelKind::Announcement)
    }
}

#[derive(Debug, Error)]
pub enum SendError {
    /// The channel no longer exists; its subscription should be removed
    #[error("Channel {channel_id} no longer exists")]
    Gone { channel_id: String },

    #[error("Channel {channel_id} cannot receive messages ({kind:?})")]
    NotSendable {
        channel_id: String,
        kind: ChannelKind,
    },

    #[error("Invalid channel id '{0}'")]
    InvalidChannelId(String),

    /// Platform rejected the request
    #[error("API error: status {status}{}: {message}", .code.map(|c| format!(" (code {c})")).unwrap_or_default())]
    Api {
        status: u16,
        code: Option<u64>,
        message: String,
    },

    #[error("Rate limited by chat platform")]
    RateLimited,

    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
}

impl SendError {
    /// "Target no longer exists": the only failure that triggers cleanup.
    pub fn is_gone(&self) -> bool {
        matches!(self, SendError::Gone { .. })
    }
}

#[async_trait]
pub trait Sender: Send + Sync {
    /// Looks a channel up by id.
    ///
    /// Returns [`SendError::Gone`] when the platform reports it deleted.
    async fn resolve_channel(&self, channel_id: &str) -> Result<Channel, SendError>;

    /// Posts a rendered message to a resolved channel.
    async fn send(&self, channel: &Channel, message: &RenderedMessage) -> Result<(), SendError>;
}
