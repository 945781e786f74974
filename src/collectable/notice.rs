//! Player-facing effects emitted by discovery hooks.
//!
//! Hooks run on whatever task performed the unlock. Anything that touches player
//! state (chat, commands) is queued as a [`Notice`] and performed by the context
//! that owns that state, which drains the receiver returned by
//! [`NoticeOutbox::channel`]. Placeholder substitution happens there too; texts
//! are passed through raw.

use log::debug;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::collectable::key::NamespacedKey;
use crate::collectable::types::{CommandInfo, CommandTarget};

/// Identity of the player an operation acts for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlayerRef {
    pub id: Uuid,
    pub name: String,
}

impl PlayerRef {
    pub fn new(id: Uuid, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Notice {
    /// Private message to one player.
    PlayerMessage { player: Uuid, text: String },
    /// Message to everyone online.
    Broadcast { text: String },
    /// Command to execute, either from the console or as the player.
    Command {
        player: PlayerRef,
        run_as: CommandTarget,
        command: String,
    },
}

/// Sending half of the notice channel. A disabled outbox drops everything.
#[derive(Debug, Clone, Default)]
pub struct NoticeOutbox {
    tx: Option<mpsc::UnboundedSender<Notice>>,
}

impl NoticeOutbox {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Notice>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn send(&self, notice: Notice) {
        let Some(tx) = &self.tx else {
            return;
        };
        if tx.send(notice).is_err() {
            debug!("notice receiver dropped; discarding notice");
        }
    }
}

/// What a [`Discoverable`](crate::collectable::types::Discoverable) hook gets to work with.
pub struct DiscoveryContext<'a> {
    pub player: &'a PlayerRef,
    pub key: &'a NamespacedKey,
    outbox: &'a NoticeOutbox,
}

impl<'a> DiscoveryContext<'a> {
    pub fn new(player: &'a PlayerRef, key: &'a NamespacedKey, outbox: &'a NoticeOutbox) -> Self {
        Self {
            player,
            key,
            outbox,
        }
    }

    /// Message the acting player. Empty texts are skipped.
    pub fn tell(&self, text: &str) {
        if text.is_empty() {
            return;
        }
        self.outbox.send(Notice::PlayerMessage {
            player: self.player.id,
            text: text.to_string(),
        });
    }

    /// Message everyone. Empty texts are skipped.
    pub fn broadcast(&self, text: &str) {
        if text.is_empty() {
            return;
        }
        self.outbox.send(Notice::Broadcast {
            text: text.to_string(),
        });
    }

    pub fn run_command(&self, info: &CommandInfo) {
        self.outbox.send(Notice::Command {
            player: self.player.clone(),
            run_as: info.run_as,
            command: info.command.trim_start_matches('/').to_string(),
        });
    }
}
