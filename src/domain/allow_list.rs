//! Static event vocabularies permitted across the host/network boundary.
//!
//! [`EventAllowList`] is built once and never mutated. The standard
//! vocabulary is available through [`EventAllowList::standard`].

use std::collections::HashSet;
use std::sync::{Arc, LazyLock};

/// Fire-and-forget names the host may send to the server.
const OUTBOUND: &[&str] = &[
    "typing",
    "stopTyping",
    "markRead",
    "updatePresence",
    "joinVoiceChannel",
    "leaveVoiceChannel",
    "voiceSignal",
    "setMute",
    "setDeafen",
];

/// Names the host may send expecting an acknowledgement.
const ACK: &[&str] = &[
    "sendMessage",
    "editMessage",
    "deleteMessage",
    "fetchMessages",
    "saveSettings",
    "fetchSettings",
    "sendFriendRequest",
    "acceptFriendRequest",
    "declineFriendRequest",
    "removeFriend",
    "createServer",
    "joinServer",
    "leaveServer",
    "createChannel",
    "deleteChannel",
];

/// Names the server may push to the host.
const INBOUND: &[&str] = &[
    "newMessage",
    "messageEdited",
    "messageDeleted",
    "userTyping",
    "userStopTyping",
    "presenceUpdate",
    "friendRequest",
    "friendAccepted",
    "friendRemoved",
    "serverUpdated",
    "channelCreated",
    "channelDeleted",
    "memberJoined",
    "memberLeft",
    "voiceStateUpdate",
    "voiceSignal",
    "notification",
];

/// Chatty names forwarded without an info log line.
const NO_LOG: &[&str] = &["typing", "stopTyping", "userTyping", "userStopTyping", "voiceSignal"];

static STANDARD: LazyLock<Arc<EventAllowList>> =
    LazyLock::new(|| Arc::new(EventAllowList::new(OUTBOUND, ACK, INBOUND, NO_LOG)));

/// Three direction-specific allow-lists plus the no-log set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventAllowList {
    outbound: HashSet<String>,
    ack: HashSet<String>,
    inbound: HashSet<String>,
    no_log: HashSet<String>,
}

impl EventAllowList {
    /// Builds an allow-list from explicit vocabularies.
    #[must_use]
    pub fn new(outbound: &[&str], ack: &[&str], inbound: &[&str], no_log: &[&str]) -> Self {
        Self {
            outbound: to_set(outbound),
            ack: to_set(ack),
            inbound: to_set(inbound),
            no_log: to_set(no_log),
        }
    }

    /// Returns the shared standard vocabulary.
    #[must_use]
    pub fn standard() -> Arc<Self> {
        Arc::clone(&STANDARD)
    }

    /// Returns `true` if `event` may be sent fire-and-forget.
    #[must_use]
    pub fn allows_outbound(&self, event: &str) -> bool {
        self.outbound.contains(event)
    }

    /// Returns `true` if `event` may be sent as an acknowledged call.
    #[must_use]
    pub fn allows_ack(&self, event: &str) -> bool {
        self.ack.contains(event)
    }

    /// Returns `true` if `event` may be forwarded from the server to the host.
    #[must_use]
    pub fn allows_inbound(&self, event: &str) -> bool {
        self.inbound.contains(event)
    }

    /// Returns `true` if forwarding `event` should be logged.
    #[must_use]
    pub fn should_log(&self, event: &str) -> bool {
        !self.no_log.contains(event)
    }

    /// Iterates the inbound vocabulary.
    pub fn inbound(&self) -> impl Iterator<Item = &str> {
        self.inbound.iter().map(String::as_str)
    }
}

fn to_set(names: &[&str]) -> HashSet<String> {
    names.iter().map(|n| (*n).to_string()).collect()
}
