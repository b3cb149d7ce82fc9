//! Transport abstraction between the core and the messaging surface
//!
//! The core never talks to a messaging network directly. It sends prompts
//! and notices, awaits answers, and deletes transcript messages through the
//! [`Transport`] trait; concrete implementations decide what those calls
//! mean (an in-memory channel for tests and embedding, a terminal for the
//! console binary).

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

pub mod channel;
pub mod console;

pub use channel::ChannelTransport;
pub use console::ConsoleTransport;

/// Opaque identifier of an owning conversation
///
/// Supplied by the transport; the core only uses it as a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChatId(pub i64);

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque reference to a message the transport has sent or received
///
/// Used to await the answer to a specific prompt and to delete transcript
/// messages during cleanup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageHandle(pub u64);

/// A respondent's reply to a prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Answer {
    /// Handle of the reply message itself (deleted on transcript cleanup)
    pub handle: MessageHandle,
    /// The reply text
    pub text: String,
}

/// Origin of an incoming interaction, resolved once at the boundary
///
/// Replaces runtime type inspection of message-vs-callback objects with a
/// tagged union: a typed command carries only the chat, while a button press
/// also carries the message it was attached to (so handlers can redisplay
/// in place) and its payload data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    /// A typed command such as `/counters`, with an optional argument
    Command {
        /// Originating chat
        chat: ChatId,
        /// Command name without the leading slash
        name: String,
        /// Remainder of the command line, if any
        arg: Option<String>,
    },
    /// A button press attached to a previously sent message
    Button {
        /// Originating chat
        chat: ChatId,
        /// The message the button belongs to
        message: MessageHandle,
        /// Callback payload, e.g. `display_counter:Coffee`
        data: String,
    },
}

impl Trigger {
    /// The chat this trigger originated from
    pub fn chat(&self) -> ChatId {
        match self {
            Self::Command { chat, .. } => *chat,
            Self::Button { chat, .. } => *chat,
        }
    }
}

/// Messaging operations the core consumes
///
/// All methods are fire-and-forget from the core's perspective except
/// [`await_answer`](Transport::await_answer), which suspends until the
/// respondent's next reply in the prompt's chat arrives. There is no
/// timeout: an unanswered prompt suspends its session indefinitely.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a prompt expecting an answer; returns a handle for awaiting
    /// the reply and for later transcript cleanup
    async fn send_prompt(&self, chat: ChatId, text: &str) -> Result<MessageHandle>;

    /// Suspend until the next reply in the prompt's chat arrives
    async fn await_answer(&self, handle: MessageHandle) -> Result<Answer>;

    /// Delete previously sent or received messages
    async fn delete_messages(&self, chat: ChatId, handles: &[MessageHandle]) -> Result<()>;

    /// Send a plain notice that expects no answer
    async fn send_notice(&self, chat: ChatId, text: &str) -> Result<()>;

    /// Replace the text of a previously sent message in place
    async fn edit_message(&self, chat: ChatId, handle: MessageHandle, text: &str) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_id_display() {
        assert_eq!(ChatId(42).to_string(), "42");
        assert_eq!(ChatId(-7).to_string(), "-7");
    }

    #[test]
    fn test_trigger_chat_accessor() {
        let command = Trigger::Command {
            chat: ChatId(1),
            name: "counters".to_string(),
            arg: None,
        };
        assert_eq!(command.chat(), ChatId(1));

        let button = Trigger::Button {
            chat: ChatId(2),
            message: MessageHandle(9),
            data: "display_counter:Coffee".to_string(),
        };
        assert_eq!(button.chat(), ChatId(2));
    }

    #[test]
    fn test_chat_id_serde_roundtrip() {
        let json = serde_json::to_string(&ChatId(42)).unwrap();
        assert_eq!(json, "42");
        let back: ChatId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ChatId(42));
    }
}
