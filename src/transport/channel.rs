//! In-memory transport backed by a pending-answer registry
//!
//! Answers are routed through an explicit map from prompt handle to a
//! `oneshot::Sender`, so there is no ambient per-chat state: each awaited
//! prompt owns exactly one registration, and [`deliver_answer`] resolves the
//! oldest pending prompt for the chat. Answers delivered before the engine
//! starts awaiting are queued per chat rather than dropped, which keeps
//! tests free of timing races.
//!
//! The transport also records a full transcript (prompts, notices, answers,
//! deleted flags) that integration tests assert against.
//!
//! [`deliver_answer`]: ChannelTransport::deliver_answer

use crate::error::{Result, TallybotError};
use crate::transport::{Answer, ChatId, MessageHandle, Transport};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{oneshot, Mutex};

/// What kind of message a transcript entry records
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SentKind {
    /// A prompt expecting an answer
    Prompt,
    /// A notice expecting no answer
    Notice,
    /// A respondent's reply
    Answer,
}

/// One message in the recorded transcript
#[derive(Debug, Clone)]
pub struct SentMessage {
    /// Handle assigned when the message entered the transcript
    pub handle: MessageHandle,
    /// Chat the message belongs to
    pub chat: ChatId,
    /// Current text (edits replace it in place)
    pub text: String,
    /// Prompt, notice, or answer
    pub kind: SentKind,
    /// Whether transcript cleanup has deleted this message
    pub deleted: bool,
}

/// One registered waiter for an answer
struct PendingAnswer {
    chat: ChatId,
    sender: oneshot::Sender<Answer>,
}

#[derive(Default)]
struct Inner {
    /// Pending map: prompt handle -> waiting sender
    pending: HashMap<MessageHandle, PendingAnswer>,
    /// Answers delivered before anyone awaited them, per chat; each keeps
    /// the handle it was recorded under
    queued: HashMap<ChatId, VecDeque<Answer>>,
    transcript: Vec<SentMessage>,
}

/// In-memory [`Transport`] for tests and embedding
#[derive(Default)]
pub struct ChannelTransport {
    next_handle: AtomicU64,
    inner: Mutex<Inner>,
}

impl ChannelTransport {
    /// Create an empty transport
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate_handle(&self) -> MessageHandle {
        MessageHandle(self.next_handle.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Deliver the respondent's next reply for a chat
    ///
    /// Resolves the oldest pending prompt registered for `chat`; if no
    /// prompt is currently awaited, the answer is queued and consumed by
    /// the next [`Transport::await_answer`] call for that chat.
    pub async fn deliver_answer(&self, chat: ChatId, text: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;

        let answer = Answer {
            handle: self.allocate_handle(),
            text: text.to_string(),
        };
        let answer_handle = answer.handle;

        // Oldest registration first: handles are allocated monotonically.
        let oldest = inner
            .pending
            .iter()
            .filter(|(_, p)| p.chat == chat)
            .map(|(h, _)| *h)
            .min_by_key(|h| h.0);

        match oldest {
            Some(handle) => {
                let pending = inner.pending.remove(&handle).expect("handle just found");
                pending.sender.send(answer).map_err(|_| {
                    TallybotError::Transport(format!(
                        "awaiting session for chat {} went away",
                        chat
                    ))
                })?;
            }
            None => {
                inner.queued.entry(chat).or_default().push_back(answer);
            }
        }

        // Recorded only once the answer is accepted; a failed send leaves
        // no transcript entry.
        inner.transcript.push(SentMessage {
            handle: answer_handle,
            chat,
            text: text.to_string(),
            kind: SentKind::Answer,
            deleted: false,
        });

        Ok(())
    }

    /// Snapshot of the recorded transcript
    pub async fn transcript(&self) -> Vec<SentMessage> {
        self.inner.lock().await.transcript.clone()
    }

    /// Number of registrations still waiting for an answer
    pub async fn pending_count(&self) -> usize {
        self.inner.lock().await.pending.len()
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn send_prompt(&self, chat: ChatId, text: &str) -> Result<MessageHandle> {
        let handle = self.allocate_handle();
        let mut inner = self.inner.lock().await;
        inner.transcript.push(SentMessage {
            handle,
            chat,
            text: text.to_string(),
            kind: SentKind::Prompt,
            deleted: false,
        });
        tracing::debug!(%chat, handle = handle.0, "sent prompt");
        Ok(handle)
    }

    async fn await_answer(&self, handle: MessageHandle) -> Result<Answer> {
        let rx = {
            let mut inner = self.inner.lock().await;

            let chat = inner
                .transcript
                .iter()
                .find(|m| m.handle == handle && m.kind == SentKind::Prompt)
                .map(|m| m.chat)
                .ok_or_else(|| {
                    TallybotError::Transport(format!("unknown prompt handle {}", handle.0))
                })?;

            // Consume an early-delivered answer if one is queued; it is
            // already in the transcript under its original handle.
            if let Some(answer) = inner.queued.get_mut(&chat).and_then(VecDeque::pop_front) {
                return Ok(answer);
            }

            // Register before releasing the lock so a delivery can never
            // slip between the check above and the await below.
            let (tx, rx) = oneshot::channel();
            inner.pending.insert(handle, PendingAnswer { chat, sender: tx });
            rx
        };

        rx.await
            .map_err(|_| TallybotError::Transport("transport dropped while awaiting answer".into()).into())
    }

    async fn delete_messages(&self, chat: ChatId, handles: &[MessageHandle]) -> Result<()> {
        let mut inner = self.inner.lock().await;
        for handle in handles {
            if let Some(message) = inner
                .transcript
                .iter_mut()
                .find(|m| m.chat == chat && m.handle == *handle)
            {
                message.deleted = true;
            }
        }
        Ok(())
    }

    async fn send_notice(&self, chat: ChatId, text: &str) -> Result<()> {
        let handle = self.allocate_handle();
        let mut inner = self.inner.lock().await;
        inner.transcript.push(SentMessage {
            handle,
            chat,
            text: text.to_string(),
            kind: SentKind::Notice,
            deleted: false,
        });
        Ok(())
    }

    async fn edit_message(&self, chat: ChatId, handle: MessageHandle, text: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let message = inner
            .transcript
            .iter_mut()
            .find(|m| m.chat == chat && m.handle == handle)
            .ok_or_else(|| {
                TallybotError::Transport(format!("cannot edit unknown message {}", handle.0))
            })?;
        message.text = text.to_string();
        Ok(())
    }
}
