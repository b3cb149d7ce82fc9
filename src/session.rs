//! Chained question engine and per-chat session registry
//!
//! [`ChainedQuestions`] drives an ordered sequence of prompts, collects
//! exactly one answer per prompt, and hands the ordered answer list to a
//! completion handler exactly once. Optional transcript cleanup erases the
//! prompts and answers from the conversation before an optional closing
//! notice is sent.
//!
//! [`SessionManager`] is the explicit registry of in-flight sequences: one
//! per chat, handed out as an RAII guard so the slot is released on every
//! exit path, including handler errors.

use crate::error::{Result, TallybotError};
use crate::transport::{ChatId, MessageHandle, Transport};
use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex};

/// An ordered prompt sequence awaiting one answer per prompt
///
/// The engine performs no validation of answer content; that is entirely
/// the completion handler's job. If the handler decides the answers are
/// invalid it reports to the user itself (possibly by starting a new
/// sequence) -- the engine never re-enters a finished sequence.
#[derive(Debug, Clone)]
pub struct ChainedQuestions {
    prompts: Vec<String>,
    cleanup_transcript: bool,
    closing_message: Option<String>,
}

impl ChainedQuestions {
    /// Create a sequence from ordered prompt texts
    ///
    /// At least one prompt is required.
    ///
    /// # Examples
    ///
    /// ```
    /// use tallybot::session::ChainedQuestions;
    ///
    /// let questions = ChainedQuestions::new(vec!["Name?".into(), "Step?".into()]).unwrap();
    /// assert!(ChainedQuestions::new(vec![]).is_err());
    /// let _ = questions;
    /// ```
    pub fn new(prompts: Vec<String>) -> Result<Self> {
        if prompts.is_empty() {
            return Err(TallybotError::Session(
                "a chained question sequence needs at least one prompt".to_string(),
            )
            .into());
        }
        Ok(Self {
            prompts,
            cleanup_transcript: false,
            closing_message: None,
        })
    }

    /// Erase every prompt and answer from the conversation on completion
    pub fn cleanup_transcript(mut self, cleanup: bool) -> Self {
        self.cleanup_transcript = cleanup;
        self
    }

    /// Send a final notice after cleanup and before the completion handler
    pub fn closing_message(mut self, text: impl Into<String>) -> Self {
        self.closing_message = Some(text.into());
        self
    }

    /// Run the sequence against a chat
    ///
    /// Sends each prompt in order, suspending on the transport until the
    /// respondent's answer arrives, then:
    ///
    /// 1. if transcript cleanup is enabled, deletes all prompt handles (in
    ///    send order) followed by all answer handles (in arrival order) in
    ///    one batched call;
    /// 2. sends the closing message, if any;
    /// 3. invokes `on_complete` with the ordered answers, exactly once.
    ///
    /// `answers[k]` always corresponds to prompt `k`, and the handler never
    /// sees fewer answers than prompts. There is no timeout: if an answer
    /// never arrives the session stays suspended at that prompt.
    pub async fn run<F, Fut>(
        self,
        transport: &dyn Transport,
        chat: ChatId,
        on_complete: F,
    ) -> Result<()>
    where
        F: FnOnce(Vec<String>) -> Fut + Send,
        Fut: Future<Output = Result<()>> + Send,
    {
        let total = self.prompts.len();
        let mut answers: Vec<String> = Vec::with_capacity(total);
        let mut prompt_handles: Vec<MessageHandle> = Vec::with_capacity(total);
        let mut answer_handles: Vec<MessageHandle> = Vec::with_capacity(total);

        for (index, prompt) in self.prompts.iter().enumerate() {
            tracing::debug!(%chat, index, total, "sending prompt");
            let handle = transport.send_prompt(chat, prompt).await?;
            prompt_handles.push(handle);

            let answer = transport.await_answer(handle).await?;
            answers.push(answer.text);
            answer_handles.push(answer.handle);
        }

        if self.cleanup_transcript {
            let mut to_delete = prompt_handles;
            to_delete.extend(answer_handles);
            transport.delete_messages(chat, &to_delete).await?;
        }

        if let Some(closing) = &self.closing_message {
            transport.send_notice(chat, closing).await?;
        }

        tracing::debug!(%chat, total, "question sequence complete");
        on_complete(answers).await
    }
}

/// Registry of chats with an in-flight question sequence
///
/// Replaces ambient per-message continuation state with an explicit,
/// process-owned set. A second sequence for a chat whose first has not
/// completed is rejected rather than interleaved.
#[derive(Debug, Clone, Default)]
pub struct SessionManager {
    active: Arc<Mutex<HashSet<ChatId>>>,
}

impl SessionManager {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the session slot for a chat
    ///
    /// Returns a guard that releases the slot when dropped, or
    /// [`TallybotError::SessionBusy`] if a sequence is already pending.
    pub fn begin(&self, chat: ChatId) -> Result<SessionGuard> {
        let mut active = self.active.lock().expect("session registry poisoned");
        if !active.insert(chat) {
            return Err(TallybotError::SessionBusy(chat.0).into());
        }
        Ok(SessionGuard {
            chat,
            active: Arc::clone(&self.active),
        })
    }

    /// Whether a sequence is pending for this chat
    pub fn is_active(&self, chat: ChatId) -> bool {
        self.active
            .lock()
            .expect("session registry poisoned")
            .contains(&chat)
    }

    /// Number of chats with a pending sequence
    pub fn active_count(&self) -> usize {
        self.active.lock().expect("session registry poisoned").len()
    }
}

/// RAII claim on a chat's session slot
#[derive(Debug)]
pub struct SessionGuard {
    chat: ChatId,
    active: Arc<Mutex<HashSet<ChatId>>>,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.active
            .lock()
            .expect("session registry poisoned")
            .remove(&self.chat);
    }
}
