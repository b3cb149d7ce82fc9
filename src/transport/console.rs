//! Console transport: prompts and notices on the terminal
//!
//! Maps the transport contract onto a readline session. Prompts print in
//! color and answers are read as input lines; messages on a terminal cannot
//! be unprinted, so deletion is a logged no-op and edits print the new text
//! instead of replacing the old one.

use crate::error::{Result, TallybotError};
use crate::transport::{Answer, ChatId, MessageHandle, Transport};
use async_trait::async_trait;
use colored::Colorize;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Terminal-backed [`Transport`]
///
/// The readline editor is shared with the surrounding command loop; a
/// chained-question flow runs to completion before the loop reads its next
/// command, so the two readers never contend.
pub struct ConsoleTransport {
    editor: Arc<Mutex<DefaultEditor>>,
    next_handle: AtomicU64,
}

impl ConsoleTransport {
    /// Create a console transport with a fresh readline editor
    pub fn new() -> Result<Self> {
        Ok(Self {
            editor: Arc::new(Mutex::new(DefaultEditor::new()?)),
            next_handle: AtomicU64::new(0),
        })
    }

    fn allocate_handle(&self) -> MessageHandle {
        MessageHandle(self.next_handle.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Read one line with the given readline prompt
    ///
    /// Used by both [`Transport::await_answer`] and the outer command loop.
    /// Ctrl-C and Ctrl-D surface as a transport error the caller treats as
    /// end of input.
    pub async fn read_line(&self, prompt: &str) -> Result<String> {
        let editor = Arc::clone(&self.editor);
        let prompt = prompt.to_string();

        let line = tokio::task::spawn_blocking(move || {
            let mut editor = editor.lock().expect("readline editor poisoned");
            editor.readline(&prompt)
        })
        .await
        .map_err(|e| TallybotError::Transport(format!("readline task failed: {}", e)))?;

        match line {
            Ok(line) => {
                let trimmed = line.trim().to_string();
                let mut editor = self.editor.lock().expect("readline editor poisoned");
                let _ = editor.add_history_entry(&trimmed);
                Ok(trimmed)
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => {
                Err(TallybotError::Transport("input closed".to_string()).into())
            }
            Err(e) => Err(TallybotError::Transport(format!("readline error: {}", e)).into()),
        }
    }
}

#[async_trait]
impl Transport for ConsoleTransport {
    async fn send_prompt(&self, _chat: ChatId, text: &str) -> Result<MessageHandle> {
        println!("{} {}", "?".cyan().bold(), text.cyan());
        Ok(self.allocate_handle())
    }

    async fn await_answer(&self, _handle: MessageHandle) -> Result<Answer> {
        let text = self.read_line("> ").await?;
        Ok(Answer {
            handle: self.allocate_handle(),
            text,
        })
    }

    async fn delete_messages(&self, chat: ChatId, handles: &[MessageHandle]) -> Result<()> {
        // A terminal transcript cannot be erased.
        tracing::debug!(%chat, count = handles.len(), "skipping transcript cleanup on console");
        Ok(())
    }

    async fn send_notice(&self, _chat: ChatId, text: &str) -> Result<()> {
        println!("{}", text);
        Ok(())
    }

    async fn edit_message(&self, _chat: ChatId, _handle: MessageHandle, text: &str) -> Result<()> {
        println!("{}", text);
        Ok(())
    }
}
