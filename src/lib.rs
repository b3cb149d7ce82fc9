//! Tallybot - conversational counter tracker library
//!
//! This library provides the core functionality for Tallybot: numeric
//! counters that move on manual adjustment or accrue automatically over
//! elapsed calendar time, driven through a conversational interface.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `counter`: the accrual model, input validation, and the stored record codec
//! - `session`: the chained question engine and the per-chat session registry
//! - `transport`: the messaging abstraction with channel and console backends
//! - `store`: counter record persistence, one file per chat
//! - `flows`: conversation flow handlers and trigger dispatch
//! - `config`: configuration management and validation
//! - `error`: error types and result aliases
//! - `cli`: command-line interface definition
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tallybot::flows::Bot;
//! use tallybot::store::FileStore;
//! use tallybot::transport::ChannelTransport;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let transport = Arc::new(ChannelTransport::new());
//! let store = Arc::new(FileStore::new()?);
//! let bot = Bot::new(transport, store);
//! # let _ = bot;
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod config;
pub mod counter;
pub mod error;
pub mod flows;
pub mod session;
pub mod store;
pub mod transport;

// Re-export commonly used types
pub use counter::{Counter, CounterKind};
pub use error::{Result, TallybotError, ValidationError};
pub use flows::Bot;
pub use session::{ChainedQuestions, SessionManager};
pub use store::{CounterStore, FileStore};
pub use transport::{Answer, ChatId, MessageHandle, Transport, Trigger};
