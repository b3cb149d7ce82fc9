//! Conversation flow handlers
//!
//! Each handler owns one user-facing interaction: creating a counter through
//! chained questions, listing, displaying, adjusting, overriding, and
//! removing. Handlers talk to the messaging surface through the [`Transport`]
//! trait and to records through [`CounterStore`]; incoming interactions are
//! resolved into a [`Trigger`] at the boundary and dispatched here.
//!
//! Validation failures are recovered locally: the handler reports to the
//! user and finishes cleanly rather than propagating an error. A finished
//! question sequence is never re-entered; a user who supplied bad input
//! starts the flow again.

use crate::counter::{parse_step, parse_value, validate_name, Counter, CounterKind};
use crate::error::Result;
use crate::session::{ChainedQuestions, SessionManager};
use crate::store::CounterStore;
use crate::transport::{ChatId, MessageHandle, Transport, Trigger};
use chrono::NaiveDate;
use std::sync::Arc;

/// The assembled bot: transport + store + session registry
#[derive(Clone)]
pub struct Bot {
    transport: Arc<dyn Transport>,
    store: Arc<dyn CounterStore>,
    sessions: SessionManager,
}

fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

impl Bot {
    /// Assemble a bot from its collaborators
    pub fn new(transport: Arc<dyn Transport>, store: Arc<dyn CounterStore>) -> Self {
        Self {
            transport,
            store,
            sessions: SessionManager::new(),
        }
    }

    /// The session registry (exposed for embedding and tests)
    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// Route one incoming interaction to its handler
    ///
    /// Commands carry a name and optional argument text; button payloads use
    /// the `action:arguments` form with `;`-separated arguments. Unknown
    /// interactions produce a notice, not an error.
    pub async fn dispatch(&self, trigger: Trigger) -> Result<()> {
        match trigger {
            Trigger::Command { chat, name, arg } => {
                tracing::debug!(%chat, command = %name, "dispatching command");
                match (name.as_str(), arg.as_deref()) {
                    ("menu", _) | ("help", _) => self.menu(chat).await,
                    ("new", Some(kind)) => match CounterKind::parse_token(kind.trim()) {
                        Ok(kind) => self.new_counter(chat, kind).await,
                        Err(_) => {
                            self.transport
                                .send_notice(
                                    chat,
                                    "Counter kind must be simple, daily or weekly.",
                                )
                                .await
                        }
                    },
                    ("new", None) => {
                        self.transport
                            .send_notice(chat, "Usage: new <simple|daily|weekly>")
                            .await
                    }
                    ("counters", _) => self.list_counters(chat).await,
                    ("show", Some(name)) => self.show_counter(chat, name.trim(), None).await,
                    ("adjust", Some(arg)) => match arg.trim().rsplit_once(' ') {
                        Some((name, delta)) => {
                            match delta.trim().parse::<i64>() {
                                Ok(delta) => {
                                    self.adjust_counter(chat, name.trim(), delta, None).await
                                }
                                Err(_) => {
                                    self.transport
                                        .send_notice(chat, "Usage: adjust <name> <delta>")
                                        .await
                                }
                            }
                        }
                        None => {
                            self.transport
                                .send_notice(chat, "Usage: adjust <name> <delta>")
                                .await
                        }
                    },
                    ("set", Some(name)) => self.set_counter(chat, name.trim(), None).await,
                    ("remove", Some(name)) => self.remove_counter(chat, name.trim()).await,
                    _ => {
                        self.transport
                            .send_notice(chat, "Unknown command. Type menu for an overview.")
                            .await
                    }
                }
            }
            Trigger::Button {
                chat,
                message,
                data,
            } => {
                tracing::debug!(%chat, data = %data, "dispatching button");
                let (action, args) = match data.split_once(':') {
                    Some((action, args)) => (action, args.split(';').collect::<Vec<_>>()),
                    None => (data.as_str(), Vec::new()),
                };
                match (action, args.as_slice()) {
                    ("counters", _) => self.list_counters(chat).await,
                    ("new_counter", [kind]) => match CounterKind::parse_token(kind) {
                        Ok(kind) => self.new_counter(chat, kind).await,
                        Err(e) => Err(e.into()),
                    },
                    ("display_counter", [name]) => {
                        self.show_counter(chat, name, Some(message)).await
                    }
                    ("decrease_counter", [name, delta]) => match delta.parse::<i64>() {
                        Ok(delta) => self.adjust_counter(chat, name, delta, Some(message)).await,
                        Err(_) => {
                            self.transport
                                .send_notice(chat, "Unknown button payload.")
                                .await
                        }
                    },
                    ("set_counter", [name]) => self.set_counter(chat, name, Some(message)).await,
                    ("remove_counter", [name]) => self.remove_counter(chat, name).await,
                    _ => {
                        self.transport
                            .send_notice(chat, "Unknown button payload.")
                            .await
                    }
                }
            }
        }
    }

    /// Send the command overview
    pub async fn menu(&self, chat: ChatId) -> Result<()> {
        self.transport
            .send_notice(
                chat,
                "MENU\n\
                 - Simple counters can be increased/decreased by 1.\n\
                 - Daily and weekly counters increase over time.\n\
                 Commands: new <simple|daily|weekly>, counters, show <name>,\n\
                 adjust <name> <delta>, set <name>, remove <name>",
            )
            .await
    }

    /// Create a counter through chained questions
    ///
    /// Asks for a name and a step, erasing the exchange afterwards. The
    /// completion handler validates both answers, rejects duplicate names
    /// without writing a second record, and reports any problem back to the
    /// user instead of re-entering the sequence.
    pub async fn new_counter(&self, chat: ChatId, kind: CounterKind) -> Result<()> {
        let guard = match self.sessions.begin(chat) {
            Ok(guard) => guard,
            Err(_) => {
                return self
                    .transport
                    .send_notice(chat, "Please answer the pending questions first.")
                    .await;
            }
        };

        let questions = ChainedQuestions::new(vec![
            "How do you want to name the counter?".to_string(),
            format!("Next! What is the {} increase value?", kind),
        ])?
        .cleanup_transcript(true)
        .closing_message("Great! You may use /counters to check your current list of counters.");

        let transport = Arc::clone(&self.transport);
        let store = Arc::clone(&self.store);

        let result = questions
            .run(self.transport.as_ref(), chat, move |answers| async move {
                let name = answers[0].trim().to_string();
                let step_text = answers[1].trim().to_string();

                if let Err(e) = validate_name(&name) {
                    transport
                        .send_notice(chat, &format!("🛑 {}. Please try again.", e))
                        .await?;
                    return Ok(());
                }
                if store.find_counter(chat, &name)?.is_some() {
                    transport
                        .send_notice(
                            chat,
                            &format!(
                                "🛑 There is already another counter named {}\n\
                                 Check out your counters list with /counters.",
                                name
                            ),
                        )
                        .await?;
                    return Ok(());
                }
                let step = match parse_step(&step_text) {
                    Ok(step) => step,
                    Err(e) => {
                        transport
                            .send_notice(chat, &format!("🛑 {}. Please try again.", e))
                            .await?;
                        return Ok(());
                    }
                };

                let counter = match Counter::create(chat, kind, &name, step, today()) {
                    Ok(counter) => counter,
                    Err(e) => {
                        transport
                            .send_notice(chat, &format!("🛑 {}. Please try again.", e))
                            .await?;
                        return Ok(());
                    }
                };

                if let Err(e) = store.append_counter(chat, &counter) {
                    tracing::error!(%chat, error = %e, "failed to add counter");
                    transport
                        .send_notice(chat, "🛑 There was a server error while adding your counter.")
                        .await?;
                }
                Ok(())
            })
            .await;

        drop(guard);
        result
    }

    /// List the chat's counters in short form
    pub async fn list_counters(&self, chat: ChatId) -> Result<()> {
        let counters = self.store.load_counters(chat)?;
        if counters.is_empty() {
            return self
                .transport
                .send_notice(chat, "You have no counters yet. Try: new daily")
                .await;
        }

        let mut text = String::from("Your counters:\n");
        for counter in &counters {
            text.push_str(&format!(" - {}\n", counter.format_short()));
        }
        self.transport.send_notice(chat, text.trim_end()).await
    }

    /// Display one counter in detail form
    ///
    /// Triggered from a button, the detail replaces the button's message in
    /// place; triggered from a command, it is sent as a fresh notice.
    pub async fn show_counter(
        &self,
        chat: ChatId,
        name: &str,
        message: Option<MessageHandle>,
    ) -> Result<()> {
        match self.store.find_counter(chat, name)? {
            Some(counter) => self.redisplay(chat, message, &counter.format_detail()).await,
            None => self.missing_counter_notice(chat, name).await,
        }
    }

    /// Apply a manual adjustment and persist it
    pub async fn adjust_counter(
        &self,
        chat: ChatId,
        name: &str,
        delta: i64,
        message: Option<MessageHandle>,
    ) -> Result<()> {
        // Applied under a single hold of the chat's store lock; concurrent
        // adjustments for one chat serialize instead of overwriting each
        // other's read.
        let counter = match self.store.modify_counter(chat, name, &mut |c| c.adjust(delta))? {
            Some(counter) => counter,
            None => return self.missing_counter_notice(chat, name).await,
        };
        self.redisplay(chat, message, &counter.format_detail()).await
    }

    /// Override a counter's value through a single chained question
    ///
    /// Cleanup is enabled and there is no closing message; the updated
    /// counter is redisplayed instead. Non-numeric input is reported and
    /// leaves the record untouched.
    pub async fn set_counter(
        &self,
        chat: ChatId,
        name: &str,
        message: Option<MessageHandle>,
    ) -> Result<()> {
        if self.store.find_counter(chat, name)?.is_none() {
            return self.missing_counter_notice(chat, name).await;
        }

        let guard = match self.sessions.begin(chat) {
            Ok(guard) => guard,
            Err(_) => {
                return self
                    .transport
                    .send_notice(chat, "Please answer the pending questions first.")
                    .await;
            }
        };

        let questions =
            ChainedQuestions::new(vec![format!("What is the new value for {}?", name)])?
                .cleanup_transcript(true);

        let bot = self.clone();
        let name = name.to_string();

        let result = questions
            .run(self.transport.as_ref(), chat, move |answers| async move {
                let value = match parse_value(&answers[0]) {
                    Ok(value) => value,
                    Err(_) => {
                        bot.transport
                            .send_notice(chat, "🛑 The new value must be an integer!")
                            .await?;
                        return Ok(());
                    }
                };

                let counter = match bot
                    .store
                    .modify_counter(chat, &name, &mut |c| c.set_value(value, today()))?
                {
                    Some(counter) => counter,
                    None => return bot.missing_counter_notice(chat, &name).await,
                };
                bot.redisplay(chat, message, &counter.format_detail()).await
            })
            .await;

        drop(guard);
        result
    }

    /// Delete a counter record
    pub async fn remove_counter(&self, chat: ChatId, name: &str) -> Result<()> {
        self.store.remove_counter(chat, name)?;
        self.transport
            .send_notice(chat, &format!("🗑 Removed {}.", name))
            .await
    }

    async fn redisplay(
        &self,
        chat: ChatId,
        message: Option<MessageHandle>,
        text: &str,
    ) -> Result<()> {
        match message {
            Some(handle) => self.transport.edit_message(chat, handle, text).await,
            None => self.transport.send_notice(chat, text).await,
        }
    }

    async fn missing_counter_notice(&self, chat: ChatId, name: &str) -> Result<()> {
        self.transport
            .send_notice(chat, &format!("🛑 No counter named {} here.", name))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::FileStore;
    use crate::transport::channel::{ChannelTransport, SentKind};
    use tempfile::tempdir;

    fn test_bot() -> (Bot, Arc<ChannelTransport>, tempfile::TempDir) {
        let transport = Arc::new(ChannelTransport::new());
        let dir = tempdir().unwrap();
        let store = Arc::new(FileStore::new_with_path(dir.path()).unwrap());
        let bot = Bot::new(transport.clone(), store);
        (bot, transport, dir)
    }

    fn command(chat: ChatId, name: &str, arg: Option<&str>) -> Trigger {
        Trigger::Command {
            chat,
            name: name.to_string(),
            arg: arg.map(|s| s.to_string()),
        }
    }

    async fn notices(transport: &ChannelTransport) -> Vec<String> {
        transport
            .transcript()
            .await
            .into_iter()
            .filter(|m| m.kind == SentKind::Notice)
            .map(|m| m.text)
            .collect()
    }

    #[tokio::test]
    async fn test_new_counter_flow_creates_record() {
        let (bot, transport, _dir) = test_bot();
        let chat = ChatId(42);

        transport.deliver_answer(chat, "Coffee").await.unwrap();
        transport.deliver_answer(chat, "2").await.unwrap();

        bot.dispatch(command(chat, "new", Some("daily")))
            .await
            .unwrap();

        let counters = bot.store.load_counters(chat).unwrap();
        assert_eq!(counters.len(), 1);
        assert_eq!(counters[0].name, "Coffee");
        assert_eq!(counters[0].step, 2);
        assert_eq!(counters[0].value, 2);
        assert_eq!(counters[0].kind, CounterKind::Daily);

        // Prompts and answers erased, closing notice sent, slot released.
        let transcript = transport.transcript().await;
        assert!(transcript
            .iter()
            .filter(|m| m.kind != SentKind::Notice)
            .all(|m| m.deleted));
        assert!(notices(&transport).await.iter().any(|t| t.contains("/counters")));
        assert!(!bot.sessions().is_active(chat));
    }

    #[tokio::test]
    async fn test_duplicate_name_writes_no_second_record() {
        let (bot, transport, _dir) = test_bot();
        let chat = ChatId(42);

        let existing =
            Counter::create(chat, CounterKind::Daily, "Coffee", 2, today()).unwrap();
        bot.store.append_counter(chat, &existing).unwrap();

        transport.deliver_answer(chat, "Coffee").await.unwrap();
        transport.deliver_answer(chat, "5").await.unwrap();

        bot.dispatch(command(chat, "new", Some("daily")))
            .await
            .unwrap();

        let counters = bot.store.load_counters(chat).unwrap();
        assert_eq!(counters.len(), 1);
        assert_eq!(counters[0].step, 2);
        assert!(notices(&transport)
            .await
            .iter()
            .any(|t| t.contains("already another counter named Coffee")));
    }

    #[tokio::test]
    async fn test_invalid_step_reports_and_stores_nothing() {
        let (bot, transport, _dir) = test_bot();
        let chat = ChatId(1);

        transport.deliver_answer(chat, "Coffee").await.unwrap();
        transport.deliver_answer(chat, "lots").await.unwrap();

        bot.dispatch(command(chat, "new", Some("daily")))
            .await
            .unwrap();

        assert!(bot.store.load_counters(chat).unwrap().is_empty());
        assert!(notices(&transport)
            .await
            .iter()
            .any(|t| t.contains("positive integer")));
    }

    #[tokio::test]
    async fn test_name_with_separator_is_rejected() {
        let (bot, transport, _dir) = test_bot();
        let chat = ChatId(1);

        transport.deliver_answer(chat, "a;b").await.unwrap();
        transport.deliver_answer(chat, "2").await.unwrap();

        bot.dispatch(command(chat, "new", Some("daily")))
            .await
            .unwrap();

        assert!(bot.store.load_counters(chat).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_second_flow_while_pending_is_rejected() {
        let (bot, transport, _dir) = test_bot();
        let chat = ChatId(1);

        let pending_bot = bot.clone();
        let first = tokio::spawn(async move {
            pending_bot
                .dispatch(command(chat, "new", Some("daily")))
                .await
        });

        // Let the first flow send its prompt and suspend.
        while transport.pending_count().await == 0 {
            tokio::task::yield_now().await;
        }

        bot.dispatch(command(chat, "new", Some("weekly")))
            .await
            .unwrap();
        assert!(notices(&transport)
            .await
            .iter()
            .any(|t| t.contains("pending questions")));

        transport.deliver_answer(chat, "Coffee").await.unwrap();
        transport.deliver_answer(chat, "2").await.unwrap();
        first.await.unwrap().unwrap();

        let counters = bot.store.load_counters(chat).unwrap();
        assert_eq!(counters.len(), 1);
        assert_eq!(counters[0].kind, CounterKind::Daily);
    }

    #[tokio::test]
    async fn test_set_counter_persists_and_redisplays() {
        let (bot, transport, _dir) = test_bot();
        let chat = ChatId(1);

        let counter = Counter::create(chat, CounterKind::Daily, "Coffee", 2, today()).unwrap();
        bot.store.append_counter(chat, &counter).unwrap();

        transport.deliver_answer(chat, "5").await.unwrap();
        bot.dispatch(command(chat, "set", Some("Coffee"))).await.unwrap();

        let loaded = bot.store.find_counter(chat, "Coffee").unwrap().unwrap();
        assert_eq!(loaded.value, 5);
        assert!(notices(&transport)
            .await
            .iter()
            .any(|t| t.contains("Coffee: 5")));
    }

    #[tokio::test]
    async fn test_set_counter_rejects_nonnumeric() {
        let (bot, transport, _dir) = test_bot();
        let chat = ChatId(1);

        let counter = Counter::create(chat, CounterKind::Daily, "Coffee", 2, today()).unwrap();
        bot.store.append_counter(chat, &counter).unwrap();

        transport.deliver_answer(chat, "five").await.unwrap();
        bot.dispatch(command(chat, "set", Some("Coffee"))).await.unwrap();

        let loaded = bot.store.find_counter(chat, "Coffee").unwrap().unwrap();
        assert_eq!(loaded.value, 2);
        assert!(notices(&transport)
            .await
            .iter()
            .any(|t| t.contains("must be an integer")));
    }

    #[tokio::test]
    async fn test_adjust_via_button_edits_in_place() {
        let (bot, transport, _dir) = test_bot();
        let chat = ChatId(1);

        let counter = Counter::create(chat, CounterKind::Simple, "Clicks", 1, today()).unwrap();
        bot.store.append_counter(chat, &counter).unwrap();

        // Simulate the message the button belongs to.
        let message = transport.send_prompt(chat, "Clicks: 1").await.unwrap();
        bot.dispatch(Trigger::Button {
            chat,
            message,
            data: "decrease_counter:Clicks;-5".to_string(),
        })
        .await
        .unwrap();

        let loaded = bot.store.find_counter(chat, "Clicks").unwrap().unwrap();
        assert_eq!(loaded.value, -4);
        let transcript = transport.transcript().await;
        assert!(transcript[0].text.contains("Clicks: -4"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_adjusts_are_all_applied() {
        let (bot, _transport, _dir) = test_bot();
        let chat = ChatId(1);

        let counter = Counter::create(chat, CounterKind::Simple, "Clicks", 1, today()).unwrap();
        bot.store.append_counter(chat, &counter).unwrap();

        let mut tasks = Vec::new();
        for _ in 0..16 {
            let bot = bot.clone();
            tasks.push(tokio::spawn(async move {
                bot.adjust_counter(chat, "Clicks", 1, None).await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        // Started at 1; every one of the 16 increments must survive.
        assert_eq!(
            bot.store.find_counter(chat, "Clicks").unwrap().unwrap().value,
            17
        );
    }

    #[tokio::test]
    async fn test_list_counters_short_form() {
        let (bot, transport, _dir) = test_bot();
        let chat = ChatId(1);

        let counter = Counter::create(chat, CounterKind::Daily, "Coffee", 2, today()).unwrap();
        bot.store.append_counter(chat, &counter).unwrap();

        bot.dispatch(command(chat, "counters", None)).await.unwrap();
        assert!(notices(&transport)
            .await
            .iter()
            .any(|t| t.contains("Coffee (D+2): 2")));
    }

    #[tokio::test]
    async fn test_list_counters_empty() {
        let (bot, transport, _dir) = test_bot();
        bot.dispatch(command(ChatId(1), "counters", None)).await.unwrap();
        assert!(notices(&transport)
            .await
            .iter()
            .any(|t| t.contains("no counters yet")));
    }

    #[tokio::test]
    async fn test_remove_counter() {
        let (bot, transport, _dir) = test_bot();
        let chat = ChatId(1);

        let counter = Counter::create(chat, CounterKind::Simple, "Clicks", 1, today()).unwrap();
        bot.store.append_counter(chat, &counter).unwrap();

        bot.dispatch(command(chat, "remove", Some("Clicks"))).await.unwrap();
        assert!(bot.store.load_counters(chat).unwrap().is_empty());
        assert!(notices(&transport)
            .await
            .iter()
            .any(|t| t.contains("Removed Clicks")));
    }

    #[tokio::test]
    async fn test_unknown_command_gets_notice() {
        let (bot, transport, _dir) = test_bot();
        bot.dispatch(command(ChatId(1), "frobnicate", None)).await.unwrap();
        assert!(notices(&transport)
            .await
            .iter()
            .any(|t| t.contains("Unknown command")));
    }

    #[tokio::test]
    async fn test_adjust_missing_counter_gets_notice() {
        let (bot, transport, _dir) = test_bot();
        bot.dispatch(command(ChatId(1), "adjust", Some("Ghost -1")))
            .await
            .unwrap();
        assert!(notices(&transport)
            .await
            .iter()
            .any(|t| t.contains("No counter named Ghost")));
    }
}
