//! User actions as discrete commands applied to the store and the remote backend.

use log::{error, info, warn};
use crate::client::ChatBackend;
use crate::error::{ChatError, StorageError};
use crate::message::Message;
use crate::storage::KeyValueStorage;
use crate::store::ConversationStore;

pub const ERROR_REPLY: &str = "⚠️ Error receiving response from the bot.";
pub const CONNECT_ERROR_REPLY: &str = "⚠️ Could not connect to the chat server.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Send(String),
    NewConversation,
    ClearHistory,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Blank input, nothing happened.
    Ignored,
    Replied(Message),
    /// The request failed; the message is the in-band error that was appended.
    Failed(Message),
    /// A reset happened while the request was in flight.
    Discarded,
    Reset,
    HistoryCleared,
}

pub struct Session<S: KeyValueStorage, B: ChatBackend> {
    store: ConversationStore<S>,
    backend: B,
}

impl<S: KeyValueStorage, B: ChatBackend> Session<S, B> {
    pub fn new(store: ConversationStore<S>, backend: B) -> Self {
        Self { store, backend }
    }

    pub fn store(&self) -> &ConversationStore<S> {
        &self.store
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Only storage failures escape; network failures become bot messages.
    pub fn handle(&mut self, command: Command) -> Result<Outcome, StorageError> {
        match command {
            Command::Send(text) => self.send(text),
            Command::NewConversation => self.new_conversation(),
            Command::ClearHistory => {
                self.store.clear_history()?;
                Ok(Outcome::HistoryCleared)
            }
        }
    }

    fn send(&mut self, text: String) -> Result<Outcome, StorageError> {
        if text.trim().is_empty() {
            return Ok(Outcome::Ignored);
        }

        // Durable before the request goes out, so a crash only loses the reply.
        self.store.append(Message::user(text.as_str()))?;
        let ticket = self.store.begin_send();

        let (reply, succeeded) = match self.backend.send_message(&text) {
            Ok(response) => (Message::bot(response), true),
            Err(e) => {
                error!("Chat request failed: {}", e);
                (Message::bot(error_reply(&e)), false)
            }
        };

        if !self.store.complete_send(ticket, reply.clone())? {
            return Ok(Outcome::Discarded);
        }
        if !succeeded {
            return Ok(Outcome::Failed(reply));
        }
        self.store.append_history_entry(text)?;
        Ok(Outcome::Replied(reply))
    }

    fn new_conversation(&mut self) -> Result<Outcome, StorageError> {
        match self.backend.reset_conversation() {
            Ok(()) => info!("Remote conversation reset"),
            Err(e) => warn!("Remote reset failed, clearing local state anyway: {}", e),
        }
        self.store.reset()?;
        Ok(Outcome::Reset)
    }
}

fn error_reply(error: &ChatError) -> &'static str {
    match error {
        ChatError::Connect(_) => CONNECT_ERROR_REPLY,
        _ => ERROR_REPLY,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use crate::storage::MemoryStorage;

    struct Scripted {
        reply: Option<&'static str>,
        sends: Cell<usize>,
    }

    impl ChatBackend for Scripted {
        fn send_message(&self, _text: &str) -> Result<String, ChatError> {
            self.sends.set(self.sends.get() + 1);
            self.reply.map(str::to_string).ok_or(ChatError::Status(500))
        }

        fn reset_conversation(&self) -> Result<(), ChatError> {
            Err(ChatError::Status(503))
        }
    }

    fn session(reply: Option<&'static str>) -> Session<MemoryStorage, Scripted> {
        Session::new(
            ConversationStore::load(MemoryStorage::new()),
            Scripted { reply, sends: Cell::new(0) },
        )
    }

    #[test]
    fn blank_input_is_ignored() {
        let mut session = session(Some("hi"));
        assert_eq!(session.handle(Command::Send("  \n".into())).unwrap(), Outcome::Ignored);
        assert!(session.store().messages().is_empty());
        assert_eq!(session.backend().sends.get(), 0);
    }

    #[test]
    fn successful_send_records_history() {
        let mut session = session(Some("hi there"));
        let outcome = session.handle(Command::Send("hello".into())).unwrap();
        assert_eq!(outcome, Outcome::Replied(Message::bot("hi there")));
        assert_eq!(session.store().history(), ["hello"]);
    }

    #[test]
    fn failed_send_appends_error_and_skips_history() {
        let mut session = session(None);
        let outcome = session.handle(Command::Send("hello".into())).unwrap();
        assert_eq!(outcome, Outcome::Failed(Message::bot(ERROR_REPLY)));
        assert_eq!(session.store().messages(), [Message::user("hello"), Message::bot(ERROR_REPLY)]);
        assert!(session.store().history().is_empty());
    }

    #[test]
    fn local_reset_ignores_remote_failure() {
        let mut session = session(Some("hi"));
        session.handle(Command::Send("hello".into())).unwrap();
        assert_eq!(session.handle(Command::NewConversation).unwrap(), Outcome::Reset);
        assert!(session.store().messages().is_empty());
        assert!(session.store().history().is_empty());
    }
}
