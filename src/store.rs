//! Conversation state mirrored into key-value storage after every mutation.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use crate::error::StorageError;
use crate::message::Message;
use crate::storage::KeyValueStorage;

pub const CONVERSATION_KEY: &str = "conversation";
pub const HISTORY_KEY: &str = "history";

/// Generation counter bumped on every reset. Anything started under an older
/// generation (a pending reply, a reveal) must not land in the new conversation.
#[derive(Clone, Debug, Default)]
pub struct Epoch(Arc<AtomicU64>);

impl Epoch {
    pub fn current(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }

    fn advance(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SendTicket {
    epoch: u64,
}

pub struct ConversationStore<S: KeyValueStorage> {
    storage: S,
    messages: Vec<Message>,
    history: Vec<String>,
    epoch: Epoch,
}

impl<S: KeyValueStorage> ConversationStore<S> {
    /// Reads both snapshot entries. Missing or unparseable entries start empty.
    pub fn load(storage: S) -> Self {
        let messages: Vec<Message> = read_json(&storage, CONVERSATION_KEY);
        let history: Vec<String> = read_json(&storage, HISTORY_KEY);
        debug!("Loaded {} messages and {} history entries", messages.len(), history.len());
        Self { storage, messages, history, epoch: Epoch::default() }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Most recent first.
    pub fn history(&self) -> &[String] {
        &self.history
    }

    pub fn epoch(&self) -> Epoch {
        self.epoch.clone()
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn append(&mut self, message: Message) -> Result<(), StorageError> {
        self.messages.push(message);
        write_json(&mut self.storage, CONVERSATION_KEY, &self.messages).inspect_err(|_| {
            self.messages.pop();
        })
    }

    pub fn append_history_entry(&mut self, text: impl Into<String>) -> Result<(), StorageError> {
        self.history.insert(0, text.into());
        write_json(&mut self.storage, HISTORY_KEY, &self.history).inspect_err(|_| {
            self.history.remove(0);
        })
    }

    pub fn clear_history(&mut self) -> Result<(), StorageError> {
        self.storage.remove(HISTORY_KEY)?;
        self.history.clear();
        Ok(())
    }

    /// Clears both lists and invalidates every outstanding [`SendTicket`].
    pub fn reset(&mut self) -> Result<(), StorageError> {
        let epoch = self.epoch.advance();
        debug!("Conversation reset, epoch {}", epoch);
        write_json(&mut self.storage, CONVERSATION_KEY, &Vec::<Message>::new())?;
        self.messages.clear();
        self.clear_history()
    }

    pub fn begin_send(&self) -> SendTicket {
        SendTicket { epoch: self.epoch.current() }
    }

    /// Appends a reply obtained under `ticket`. Returns `false` when a reset
    /// happened in between and the reply was dropped.
    pub fn complete_send(&mut self, ticket: SendTicket, reply: Message) -> Result<bool, StorageError> {
        if ticket.epoch != self.epoch.current() {
            warn!("Dropping reply from epoch {} after reset", ticket.epoch);
            return Ok(false);
        }
        self.append(reply)?;
        Ok(true)
    }
}

fn read_json<S: KeyValueStorage, T: DeserializeOwned + Default>(storage: &S, key: &str) -> T {
    let Some(raw) = storage.get(key) else {
        return T::default();
    };
    serde_json::from_str(&raw).unwrap_or_else(|e| {
        warn!("Stored '{}' is corrupt, starting empty: {}", key, e);
        T::default()
    })
}

fn write_json<S: KeyValueStorage, T: Serialize + ?Sized>(storage: &mut S, key: &str, value: &T) -> Result<(), StorageError> {
    let json = serde_json::to_string(value).map_err(|source| StorageError::Serialize {
        key: key.to_string(),
        source,
    })?;
    storage.set(key, &json)
}
