//! Cosmetic character-by-character display of a reply that is already complete.

use std::io::{self, Write};
use std::time::Duration;
use crate::store::Epoch;

pub struct Reveal {
    interval: Duration,
    epoch: Epoch,
    started_at: u64,
}

impl Reveal {
    /// Captures the current epoch; a reset after this point cancels the reveal.
    pub fn new(interval: Duration, epoch: Epoch) -> Self {
        let started_at = epoch.current();
        Self { interval, epoch, started_at }
    }

    pub fn is_cancelled(&self) -> bool {
        self.epoch.current() != self.started_at
    }

    /// Writes `text` one visible character at a time. ANSI escape sequences are
    /// written without delay. Returns `false` if cancelled before the end.
    pub fn run<W: Write>(&self, text: &str, out: &mut W) -> io::Result<bool> {
        let mut in_escape = false;
        let mut buf = [0u8; 4];
        for c in text.chars() {
            if self.is_cancelled() {
                return Ok(false);
            }
            out.write_all(c.encode_utf8(&mut buf).as_bytes())?;

            if c == '\x1b' {
                in_escape = true;
                continue;
            }
            if in_escape {
                in_escape = !c.is_ascii_alphabetic();
                continue;
            }

            out.flush()?;
            if !self.interval.is_zero() {
                std::thread::sleep(self.interval);
            }
        }
        out.flush()?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use crate::store::ConversationStore;

    #[test]
    fn writes_full_text_when_not_cancelled() {
        let store = ConversationStore::load(MemoryStorage::new());
        let mut out = Vec::new();
        let done = Reveal::new(Duration::ZERO, store.epoch()).run("hi there", &mut out).unwrap();
        assert!(done);
        assert_eq!(String::from_utf8(out).unwrap(), "hi there");
    }

    #[test]
    fn reset_cancels_reveal() {
        let mut store = ConversationStore::load(MemoryStorage::new());
        let reveal = Reveal::new(Duration::ZERO, store.epoch());
        store.reset().unwrap();
        let mut out = Vec::new();
        assert!(!reveal.run("never shown", &mut out).unwrap());
        assert!(out.is_empty());
    }

    #[test]
    fn reset_from_another_thread_stops_midway() {
        let mut store = ConversationStore::load(MemoryStorage::new());
        let reveal = Reveal::new(Duration::from_millis(5), store.epoch());
        let text = "x".repeat(1000);

        let handle = std::thread::spawn(move || {
            let mut out = Vec::new();
            let done = reveal.run(&text, &mut out).unwrap();
            (done, out.len())
        });
        std::thread::sleep(Duration::from_millis(50));
        store.reset().unwrap();

        let (done, written) = handle.join().unwrap();
        assert!(!done);
        assert!(written < 1000);
    }

    #[test]
    fn escape_sequences_pass_through_whole() {
        let store = ConversationStore::load(MemoryStorage::new());
        let mut out = Vec::new();
        Reveal::new(Duration::ZERO, store.epoch()).run("\x1b[1mbold\x1b[0m", &mut out).unwrap();
        assert_eq!(out, b"\x1b[1mbold\x1b[0m");
    }
}
