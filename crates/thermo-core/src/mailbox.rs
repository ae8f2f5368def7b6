//! Single-slot status buffer between the device link and the broadcast hub.
//!
//! The device side overwrites whatever is in the slot; the hub drains it once
//! per broadcast tick. There is no queue and no history: a reading that is
//! replaced before the hub gets to it is gone.

use parking_lot::Mutex;

/// Latest unconsumed controller status.
#[derive(Debug, Default)]
pub struct StatusMailbox {
    slot: Mutex<Option<String>>,
}

impl StatusMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value`, replacing any unread reading.
    ///
    /// Returns `true` when an unread value was displaced.
    pub fn set(&self, value: impl Into<String>) -> bool {
        self.slot.lock().replace(value.into()).is_some()
    }

    /// Take the current value and leave the slot empty.
    ///
    /// `None` means nothing arrived since the last take, which is distinct
    /// from an empty status string.
    pub fn take_if_present(&self) -> Option<String> {
        self.slot.lock().take()
    }

    pub fn is_empty(&self) -> bool {
        self.slot.lock().is_none()
    }

    /// Copy of the current value without consuming it.
    pub fn peek(&self) -> Option<String> {
        self.slot.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn starts_empty() {
        let mailbox = StatusMailbox::new();
        assert!(mailbox.is_empty());
        assert_eq!(mailbox.take_if_present(), None);
    }

    #[test]
    fn last_write_wins() {
        let mailbox = StatusMailbox::new();
        assert!(!mailbox.set("T=20.0"));
        assert!(mailbox.set("T=21.5"));
        assert_eq!(mailbox.take_if_present().as_deref(), Some("T=21.5"));
        assert_eq!(mailbox.take_if_present(), None);
    }

    #[test]
    fn take_clears_slot() {
        let mailbox = StatusMailbox::new();
        mailbox.set("T=24.1");
        assert_eq!(mailbox.take_if_present().as_deref(), Some("T=24.1"));
        assert!(mailbox.is_empty());
        assert_eq!(mailbox.take_if_present(), None);
    }

    #[test]
    fn empty_string_is_a_value() {
        let mailbox = StatusMailbox::new();
        mailbox.set("");
        assert_eq!(mailbox.take_if_present(), Some(String::new()));
        assert_eq!(mailbox.take_if_present(), None);
    }

    #[test]
    fn peek_does_not_consume() {
        let mailbox = StatusMailbox::new();
        mailbox.set("T=30.0");
        assert_eq!(mailbox.peek().as_deref(), Some("T=30.0"));
        assert_eq!(mailbox.take_if_present().as_deref(), Some("T=30.0"));
    }

    #[test]
    fn concurrent_writers_and_taker_never_duplicate() {
        let mailbox = Arc::new(StatusMailbox::new());
        let writers: Vec<_> = (0..4)
            .map(|w| {
                let mailbox = Arc::clone(&mailbox);
                std::thread::spawn(move || {
                    for i in 0..500 {
                        mailbox.set(format!("{w}-{i}"));
                    }
                })
            })
            .collect();

        let taker = {
            let mailbox = Arc::clone(&mailbox);
            std::thread::spawn(move || {
                let mut taken = Vec::new();
                for _ in 0..2000 {
                    if let Some(v) = mailbox.take_if_present() {
                        taken.push(v);
                    }
                }
                taken
            })
        };

        for w in writers {
            w.join().unwrap();
        }
        let mut taken = taker.join().unwrap();
        if let Some(rest) = mailbox.take_if_present() {
            taken.push(rest);
        }

        let mut unique = taken.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), taken.len());
        assert!(!taken.is_empty());
        assert!(mailbox.is_empty());
    }
}
