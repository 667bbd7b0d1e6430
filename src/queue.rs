//! The input side's message queue: a bounded FIFO that a backend's reader
//! thread/callback feeds and the application drains, plus the `Ignore`
//! flags that decide what never reaches the queue at all.

use std::collections::VecDeque;

use crate::bytes;
use crate::message::Message;

bitflags::bitflags! {
    /// Classes of incoming message a client can ask to have filtered out
    /// before they reach the queue or callback. Mirrors the legacy
    /// byte-valued enum, but as a proper flag set so combinations don't
    /// need their own named variant.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Ignore: u8 {
        const SYSEX         = 0x01;
        const TIME          = 0x02;
        const ACTIVE_SENSE  = 0x04;
    }
}

impl Ignore {
    /// Whether a raw status byte should be dropped under these flags.
    pub fn filters(self, status: u8) -> bool {
        if self.contains(Ignore::SYSEX) && bytes::is_sysex_msg(status) {
            return true;
        }
        if self.contains(Ignore::TIME) && status == bytes::MTC_QUARTER_FRAME {
            return true;
        }
        if self.contains(Ignore::ACTIVE_SENSE) && status == bytes::ACTIVE_SENSING {
            return true;
        }
        false
    }
}

/// A capacity-bounded FIFO of incoming [`Message`]s. When full, further
/// pushes are dropped and counted rather than blocking or growing
/// unbounded, since the producer is often a real-time or poll-driven
/// reader thread that cannot be allowed to stall.
pub struct InputQueue {
    messages: VecDeque<Message>,
    capacity: usize,
    dropped: u64,
}

impl InputQueue {
    pub fn new(capacity: usize) -> Self {
        InputQueue {
            messages: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
            dropped: 0,
        }
    }

    /// Attempts to enqueue `message`. Returns `false` and increments the
    /// drop count if the queue is already at capacity.
    pub fn push(&mut self, message: Message) -> bool {
        if self.messages.len() >= self.capacity {
            self.dropped += 1;
            return false;
        }
        self.messages.push_back(message);
        true
    }

    pub fn pop(&mut self) -> Option<Message> {
        self.messages.pop_front()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of messages discarded because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ignore_flags_filter_sysex_and_active_sense_but_not_notes() {
        let flags = Ignore::SYSEX | Ignore::ACTIVE_SENSE;
        assert!(flags.filters(bytes::SYSEX_START));
        assert!(flags.filters(bytes::ACTIVE_SENSING));
        assert!(!flags.filters(bytes::MTC_QUARTER_FRAME));
        assert!(!flags.filters(0x90));
    }

    #[test]
    fn queue_drops_and_counts_past_capacity() {
        let mut q = InputQueue::new(2);
        assert!(q.push(Message::new()));
        assert!(q.push(Message::new()));
        assert!(!q.push(Message::new()));
        assert_eq!(q.dropped(), 1);
        assert_eq!(q.len(), 2);
    }

    #[test]
    fn queue_pop_is_fifo() {
        let mut q = InputQueue::new(4);
        let mut a = Message::new();
        a.set_status(0x90);
        let mut b = Message::new();
        b.set_status(0x80);
        q.push(a.clone());
        q.push(b.clone());
        assert_eq!(q.pop(), Some(a));
        assert_eq!(q.pop(), Some(b));
        assert_eq!(q.pop(), None);
    }
}
