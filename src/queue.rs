//! Bounded queues shared between the calling thread and the worker.
//!
//! Input queues are [`BoundedQueue`]s: the caller pushes without blocking and the worker drains
//! the whole queue once per tick. When a queue is full the newest item is dropped.
//!
//! [`MessageQueue`] carries text from the page back to the caller (native messages and console
//! lines). It is written by the worker and polled by the caller.

use std::collections::VecDeque;
use std::sync::Mutex;

/// What happens when a message is pushed into a full [`MessageQueue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
    /// Keep what is queued and drop the new message.
    #[default]
    RejectNewest,
    /// Drop the oldest queued message to make room.
    EvictOldest,
}

/// What happens when a message exceeds the maximum length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OversizePolicy {
    Reject,
    /// Cut the message at the last char boundary that fits.
    Truncate,
}

/// FIFO with a fixed capacity that drops new items once full.
#[derive(Debug)]
pub struct BoundedQueue<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> BoundedQueue<T> {
    pub fn new(capacity: usize) -> Self {
        Self { items: VecDeque::with_capacity(capacity), capacity }
    }

    /// Returns false when the queue is full and `item` was dropped.
    pub fn push(&mut self, item: T) -> bool {
        if self.items.len() >= self.capacity {
            return false;
        }
        self.items.push_back(item);
        true
    }

    /// Takes every queued item in insertion order.
    pub fn drain(&mut self) -> Vec<T> {
        self.items.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

/// Cuts `s` to at most `max` bytes without splitting a character.
pub fn truncate_utf8(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Text queue from the page to the caller.
#[derive(Debug)]
pub struct MessageQueue {
    inner: Mutex<VecDeque<String>>,
    capacity: usize,
    max_len: usize,
    overflow: OverflowPolicy,
    oversize: OversizePolicy,
}

impl MessageQueue {
    pub fn new(capacity: usize, max_len: usize, overflow: OverflowPolicy, oversize: OversizePolicy) -> Self {
        Self {
            inner: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            max_len,
            overflow,
            oversize,
        }
    }

    /// Queues `msg`. Returns false if it was dropped. Empty messages are ignored.
    pub fn push(&self, msg: &str) -> bool {
        if msg.is_empty() {
            return false;
        }

        let msg = if msg.len() > self.max_len {
            match self.oversize {
                OversizePolicy::Reject => {
                    log::debug!("message of {} bytes exceeds limit of {}", msg.len(), self.max_len);
                    return false;
                }
                OversizePolicy::Truncate => truncate_utf8(msg, self.max_len),
            }
        } else {
            msg
        };

        let mut q = self.lock();
        if q.len() >= self.capacity {
            match self.overflow {
                OverflowPolicy::RejectNewest => {
                    log::debug!("message queue full ({} entries), dropping new message", q.len());
                    return false;
                }
                OverflowPolicy::EvictOldest => {
                    q.pop_front();
                }
            }
        }
        q.push_back(msg.to_owned());
        true
    }

    /// Next message, or `None` when the queue is empty. Never blocks on the worker.
    pub fn pop(&self) -> Option<String> {
        self.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<String>> {
        // A poisoned queue still holds valid strings.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounded_queue_drops_newest() {
        let mut q = BoundedQueue::new(3);
        for i in 0..5 {
            let accepted = q.push(i);
            assert_eq!(accepted, i < 3);
        }
        assert_eq!(q.drain(), vec![0, 1, 2]);
        assert!(q.is_empty());
        assert!(q.push(9));
    }

    #[test]
    fn reject_newest_keeps_first_messages() {
        let q = MessageQueue::new(2, 16, OverflowPolicy::RejectNewest, OversizePolicy::Reject);
        assert!(q.push("a"));
        assert!(q.push("b"));
        assert!(!q.push("c"));
        assert_eq!(q.pop().as_deref(), Some("a"));
        assert_eq!(q.pop().as_deref(), Some("b"));
        assert_eq!(q.pop(), None);
    }

    #[test]
    fn evict_oldest_keeps_latest_messages() {
        let q = MessageQueue::new(2, 16, OverflowPolicy::EvictOldest, OversizePolicy::Truncate);
        q.push("a");
        q.push("b");
        assert!(q.push("c"));
        assert_eq!(q.pop().as_deref(), Some("b"));
        assert_eq!(q.pop().as_deref(), Some("c"));
    }

    #[test]
    fn oversize_handling() {
        let strict = MessageQueue::new(4, 4, OverflowPolicy::RejectNewest, OversizePolicy::Reject);
        assert!(!strict.push("hello"));
        assert!(strict.push("hell"));

        let lenient = MessageQueue::new(4, 2, OverflowPolicy::EvictOldest, OversizePolicy::Truncate);
        // 'é' occupies bytes 1..3 and straddles the cut
        assert!(lenient.push("h\u{e9}llo"));
        assert_eq!(lenient.pop().as_deref(), Some("h"));
    }

    #[test]
    fn empty_messages_are_ignored() {
        let q = MessageQueue::new(4, 4, OverflowPolicy::RejectNewest, OversizePolicy::Reject);
        assert!(!q.push(""));
        assert!(q.is_empty());
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_utf8("abc", 10), "abc");
        assert_eq!(truncate_utf8("\u{1F600}x", 3), "");
        assert_eq!(truncate_utf8("ab\u{1F600}", 5), "ab");
    }
}
