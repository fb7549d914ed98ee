use crate::db::models::MessageStatus;
use chrono::{DateTime, TimeDelta, Utc};
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

/// Cosmetic delays of the delivery indicator.
#[derive(Debug, Clone, Copy)]
pub struct StatusDelays {
    /// From `sending` to `sent`, counted from the append.
    pub sent: TimeDelta,
    /// From `delivered` to `read`, counted from the reply.
    pub read: TimeDelta,
}

impl Default for StatusDelays {
    fn default() -> Self {
        Self {
            sent: TimeDelta::milliseconds(500),
            read: TimeDelta::milliseconds(1000),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledTransition {
    pub due: DateTime<Utc>,
    seq: u64,
    pub conversation_id: String,
    pub message_id: String,
    pub target: MessageStatus,
}

impl Ord for ScheduledTransition {
    fn cmp(&self, other: &Self) -> Ordering {
        self.due.cmp(&other.due).then(self.seq.cmp(&other.seq))
    }
}

impl PartialOrd for ScheduledTransition {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Single source of delayed status transitions. Nothing fires on its own:
/// the owner drains due entries against its clock.
#[derive(Debug, Default)]
pub struct StatusScheduler {
    queue: BinaryHeap<Reverse<ScheduledTransition>>,
    next_seq: u64,
}

impl StatusScheduler {
    pub fn schedule(
        &mut self,
        due: DateTime<Utc>,
        conversation_id: &str,
        message_id: &str,
        target: MessageStatus,
    ) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.push(Reverse(ScheduledTransition {
            due,
            seq,
            conversation_id: conversation_id.to_string(),
            message_id: message_id.to_string(),
            target,
        }));
    }

    /// Remove and return every transition due at or before `now`, in
    /// due order (ties in scheduling order).
    pub fn drain_due(&mut self, now: DateTime<Utc>) -> Vec<ScheduledTransition> {
        let mut due = Vec::new();
        while let Some(Reverse(next)) = self.queue.peek() {
            if next.due > now {
                break;
            }
            if let Some(Reverse(item)) = self.queue.pop() {
                due.push(item);
            }
        }
        due
    }

    pub fn cancel_conversation(&mut self, conversation_id: &str) {
        self.queue
            .retain(|Reverse(item)| item.conversation_id != conversation_id);
    }

    pub fn next_due(&self) -> Option<DateTime<Utc>> {
        self.queue.peek().map(|Reverse(item)| item.due)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
