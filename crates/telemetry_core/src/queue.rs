use std::collections::{BTreeMap, HashMap, VecDeque};

use chrono::{DateTime, Duration, Utc};

use crate::envelope::content_fingerprint;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeadQueueConfig {
    /// Window within which an identical message body coalesces into the
    /// earlier enqueue.
    pub dedup_window: Duration,
    /// Unacknowledged deliveries become eligible for redelivery after this
    /// long.
    pub visibility_timeout: Duration,
}

impl Default for LeadQueueConfig {
    fn default() -> Self {
        Self {
            dedup_window: Duration::seconds(300),
            visibility_timeout: Duration::seconds(30),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Accepted { message_id: u64 },
    Deduplicated { original_message_id: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveredMessage {
    pub message_id: u64,
    pub group_key: String,
    pub body: String,
}

#[derive(Debug, Clone)]
struct PendingMessage {
    message_id: u64,
    body: String,
}

#[derive(Debug, Clone)]
struct InFlightDelivery {
    message_id: u64,
    delivered_at: DateTime<Utc>,
}

/// Ordered-per-key, content-deduplicating, at-least-once delivery channel.
///
/// Messages with the same group key deliver in enqueue order with at most
/// one delivery in flight per group (batch size one); groups are independent
/// of each other. A message leaves the queue only when acknowledged; callers
/// drive redelivery by invoking `release_expired` with the current time.
#[derive(Debug, Default)]
pub struct LeadQueue {
    config: LeadQueueConfig,
    next_message_id: u64,
    groups: BTreeMap<String, VecDeque<PendingMessage>>,
    in_flight: BTreeMap<String, InFlightDelivery>,
    recent_fingerprints: HashMap<String, (u64, DateTime<Utc>)>,
}

impl LeadQueue {
    pub fn new(config: LeadQueueConfig) -> Self {
        Self {
            config,
            next_message_id: 0,
            groups: BTreeMap::new(),
            in_flight: BTreeMap::new(),
            recent_fingerprints: HashMap::new(),
        }
    }

    pub fn enqueue(&mut self, group_key: &str, body: &str, now: DateTime<Utc>) -> EnqueueOutcome {
        self.recent_fingerprints.retain(|_, (_, enqueued_at)| {
            now.signed_duration_since(*enqueued_at) < self.config.dedup_window
        });

        let fingerprint = content_fingerprint(body);
        if let Some((original_message_id, _)) = self.recent_fingerprints.get(&fingerprint) {
            return EnqueueOutcome::Deduplicated {
                original_message_id: *original_message_id,
            };
        }

        let message_id = self.next_message_id;
        self.next_message_id += 1;
        self.groups
            .entry(group_key.to_string())
            .or_default()
            .push_back(PendingMessage {
                message_id,
                body: body.to_string(),
            });
        self.recent_fingerprints
            .insert(fingerprint, (message_id, now));

        EnqueueOutcome::Accepted { message_id }
    }

    /// Delivers at most one message; a group with an unacknowledged delivery
    /// is skipped so per-group order holds.
    pub fn receive(&mut self, now: DateTime<Utc>) -> Option<DeliveredMessage> {
        for (group_key, pending) in &self.groups {
            if self.in_flight.contains_key(group_key) {
                continue;
            }
            let Some(message) = pending.front() else {
                continue;
            };

            let delivered = DeliveredMessage {
                message_id: message.message_id,
                group_key: group_key.clone(),
                body: message.body.clone(),
            };
            self.in_flight.insert(
                group_key.clone(),
                InFlightDelivery {
                    message_id: message.message_id,
                    delivered_at: now,
                },
            );
            return Some(delivered);
        }
        None
    }

    /// Removes an in-flight message. Returns false for unknown or
    /// already-acknowledged ids, which makes duplicate acknowledgments safe.
    pub fn acknowledge(&mut self, message_id: u64) -> bool {
        let Some(group_key) = self
            .in_flight
            .iter()
            .find(|(_, delivery)| delivery.message_id == message_id)
            .map(|(group_key, _)| group_key.clone())
        else {
            return false;
        };

        self.in_flight.remove(&group_key);
        if let Some(pending) = self.groups.get_mut(&group_key) {
            if pending
                .front()
                .map(|message| message.message_id == message_id)
                .unwrap_or(false)
            {
                pending.pop_front();
            }
            if pending.is_empty() {
                self.groups.remove(&group_key);
            }
        }
        true
    }

    /// Returns expired in-flight deliveries to their groups for redelivery.
    pub fn release_expired(&mut self, now: DateTime<Utc>) -> usize {
        let expired: Vec<String> = self
            .in_flight
            .iter()
            .filter(|(_, delivery)| {
                now.signed_duration_since(delivery.delivered_at) >= self.config.visibility_timeout
            })
            .map(|(group_key, _)| group_key.clone())
            .collect();

        for group_key in &expired {
            self.in_flight.remove(group_key);
        }
        expired.len()
    }

    pub fn pending_messages(&self) -> usize {
        self.groups.values().map(VecDeque::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue() -> LeadQueue {
        LeadQueue::new(LeadQueueConfig::default())
    }

    fn expect_accepted(outcome: EnqueueOutcome) -> u64 {
        match outcome {
            EnqueueOutcome::Accepted { message_id } => message_id,
            EnqueueOutcome::Deduplicated { .. } => panic!("expected accepted enqueue"),
        }
    }

    #[test]
    fn delivers_same_group_in_enqueue_order() {
        let mut queue = queue();
        let now = Utc::now();
        queue.enqueue("s1", "first", now);
        queue.enqueue("s1", "second", now);

        let first = queue.receive(now).expect("first delivery");
        assert_eq!(first.body, "first");
        assert!(queue.acknowledge(first.message_id));

        let second = queue.receive(now).expect("second delivery");
        assert_eq!(second.body, "second");
        assert!(queue.acknowledge(second.message_id));
        assert!(queue.is_empty());
    }

    #[test]
    fn group_with_in_flight_delivery_is_skipped() {
        let mut queue = queue();
        let now = Utc::now();
        queue.enqueue("s1", "a1", now);
        queue.enqueue("s1", "a2", now);
        queue.enqueue("s2", "b1", now);

        let first = queue.receive(now).expect("delivery from s1");
        assert_eq!(first.group_key, "s1");

        let second = queue.receive(now).expect("delivery from other group");
        assert_eq!(second.group_key, "s2");

        assert_eq!(queue.receive(now), None);

        queue.acknowledge(first.message_id);
        let third = queue.receive(now).expect("next s1 delivery");
        assert_eq!(third.body, "a2");
    }

    #[test]
    fn identical_body_within_window_is_deduplicated() {
        let mut queue = queue();
        let now = Utc::now();
        let first_id = expect_accepted(queue.enqueue("s1", "same-lead", now));

        let outcome = queue.enqueue("s1", "same-lead", now + Duration::seconds(5));
        assert_eq!(
            outcome,
            EnqueueOutcome::Deduplicated {
                original_message_id: first_id
            }
        );
        assert_eq!(queue.pending_messages(), 1);
    }

    #[test]
    fn identical_body_after_window_is_accepted_again() {
        let mut queue = queue();
        let now = Utc::now();
        queue.enqueue("s1", "same-lead", now);

        let outcome = queue.enqueue("s1", "same-lead", now + Duration::seconds(301));
        assert!(matches!(outcome, EnqueueOutcome::Accepted { .. }));
        assert_eq!(queue.pending_messages(), 2);
    }

    #[test]
    fn different_bodies_are_not_deduplicated() {
        let mut queue = queue();
        let now = Utc::now();
        queue.enqueue("s1", "lead-a", now);
        queue.enqueue("s1", "lead-b", now);
        assert_eq!(queue.pending_messages(), 2);
    }

    #[test]
    fn unacknowledged_delivery_is_redelivered_after_visibility_timeout() {
        let mut queue = queue();
        let now = Utc::now();
        let message_id = expect_accepted(queue.enqueue("s1", "lead", now));

        let delivery = queue.receive(now).expect("first delivery");
        assert_eq!(delivery.message_id, message_id);

        assert_eq!(queue.release_expired(now + Duration::seconds(29)), 0);
        assert_eq!(queue.receive(now + Duration::seconds(29)), None);

        assert_eq!(queue.release_expired(now + Duration::seconds(31)), 1);
        let redelivered = queue
            .receive(now + Duration::seconds(31))
            .expect("redelivery");
        assert_eq!(redelivered.message_id, message_id);
        assert_eq!(redelivered.body, "lead");
    }

    #[test]
    fn acknowledge_unknown_message_is_rejected() {
        let mut queue = queue();
        assert!(!queue.acknowledge(99));
    }
}
