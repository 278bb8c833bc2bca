use crate::dead_letter::FailureStage;

/// Terminal disposition of one item within a processed message.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemDisposition {
    /// Written to the store (or already present with identical key).
    Persisted,
    /// Failed and its dead-letter envelope was delivered.
    DeadLettered { stage: FailureStage, reason: String },
    /// Failed and the dead-letter delivery itself failed. The item is in
    /// neither the store nor the DLQ; the message must not be acknowledged.
    Unroutable { stage: FailureStage, reason: String },
}

/// Overall verdict for one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeStatus {
    FullySucceeded,
    PartiallySucceeded,
    FullyFailed,
}

/// Per-message processing report returned to the intake/ack layer.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageOutcome {
    pub message_id: String,
    /// (item index, disposition); for whole-message intake failures a single
    /// entry at index 0 stands for the entire payload.
    pub items: Vec<(usize, ItemDisposition)>,
    pub status: OutcomeStatus,
}

impl MessageOutcome {
    pub fn new(message_id: String, items: Vec<(usize, ItemDisposition)>) -> Self {
        let persisted = items
            .iter()
            .filter(|(_, d)| matches!(d, ItemDisposition::Persisted))
            .count();
        let status = if persisted == items.len() && !items.is_empty() {
            OutcomeStatus::FullySucceeded
        } else if persisted > 0 {
            OutcomeStatus::PartiallySucceeded
        } else {
            OutcomeStatus::FullyFailed
        };
        Self {
            message_id,
            items,
            status,
        }
    }

    /// A message may be acknowledged only once every item is either persisted
    /// or dead-lettered. Any unroutable item forces redelivery.
    pub fn safe_to_acknowledge(&self) -> bool {
        self.items
            .iter()
            .all(|(_, d)| !matches!(d, ItemDisposition::Unroutable { .. }))
    }

    pub fn persisted_count(&self) -> usize {
        self.items
            .iter()
            .filter(|(_, d)| matches!(d, ItemDisposition::Persisted))
            .count()
    }

    pub fn dead_lettered_count(&self) -> usize {
        self.items
            .iter()
            .filter(|(_, d)| matches!(d, ItemDisposition::DeadLettered { .. }))
            .count()
    }
}
