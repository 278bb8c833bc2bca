pub mod client;
pub mod consumer;
pub mod dead_letter_producer;
pub mod traits;

pub use client::{NatsClient, NatsJetStreamPublisher};
pub use consumer::{BatchProcessor, NatsConsumer, ProcessingResult};
pub use dead_letter_producer::NatsDeadLetterPublisher;
pub use traits::JetStreamPublisher;

#[cfg(any(test, feature = "testing"))]
pub use traits::MockJetStreamPublisher;
