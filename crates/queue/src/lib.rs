pub mod consumer;
pub mod error;
pub mod memory;
pub mod parser;
pub mod sqs;

pub use consumer::{MessageQueue, QueueMessage};
pub use error::QueueError;
pub use memory::InMemoryQueue;
pub use parser::{parse_body, value_as_text, MessageParams};
pub use sqs::SqsQueue;
