//! Agent memory
//!
//! Conversation history and user feedback, both persisted through the
//! key/value state store.

pub mod feedback;
pub mod store;

pub use feedback::{FeedbackRecord, FeedbackStore};
pub use store::ConversationStore;
