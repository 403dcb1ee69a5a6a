//! Collaborator boundaries: source fetching, classification, action
//! dispatch, and notification delivery.

pub mod classifier;
pub mod dispatcher;
pub mod notifier;
pub mod source;

pub use classifier::{Classification, Classifier, LlmClassifier};
pub use dispatcher::{ActionDispatcher, BacktestDispatcher, DispatchOutcome};
pub use notifier::{ConversationNotifier, LogNotifier, NotificationSink};
pub use source::{HttpSourceFetcher, SourceFetcher, SourceItem};
