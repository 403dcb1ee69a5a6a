//! Shared data models spanning the engine layers.

pub mod event;
pub mod signal;

pub use event::{
    NewEvent, SignalEvent, Verdict, ACTION_DISPATCHED, ACTION_DISPATCH_FAILED,
    ACTION_NOTIFICATION_SENT,
};
pub use signal::{LifecycleState, NewSignal, Signal, SignalChanges};
