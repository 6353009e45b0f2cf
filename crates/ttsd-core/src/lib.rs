//! Shared types for the TTS coordinator workspace.
//!
//! Every other crate depends on this one for the error taxonomy, the
//! speech/session vocabulary, and the tagged event types exchanged between
//! the coordinator and its clients.

pub mod error;
pub mod events;
pub mod policy;
pub mod speech;

pub use error::{Result, TtsError, TTS_OK};
pub use events::{ExtendedEvents, ManagerEvent, SessionEvent};
pub use policy::ResourceAllocationPolicy;
pub use speech::{SpeechItem, SpeechState};
