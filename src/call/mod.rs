//! Call session orchestration
//!
//! Ties the audio pipeline, the session contract and the transcript together
//! behind a single state machine.

pub mod config;
pub mod event;
pub mod orchestrator;
pub mod state;

pub use config::CallConfig;
pub use event::CallEvent;
pub use orchestrator::{CallCollaborators, CallHandle, CallSession};
pub use state::{CallState, CallStateSnapshot, CallStatus, CallUpdate, SharedCallState};
