//! Events consumed by the call's dispatch loop

use crate::session::SessionEvent;
use crate::Result;
use std::fmt;

/// Everything that can happen to a call, serialized onto one channel
pub enum CallEvent {
    /// The greeting request finished
    GreetingReady(Result<String>),

    /// The session reported something
    Session(SessionEvent),

    /// The frame source delivered a captured block
    CaptureFrame(Vec<f32>),

    /// The frame source broke after it was started
    CaptureFailed(String),

    /// The frame sink finished playing a chunk
    PlaybackComplete { chunk_id: u64 },

    /// The user hung up
    EndCall,
}

impl fmt::Debug for CallEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallEvent::GreetingReady(Ok(payload)) => {
                write!(f, "GreetingReady(Ok({} chars))", payload.len())
            }
            CallEvent::GreetingReady(Err(e)) => write!(f, "GreetingReady(Err({}))", e),
            CallEvent::Session(event) => f.debug_tuple("Session").field(event).finish(),
            CallEvent::CaptureFrame(samples) => {
                write!(f, "CaptureFrame({} samples)", samples.len())
            }
            CallEvent::CaptureFailed(reason) => {
                f.debug_tuple("CaptureFailed").field(reason).finish()
            }
            CallEvent::PlaybackComplete { chunk_id } => f
                .debug_struct("PlaybackComplete")
                .field("chunk_id", chunk_id)
                .finish(),
            CallEvent::EndCall => write!(f, "EndCall"),
        }
    }
}
