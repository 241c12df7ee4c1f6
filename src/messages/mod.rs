pub mod assembler;
pub mod storage;
pub mod types;

pub use assembler::TranscriptAssembler;
pub use storage::Transcript;
pub use types::{Speaker, TranscriptionEntry};
