use thiserror::Error;

/// Configuration and validation failures surfaced to callers.
///
/// Everything else (broken table files, offsets past the end, device
/// faults) is an invariant violation or a fatal device condition and
/// panics; the engine carries no transactional state to unwind. Callers
/// needing recovery validate inputs before calling in.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("engine was already initialized")]
    AlreadyInitialized,
    #[error("unsupported curve: {0}")]
    UnsupportedCurve(String),
    #[error("unsupported backend: {0}")]
    UnsupportedBackend(String),
    #[error("element byte width {0} is out of range (expected 1..=32)")]
    InvalidElementWidth(usize),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}
