//! Failure taxonomy of a bridge session.

/// Conditions observed by the submission entry points and the dispatch loop.
///
/// None of these is raised to a caller: submissions report failure by
/// returning `None`, engine-reported command failures are surfaced through
/// the editor, and the loop logs the rest. The enum exists so every
/// condition is logged under one auditable name.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Submission attempted after the worker released the engine.
    #[error("debugger session was terminated")]
    TerminatedSession,
    /// The engine interpreter reported failure for a command.
    #[error("command failed: {0}")]
    CommandFailure(String),
    /// A command handler panicked on the worker thread.
    #[error("handler defect: {0}")]
    HandlerDefect(String),
    /// The worker hit its idle ceiling and self-terminates.
    #[error("broke the loop barrier after {0} idle timeouts")]
    IdleBarrier(u32),
    /// An interrupt arrived for an already drained command queue.
    #[error("interrupt without a queued command")]
    EmptyQueue,
}

impl Error {
    /// Return a hint to the dispatch loop - terminate the session or keep going.
    pub fn is_fatal(&self) -> bool {
        match self {
            Error::TerminatedSession => false,
            Error::CommandFailure(_) => false,
            Error::HandlerDefect(_) => false,
            Error::EmptyQueue => false,

            Error::IdleBarrier(_) => true,
        }
    }
}
