//! Interface boundary of the wrapped debugger engine.
//!
//! The engine is a synchronous, single-threaded collaborator: every method
//! of every trait here is called exclusively from the worker thread that
//! owns the [`Engine`] value. The only part that crosses threads is the
//! [`Broadcaster`] wake-up handle, which the engine's event facility must
//! make safe to signal from anywhere.

use std::time::Duration;

/// Outcome of one interpreter command: a success flag plus either the
/// textual result or the textual error, chosen by the flag. Engine-reported
/// failure is data, never a Rust error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutcome {
    pub success: bool,
    pub output: String,
}

/// Result of a completion request against the engine interpreter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// Candidate list. Element 0 is the interpreter's common-match slot: an
    /// empty string there means element 0 reports an exact full match.
    Matches(Vec<String>),
    /// The interpreter saw a history-repeat token instead of a completable
    /// line.
    HistoryRepeat,
}

/// Identity of an event source (a broadcaster) as reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceId(pub u64);

/// An event delivered by a [`Listener`], tagged with its originating
/// broadcaster.
pub trait BroadcastEvent {
    fn source(&self) -> SourceId;
}

/// Signalling side of the engine's event facility.
///
/// Cloned into caller threads and used as the out-of-band wake-up channel
/// for queued commands, so one listener wait multiplexes submissions and
/// engine notifications without polling either.
pub trait Broadcaster: Clone + Send + Sync + 'static {
    fn id(&self) -> SourceId;

    /// Deliver one wake-up event to every subscribed listener.
    fn broadcast(&self);
}

/// Receiving side of the engine's event facility. One listener multiplexes
/// every broadcaster subscribed to it.
pub trait Listener {
    type Event: BroadcastEvent;

    /// Block until an event arrives or `timeout` expires.
    fn wait_for_event(&mut self, timeout: Duration) -> Option<Self::Event>;

    /// Non-blocking fetch of the next queued event originating from
    /// `source`.
    fn next_event_for(&mut self, source: SourceId) -> Option<Self::Event>;
}

/// A debug target as exposed by the engine. Handles are cheap engine
/// references; a clone refers to the same underlying target.
pub trait Target: Clone {
    type Process;
    type Listener;

    fn is_valid(&self) -> bool;

    /// The live process of this target, if any.
    fn process(&self) -> Option<Self::Process>;

    /// Subscribe breakpoint-change notifications on `listener` and return
    /// the source under which they will be delivered.
    fn listen_breakpoint_changes(&self, listener: &mut Self::Listener) -> SourceId;
}

/// A debuggee process as exposed by the engine.
pub trait Process: Clone {
    type Listener;

    fn is_valid(&self) -> bool;

    /// Subscribe state-change notifications on `listener` and return the
    /// source under which they will be delivered.
    fn listen_state_changes(&self, listener: &mut Self::Listener) -> SourceId;

    /// Kill the process. The handle (and every clone of it) becomes
    /// invalid.
    fn destroy(&self);
}

/// The wrapped debugger engine.
pub trait Engine: Send + 'static {
    type Event: BroadcastEvent;
    type Listener: Listener<Event = Self::Event> + Send + 'static;
    type Interrupter: Broadcaster;
    type Target: Target<Process = Self::Process, Listener = Self::Listener> + Send + 'static;
    type Process: Process<Listener = Self::Listener> + Send + 'static;

    /// Create the worker's listener.
    fn create_listener(&mut self, name: &str) -> Self::Listener;

    /// Create a broadcaster already subscribed on `listener`, used as the
    /// wake-up channel for queued commands.
    fn create_interrupter(
        &mut self,
        name: &str,
        listener: &mut Self::Listener,
    ) -> Self::Interrupter;

    /// The currently selected target. The handle may be invalid; callers
    /// check [`Target::is_valid`].
    fn selected_target(&mut self) -> Option<Self::Target>;

    /// Submit one line to the command interpreter.
    fn exec(&mut self, line: &str) -> CommandOutcome;

    /// Completion candidates for `line` with the cursor at byte `pos`. The
    /// engine chooses the result size cap.
    fn complete(&mut self, line: &str, pos: usize) -> Completion;

    /// Release the engine. No other method may be called afterwards.
    fn terminate(&mut self);
}
