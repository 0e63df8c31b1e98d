//! The dispatch loop: single worker execution context owning the engine.

use super::classify::{FrameVerb, ProcessVerb, TargetVerb, ThreadVerb};
use super::complete::filter_candidates;
use super::{Envelope, Operation, Reply};
use crate::config::BridgeConfig;
use crate::engine::{
    BroadcastEvent, CommandOutcome, Completion, Engine, Listener, Process, SourceId, Target,
};
use crate::error::Error;
use crate::host::{
    BufferId, EditorHost, MessageLevel, RefreshScope, Renderer, BREAKPOINTS_REGION,
    DISASSEMBLY_REGION,
};
use crate::weak_error;
use itertools::Itertools;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use strum_macros::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
enum LoopState {
    Running,
    Terminating,
    Terminated,
}

/// A memoized engine handle plus the source its notifications arrive under.
struct Cached<H> {
    handle: H,
    source: SourceId,
}

/// The worker state machine. Owns the engine, the listener, the handle
/// cache and both outbound collaborators; nothing here is shared with
/// caller threads except the terminated flag.
pub(crate) struct DispatchLoop<E: Engine, H, R> {
    engine: E,
    listener: E::Listener,
    interrupt_source: SourceId,
    queue_rx: Receiver<Envelope>,
    editor: H,
    renderer: R,
    config: BridgeConfig,
    terminated: Arc<AtomicBool>,
    target: Option<Cached<E::Target>>,
    process: Option<Cached<E::Process>>,
    idle: u32,
    state: LoopState,
}

impl<E, H, R> DispatchLoop<E, H, R>
where
    E: Engine,
    H: EditorHost,
    R: Renderer<E::Target>,
{
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        engine: E,
        listener: E::Listener,
        interrupt_source: SourceId,
        queue_rx: Receiver<Envelope>,
        editor: H,
        renderer: R,
        config: BridgeConfig,
        terminated: Arc<AtomicBool>,
    ) -> Self {
        Self {
            engine,
            listener,
            interrupt_source,
            queue_rx,
            editor,
            renderer,
            config,
            terminated,
            target: None,
            process: None,
            idle: 0,
            state: LoopState::Running,
        }
    }

    /// Multiplex the interrupt channel and engine notifications until an
    /// exit sentinel or the idle barrier, then release the engine.
    pub(crate) fn run(mut self) {
        log::info!(target: "bridge", "dispatch loop {}", self.state);

        while self.state == LoopState::Running {
            match self.listener.wait_for_event(self.config.wait_budget()) {
                Some(event) => self.on_event(event),
                None => self.on_timeout(),
            }
        }

        self.engine.terminate();
        self.terminated.store(true, Ordering::Release);
        self.state = LoopState::Terminated;
        log::info!(target: "bridge", "dispatch loop {}", self.state);
    }

    fn on_event(&mut self, event: E::Event) {
        let source = event.source();
        // coalesce everything else this broadcaster has queued up
        while self.listener.next_event_for(source).is_some() {}

        if source == self.interrupt_source {
            self.drain_queue();
        } else if self.target.as_ref().map(|c| c.source) == Some(source) {
            self.update_buffers(true, &RefreshScope::Region(BREAKPOINTS_REGION.to_string()));
        } else if self.process.as_ref().map(|c| c.source) == Some(source) {
            self.update_buffers(true, &RefreshScope::All);
        } else {
            // subscription of a handle that has since been replaced
            log::debug!(target: "bridge", "event from stale source {source:?}");
        }
    }

    fn on_timeout(&mut self) {
        self.idle += 1;
        if self.idle > self.config.idle_ceiling {
            log::error!(target: "bridge", "{}", Error::IdleBarrier(self.idle));
            self.state = LoopState::Terminating;
        }
    }

    /// Execute queued envelopes in FIFO order until the queue is empty.
    ///
    /// Interrupt wake-ups are at-least-once per enqueue and may have been
    /// coalesced, so the pop count is decoupled from the wake-up count; an
    /// interrupt that finds nothing queued is a benign race.
    fn drain_queue(&mut self) {
        let mut processed = 0usize;
        loop {
            let Ok(Envelope { op, reply_tx }) = self.queue_rx.try_recv() else {
                if processed == 0 {
                    log::info!(target: "bridge", "{}", Error::EmptyQueue);
                }
                return;
            };
            processed += 1;

            if op == Operation::Exit {
                log::info!(target: "bridge", "exit requested");
                self.state = LoopState::Terminating;
                return;
            }

            log::debug!(target: "bridge", "executing `{}`", op.name());
            let reply = match panic::catch_unwind(AssertUnwindSafe(|| self.execute(op))) {
                Ok(reply) => reply,
                Err(payload) => {
                    // a single bad command must not kill the session
                    let defect = Error::HandlerDefect(panic_message(payload.as_ref()));
                    log::error!(target: "bridge", "{defect}");
                    if defect.is_fatal() {
                        self.state = LoopState::Terminating;
                        return;
                    }
                    None
                }
            };
            if let Some(reply_tx) = reply_tx {
                _ = reply_tx.send(reply);
            }
        }
    }

    fn execute(&mut self, op: Operation) -> Option<Reply> {
        match op {
            Operation::Exit => unreachable!("sentinel is consumed by the queue drain"),
            Operation::Frame(args) => {
                self.do_frame(&args);
                None
            }
            Operation::Thread(args) => {
                self.do_thread(&args);
                None
            }
            Operation::Process(args) => {
                self.do_process(&args);
                None
            }
            Operation::Target(args) => {
                self.do_target(&args);
                None
            }
            Operation::Breakpoint(args) => {
                self.do_breakpoint(&args);
                None
            }
            Operation::Disassemble(args) => {
                self.do_disassemble(&args);
                None
            }
            Operation::BreakSwitch { buffer, line } => {
                self.do_breakswitch(buffer, line);
                None
            }
            Operation::Command { command, arguments } => {
                self.exec_command(&command, &arguments.join(" "));
                None
            }
            Operation::Complete { arg, line, pos } => {
                Some(Reply::Candidates(self.complete_command(&arg, &line, pos)))
            }
            Operation::Refresh { follow_pc, scope } => {
                self.update_buffers(follow_pc, &scope);
                None
            }
        }
    }

    /// The currently selected target, revalidated lazily. A fresh handle is
    /// cached and its breakpoint-change notifications subscribed on the
    /// loop's listener. Valid for the current iteration only.
    fn current_target(&mut self) -> Option<E::Target> {
        if let Some(cached) = &self.target {
            if cached.handle.is_valid() {
                return Some(cached.handle.clone());
            }
        }

        let target = self.engine.selected_target()?;
        if !target.is_valid() {
            return None;
        }
        let source = target.listen_breakpoint_changes(&mut self.listener);
        self.target = Some(Cached {
            handle: target.clone(),
            source,
        });
        Some(target)
    }

    /// The live process of the current target, revalidated lazily and
    /// subscribed to state-change notifications. Valid for the current
    /// iteration only.
    fn current_process(&mut self) -> Option<E::Process> {
        if let Some(cached) = &self.process {
            if cached.handle.is_valid() {
                return Some(cached.handle.clone());
            }
        }

        let process = self.current_target()?.process()?;
        if !process.is_valid() {
            return None;
        }
        let source = process.listen_state_changes(&mut self.listener);
        self.process = Some(Cached {
            handle: process.clone(),
            source,
        });
        Some(process)
    }

    /// Run one interpreter command, returning the engine's verdict.
    fn command_result(&mut self, command: &str, args: &str) -> CommandOutcome {
        let outcome = self.engine.exec(&format!("{command} {args}"));
        if !outcome.success {
            log::debug!(target: "bridge", "{}", Error::CommandFailure(outcome.output.clone()));
        }
        outcome
    }

    /// Run one interpreter command and surface its output to the user.
    fn exec_command(&mut self, command: &str, args: &str) {
        let outcome = self.command_result(command, args);
        if !outcome.success {
            self.editor.message(&outcome.output, MessageLevel::Error);
        } else if !outcome.output.is_empty() {
            self.editor.message(&outcome.output, MessageLevel::Info);
        }
    }

    /// Forward a refresh request to the renderer, resolving the target and
    /// lending it an engine-command callback for the duration of the call.
    fn update_buffers(&mut self, follow_pc: bool, scope: &RefreshScope) {
        let target = self.current_target();

        let engine = &mut self.engine;
        let mut commander =
            |command: &str, args: &str| -> CommandOutcome { engine.exec(&format!("{command} {args}")) };

        let result = match scope {
            RefreshScope::Default => self.renderer.update_all(
                target.as_ref(),
                &mut commander,
                follow_pc,
                &[BREAKPOINTS_REGION],
            ),
            RefreshScope::All => {
                self.renderer
                    .update_all(target.as_ref(), &mut commander, follow_pc, &[])
            }
            RefreshScope::Region(region) => {
                self.renderer
                    .update_region(region, target.as_ref(), &mut commander)
            }
        };
        weak_error!(result);
    }

    fn do_frame(&mut self, args: &str) {
        self.exec_command("frame", args);
        if FrameVerb::classify(args) == FrameVerb::Select {
            self.update_buffers(true, &RefreshScope::Default);
        }
    }

    fn do_thread(&mut self, args: &str) {
        self.exec_command("thread", args);
        if ThreadVerb::classify(args) == ThreadVerb::Select {
            self.update_buffers(true, &RefreshScope::Default);
        }
    }

    /// A launch replaces any live process; other sub-commands pass through.
    fn do_process(&mut self, args: &str) {
        match ProcessVerb::classify(args) {
            ProcessVerb::Launch => {
                if let Some(process) = self.current_process() {
                    process.destroy();
                }

                let outcome = self.command_result("process", args);
                if !outcome.success {
                    let text = format!("Error during launch: {}", outcome.output);
                    self.editor.message(&text, MessageLevel::Error);
                    return;
                }
                // pick up the fresh process and its state notifications
                self.current_process();
                self.editor.message(&outcome.output, MessageLevel::Info);
            }
            ProcessVerb::Other => self.exec_command("process", args),
        }
    }

    fn do_target(&mut self, args: &str) {
        let outcome = self.command_result("target", args);
        if !outcome.success {
            self.editor.message(&outcome.output, MessageLevel::Error);
        } else {
            if TargetVerb::classify(args) == TargetVerb::Delete {
                self.update_buffers(true, &RefreshScope::All);
            }
            self.editor.message(&outcome.output, MessageLevel::Info);
        }
        // the selected target may have changed under the cache
        self.current_target();
    }

    fn do_disassemble(&mut self, args: &str) {
        self.renderer.set_disassembly_query(args);
        self.update_buffers(true, &RefreshScope::Region(DISASSEMBLY_REGION.to_string()));
    }

    /// Toggle a breakpoint at `(buffer, line)`: delete every breakpoint
    /// registered there, or set a new one resolved via the buffer's file
    /// path.
    fn do_breakswitch(&mut self, buffer: BufferId, line: u32) {
        let args = match self.renderer.breakpoints_at(buffer, line) {
            Some(ids) if !ids.is_empty() => format!("delete {}", ids.iter().join(" ")),
            _ => {
                let Some(path) = self.editor.buffer_path(buffer) else {
                    let text = format!("no file path for buffer {buffer}");
                    self.editor.message(&text, MessageLevel::Error);
                    return;
                };
                format!("set -f {} -l {}", path.display(), line)
            }
        };
        self.do_breakpoint(&args);
    }

    fn do_breakpoint(&mut self, args: &str) {
        self.exec_command("breakpoint", args);
    }

    fn complete_command(&mut self, arg: &str, line: &str, pos: usize) -> Vec<String> {
        match self.engine.complete(line, pos) {
            // history expansion is not completable
            Completion::HistoryRepeat => Vec::new(),
            Completion::Matches(candidates) => filter_candidates(arg, candidates),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "opaque panic payload".to_string()
    }
}
