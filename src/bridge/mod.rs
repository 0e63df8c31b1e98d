//! Public face of the bridge: operations, submission handle, worker spawn.

use crate::config::BridgeConfig;
use crate::engine::{Broadcaster, Engine};
use crate::error::Error;
use crate::host::{BufferId, EditorHost, RefreshScope, Renderer};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Sender, SyncSender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use strum_macros::IntoStaticStr;

mod classify;
mod complete;
mod dispatch;

use dispatch::DispatchLoop;

/// One unit of work requested by a caller, executed on the worker thread.
///
/// Argument strings are forwarded to the engine interpreter verbatim, in
/// the engine's own sub-command syntax.
#[derive(Debug, Clone, PartialEq, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum Operation {
    /// Sentinel: terminate the worker.
    Exit,
    /// `frame <args>`.
    Frame(String),
    /// `thread <args>`.
    Thread(String),
    /// `process <args>`.
    Process(String),
    /// `target <args>`.
    Target(String),
    /// `breakpoint <args>`.
    Breakpoint(String),
    /// Re-render the disassembly region for a new query.
    Disassemble(String),
    /// Toggle a breakpoint at a source line.
    BreakSwitch { buffer: BufferId, line: u32 },
    /// Any interpreter command with pre-tokenized arguments.
    Command {
        command: String,
        arguments: Vec<String>,
    },
    /// Complete the partial token `arg` of `line` with the cursor at `pos`.
    Complete {
        arg: String,
        line: String,
        pos: usize,
    },
    /// Refresh editor display state.
    Refresh {
        follow_pc: bool,
        scope: RefreshScope,
    },
}

impl Operation {
    fn name(&self) -> &'static str {
        self.into()
    }
}

/// Value posted back to a synchronous caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Candidates(Vec<String>),
}

/// A queued operation plus its optional result slot.
pub(crate) struct Envelope {
    pub(crate) op: Operation,
    pub(crate) reply_tx: Option<SyncSender<Option<Reply>>>,
}

/// Thread-safe submission handle for one debugger session.
///
/// The handle may be shared freely between caller threads; the engine it
/// wraps is only ever touched by the worker spawned in [`Bridge::spawn`].
/// Dropping the handle terminates the session.
pub struct Bridge<E: Engine> {
    queue_tx: Sender<Envelope>,
    interrupter: E::Interrupter,
    terminated: Arc<AtomicBool>,
    worker: Mutex<Option<JoinHandle<()>>>,
    sync_timeout: Option<Duration>,
}

impl<E: Engine> Bridge<E> {
    /// Spawn the worker thread and hand it exclusive ownership of `engine`,
    /// `editor` and `renderer`.
    pub fn spawn<H, R>(
        mut engine: E,
        editor: H,
        renderer: R,
        config: BridgeConfig,
    ) -> io::Result<Self>
    where
        H: EditorHost,
        R: Renderer<E::Target>,
    {
        let mut listener = engine.create_listener("lldbridge-listener");
        let interrupter = engine.create_interrupter("lldbridge-interrupter", &mut listener);
        let (queue_tx, queue_rx) = mpsc::channel();
        let terminated = Arc::new(AtomicBool::new(false));

        let worker = thread::Builder::new().name("lldbridge-worker".to_string()).spawn({
            let terminated = Arc::clone(&terminated);
            let interrupt_source = interrupter.id();
            let config = config.clone();
            move || {
                DispatchLoop::new(
                    engine,
                    listener,
                    interrupt_source,
                    queue_rx,
                    editor,
                    renderer,
                    config,
                    terminated,
                )
                .run()
            }
        })?;

        Ok(Self {
            queue_tx,
            interrupter,
            terminated,
            worker: Mutex::new(Some(worker)),
            sync_timeout: config.sync_timeout(),
        })
    }

    /// Enqueue `op` for execution on the worker and signal the interrupt
    /// channel once.
    ///
    /// With `sync` the caller blocks on a dedicated single-slot result
    /// channel until the worker posts the operation's value; `None` means
    /// the operation produced no value or panicked. Without `sync` the call
    /// returns `None` immediately after enqueueing.
    ///
    /// After the session terminated the call is a no-op returning `None`.
    pub fn submit(&self, op: Operation, sync: bool) -> Option<Reply> {
        let name = op.name();
        if self.terminated.load(Ordering::Acquire) {
            log::error!(target: "bridge", "{}; dropped `{name}` call", Error::TerminatedSession);
            return None;
        }

        let (envelope, reply_rx) = if sync {
            let (tx, rx) = mpsc::sync_channel(1);
            let envelope = Envelope {
                op,
                reply_tx: Some(tx),
            };
            (envelope, Some(rx))
        } else {
            (Envelope { op, reply_tx: None }, None)
        };

        if self.queue_tx.send(envelope).is_err() {
            // the worker exited before the terminated flag was observed
            log::error!(target: "bridge", "{}; dropped `{name}` call", Error::TerminatedSession);
            return None;
        }
        self.interrupter.broadcast();

        let reply_rx = reply_rx?;
        match self.sync_timeout {
            // a dead worker drops the result slot, releasing the caller
            None => reply_rx.recv().ok().flatten(),
            Some(timeout) => match reply_rx.recv_timeout(timeout) {
                Ok(reply) => reply,
                Err(_) => {
                    log::warn!(target: "bridge", "no reply to `{name}` within {timeout:?}");
                    None
                }
            },
        }
    }

    /// Fire-and-forget execution of one interpreter command.
    pub fn execute(&self, command: &str, arguments: &[&str]) {
        let op = Operation::Command {
            command: command.to_string(),
            arguments: arguments.iter().map(ToString::to_string).collect(),
        };
        self.submit(op, false);
    }

    /// Completion candidates for `line` with the cursor at `pos`, `arg`
    /// being the partial token under completion. Blocks until the worker
    /// answers.
    pub fn complete(&self, arg: &str, line: &str, pos: usize) -> Vec<String> {
        let op = Operation::Complete {
            arg: arg.to_string(),
            line: line.to_string(),
            pos,
        };
        match self.submit(op, true) {
            Some(Reply::Candidates(candidates)) => candidates,
            _ => Vec::new(),
        }
    }

    /// Request a display refresh.
    pub fn refresh(&self, follow_pc: bool, scope: RefreshScope) {
        self.submit(Operation::Refresh { follow_pc, scope }, false);
    }

    /// True once the worker released the engine.
    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::Acquire)
    }

    /// Submit the exit sentinel and wait for the worker to finish.
    ///
    /// Subsequent submissions fail with a logged
    /// [`Error::TerminatedSession`]; a repeated call is a no-op.
    pub fn submit_exit(&self) {
        let Some(worker) = self.worker.lock().unwrap().take() else {
            return;
        };
        // send and broadcast may both fail if the worker already
        // self-terminated; joining is all that is left to do then
        _ = self.queue_tx.send(Envelope {
            op: Operation::Exit,
            reply_tx: None,
        });
        self.interrupter.broadcast();
        _ = worker.join();
    }
}

impl<E: Engine> Drop for Bridge<E> {
    fn drop(&mut self) {
        self.submit_exit();
    }
}
