//! Scripted engine, editor and renderer doubles for bridge tests.

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use lldbridge::bridge::Bridge;
use lldbridge::config::BridgeConfig;
use lldbridge::engine::{
    BroadcastEvent, Broadcaster, CommandOutcome, Completion, Engine, Listener, Process, SourceId,
    Target,
};
use lldbridge::host::{
    BreakpointId, BufferId, Commander, EditorHost, MessageLevel, Renderer,
};

static NEXT_SOURCE: AtomicU64 = AtomicU64::new(1);

fn fresh_source() -> SourceId {
    SourceId(NEXT_SOURCE.fetch_add(1, Ordering::Relaxed))
}

#[derive(Debug, Clone)]
pub struct MockEvent {
    source: SourceId,
}

impl BroadcastEvent for MockEvent {
    fn source(&self) -> SourceId {
        self.source
    }
}

pub struct MockListener {
    tx: Sender<MockEvent>,
    rx: Receiver<MockEvent>,
    pending: VecDeque<MockEvent>,
}

impl Listener for MockListener {
    type Event = MockEvent;

    fn wait_for_event(&mut self, timeout: Duration) -> Option<MockEvent> {
        if let Some(event) = self.pending.pop_front() {
            return Some(event);
        }
        self.rx.recv_timeout(timeout).ok()
    }

    fn next_event_for(&mut self, source: SourceId) -> Option<MockEvent> {
        while let Ok(event) = self.rx.try_recv() {
            self.pending.push_back(event);
        }
        let idx = self.pending.iter().position(|e| e.source == source)?;
        self.pending.remove(idx)
    }
}

#[derive(Clone)]
pub struct MockBroadcaster {
    source: SourceId,
    tx: Sender<MockEvent>,
}

impl Broadcaster for MockBroadcaster {
    fn id(&self) -> SourceId {
        self.source
    }

    fn broadcast(&self) {
        // the worker may already be gone
        _ = self.tx.send(MockEvent {
            source: self.source,
        });
    }
}

#[derive(Default)]
pub struct ProcessState {
    pub valid: AtomicBool,
    pub destroyed: AtomicBool,
    pub subscriptions: AtomicU32,
    pub subscription: Mutex<Option<MockBroadcaster>>,
}

#[derive(Clone, Default)]
pub struct MockProcess {
    pub state: Arc<ProcessState>,
}

impl MockProcess {
    pub fn new_valid() -> Self {
        let process = Self::default();
        process.state.valid.store(true, Ordering::SeqCst);
        process
    }

    /// Emit one state-change notification, if anyone subscribed.
    pub fn notify_state_changed(&self) {
        if let Some(broadcaster) = &*self.state.subscription.lock().unwrap() {
            broadcaster.broadcast();
        }
    }
}

impl Process for MockProcess {
    type Listener = MockListener;

    fn is_valid(&self) -> bool {
        self.state.valid.load(Ordering::SeqCst)
    }

    fn listen_state_changes(&self, listener: &mut MockListener) -> SourceId {
        let broadcaster = MockBroadcaster {
            source: fresh_source(),
            tx: listener.tx.clone(),
        };
        let source = broadcaster.id();
        self.state.subscriptions.fetch_add(1, Ordering::SeqCst);
        *self.state.subscription.lock().unwrap() = Some(broadcaster);
        source
    }

    fn destroy(&self) {
        self.state.destroyed.store(true, Ordering::SeqCst);
        self.state.valid.store(false, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct TargetState {
    pub valid: AtomicBool,
    pub subscriptions: AtomicU32,
    pub subscription: Mutex<Option<MockBroadcaster>>,
    pub process: Mutex<Option<MockProcess>>,
}

#[derive(Clone, Default)]
pub struct MockTarget {
    pub state: Arc<TargetState>,
}

impl MockTarget {
    pub fn new_valid(process: Option<MockProcess>) -> Self {
        let target = Self::default();
        target.state.valid.store(true, Ordering::SeqCst);
        *target.state.process.lock().unwrap() = process;
        target
    }

    /// Emit one breakpoint-change notification, if anyone subscribed.
    pub fn notify_breakpoint_changed(&self) {
        if let Some(broadcaster) = &*self.state.subscription.lock().unwrap() {
            broadcaster.broadcast();
        }
    }
}

impl Target for MockTarget {
    type Process = MockProcess;
    type Listener = MockListener;

    fn is_valid(&self) -> bool {
        self.state.valid.load(Ordering::SeqCst)
    }

    fn process(&self) -> Option<MockProcess> {
        self.state.process.lock().unwrap().clone()
    }

    fn listen_breakpoint_changes(&self, listener: &mut MockListener) -> SourceId {
        let broadcaster = MockBroadcaster {
            source: fresh_source(),
            tx: listener.tx.clone(),
        };
        let source = broadcaster.id();
        self.state.subscriptions.fetch_add(1, Ordering::SeqCst);
        *self.state.subscription.lock().unwrap() = Some(broadcaster);
        source
    }
}

/// Shared view into the engine double, kept by the test after the engine
/// itself moved onto the worker thread.
pub struct EngineProbe {
    /// Every interpreter line, in execution order.
    pub commands: Mutex<Vec<String>>,
    /// Scripted outcomes, matched by line prefix; unmatched lines succeed
    /// with empty output.
    pub responses: Mutex<Vec<(String, CommandOutcome)>>,
    /// Process installed on the target by the next successful launch.
    pub on_launch: Mutex<Option<MockProcess>>,
    pub completion: Mutex<Completion>,
    pub target: Mutex<Option<MockTarget>>,
    pub interrupter: Mutex<Option<MockBroadcaster>>,
    pub terminate_calls: AtomicU32,
    pub terminated: AtomicBool,
}

impl Default for EngineProbe {
    fn default() -> Self {
        Self {
            commands: Mutex::new(Vec::new()),
            responses: Mutex::new(Vec::new()),
            on_launch: Mutex::new(None),
            completion: Mutex::new(Completion::Matches(Vec::new())),
            target: Mutex::new(None),
            interrupter: Mutex::new(None),
            terminate_calls: AtomicU32::new(0),
            terminated: AtomicBool::new(false),
        }
    }
}

impl EngineProbe {
    pub fn script(&self, prefix: &str, success: bool, output: &str) {
        self.responses.lock().unwrap().push((
            prefix.to_string(),
            CommandOutcome {
                success,
                output: output.to_string(),
            },
        ));
    }

    pub fn executed(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }

    /// Raise a wake-up with no queued command behind it.
    pub fn spurious_interrupt(&self) {
        if let Some(interrupter) = &*self.interrupter.lock().unwrap() {
            interrupter.broadcast();
        }
    }
}

pub struct MockEngine {
    pub probe: Arc<EngineProbe>,
}

impl Engine for MockEngine {
    type Event = MockEvent;
    type Listener = MockListener;
    type Interrupter = MockBroadcaster;
    type Target = MockTarget;
    type Process = MockProcess;

    fn create_listener(&mut self, _name: &str) -> MockListener {
        let (tx, rx) = channel();
        MockListener {
            tx,
            rx,
            pending: VecDeque::new(),
        }
    }

    fn create_interrupter(
        &mut self,
        _name: &str,
        listener: &mut MockListener,
    ) -> MockBroadcaster {
        let broadcaster = MockBroadcaster {
            source: fresh_source(),
            tx: listener.tx.clone(),
        };
        *self.probe.interrupter.lock().unwrap() = Some(broadcaster.clone());
        broadcaster
    }

    fn selected_target(&mut self) -> Option<MockTarget> {
        self.probe.target.lock().unwrap().clone()
    }

    fn exec(&mut self, line: &str) -> CommandOutcome {
        assert!(
            !self.probe.terminated.load(Ordering::SeqCst),
            "engine used after terminate"
        );
        self.probe.commands.lock().unwrap().push(line.to_string());

        let outcome = self
            .probe
            .responses
            .lock()
            .unwrap()
            .iter()
            .find(|(prefix, _)| line.starts_with(prefix.as_str()))
            .map(|(_, outcome)| outcome.clone())
            .unwrap_or(CommandOutcome {
                success: true,
                output: String::new(),
            });

        if outcome.success && line.starts_with("process la") {
            if let Some(fresh) = self.probe.on_launch.lock().unwrap().take() {
                if let Some(target) = &*self.probe.target.lock().unwrap() {
                    *target.state.process.lock().unwrap() = Some(fresh);
                }
            }
        }
        outcome
    }

    fn complete(&mut self, _line: &str, _pos: usize) -> Completion {
        self.probe.completion.lock().unwrap().clone()
    }

    fn terminate(&mut self) {
        self.probe.terminate_calls.fetch_add(1, Ordering::SeqCst);
        self.probe.terminated.store(true, Ordering::SeqCst);
    }
}

#[derive(Clone, Default)]
pub struct RecordingEditor {
    pub messages: Arc<Mutex<Vec<(MessageLevel, String)>>>,
}

impl RecordingEditor {
    pub fn received(&self) -> Vec<(MessageLevel, String)> {
        self.messages.lock().unwrap().clone()
    }
}

impl EditorHost for RecordingEditor {
    fn message(&self, text: &str, level: MessageLevel) {
        self.messages.lock().unwrap().push((level, text.to_string()));
    }

    fn buffer_path(&self, buffer: BufferId) -> Option<PathBuf> {
        Some(PathBuf::from(format!("/work/src/buf{buffer}.rs")))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Refresh {
    All {
        follow_pc: bool,
        exclude: Vec<String>,
    },
    Region(String),
}

#[derive(Clone, Default)]
pub struct RecordingRenderer {
    pub refreshes: Arc<Mutex<Vec<Refresh>>>,
    pub breakpoint_index: Arc<Mutex<HashMap<(BufferId, u32), Vec<BreakpointId>>>>,
    pub disassembly_query: Arc<Mutex<Option<String>>>,
    pub panic_on_next_update: Arc<AtomicBool>,
}

impl RecordingRenderer {
    pub fn recorded(&self) -> Vec<Refresh> {
        self.refreshes.lock().unwrap().clone()
    }

    pub fn forget(&self) {
        self.refreshes.lock().unwrap().clear();
    }
}

impl Renderer<MockTarget> for RecordingRenderer {
    fn update_all(
        &mut self,
        _target: Option<&MockTarget>,
        _commander: Commander<'_>,
        follow_pc: bool,
        exclude: &[&str],
    ) -> anyhow::Result<()> {
        if self.panic_on_next_update.swap(false, Ordering::SeqCst) {
            panic!("renderer defect injected");
        }
        self.refreshes.lock().unwrap().push(Refresh::All {
            follow_pc,
            exclude: exclude.iter().map(ToString::to_string).collect(),
        });
        Ok(())
    }

    fn update_region(
        &mut self,
        region: &str,
        _target: Option<&MockTarget>,
        _commander: Commander<'_>,
    ) -> anyhow::Result<()> {
        self.refreshes
            .lock()
            .unwrap()
            .push(Refresh::Region(region.to_string()));
        Ok(())
    }

    fn set_disassembly_query(&mut self, args: &str) {
        *self.disassembly_query.lock().unwrap() = Some(args.to_string());
    }

    fn breakpoints_at(&self, buffer: BufferId, line: u32) -> Option<Vec<BreakpointId>> {
        self.breakpoint_index
            .lock()
            .unwrap()
            .get(&(buffer, line))
            .cloned()
    }
}

pub struct Harness {
    pub bridge: Bridge<MockEngine>,
    pub probe: Arc<EngineProbe>,
    pub editor: RecordingEditor,
    pub renderer: RecordingRenderer,
}

pub fn harness() -> Harness {
    harness_with(BridgeConfig::default(), None)
}

pub fn harness_with(config: BridgeConfig, target: Option<MockTarget>) -> Harness {
    let probe = Arc::new(EngineProbe::default());
    *probe.target.lock().unwrap() = target;

    let engine = MockEngine {
        probe: Arc::clone(&probe),
    };
    let editor = RecordingEditor::default();
    let renderer = RecordingRenderer::default();
    let bridge = Bridge::spawn(engine, editor.clone(), renderer.clone(), config)
        .expect("spawn bridge worker");

    Harness {
        bridge,
        probe,
        editor,
        renderer,
    }
}

/// Poll `pred` until it holds or `timeout` expires.
pub fn wait_until(timeout: Duration, mut pred: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if pred() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    pred()
}
