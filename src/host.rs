//! Interface boundary of the editor host and the buffer/sign renderer.
//!
//! Both collaborators are owned by the worker thread; implementations
//! forward to the editor's RPC channel however they see fit.

use crate::engine::CommandOutcome;
use std::path::PathBuf;
use std::str::FromStr;
use strum_macros::{Display, EnumString};

/// Editor buffer number.
pub type BufferId = u32;

/// Breakpoint identifier assigned by the engine.
pub type BreakpointId = u32;

/// Severity of a user-visible editor message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum MessageLevel {
    Info,
    Error,
}

impl MessageLevel {
    /// Parse an editor-supplied severity name, defaulting to `Error` for
    /// anything unrecognized.
    pub fn parse_lossy(raw: &str) -> Self {
        Self::from_str(raw).unwrap_or(MessageLevel::Error)
    }
}

/// Scope of one display refresh request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshScope {
    /// Every display region except breakpoint signs.
    Default,
    /// Every display region, breakpoint signs included.
    All,
    /// Exactly one named display region.
    Region(String),
}

/// Display region holding breakpoint signs, excluded from default
/// refreshes.
pub const BREAKPOINTS_REGION: &str = "breakpoints";

/// Display region holding the disassembly view.
pub const DISASSEMBLY_REGION: &str = "disassembly";

/// Engine-command callback handed to the renderer so it can query debugger
/// state while redrawing. Valid for the duration of one refresh call only.
pub type Commander<'a> = &'a mut dyn FnMut(&str, &str) -> CommandOutcome;

/// The editor side of the bridge.
pub trait EditorHost: Send + 'static {
    /// Show a message to the user.
    fn message(&self, text: &str, level: MessageLevel);

    /// Absolute path of the file loaded in `buffer`.
    fn buffer_path(&self, buffer: BufferId) -> Option<PathBuf>;
}

/// Renderer of debugger state into editor buffers and signs.
///
/// Also the owner of the breakpoint-location index, which the bridge reads
/// (never writes) when toggling breakpoints.
pub trait Renderer<T>: Send + 'static {
    /// Redraw every display region except those in `exclude`.
    fn update_all(
        &mut self,
        target: Option<&T>,
        commander: Commander<'_>,
        follow_pc: bool,
        exclude: &[&str],
    ) -> anyhow::Result<()>;

    /// Redraw a single named display region.
    fn update_region(
        &mut self,
        region: &str,
        target: Option<&T>,
        commander: Commander<'_>,
    ) -> anyhow::Result<()>;

    /// Remember the argument string for subsequent disassembly redraws.
    fn set_disassembly_query(&mut self, args: &str);

    /// Breakpoint ids registered at `(buffer, line)`, if any.
    fn breakpoints_at(&self, buffer: BufferId, line: u32) -> Option<Vec<BreakpointId>>;
}
