//! Commands sent from the calling thread to the worker, and their replies.
//!
//! Every command travels with a oneshot reply channel. The caller waits on that channel, so a
//! command has been fully executed by the time the caller resumes.

use crate::errors::ResultCode;
use crate::pixels::{PixelUpdate, RawFrame};
use crate::slot::{PendingContent, ViewHandle};
use crate::tick::TickReport;
use tokio::sync::oneshot;

#[derive(Debug)]
pub enum Command {
    /// Creates the engine. Sent once, right after the worker starts.
    Init,
    /// Creates a view and primes it before replying.
    CreateView { width: u32, height: u32 },
    /// Creates a view and replies immediately. Content loads over the next ticks.
    CreateViewAsync { width: u32, height: u32, content: PendingContent },
    /// Creates a view and starts loading in the same round trip. Painting waits for the next tick.
    CreateWithContent { width: u32, height: u32, content: PendingContent },
    DestroyView { view: ViewHandle },
    /// Navigates an existing view.
    Load { view: ViewHandle, content: PendingContent },
    Tick,
    /// Runs a script right away and returns its result.
    Evaluate { view: ViewHandle, script: String },
    /// Copies the raw surface into `scratch` if it changed. `min_len` is the size of the
    /// caller's RGBA destination.
    CopyPixels { view: ViewHandle, min_len: usize, scratch: Vec<u8> },
    /// Destroys all views, drops the engine and stops the worker.
    Quit,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Init => "Init",
            Command::CreateView { .. } => "CreateView",
            Command::CreateViewAsync { .. } => "CreateViewAsync",
            Command::CreateWithContent { .. } => "CreateWithContent",
            Command::DestroyView { .. } => "DestroyView",
            Command::Load { .. } => "Load",
            Command::Tick => "Tick",
            Command::Evaluate { .. } => "Evaluate",
            Command::CopyPixels { .. } => "CopyPixels",
            Command::Quit => "Quit",
        }
    }
}

#[derive(Debug)]
pub enum Reply {
    Done,
    Created(ViewHandle),
    Tick(TickReport),
    Evaluated(Option<String>),
    /// `frame.bytes` always carries the scratch buffer back, filled only when `update` is
    /// [`PixelUpdate::Updated`].
    Pixels { update: PixelUpdate, frame: RawFrame },
    Failed(ResultCode),
}

impl Reply {
    pub fn code(&self) -> ResultCode {
        match self {
            Reply::Failed(code) => *code,
            _ => ResultCode::Ok,
        }
    }
}

/// A command plus the channel its reply goes to.
pub(crate) struct Envelope {
    pub command: Command,
    pub reply: oneshot::Sender<Reply>,
}

impl std::fmt::Debug for Envelope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Envelope").field("command", &self.command.name()).finish()
    }
}
