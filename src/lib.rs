pub mod bridge;
pub mod command;
pub mod config;
pub mod engine;
pub mod errors;
pub mod ffi;
pub mod input;
pub mod logging;
pub mod messages;
pub mod pixels;
pub mod queue;
pub mod slot;
pub mod tick;
pub mod ui;
pub mod vfs;
pub mod viewport;
mod worker;

pub use bridge::Bridge;
pub use config::{BridgeConfig, BridgeConfigError, QueueLimits};
pub use engine::{Engine, EngineFactory, EngineHooks};
pub use errors::{BridgeError, ResultCode};
pub use input::{KeyEvent, KeyEventKind, Modifiers, MouseButton, MouseEvent, MouseEventKind, ScrollEvent, ScrollEventKind};
pub use pixels::PixelUpdate;
pub use slot::{PendingContent, ViewHandle};
pub use tick::TickReport;
pub use ui::{parse_message, HtmlView, InputSample};
pub use viewport::Viewport;
