//! Bridge configuration.
//!
//! [`BridgeConfig`] controls the worker, the view slot table, the per-view queues and the
//! virtual file system. It provides defaults via [`Default`] and a fluent
//! [`BridgeConfig::builder()`] that validates the result.
//!
//! # Examples
//!
//! ```rust
//! use webview_bridge::BridgeConfig;
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let cfg = BridgeConfig::builder()
//!     .base_dir("assets")
//!     .max_views(4)
//!     .debug(true)
//!     .build()?;
//! assert_eq!(cfg.max_views, 4);
//! # Ok(()) }
//! ```
//!
//! # Queue limits
//!
//! Input queues (mouse, scroll, key, script) drop the newest event when full. The native
//! message queue rejects new messages when full, the console queue evicts the oldest one.
//! Both message policies can be changed with [`QueueLimits`].

use crate::queue::OverflowPolicy;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Capacity and overflow behavior of the per-view queues.
#[derive(Debug, Clone)]
pub struct QueueLimits {
    pub mouse: usize,
    pub scroll: usize,
    pub key: usize,
    /// Longest text (in bytes) carried by a key event. Longer text is cut at a char boundary.
    pub key_text_len: usize,
    pub script: usize,
    /// Longest script (in bytes) accepted by the script queue.
    pub script_len: usize,
    pub messages: usize,
    /// Longest native message (in bytes). Longer messages are refused.
    pub message_len: usize,
    pub message_overflow: OverflowPolicy,
    pub console: usize,
    /// Longest console line (in bytes). Longer lines are cut at a char boundary.
    pub console_len: usize,
    pub console_overflow: OverflowPolicy,
}

impl Default for QueueLimits {
    fn default() -> Self {
        Self {
            mouse: 64,
            scroll: 16,
            key: 32,
            key_text_len: 31,
            script: 32,
            script_len: 1023,
            messages: 64,
            message_len: 2047,
            message_overflow: OverflowPolicy::RejectNewest,
            console: 64,
            console_len: 2047,
            console_overflow: OverflowPolicy::EvictOldest,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Directory holding the engine libraries. Also the root of the VFS disk fallback.
    pub base_dir: PathBuf,
    /// Writes `bridge.log` (and the engine's own log) into `base_dir`.
    pub debug: bool,
    /// Overrides the location of the debug log.
    pub log_file: Option<PathBuf>,
    /// Size of the view slot table.
    pub max_views: usize,
    pub queues: QueueLimits,
    /// Maximum number of files registered in memory.
    pub vfs_capacity: usize,
    /// Record every VFS lookup (see [`Vfs::access_log`](crate::vfs::Vfs::access_log)).
    pub trace_vfs_access: bool,
    /// Ticks spent in `Priming` before an async view submits its content.
    pub priming_ticks: u32,
    /// Ticks spent in `ContentPending` before an async view becomes ready.
    pub content_ticks: u32,
    /// Update passes run by a synchronous create before the first render.
    pub prime_passes: u32,
    /// Update passes run after a navigation before the bindings are reinstalled.
    pub settle_passes: u32,
    /// Pause between settle passes.
    pub settle_interval: Duration,
    /// Drop the engine once the last view closes. It is created again on the next create.
    /// On by default.
    pub release_engine_when_idle: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("."),
            debug: false,
            log_file: None,
            max_views: 16,
            queues: QueueLimits::default(),
            vfs_capacity: 1024,
            trace_vfs_access: false,
            priming_ticks: 2,
            content_ticks: 3,
            prime_passes: 1,
            settle_passes: 20,
            settle_interval: Duration::from_millis(10),
            release_engine_when_idle: true,
        }
    }
}

impl BridgeConfig {
    pub fn builder() -> BridgeConfigBuilder {
        BridgeConfigBuilder::default()
    }

    /// Path of the bridge debug log.
    pub fn log_path(&self) -> PathBuf {
        self.log_file
            .clone()
            .unwrap_or_else(|| self.base_dir.join("bridge.log"))
    }
}

#[derive(Debug, Clone, Default)]
pub struct BridgeConfigBuilder {
    inner: BridgeConfig,
}

impl BridgeConfigBuilder {
    #[inline]
    fn map(mut self, f: impl FnOnce(&mut BridgeConfig)) -> Self {
        f(&mut self.inner);
        self
    }

    pub fn base_dir<P: Into<PathBuf>>(self, dir: P) -> Self { self.map(|c| c.base_dir = dir.into()) }
    pub fn debug(self, on: bool) -> Self { self.map(|c| c.debug = on) }
    pub fn log_file<P: Into<PathBuf>>(self, path: P) -> Self { self.map(|c| c.log_file = Some(path.into())) }
    pub fn max_views(self, n: usize) -> Self { self.map(|c| c.max_views = n) }
    pub fn queues(self, limits: QueueLimits) -> Self { self.map(|c| c.queues = limits) }
    pub fn vfs_capacity(self, n: usize) -> Self { self.map(|c| c.vfs_capacity = n) }
    pub fn trace_vfs_access(self, on: bool) -> Self { self.map(|c| c.trace_vfs_access = on) }
    pub fn priming_ticks(self, n: u32) -> Self { self.map(|c| c.priming_ticks = n) }
    pub fn content_ticks(self, n: u32) -> Self { self.map(|c| c.content_ticks = n) }
    pub fn prime_passes(self, n: u32) -> Self { self.map(|c| c.prime_passes = n) }
    pub fn settle_passes(self, n: u32) -> Self { self.map(|c| c.settle_passes = n) }
    pub fn settle_interval(self, d: Duration) -> Self { self.map(|c| c.settle_interval = d) }
    pub fn release_engine_when_idle(self, on: bool) -> Self { self.map(|c| c.release_engine_when_idle = on) }

    /// Apply multiple changes in one go.
    pub fn with(self, f: impl FnOnce(&mut BridgeConfig)) -> Self { self.map(f) }

    /// Validate and build the final config.
    pub fn build(self) -> Result<BridgeConfig, BridgeConfigError> {
        validate(&self.inner)?;
        Ok(self.inner)
    }
}

// ---------- Validation ----------

#[derive(Debug, Clone, PartialEq)]
pub enum BridgeConfigError {
    ZeroViews,
    ViewLimitTooLarge(usize),
    ZeroQueue(&'static str),
    ZeroPhaseTicks,
}

impl fmt::Display for BridgeConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BridgeConfigError::ZeroViews => write!(f, "max_views must be at least 1"),
            BridgeConfigError::ViewLimitTooLarge(n) =>
                write!(f, "max_views {n} does not fit in a view handle"),
            BridgeConfigError::ZeroQueue(name) => write!(f, "queue '{name}' must hold at least 1 entry"),
            BridgeConfigError::ZeroPhaseTicks => write!(f, "priming_ticks and content_ticks must be at least 1"),
        }
    }
}
impl std::error::Error for BridgeConfigError {}

fn validate(c: &BridgeConfig) -> Result<(), BridgeConfigError> {
    if c.max_views == 0 {
        return Err(BridgeConfigError::ZeroViews);
    }
    if c.max_views > i32::MAX as usize {
        return Err(BridgeConfigError::ViewLimitTooLarge(c.max_views));
    }
    let q = &c.queues;
    for (name, cap) in [
        ("mouse", q.mouse),
        ("scroll", q.scroll),
        ("key", q.key),
        ("script", q.script),
        ("messages", q.messages),
        ("console", q.console),
    ] {
        if cap == 0 {
            return Err(BridgeConfigError::ZeroQueue(name));
        }
    }
    if c.priming_ticks == 0 || c.content_ticks == 0 {
        return Err(BridgeConfigError::ZeroPhaseTicks);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_limits() {
        let cfg = BridgeConfig::default();
        assert_eq!(cfg.max_views, 16);
        assert_eq!(cfg.queues.mouse, 64);
        assert_eq!(cfg.queues.scroll, 16);
        assert_eq!(cfg.queues.key, 32);
        assert_eq!(cfg.queues.script, 32);
        assert_eq!(cfg.priming_ticks, 2);
        assert_eq!(cfg.content_ticks, 3);
        assert_eq!(cfg.queues.message_overflow, OverflowPolicy::RejectNewest);
        assert_eq!(cfg.queues.console_overflow, OverflowPolicy::EvictOldest);
    }

    #[test]
    fn builder_validates() {
        assert_eq!(
            BridgeConfig::builder().max_views(0).build().unwrap_err(),
            BridgeConfigError::ZeroViews
        );
        let err = BridgeConfig::builder()
            .with(|c| c.queues.scroll = 0)
            .build()
            .unwrap_err();
        assert_eq!(err, BridgeConfigError::ZeroQueue("scroll"));
        assert_eq!(
            BridgeConfig::builder().priming_ticks(0).build().unwrap_err(),
            BridgeConfigError::ZeroPhaseTicks
        );
    }

    #[test]
    fn log_path_defaults_to_base_dir() {
        let cfg = BridgeConfig::builder().base_dir("/tmp/ui").build().unwrap();
        assert_eq!(cfg.log_path(), PathBuf::from("/tmp/ui/bridge.log"));
        let cfg = BridgeConfig::builder().log_file("/var/log/b.log").build().unwrap();
        assert_eq!(cfg.log_path(), PathBuf::from("/var/log/b.log"));
    }
}
