use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("Failed to load library {path}: {reason}")]
    LibraryLoad { path: PathBuf, reason: String },

    #[error("Symbol not found in engine library: {0}")]
    SymbolMissing(String),

    #[error("Renderer creation failed")]
    RendererCreation,

    #[error("Engine initialization failed ({0:?})")]
    InitFailed(ResultCode),

    #[error("Engine not initialized")]
    NotInitialized,

    #[error("No free view slot")]
    NoFreeSlot,

    #[error("View creation failed")]
    ViewCreation,

    #[error("Virtual file system is full ({0} entries)")]
    VfsFull(usize),

    #[error("Invalid or destroyed view handle")]
    InvalidHandle,

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Worker thread is gone")]
    WorkerGone,

    #[error("Failed to spawn worker thread: {0}")]
    WorkerSpawn(std::io::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Integer result codes. These are the only failure representation that crosses the worker
/// boundary and the C ABI. Every failure is negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ResultCode {
    Ok = 0,
    NoFreeSlot = -1,
    LibraryLoad = -2,
    RendererCreation = -10,
    ViewCreation = -11,
    WorkerSpawn = -20,
    NotInitialized = -30,
    InvalidHandle = -40,
    VfsFull = -60,
    InvalidArgument = -70,
    WorkerGone = -80,
    Io = -90,
    SymbolMissing = -100,
}

impl ResultCode {
    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn from_code(code: i32) -> Option<Self> {
        let rc = match code {
            0 => ResultCode::Ok,
            -1 => ResultCode::NoFreeSlot,
            -2 => ResultCode::LibraryLoad,
            -10 => ResultCode::RendererCreation,
            -11 => ResultCode::ViewCreation,
            -20 => ResultCode::WorkerSpawn,
            -30 => ResultCode::NotInitialized,
            -40 => ResultCode::InvalidHandle,
            -60 => ResultCode::VfsFull,
            -70 => ResultCode::InvalidArgument,
            -80 => ResultCode::WorkerGone,
            -90 => ResultCode::Io,
            -100 => ResultCode::SymbolMissing,
            _ => return None,
        };
        Some(rc)
    }

    /// Initialization failures are fatal for the whole subsystem.
    pub fn is_init_failure(self) -> bool {
        matches!(
            self,
            ResultCode::LibraryLoad | ResultCode::SymbolMissing | ResultCode::RendererCreation
        )
    }

    /// Host-side error for a code received from the worker.
    pub fn into_error(self) -> BridgeError {
        match self {
            ResultCode::NoFreeSlot => BridgeError::NoFreeSlot,
            ResultCode::ViewCreation => BridgeError::ViewCreation,
            ResultCode::NotInitialized => BridgeError::NotInitialized,
            ResultCode::InvalidHandle => BridgeError::InvalidHandle,
            ResultCode::InvalidArgument => BridgeError::InvalidArgument("rejected by worker".into()),
            ResultCode::WorkerGone | ResultCode::WorkerSpawn => BridgeError::WorkerGone,
            other => BridgeError::InitFailed(other),
        }
    }
}

impl From<&BridgeError> for ResultCode {
    fn from(err: &BridgeError) -> Self {
        match err {
            BridgeError::LibraryLoad { .. } => ResultCode::LibraryLoad,
            BridgeError::SymbolMissing(_) => ResultCode::SymbolMissing,
            BridgeError::RendererCreation => ResultCode::RendererCreation,
            BridgeError::InitFailed(code) => *code,
            BridgeError::NotInitialized => ResultCode::NotInitialized,
            BridgeError::NoFreeSlot => ResultCode::NoFreeSlot,
            BridgeError::ViewCreation => ResultCode::ViewCreation,
            BridgeError::VfsFull(_) => ResultCode::VfsFull,
            BridgeError::InvalidHandle => ResultCode::InvalidHandle,
            BridgeError::InvalidUrl(_) | BridgeError::InvalidArgument(_) => ResultCode::InvalidArgument,
            BridgeError::WorkerGone => ResultCode::WorkerGone,
            BridgeError::WorkerSpawn(_) => ResultCode::WorkerSpawn,
            BridgeError::Io(_) | BridgeError::Serialization(_) => ResultCode::Io,
        }
    }
}
