use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum DockError {
    #[error("hardware error: {0}")]
    Hardware(String),
    #[error("hardware fault: {0}")]
    HardwareFault(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("timeout waiting for hardware")]
    Timeout,
    #[error("invalid state: {0}")]
    State(String),
    #[error("store error: {0}")]
    Store(String),
    #[error("upload queue error: {0}")]
    Queue(String),
    #[error("upload failed: {0}")]
    Upload(String),
    #[error("io error: {0}")]
    Io(String),
}

impl DockError {
    /// Stable name of the variant, used to recognise repeats of the same failure kind.
    pub fn kind(&self) -> &'static str {
        match self {
            DockError::Hardware(_) => "Hardware",
            DockError::HardwareFault(_) => "HardwareFault",
            DockError::Config(_) => "Config",
            DockError::Timeout => "Timeout",
            DockError::State(_) => "State",
            DockError::Store(_) => "Store",
            DockError::Queue(_) => "Queue",
            DockError::Upload(_) => "Upload",
            DockError::Io(_) => "Io",
        }
    }
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
