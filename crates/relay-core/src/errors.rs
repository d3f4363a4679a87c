/// Core error type for the relay.
///
/// Adapter crates map their specific errors into this type so handlers can
/// turn any failure into a user-facing chat message.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// Source could not be fetched; the message is shown to the user as is.
    #[error("{0}")]
    Download(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("Upload stopped by admin command")]
    Cancelled,

    #[error("size mismatch: expected {expected} bytes, transferred {actual}")]
    SizeMismatch { expected: u64, actual: u64 },

    #[error("file too large: {size} bytes exceeds limit of {limit} bytes")]
    TooLarge { size: u64, limit: u64 },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("external error: {0}")]
    External(String),
}

impl Error {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
