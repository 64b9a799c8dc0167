use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    /// Transient delivery failure on a channel. The callback dispatcher
    /// absorbs these into its per-replica queue; they never reach the
    /// caller of a notify.
    #[error("Communication fault: {0}")]
    CommunicationFault(String),

    #[error("Connection to master lost")]
    ConnectionLost,

    /// An entity was offered two different confirmed identifiers. This must
    /// never happen; it is a fatal defect, not a recoverable condition.
    #[error("Protocol inconsistency: {0}")]
    ProtocolInconsistency(String),

    /// The remote side answered a request with an error.
    #[error("Remote error: {0}")]
    Remote(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SyncError>;
