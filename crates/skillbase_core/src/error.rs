use thiserror::Error;

/// Errors from the object model, codecs, and transport framing.
#[derive(Debug, Error)]
pub enum GitError {
    /// The requested object is not stored.
    #[error("object {0} not found")]
    ObjectNotFound(String),

    /// A string failed to parse as a 40 hex digit object id.
    #[error("invalid object id: {0:?}")]
    InvalidObjectId(String),

    /// Stored bytes do not hash back to their recorded id.
    #[error("corrupt object {oid}: {reason}")]
    CorruptObject {
        /// The id the object was stored under.
        oid: String,
        /// What went wrong when re-reading it.
        reason: String,
    },

    /// An object payload does not follow its kind's encoding.
    #[error("malformed {kind} object: {reason}")]
    MalformedObject {
        /// Object kind being parsed.
        kind: &'static str,
        /// Parse failure detail.
        reason: String,
    },

    /// A pkt-line frame or negotiation line violates the protocol grammar.
    #[error("invalid protocol request: {0}")]
    Protocol(String),

    /// The requested closure walk touched more objects than permitted.
    #[error("object closure exceeds the configured cap of {0} objects")]
    ClosureTooLarge(usize),

    /// The backing store failed while serving an object.
    #[error("storage error: {0}")]
    Storage(String),

    /// Compression or decompression I/O failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl GitError {
    pub(crate) fn malformed(kind: &'static str, reason: impl Into<String>) -> Self {
        GitError::MalformedObject {
            kind,
            reason: reason.into(),
        }
    }
}
