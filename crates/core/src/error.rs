//! Error types for the RTSP server library.

use std::fmt;

/// Errors that can occur in the RTSP server library.
///
/// Variants map to specific failure modes across the stack:
///
/// - **Protocol**: [`Parse`](Self::Parse) — malformed RTSP messages.
/// - **Transport**: [`Io`](Self::Io) — socket/network failures,
///   [`Interrupted`](Self::Interrupted) — a cancellable wait was woken
///   by the wakeup pipe rather than socket readiness.
/// - **Media**: [`PoolExhausted`](Self::PoolExhausted),
///   [`OversizeFrame`](Self::OversizeFrame),
///   [`PacketizerBufferTooSmall`](Self::PacketizerBufferTooSmall).
/// - **Server**: [`NotStarted`](Self::NotStarted),
///   [`AlreadyRunning`](Self::AlreadyRunning), [`NoFreeSlot`](Self::NoFreeSlot).
#[derive(Debug, thiserror::Error)]
pub enum RtspError {
    /// Underlying I/O or socket error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A [`CancellableSocket`](crate::cancellable_socket::CancellableSocket)
    /// wait was woken by its wakeup pipe rather than the watched socket
    /// becoming ready.
    #[error("wait interrupted by cancellation")]
    Interrupted,

    /// [`RtspServer::start`](crate::server::RtspServer::start) has not
    /// been called yet.
    #[error("server not started")]
    NotStarted,

    /// [`RtspServer::start`](crate::server::RtspServer::start) was
    /// called while already running.
    #[error("server already running")]
    AlreadyRunning,

    /// The fixed-size client slot table has no free entry.
    #[error("no free client slot")]
    NoFreeSlot,

    /// Failed to parse an RTSP request message (RFC 2326 §6).
    #[error("RTSP parse error: {kind}")]
    Parse { kind: ParseErrorKind },

    /// A [`HierarchyPool::acquire`](crate::pool::HierarchyPool::acquire)
    /// call found no free cell in either sub-pool for the requested size.
    #[error("buffer pool exhausted (requested {requested} bytes)")]
    PoolExhausted { requested: usize },

    /// An encoded access unit exceeded its destination buffer's fixed
    /// capacity.
    #[error("frame of {size} bytes exceeds capacity of {capacity} bytes")]
    OversizeFrame { size: usize, capacity: usize },

    /// A packetizer destination buffer was too small to hold even a
    /// minimal fragment header.
    #[error("packetizer destination buffer too small")]
    PacketizerBufferTooSmall,
}

/// Specific kind of RTSP parse failure.
#[derive(Debug)]
pub enum ParseErrorKind {
    /// Input was empty (no request line).
    EmptyRequest,
    /// Request line did not have the expected `Method URI Version` format.
    InvalidRequestLine,
    /// A header line did not contain a colon separator.
    InvalidHeader,
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyRequest => write!(f, "empty request"),
            Self::InvalidRequestLine => write!(f, "invalid request line"),
            Self::InvalidHeader => write!(f, "invalid header"),
        }
    }
}

/// Convenience alias for `Result<T, RtspError>`.
pub type Result<T> = std::result::Result<T, RtspError>;
