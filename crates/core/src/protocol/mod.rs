//! RTSP/1.0 protocol plumbing (RFC 2326): request parsing, response
//! serialization, and SDP generation.
//!
//! ```text
//! DESCRIBE rtsp://server:8554 RTSP/1.0\r\n
//! CSeq: 2\r\n
//! \r\n
//! ```
//!
//! Method dispatch and session lifecycle live in
//! [`crate::client::RtspClient`], which drives these pieces over a
//! [`crate::cancellable_socket::CancellableSocket`].
//!
//! ## Supported methods
//!
//! | Method | RFC section | Purpose |
//! |--------|-------------|---------|
//! | OPTIONS | §10.1 | Capability discovery |
//! | DESCRIBE | §10.2 | Retrieve SDP session description |
//! | SETUP | §10.4 | Negotiate interleaved TCP transport |
//! | PLAY | §10.5 | Start media delivery |
//! | TEARDOWN | §10.7 | Destroy session |
//! | GET_PARAMETER | §10.8 | Keepalive, answered as a no-op |

pub mod request;
pub mod response;
pub mod sdp;

pub use request::RtspRequest;
pub use response::RtspResponse;
