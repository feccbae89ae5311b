//! Error types for the flock graph framework.
//!
//! The partitioning protocol is crash-stop: violated internal invariants are
//! asserted, not returned. The variants here cover the conditions a caller
//! can actually observe, all of which mean restarting the distributed job.

use std::fmt;

/// Errors surfaced by the ingestion and partitioning layer.
#[derive(Debug)]
pub enum Error {
    /// A vertex degree needed for the de-duplication or assignment decision
    /// was never received from that vertex's hash owner. This is a protocol
    /// defect, not a transient condition; the job must be restarted.
    DegreeUnavailable(u64),

    /// Message-exchange transport failure.
    Transport(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::DegreeUnavailable(vid) => {
                write!(f, "degree for vertex {vid} was never received")
            }
            Error::Transport(msg) => {
                write!(f, "transport error: {msg}")
            }
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;
