//! Shared memory specific error types

use std::path::PathBuf;
use thiserror::Error;

use crate::segment::SegmentKey;

/// Shared memory error types
#[derive(Error, Debug)]
pub enum SegmentError {
    /// ftok key derivation failed, usually because the path does not exist
    #[error("Could not derive segment key from {path}: {source}")]
    KeyDerivation {
        path: PathBuf,
        source: std::io::Error,
    },

    /// shmget creation failure
    #[error("Could not create segment: {0}")]
    Create(std::io::Error),

    /// No segment is bound to the requested key
    #[error("No segment bound to key {0}")]
    NotFound(SegmentKey),

    /// shmat failure
    #[error("Could not attach segment: {0}")]
    Attach(std::io::Error),

    /// shmdt failure
    #[error("Could not detach segment: {0}")]
    Detach(std::io::Error),

    /// shmctl(IPC_RMID) failure
    #[error("Could not destroy segment: {0}")]
    Destroy(std::io::Error),

    /// shmctl(IPC_STAT) failure
    #[error("Could not stat segment: {0}")]
    Stat(std::io::Error),

    /// Payload does not fit the segment
    #[error("Payload of {needed} bytes exceeds segment capacity of {capacity}")]
    CapacityExceeded { needed: usize, capacity: usize },

    /// Segment header claims more payload than the segment can hold
    #[error("Segment header claims {claimed} bytes but capacity is {capacity}")]
    HeaderOutOfRange { claimed: usize, capacity: usize },

    /// Random key allocation gave up after too many collisions
    #[error("Could not find an unused segment key after {attempts} attempts")]
    KeySpaceExhausted { attempts: usize },
}

/// Convenience type alias
pub type Result<T> = std::result::Result<T, SegmentError>;
