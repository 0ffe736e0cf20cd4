use std::io;
use thiserror::Error;

/// Errors produced by the message core and its collaborators.
///
/// Resource-limit errors (`QuotaExceeded`, `PoolExhausted`, `ResourceExhausted`)
/// always leave every resource touched by the failing call exactly as it was
/// before the call. `WriteFailure` during installation leaves the message bound.
#[derive(Debug, Error)]
pub enum Error {
    #[error("out of memory")]
    OutOfMemory,

    #[error("user quota exceeded")]
    QuotaExceeded,

    #[error("destination pool exhausted")]
    PoolExhausted,

    #[error("message is already bound to a pool slice")]
    AlreadyBound,

    #[error("message is not bound to a pool slice")]
    NotBound,

    #[error("message is bound on peer {bound}, not on peer {given}")]
    WrongPeer { bound: u64, given: u64 },

    #[error("descriptor table of the receiving process is exhausted")]
    ResourceExhausted,

    #[error("pool write failed: {0}")]
    WriteFailure(#[source] io::Error),

    #[error("slot index {index} out of range (len {len})")]
    InvalidSlot { index: usize, len: usize },

    #[error("slot {0} is already populated")]
    SlotInUse(usize),

    #[error("file slot {0} is empty")]
    MissingFile(usize),

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
