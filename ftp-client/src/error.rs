//! ## ERROR TAXONOMY
//!
//! Distinguishes connection failures, protocol parse failures, negative
//! server replies, command-sequencing violations, and transfer failures, so
//! that call sites can match on the kind rather than inspect a message
//! string.

use ftp_reply::{ParseError, Reply};

/// ## FTP ERROR
///
/// The top-level error returned by [crate::session::Session] and
/// [crate::dispatch::Dispatcher] operations.
#[derive(Debug, thiserror::Error)]
pub enum FtpError {
    /// TCP connect failed, the connection was closed mid-command, or a send
    /// observed a broken pipe.
    #[error("control connection error: {0}")]
    Connection(#[from] std::io::Error),

    /// A reply's bytes could not be parsed.
    #[error("reply parse error: {0}")]
    Parse(#[from] ParseError),

    /// The server answered with a 4xx or 5xx reply.
    #[error("server replied with an error: {0}")]
    ServerReply(Reply),

    /// A required intermediate reply (REST → 350, RNFR → 350) was not
    /// received, or an operation was attempted while not connected.
    #[error("command sequencing error: {0}")]
    Sequence(&'static str),

    /// The data channel or local I/O failed during a transfer.
    #[error("transfer error: {0}")]
    Transfer(#[from] TransferError),
}

/// ## TRANSFER ERROR
///
/// Failure kinds specific to the streaming phase of a transfer, kept
/// distinct from [FtpError] because the transfer engine reports them to a
/// completion callback rather than unwinding a call stack.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    /// Reading or writing the local file/buffer failed.
    #[error("local I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The transfer was cancelled by the caller; never surfaced as a
    /// `failed` status, only used internally to short-circuit streaming.
    #[error("transfer cancelled")]
    Cancelled,

    /// The data channel could not be connected (PASV dial or PORT accept).
    #[error("data channel connect failed: {0}")]
    DataConnect(std::io::Error),

    /// The server's trailing reply was a 4xx/5xx.
    #[error("server rejected the transfer: {0}")]
    ServerReply(Reply),
}
