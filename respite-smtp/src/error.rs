//! Error types for the SMTP client.

use std::io;

use thiserror::Error;

/// Errors raised while talking to an SMTP server.
#[derive(Error, Debug)]
pub enum ClientError {
    /// IO error during network operations.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// The server reply could not be parsed.
    #[error("failed to parse server reply: {0}")]
    Parse(String),

    /// The server answered a command with an unexpected status code.
    #[error("server replied {code} {message}")]
    Status { code: u16, message: String },

    /// TLS negotiation or certificate handling failed.
    #[error("TLS error: {0}")]
    Tls(String),

    /// The connection was closed before the transaction finished.
    #[error("connection closed unexpectedly")]
    ConnectionClosed,

    /// A single operation exceeded its timeout budget.
    #[error("{0} timed out")]
    Timeout(&'static str),
}

pub type Result<T> = std::result::Result<T, ClientError>;
