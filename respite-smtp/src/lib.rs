//! SMTP transport for the respite outbound-mail queue.
//!
//! Implements the queue's [`respite_queue::Transport`] seam with an
//! asynchronous SMTP client: explicit TLS mode (TLS-on-connect, STARTTLS or
//! plaintext), `AUTH LOGIN`, MIME assembly for text bodies with base64
//! attachments, and a per-operation timeout budget.

mod client;
mod error;
mod message;
mod response;
mod timeouts;
mod transport;

pub use client::MailClient;
pub use error::ClientError;
pub use message::MessageBuilder;
pub use response::Reply;
pub use timeouts::SmtpTimeouts;
pub use transport::SmtpTransport;
