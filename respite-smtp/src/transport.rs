//! SMTP implementation of the queue's transport seam.

use async_trait::async_trait;
use respite_queue::{Job, TlsMode, Transport, TransportError};
use tokio::time::timeout;
use tracing::debug;

use crate::{
    client::MailClient, error::ClientError, message::MessageBuilder, timeouts::SmtpTimeouts,
};

/// Delivers jobs over SMTP according to each job's captured transport
/// settings: explicit TLS mode, `AUTH LOGIN` with the captured credentials,
/// then one envelope and DATA phase per job.
#[derive(Debug, Clone, Default)]
pub struct SmtpTransport {
    timeouts: SmtpTimeouts,
    accept_invalid_certs: bool,
}

impl SmtpTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn with_timeouts(timeouts: SmtpTimeouts) -> Self {
        Self {
            timeouts,
            accept_invalid_certs: false,
        }
    }

    /// Accept invalid TLS certificates. Testing with self-signed servers
    /// only; never enable against real providers.
    #[must_use]
    pub const fn accept_invalid_certs(mut self, accept: bool) -> Self {
        self.accept_invalid_certs = accept;
        self
    }

    /// Connect, greet and authenticate according to the job's settings.
    async fn open_session(&self, job: &Job) -> Result<MailClient, TransportError> {
        let config = &job.config;

        let connected = timeout(self.timeouts.connect(), async {
            match config.tls {
                TlsMode::Implicit => {
                    MailClient::connect_tls(&config.host, config.port, self.accept_invalid_certs)
                        .await
                }
                TlsMode::StartTls | TlsMode::Plaintext => {
                    MailClient::connect(&config.host, config.port, self.accept_invalid_certs).await
                }
            }
        })
        .await
        .map_err(|_| TransportError::Timeout(self.timeouts.connect()))?;
        let mut client = connected.map_err(connect_error)?;

        let greeting = self
            .with_command_timeout(client.read_greeting())
            .await
            .map_err(connect_error)?;
        if !greeting.is_success() {
            return Err(TransportError::Connect(format!(
                "server rejected connection: {} {}",
                greeting.code,
                greeting.message()
            )));
        }

        let helo_domain = domain_of(&config.sender);
        self.with_command_timeout(client.hello(helo_domain))
            .await
            .map_err(into_transport_error)?;

        if config.tls == TlsMode::StartTls {
            self.with_command_timeout(client.starttls())
                .await
                .map_err(|e| match e {
                    ClientError::Status { code, message } => {
                        TransportError::Tls(format!("STARTTLS refused: {code} {message}"))
                    }
                    other => into_transport_error(other),
                })?;
            // A fresh greeting is required on the encrypted channel.
            self.with_command_timeout(client.hello(helo_domain))
                .await
                .map_err(into_transport_error)?;
        }

        self.with_command_timeout(client.auth_login(&config.sender, &config.password))
            .await
            .map_err(|e| match e {
                ClientError::Status { code, message } => {
                    TransportError::Auth(format!("{code} {message}"))
                }
                other => into_transport_error(other),
            })?;

        Ok(client)
    }

    async fn with_command_timeout<T>(
        &self,
        operation: impl Future<Output = crate::error::Result<T>>,
    ) -> crate::error::Result<T> {
        timeout(self.timeouts.command(), operation)
            .await
            .map_err(|_| ClientError::Timeout("command"))?
    }
}

#[async_trait]
impl Transport for SmtpTransport {
    async fn send(&self, job: &Job) -> Result<(), TransportError> {
        let mut client = self.open_session(job).await?;

        let reply = self
            .with_command_timeout(client.mail_from(&job.config.sender))
            .await
            .map_err(into_transport_error)?;
        if !reply.is_success() {
            return Err(TransportError::Rejected {
                code: reply.code,
                message: reply.message(),
            });
        }

        let reply = self
            .with_command_timeout(client.rcpt_to(&job.recipient.email))
            .await
            .map_err(into_transport_error)?;
        if !reply.is_success() {
            return Err(TransportError::Rejected {
                code: reply.code,
                message: reply.message(),
            });
        }

        // Attachment payloads are read at send time from the referenced
        // paths; the job only ever owned the references.
        let mut message = MessageBuilder::new(
            &job.config.sender,
            &job.recipient.name,
            &job.recipient.email,
            &job.subject,
            &job.body,
        );
        for path in &job.attachments {
            let bytes = tokio::fs::read(path)
                .await
                .map_err(|e| TransportError::Attachment(format!("{}: {e}", path.display())))?;
            let filename = path
                .file_name()
                .map_or_else(|| "attachment".to_string(), |n| n.to_string_lossy().into_owned());
            message.attach(filename, bytes);
        }

        let reply = timeout(self.timeouts.data(), client.send_data(&message.build()))
            .await
            .map_err(|_| TransportError::Timeout(self.timeouts.data()))?
            .map_err(into_transport_error)?;
        if !reply.is_success() {
            return Err(TransportError::Rejected {
                code: reply.code,
                message: reply.message(),
            });
        }

        // The message is accepted at this point; a failed QUIT is not a
        // failed delivery.
        match timeout(self.timeouts.quit(), client.quit()).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => debug!("QUIT after accepted delivery failed: {e}"),
            Err(_) => debug!("QUIT after accepted delivery timed out"),
        }

        Ok(())
    }
}

fn domain_of(address: &str) -> &str {
    address.split_once('@').map_or("localhost", |(_, domain)| domain)
}

fn connect_error(error: ClientError) -> TransportError {
    match error {
        ClientError::Tls(message) => TransportError::Tls(message),
        ClientError::Io(e) => TransportError::Connect(e.to_string()),
        ClientError::ConnectionClosed => {
            TransportError::Connect("connection closed during session setup".to_string())
        }
        other => TransportError::Connect(other.to_string()),
    }
}

fn into_transport_error(error: ClientError) -> TransportError {
    match error {
        ClientError::Status { code, message } => TransportError::Rejected { code, message },
        ClientError::Tls(message) => TransportError::Tls(message),
        ClientError::Io(e) => TransportError::Connect(format!("I/O error: {e}")),
        ClientError::ConnectionClosed => {
            TransportError::Connect("connection closed unexpectedly".to_string())
        }
        other @ (ClientError::Parse(_) | ClientError::Timeout(_)) => {
            TransportError::Other(other.to_string())
        }
    }
}
