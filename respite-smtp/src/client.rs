//! Asynchronous SMTP client used by the delivery transport.

use std::sync::Arc;

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
};
use tokio_rustls::{
    TlsConnector,
    rustls::{ClientConfig, RootCertStore, pki_types::ServerName},
};

use crate::{
    error::{ClientError, Result},
    response::Reply,
};

/// Read chunk size for server replies.
const BUFFER_SIZE: usize = 8192;

/// Upper bound on a buffered reply, to prevent unbounded growth.
const MAX_REPLY_SIZE: usize = 1024 * 1024;

/// A client connection that is either plain TCP or TLS-wrapped.
enum Connection {
    Plain(TcpStream),
    Tls(Box<tokio_rustls::client::TlsStream<TcpStream>>),
}

impl Connection {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        match self {
            Self::Plain(stream) => stream.write_all(data).await?,
            Self::Tls(stream) => stream.write_all(data).await?,
        }
        Ok(())
    }

    async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let n = match self {
            Self::Plain(stream) => stream.read(buf).await?,
            Self::Tls(stream) => stream.read(buf).await?,
        };
        if n == 0 {
            return Err(ClientError::ConnectionClosed);
        }
        Ok(n)
    }

    /// Upgrade a plain connection to TLS (the STARTTLS path).
    async fn upgrade_to_tls(self, host: &str, accept_invalid_certs: bool) -> Result<Self> {
        match self {
            Self::Plain(stream) => {
                let tls = tls_handshake(stream, host, accept_invalid_certs).await?;
                Ok(Self::Tls(Box::new(tls)))
            }
            Self::Tls(_) => Err(ClientError::Tls("connection is already TLS".to_string())),
        }
    }
}

async fn tls_handshake(
    stream: TcpStream,
    host: &str,
    accept_invalid_certs: bool,
) -> Result<tokio_rustls::client::TlsStream<TcpStream>> {
    let mut root_store = RootCertStore::empty();
    let certs = rustls_native_certs::load_native_certs();
    for cert in certs.certs {
        root_store
            .add(cert)
            .map_err(|e| ClientError::Tls(format!("failed to add certificate: {e}")))?;
    }
    if !certs.errors.is_empty() {
        tracing::warn!(?certs.errors, "some root certificates could not be loaded");
    }

    let mut config = ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();

    // For tests against self-signed servers only.
    if accept_invalid_certs {
        config
            .dangerous()
            .set_certificate_verifier(Arc::new(NoVerifier));
    }

    let connector = TlsConnector::from(Arc::new(config));
    let server_name = ServerName::try_from(host.to_string())
        .map_err(|e| ClientError::Tls(format!("invalid server name '{host}': {e}")))?;

    connector
        .connect(server_name, stream)
        .await
        .map_err(|e| ClientError::Tls(e.to_string()))
}

/// A certificate verifier that accepts all certificates (testing only).
#[derive(Debug)]
struct NoVerifier;

impl tokio_rustls::rustls::client::danger::ServerCertVerifier for NoVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &tokio_rustls::rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[tokio_rustls::rustls::pki_types::CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: tokio_rustls::rustls::pki_types::UnixTime,
    ) -> std::result::Result<
        tokio_rustls::rustls::client::danger::ServerCertVerified,
        tokio_rustls::rustls::Error,
    > {
        Ok(tokio_rustls::rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &tokio_rustls::rustls::pki_types::CertificateDer<'_>,
        _dss: &tokio_rustls::rustls::DigitallySignedStruct,
    ) -> std::result::Result<
        tokio_rustls::rustls::client::danger::HandshakeSignatureValid,
        tokio_rustls::rustls::Error,
    > {
        Ok(tokio_rustls::rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &tokio_rustls::rustls::pki_types::CertificateDer<'_>,
        _dss: &tokio_rustls::rustls::DigitallySignedStruct,
    ) -> std::result::Result<
        tokio_rustls::rustls::client::danger::HandshakeSignatureValid,
        tokio_rustls::rustls::Error,
    > {
        Ok(tokio_rustls::rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<tokio_rustls::rustls::SignatureScheme> {
        vec![
            tokio_rustls::rustls::SignatureScheme::RSA_PKCS1_SHA256,
            tokio_rustls::rustls::SignatureScheme::ECDSA_NISTP256_SHA256,
            tokio_rustls::rustls::SignatureScheme::ED25519,
        ]
    }
}

/// One SMTP session: command/reply plumbing over a plain or TLS stream.
pub struct MailClient {
    connection: Option<Connection>,
    pending: Vec<u8>,
    host: String,
    accept_invalid_certs: bool,
}

impl std::fmt::Debug for MailClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailClient")
            .field("host", &self.host)
            .finish_non_exhaustive()
    }
}

impl MailClient {
    /// Open a plaintext connection (upgradable later via [`Self::starttls`]).
    ///
    /// # Errors
    ///
    /// Returns an error if the TCP connection fails.
    pub async fn connect(host: &str, port: u16, accept_invalid_certs: bool) -> Result<Self> {
        let stream = TcpStream::connect((host, port)).await?;
        Ok(Self {
            connection: Some(Connection::Plain(stream)),
            pending: Vec::new(),
            host: host.to_string(),
            accept_invalid_certs,
        })
    }

    /// Open a TLS-on-connect session (SSL ports such as 465).
    ///
    /// # Errors
    ///
    /// Returns an error if the TCP connection or the TLS handshake fails.
    pub async fn connect_tls(host: &str, port: u16, accept_invalid_certs: bool) -> Result<Self> {
        let stream = TcpStream::connect((host, port)).await?;
        let tls = tls_handshake(stream, host, accept_invalid_certs).await?;
        Ok(Self {
            connection: Some(Connection::Tls(Box::new(tls))),
            pending: Vec::new(),
            host: host.to_string(),
            accept_invalid_certs,
        })
    }

    /// Read the initial server greeting.
    ///
    /// # Errors
    ///
    /// Returns an error if reading or parsing fails.
    pub async fn read_greeting(&mut self) -> Result<Reply> {
        self.read_reply().await
    }

    /// Send one command line and read the reply.
    ///
    /// # Errors
    ///
    /// Returns an error if sending or reading fails.
    pub async fn command(&mut self, line: &str) -> Result<Reply> {
        let data = format!("{line}\r\n");
        self.connection_mut()?.send(data.as_bytes()).await?;
        self.read_reply().await
    }

    /// Greet the server: EHLO, falling back to HELO when EHLO is refused.
    ///
    /// # Errors
    ///
    /// Returns an error if both greetings are rejected.
    pub async fn hello(&mut self, domain: &str) -> Result<Reply> {
        let reply = self.command(&format!("EHLO {domain}")).await?;
        if reply.is_success() {
            return Ok(reply);
        }
        let reply = self.command(&format!("HELO {domain}")).await?;
        if reply.is_success() {
            Ok(reply)
        } else {
            Err(reply.into_status_error())
        }
    }

    /// Upgrade the session to TLS via STARTTLS.
    ///
    /// The server must be greeted again after a successful upgrade.
    ///
    /// # Errors
    ///
    /// Returns an error if the server refuses STARTTLS or the handshake
    /// fails.
    pub async fn starttls(&mut self) -> Result<()> {
        let reply = self.command("STARTTLS").await?;
        if !reply.is_success() {
            return Err(reply.into_status_error());
        }
        let connection = self.connection.take().ok_or(ClientError::ConnectionClosed)?;
        let upgraded = connection
            .upgrade_to_tls(&self.host, self.accept_invalid_certs)
            .await?;
        self.connection = Some(upgraded);
        // Anything buffered before the handshake belongs to the old layer.
        self.pending.clear();
        Ok(())
    }

    /// Authenticate with `AUTH LOGIN` (base64 username/password exchange).
    ///
    /// # Errors
    ///
    /// Returns an error if the server refuses the mechanism or the
    /// credentials.
    pub async fn auth_login(&mut self, username: &str, password: &str) -> Result<()> {
        let reply = self.command("AUTH LOGIN").await?;
        if !reply.is_intermediate() {
            return Err(reply.into_status_error());
        }
        let reply = self.command(&BASE64.encode(username)).await?;
        if !reply.is_intermediate() {
            return Err(reply.into_status_error());
        }
        let reply = self.command(&BASE64.encode(password)).await?;
        if reply.is_success() {
            Ok(())
        } else {
            Err(reply.into_status_error())
        }
    }

    /// Send `MAIL FROM`.
    ///
    /// # Errors
    ///
    /// Returns an error if sending or reading fails.
    pub async fn mail_from(&mut self, from: &str) -> Result<Reply> {
        self.command(&format!("MAIL FROM:<{from}>")).await
    }

    /// Send `RCPT TO`.
    ///
    /// # Errors
    ///
    /// Returns an error if sending or reading fails.
    pub async fn rcpt_to(&mut self, to: &str) -> Result<Reply> {
        self.command(&format!("RCPT TO:<{to}>")).await
    }

    /// Send `DATA` followed by the message and the end-of-data marker.
    ///
    /// The message is expected to already use CRLF line endings with leading
    /// dots stuffed (see [`crate::MessageBuilder`]).
    ///
    /// # Errors
    ///
    /// Returns an error if the server refuses `DATA` or the content.
    pub async fn send_data(&mut self, message: &str) -> Result<Reply> {
        let reply = self.command("DATA").await?;
        if reply.code != 354 {
            return Err(reply.into_status_error());
        }

        let connection = self.connection_mut()?;
        connection.send(message.as_bytes()).await?;
        if !message.ends_with("\r\n") {
            connection.send(b"\r\n").await?;
        }
        connection.send(b".\r\n").await?;

        self.read_reply().await
    }

    /// Send `QUIT` to close the session cleanly.
    ///
    /// # Errors
    ///
    /// Returns an error if sending or reading fails.
    pub async fn quit(&mut self) -> Result<Reply> {
        self.command("QUIT").await
    }

    fn connection_mut(&mut self) -> Result<&mut Connection> {
        self.connection.as_mut().ok_or(ClientError::ConnectionClosed)
    }

    async fn read_reply(&mut self) -> Result<Reply> {
        loop {
            if let Some((reply, consumed)) = Reply::try_parse(&self.pending)? {
                self.pending.drain(..consumed);
                return Ok(reply);
            }
            if self.pending.len() > MAX_REPLY_SIZE {
                return Err(ClientError::Parse(
                    "server reply exceeds maximum size".to_string(),
                ));
            }

            let mut chunk = [0u8; BUFFER_SIZE];
            let n = self.connection_mut()?.read(&mut chunk).await?;
            self.pending.extend_from_slice(&chunk[..n]);
        }
    }
}
