//! Configurable in-process SMTP server for transport tests.
//!
//! Speaks just enough of the protocol for a full plaintext transaction:
//! greeting, EHLO/HELO, `AUTH LOGIN`, MAIL FROM, RCPT TO, DATA and QUIT.
//! Each phase's reply is configurable so tests can inject failures at any
//! point and observe what the client actually sent.

use std::{
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
    sync::RwLock,
    time::timeout,
};

#[derive(Clone)]
struct MockConfig {
    greeting: (u16, String),
    auth_reply: (u16, String),
    mail_reply: (u16, String),
    rcpt_reply: (u16, String),
    data_end_reply: (u16, String),
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            greeting: (220, "mock ESMTP ready".to_string()),
            auth_reply: (235, "2.7.0 accepted".to_string()),
            mail_reply: (250, "OK".to_string()),
            rcpt_reply: (250, "OK".to_string()),
            data_end_reply: (250, "OK: queued".to_string()),
        }
    }
}

#[derive(Default)]
struct Observed {
    commands: Vec<String>,
    credentials: Option<(String, String)>,
    message: Option<String>,
}

/// Handle to a running mock server.
pub struct MockMailServer {
    addr: SocketAddr,
    observed: Arc<RwLock<Observed>>,
    shutdown: Arc<AtomicBool>,
}

impl MockMailServer {
    pub fn builder() -> MockMailServerBuilder {
        MockMailServerBuilder {
            config: MockConfig::default(),
        }
    }

    /// Start a mock with all-success replies.
    pub async fn start() -> Self {
        Self::builder().build().await
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Command lines received so far, uppercased verbs intact.
    pub async fn commands(&self) -> Vec<String> {
        self.observed.read().await.commands.clone()
    }

    /// Username and password received via `AUTH LOGIN`, base64-decoded.
    pub async fn credentials(&self) -> Option<(String, String)> {
        self.observed.read().await.credentials.clone()
    }

    /// Raw DATA payload (dot-stuffing still present), if one arrived.
    pub async fn message(&self) -> Option<String> {
        self.observed.read().await.message.clone()
    }

    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    async fn handle_client(
        mut stream: TcpStream,
        config: MockConfig,
        observed: Arc<RwLock<Observed>>,
    ) -> std::io::Result<()> {
        let (reader, mut writer) = stream.split();
        let mut reader = BufReader::new(reader);
        let mut line = String::new();

        send_reply(&mut writer, config.greeting.0, &config.greeting.1).await?;

        loop {
            line.clear();
            if reader.read_line(&mut line).await? == 0 {
                return Ok(());
            }
            let command = line.trim().to_string();
            observed.write().await.commands.push(command.clone());

            let verb = command
                .split_whitespace()
                .next()
                .unwrap_or_default()
                .to_uppercase();

            match verb.as_str() {
                "EHLO" => {
                    writer
                        .write_all(b"250-mock greets you\r\n250 AUTH LOGIN PLAIN\r\n")
                        .await?;
                    writer.flush().await?;
                }
                "HELO" => send_reply(&mut writer, 250, "mock greets you").await?,
                "AUTH" => {
                    send_reply(&mut writer, 334, &BASE64.encode("Username:")).await?;
                    line.clear();
                    reader.read_line(&mut line).await?;
                    let username = decode(line.trim());

                    send_reply(&mut writer, 334, &BASE64.encode("Password:")).await?;
                    line.clear();
                    reader.read_line(&mut line).await?;
                    let password = decode(line.trim());

                    observed.write().await.credentials = Some((username, password));
                    send_reply(&mut writer, config.auth_reply.0, &config.auth_reply.1).await?;
                }
                "MAIL" => send_reply(&mut writer, config.mail_reply.0, &config.mail_reply.1).await?,
                "RCPT" => send_reply(&mut writer, config.rcpt_reply.0, &config.rcpt_reply.1).await?,
                "DATA" => {
                    send_reply(&mut writer, 354, "end data with <CRLF>.<CRLF>").await?;
                    let mut content = String::new();
                    loop {
                        line.clear();
                        if reader.read_line(&mut line).await? == 0 {
                            return Ok(());
                        }
                        if line.trim_end() == "." {
                            break;
                        }
                        content.push_str(&line);
                    }
                    observed.write().await.message = Some(content);
                    send_reply(
                        &mut writer,
                        config.data_end_reply.0,
                        &config.data_end_reply.1,
                    )
                    .await?;
                }
                "QUIT" => {
                    send_reply(&mut writer, 221, "bye").await?;
                    return Ok(());
                }
                _ => send_reply(&mut writer, 500, "unknown command").await?,
            }
        }
    }
}

async fn send_reply<W: AsyncWriteExt + Unpin>(
    writer: &mut W,
    code: u16,
    message: &str,
) -> std::io::Result<()> {
    writer
        .write_all(format!("{code} {message}\r\n").as_bytes())
        .await?;
    writer.flush().await
}

fn decode(line: &str) -> String {
    BASE64
        .decode(line)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .unwrap_or_default()
}

pub struct MockMailServerBuilder {
    config: MockConfig,
}

impl MockMailServerBuilder {
    pub fn with_greeting(mut self, code: u16, message: &str) -> Self {
        self.config.greeting = (code, message.to_string());
        self
    }

    pub fn with_auth_reply(mut self, code: u16, message: &str) -> Self {
        self.config.auth_reply = (code, message.to_string());
        self
    }

    pub fn with_rcpt_reply(mut self, code: u16, message: &str) -> Self {
        self.config.rcpt_reply = (code, message.to_string());
        self
    }

    pub fn with_data_end_reply(mut self, code: u16, message: &str) -> Self {
        self.config.data_end_reply = (code, message.to_string());
        self
    }

    pub async fn build(self) -> MockMailServer {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind mock");
        let addr = listener.local_addr().expect("mock addr");

        let observed = Arc::new(RwLock::new(Observed::default()));
        let shutdown = Arc::new(AtomicBool::new(false));

        let config = self.config;
        let observed_task = Arc::clone(&observed);
        let shutdown_task = Arc::clone(&shutdown);
        tokio::spawn(async move {
            while !shutdown_task.load(Ordering::Relaxed) {
                let accepted = timeout(Duration::from_millis(100), listener.accept()).await;
                if let Ok(Ok((stream, _peer))) = accepted {
                    let config = config.clone();
                    let observed = Arc::clone(&observed_task);
                    tokio::spawn(async move {
                        let _ = MockMailServer::handle_client(stream, config, observed).await;
                    });
                }
            }
        });

        MockMailServer {
            addr,
            observed,
            shutdown,
        }
    }
}
