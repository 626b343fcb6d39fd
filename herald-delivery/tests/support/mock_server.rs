//! Mock SMTP server for testing delivery scenarios
//!
//! This module provides a configurable mock SMTP server that can:
#![allow(dead_code)] // Test utility module - not all methods used in every test
//! - Simulate various SMTP responses (success, failure, temporary errors)
//! - Advertise and check SASL authentication (PLAIN, LOGIN, CRAM-MD5)
//! - Reject individual recipients
//! - Drop connections after N commands
//! - Serve implicit TLS or upgrade with STARTTLS, using a self-signed fixture
//!   certificate
//! - Track received commands and concurrent connections for verification
//!
//! # Example
//!
//! ```rust,no_run
//! use support::mock_server::MockSmtpServer;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let server = MockSmtpServer::builder()
//!     .with_auth(&["PLAIN", "LOGIN"], "user", "secret")
//!     .with_rejected_recipient("nobody@example.com")
//!     .build()
//!     .await?;
//!
//! // Server is now running on server.addr()
//! server.shutdown();
//! # Ok(())
//! # }
//! ```

use std::{
    fmt::Write,
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use base64::{Engine as _, engine::general_purpose::STANDARD};
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
    sync::RwLock,
    time::timeout,
};
use tokio_rustls::{TlsAcceptor, rustls::ServerConfig};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Fixed CRAM-MD5 challenge sent by the mock server.
pub const CRAM_CHALLENGE: &str = "<12345.67890@mock.example>";

const TLS_CERT: &[u8] = include_bytes!("../fixtures/mock-server.crt");
const TLS_KEY: &[u8] = include_bytes!("../fixtures/mock-server.key");

/// Acceptor serving the self-signed `localhost`/`127.0.0.1` fixture
/// certificate.
fn tls_acceptor() -> TlsAcceptor {
    let certs = rustls_pemfile::certs(&mut &TLS_CERT[..])
        .collect::<Result<Vec<_>, _>>()
        .expect("fixture certificate parses");
    let key = rustls_pemfile::private_key(&mut &TLS_KEY[..])
        .expect("fixture key parses")
        .expect("fixture key present");

    let config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .expect("fixture certificate matches key");
    TlsAcceptor::from(Arc::new(config))
}

/// SMTP command received by the mock server
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SmtpCommand {
    /// EHLO command with hostname
    Ehlo(String),
    /// MAIL FROM argument
    MailFrom(String),
    /// RCPT TO argument
    RcptTo(String),
    /// DATA command
    Data,
    /// Message content as received on the wire (still dot-stuffed)
    MessageContent(Vec<u8>),
    /// AUTH with the mechanism name
    Auth(String),
    /// Decoded client responses of a SASL exchange, in order
    AuthExchange(Vec<String>),
    /// RSET command
    Rset,
    /// QUIT command
    Quit,
    /// STARTTLS command
    StartTls,
    /// TLS handshake completed; later commands arrived encrypted
    TlsEstablished,
    /// Unknown/other command
    Other(String),
}

/// Response configuration for SMTP commands
#[derive(Debug, Clone)]
pub struct SmtpResponse {
    /// SMTP status code (e.g., 250, 550)
    pub code: u16,
    /// Response message
    pub message: String,
}

impl SmtpResponse {
    fn new(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    fn to_bytes(&self) -> Vec<u8> {
        format!("{} {}\r\n", self.code, self.message).into_bytes()
    }
}

#[derive(Clone)]
struct TlsSetup {
    acceptor: TlsAcceptor,
    /// Handshake before the greeting instead of on STARTTLS
    implicit: bool,
}

#[derive(Clone)]
struct AuthConfig {
    mechanisms: Vec<String>,
    username: String,
    password: String,
    login_prompts: (String, String),
}

/// Mock SMTP server configuration
#[derive(Clone)]
struct MockServerConfig {
    greeting: SmtpResponse,
    capabilities: Vec<String>,
    auth: Option<AuthConfig>,
    mail_from_response: SmtpResponse,
    rcpt_to_response: SmtpResponse,
    rejected_recipients: Vec<String>,
    data_response: SmtpResponse,
    data_end_response: SmtpResponse,
    quit_response: SmtpResponse,
    rset_response: SmtpResponse,
    starttls_response: Option<SmtpResponse>,
    tls: Option<TlsSetup>,

    // Failure injection
    response_delay: Option<Duration>,
    drop_after_commands: Option<usize>,
}

impl Default for MockServerConfig {
    fn default() -> Self {
        Self {
            greeting: SmtpResponse::new(220, "Mock SMTP Server"),
            capabilities: vec!["SIZE 10000".to_string()],
            auth: None,
            mail_from_response: SmtpResponse::new(250, "OK"),
            rcpt_to_response: SmtpResponse::new(250, "OK"),
            rejected_recipients: Vec::new(),
            data_response: SmtpResponse::new(354, "Start mail input; end with <CRLF>.<CRLF>"),
            data_end_response: SmtpResponse::new(250, "OK: Message accepted"),
            quit_response: SmtpResponse::new(221, "Bye"),
            rset_response: SmtpResponse::new(250, "OK"),
            starttls_response: None,
            tls: None,
            response_delay: None,
            drop_after_commands: None,
        }
    }
}

impl MockServerConfig {
    fn ehlo_response(&self, encrypted: bool) -> Vec<u8> {
        let mut lines = vec!["mock.example".to_string()];
        lines.extend(self.capabilities.iter().cloned());
        if let Some(auth) = &self.auth {
            lines.push(format!("AUTH {}", auth.mechanisms.join(" ")));
        }
        if self.starttls_response.is_some() && !encrypted {
            lines.push("STARTTLS".to_string());
        }

        let mut response = String::new();
        let last = lines.len() - 1;
        for (i, line) in lines.iter().enumerate() {
            let separator = if i < last { '-' } else { ' ' };
            let _ = write!(&mut response, "250{separator}{line}\r\n");
        }
        response.into_bytes()
    }
}

#[derive(Default)]
struct Counters {
    commands: AtomicUsize,
    connections: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
    tls_sessions: AtomicUsize,
}

/// Mock SMTP server for testing
pub struct MockSmtpServer {
    addr: SocketAddr,
    commands_received: Arc<RwLock<Vec<SmtpCommand>>>,
    shutdown: Arc<AtomicBool>,
    counters: Arc<Counters>,
}

impl MockSmtpServer {
    /// Create a new builder for configuring the mock server
    #[must_use]
    pub fn builder() -> MockSmtpServerBuilder {
        MockSmtpServerBuilder::new()
    }

    /// Get the address the server is listening on
    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    #[must_use]
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Get all commands received by the server
    pub async fn commands(&self) -> Vec<SmtpCommand> {
        self.commands_received.read().await.clone()
    }

    /// Message contents received so far, in order
    pub async fn messages(&self) -> Vec<String> {
        self.commands()
            .await
            .into_iter()
            .filter_map(|cmd| match cmd {
                SmtpCommand::MessageContent(data) => Some(String::from_utf8_lossy(&data).into_owned()),
                _ => None,
            })
            .collect()
    }

    /// Get the number of commands received
    #[must_use]
    pub fn command_count(&self) -> usize {
        self.counters.commands.load(Ordering::Relaxed)
    }

    /// Connections accepted so far
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.counters.connections.load(Ordering::Relaxed)
    }

    /// Highest number of simultaneously open connections seen
    #[must_use]
    pub fn max_concurrent_connections(&self) -> usize {
        self.counters.max_active.load(Ordering::Relaxed)
    }

    /// Connections that completed a TLS handshake
    #[must_use]
    pub fn tls_session_count(&self) -> usize {
        self.counters.tls_sessions.load(Ordering::Relaxed)
    }

    /// Shutdown the server
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    async fn reply<W>(writer: &mut W, config: &MockServerConfig, bytes: &[u8]) -> std::io::Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        if let Some(delay) = config.response_delay {
            tokio::time::sleep(delay).await;
        }
        writer.write_all(bytes).await?;
        writer.flush().await
    }

    /// Handle a single client connection
    async fn handle_client(
        stream: TcpStream,
        config: Arc<MockServerConfig>,
        commands: Arc<RwLock<Vec<SmtpCommand>>>,
        counters: Arc<Counters>,
    ) -> Result<(), BoxError> {
        let Some(tls) = config.tls.clone() else {
            Self::serve(stream, true, false, &config, &commands, &counters).await?;
            return Ok(());
        };

        if tls.implicit {
            let stream = tls.acceptor.accept(stream).await?;
            Self::tls_established(&commands, &counters).await;
            Self::serve(stream, true, true, &config, &commands, &counters).await?;
        } else if let Some(stream) =
            Self::serve(stream, true, false, &config, &commands, &counters).await?
        {
            let stream = tls.acceptor.accept(stream).await?;
            Self::tls_established(&commands, &counters).await;
            // The client speaks first after STARTTLS, starting with EHLO
            Self::serve(stream, false, true, &config, &commands, &counters).await?;
        }
        Ok(())
    }

    async fn tls_established(commands: &RwLock<Vec<SmtpCommand>>, counters: &Counters) {
        counters.tls_sessions.fetch_add(1, Ordering::Relaxed);
        commands.write().await.push(SmtpCommand::TlsEstablished);
    }

    /// Runs the command loop over `stream`. Returns the stream when the
    /// client has been told to start TLS and the handshake should follow.
    #[allow(clippy::too_many_lines)]
    async fn serve<S>(
        stream: S,
        greet: bool,
        encrypted: bool,
        config: &MockServerConfig,
        commands: &RwLock<Vec<SmtpCommand>>,
        counters: &Counters,
    ) -> Result<Option<S>, BoxError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let (reader, mut writer) = tokio::io::split(stream);
        let mut reader = BufReader::new(reader);
        let mut line = String::new();
        let mut local_command_count = 0;

        if greet {
            writer.write_all(&config.greeting.to_bytes()).await?;
            writer.flush().await?;
        }

        loop {
            line.clear();

            if let Some(drop_after) = config.drop_after_commands
                && local_command_count >= drop_after
            {
                // Silently close connection
                return Ok(None);
            }

            let read_result = timeout(Duration::from_secs(10), reader.read_line(&mut line)).await;
            let Ok(bytes_read) = read_result else {
                return Ok(None);
            };
            if bytes_read? == 0 {
                return Ok(None);
            }

            local_command_count += 1;
            counters.commands.fetch_add(1, Ordering::Relaxed);

            let cmd_line = line.trim_end_matches(['\r', '\n']).to_string();
            tracing::debug!("Mock server received: {}", cmd_line);

            let mut parts = cmd_line.splitn(2, ' ');
            let command = parts.next().unwrap_or_default().to_uppercase();
            let argument = parts.next().unwrap_or_default().to_string();

            match command.as_str() {
                "EHLO" => {
                    commands.write().await.push(SmtpCommand::Ehlo(argument));
                    Self::reply(&mut writer, config, &config.ehlo_response(encrypted)).await?;
                }
                "MAIL" => {
                    commands.write().await.push(SmtpCommand::MailFrom(argument));
                    Self::reply(&mut writer, config, &config.mail_from_response.to_bytes()).await?;
                }
                "RCPT" => {
                    let rejected = config
                        .rejected_recipients
                        .iter()
                        .any(|r| argument.contains(&format!("<{r}>")));
                    commands.write().await.push(SmtpCommand::RcptTo(argument));
                    let response = if rejected {
                        SmtpResponse::new(550, "User unknown").to_bytes()
                    } else {
                        config.rcpt_to_response.to_bytes()
                    };
                    Self::reply(&mut writer, config, &response).await?;
                }
                "DATA" => {
                    commands.write().await.push(SmtpCommand::Data);
                    Self::reply(&mut writer, config, &config.data_response.to_bytes()).await?;
                    if config.data_response.code != 354 {
                        continue;
                    }

                    // Read message content until we see <CRLF>.<CRLF>
                    let mut message_content = Vec::new();
                    let mut data_line = String::new();
                    loop {
                        data_line.clear();
                        if reader.read_line(&mut data_line).await? == 0 {
                            return Ok(None);
                        }
                        if data_line == ".\r\n" {
                            break;
                        }
                        message_content.extend_from_slice(data_line.as_bytes());
                    }
                    commands
                        .write()
                        .await
                        .push(SmtpCommand::MessageContent(message_content));
                    Self::reply(&mut writer, config, &config.data_end_response.to_bytes()).await?;
                }
                "AUTH" => {
                    let mut words = argument.split_whitespace();
                    let mechanism = words.next().unwrap_or_default().to_uppercase();
                    let initial = words.next().map(str::to_string);
                    commands.write().await.push(SmtpCommand::Auth(mechanism.clone()));

                    let response =
                        Self::authenticate(&mut reader, &mut writer, config, &mechanism, initial)
                            .await?;
                    commands
                        .write()
                        .await
                        .push(SmtpCommand::AuthExchange(response.1));
                    Self::reply(&mut writer, config, &response.0.to_bytes()).await?;
                }
                "RSET" => {
                    commands.write().await.push(SmtpCommand::Rset);
                    Self::reply(&mut writer, config, &config.rset_response.to_bytes()).await?;
                }
                "QUIT" => {
                    commands.write().await.push(SmtpCommand::Quit);
                    Self::reply(&mut writer, config, &config.quit_response.to_bytes()).await?;
                    return Ok(None);
                }
                "STARTTLS" => {
                    commands.write().await.push(SmtpCommand::StartTls);
                    let response = if encrypted {
                        SmtpResponse::new(503, "TLS already active")
                    } else {
                        config
                            .starttls_response
                            .clone()
                            .unwrap_or_else(|| SmtpResponse::new(502, "Command not implemented"))
                    };
                    Self::reply(&mut writer, config, &response.to_bytes()).await?;

                    if response.code == 220 && config.tls.is_some() {
                        return Ok(Some(reader.into_inner().unsplit(writer)));
                    }
                }
                _ => {
                    commands.write().await.push(SmtpCommand::Other(cmd_line.clone()));
                    Self::reply(&mut writer, config, b"500 Unknown command\r\n").await?;
                }
            }
        }
    }

    /// Runs the server side of a SASL exchange. Returns the final reply and
    /// every decoded client response.
    async fn authenticate<R, W>(
        reader: &mut BufReader<R>,
        writer: &mut W,
        config: &MockServerConfig,
        mechanism: &str,
        initial: Option<String>,
    ) -> std::io::Result<(SmtpResponse, Vec<String>)>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let Some(auth) = &config.auth else {
            return Ok((SmtpResponse::new(503, "AUTH not available"), Vec::new()));
        };
        if !auth.mechanisms.iter().any(|m| m == mechanism) {
            return Ok((SmtpResponse::new(504, "Unrecognized mechanism"), Vec::new()));
        }

        let decode = |s: &str| {
            STANDARD
                .decode(s.trim())
                .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
                .unwrap_or_else(|_| format!("<undecodable {s}>"))
        };

        let mut exchange = Vec::new();

        let accepted = match mechanism {
            "PLAIN" => {
                let payload = match initial {
                    Some(payload) => Some(payload),
                    None => Self::challenge(reader, writer, "").await?,
                };
                let Some(payload) = payload else {
                    return Ok((SmtpResponse::new(501, "Cancelled"), exchange));
                };
                let decoded = decode(&payload);
                exchange.push(decoded.clone());
                decoded == format!("\0{}\0{}", auth.username, auth.password)
            }
            "LOGIN" => {
                let mut answers = Vec::new();
                for prompt in [&auth.login_prompts.0, &auth.login_prompts.1] {
                    let Some(answer) = Self::challenge(reader, writer, prompt).await? else {
                        return Ok((SmtpResponse::new(501, "Cancelled"), exchange));
                    };
                    let decoded = decode(&answer);
                    exchange.push(decoded.clone());
                    answers.push(decoded);
                }
                answers == [auth.username.clone(), auth.password.clone()]
            }
            "CRAM-MD5" => {
                let Some(answer) = Self::challenge(reader, writer, CRAM_CHALLENGE).await? else {
                    return Ok((SmtpResponse::new(501, "Cancelled"), exchange));
                };
                let decoded = decode(&answer);
                exchange.push(decoded.clone());
                decoded
                    .split_once(' ')
                    .is_some_and(|(user, digest)| user == auth.username && digest.len() == 32)
            }
            _ => false,
        };

        let response = if accepted {
            SmtpResponse::new(235, "Authentication successful")
        } else {
            SmtpResponse::new(535, "Authentication credentials invalid")
        };
        Ok((response, exchange))
    }

    /// Sends a 334 challenge and reads one client line. `None` means the
    /// client cancelled with `*`.
    async fn challenge<R, W>(
        reader: &mut BufReader<R>,
        writer: &mut W,
        prompt: &str,
    ) -> std::io::Result<Option<String>>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let line = format!("334 {}\r\n", STANDARD.encode(prompt));
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await?;

        let mut response = String::new();
        reader.read_line(&mut response).await?;
        let response = response.trim_end_matches(['\r', '\n']).to_string();
        Ok((response != "*").then_some(response))
    }
}

/// Builder for configuring a `MockSmtpServer`
pub struct MockSmtpServerBuilder {
    config: MockServerConfig,
}

impl MockSmtpServerBuilder {
    fn new() -> Self {
        Self {
            config: MockServerConfig::default(),
        }
    }

    /// Set the greeting message
    #[must_use]
    pub fn with_greeting(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.greeting = SmtpResponse::new(code, message);
        self
    }

    /// Advertise `mechanisms` and accept exactly these credentials
    #[must_use]
    pub fn with_auth(mut self, mechanisms: &[&str], username: &str, password: &str) -> Self {
        self.config.auth = Some(AuthConfig {
            mechanisms: mechanisms.iter().map(|m| (*m).to_string()).collect(),
            username: username.to_string(),
            password: password.to_string(),
            login_prompts: ("Username:".to_string(), "Password:".to_string()),
        });
        self
    }

    /// Replace the two LOGIN prompts (requires `with_auth`)
    #[must_use]
    pub fn with_login_prompts(mut self, first: &str, second: &str) -> Self {
        if let Some(auth) = &mut self.config.auth {
            auth.login_prompts = (first.to_string(), second.to_string());
        }
        self
    }

    /// Set the MAIL FROM response
    #[must_use]
    pub fn with_mail_from_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.mail_from_response = SmtpResponse::new(code, message);
        self
    }

    /// Set the RCPT TO response
    #[must_use]
    pub fn with_rcpt_to_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.rcpt_to_response = SmtpResponse::new(code, message);
        self
    }

    /// Answer 550 for this address only
    #[must_use]
    pub fn with_rejected_recipient(mut self, address: &str) -> Self {
        self.config.rejected_recipients.push(address.to_string());
        self
    }

    /// Set the DATA command response
    #[must_use]
    pub fn with_data_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.data_response = SmtpResponse::new(code, message);
        self
    }

    /// Set the response after message content (after `<CRLF>.<CRLF>`)
    #[must_use]
    pub fn with_data_end_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.data_end_response = SmtpResponse::new(code, message);
        self
    }

    /// Set the RSET response
    #[must_use]
    pub fn with_rset_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.rset_response = SmtpResponse::new(code, message);
        self
    }

    /// Set the STARTTLS response (also advertises STARTTLS)
    #[must_use]
    pub fn with_starttls_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.starttls_response = Some(SmtpResponse::new(code, message));
        self
    }

    /// Handshake TLS on accept, before the greeting
    #[must_use]
    pub fn with_implicit_tls(mut self) -> Self {
        self.config.tls = Some(TlsSetup {
            acceptor: tls_acceptor(),
            implicit: true,
        });
        self
    }

    /// Advertise STARTTLS and upgrade the connection when the client asks
    #[must_use]
    pub fn with_starttls(mut self) -> Self {
        self.config.starttls_response = Some(SmtpResponse::new(220, "Ready to start TLS"));
        self.config.tls = Some(TlsSetup {
            acceptor: tls_acceptor(),
            implicit: false,
        });
        self
    }

    /// Add a delay before sending each response
    #[must_use]
    pub const fn with_response_delay(mut self, delay: Duration) -> Self {
        self.config.response_delay = Some(delay);
        self
    }

    /// Drop the connection after N commands
    #[must_use]
    pub const fn with_network_error_after_commands(mut self, count: usize) -> Self {
        self.config.drop_after_commands = Some(count);
        self
    }

    /// Build and start the mock SMTP server
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails to bind to a port
    pub async fn build(self) -> Result<MockSmtpServer, std::io::Error> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let config = Arc::new(self.config);
        let commands = Arc::new(RwLock::new(Vec::new()));
        let shutdown = Arc::new(AtomicBool::new(false));
        let counters = Arc::new(Counters::default());

        let commands_clone = Arc::clone(&commands);
        let shutdown_clone = Arc::clone(&shutdown);
        let counters_clone = Arc::clone(&counters);

        tokio::spawn(async move {
            loop {
                if shutdown_clone.load(Ordering::Relaxed) {
                    break;
                }

                // Accept connection with timeout to allow checking shutdown flag
                let accept_result = timeout(Duration::from_millis(100), listener.accept()).await;

                if let Ok(Ok((stream, _peer))) = accept_result {
                    let config = Arc::clone(&config);
                    let commands = Arc::clone(&commands_clone);
                    let counters = Arc::clone(&counters_clone);

                    counters.connections.fetch_add(1, Ordering::Relaxed);
                    let active = counters.active.fetch_add(1, Ordering::SeqCst) + 1;
                    counters.max_active.fetch_max(active, Ordering::SeqCst);

                    tokio::spawn(async move {
                        if let Err(e) = MockSmtpServer::handle_client(
                            stream,
                            config,
                            commands,
                            Arc::clone(&counters),
                        )
                        .await
                        {
                            tracing::debug!("Mock server client error: {}", e);
                        }
                        counters.active.fetch_sub(1, Ordering::SeqCst);
                    });
                }
            }
        });

        Ok(MockSmtpServer {
            addr,
            commands_received: commands,
            shutdown,
            counters,
        })
    }
}
