//! Minimal POP3(S) transport.
//!
//! Speaks the small command subset the poll handler needs: USER/PASS,
//! UIDL, RETR, QUIT. Each poll opens a fresh session; POP3 servers drop
//! idle connections aggressively and the poll cadence is minutes.
//!
//! POP3 has no reliable server-side read flag, so processed UIDLs are
//! tracked in memory for the lifetime of the process; the downstream
//! receiver is idempotent by contract. Replies are unsupported: they are
//! logged and dropped.

use std::collections::HashSet;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufStream};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::net::{connect, BoxedStream};
use crate::{mime, EmailMessage, EmailTransport, MailError, Result};

/// POP3 configuration.
#[derive(Debug, Clone)]
pub struct Pop3Config {
    /// Server host.
    pub host: String,
    /// Server port (110 plain, 995 TLS).
    pub port: u16,
    /// Mailbox user.
    pub username: String,
    /// Mailbox password.
    pub password: String,
    /// Whether to use implicit TLS.
    pub ssl: bool,
}

impl Pop3Config {
    /// Create a configuration with the implicit-TLS default port.
    pub fn new(
        host: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port: 995,
            username: username.into(),
            password: password.into(),
            ssl: true,
        }
    }

    /// Set the port.
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Enable or disable implicit TLS.
    pub fn ssl(mut self, ssl: bool) -> Self {
        self.ssl = ssl;
        self
    }
}

/// POP3 mailbox transport.
pub struct Pop3Transport {
    config: Pop3Config,
    processed: RwLock<HashSet<String>>,
}

impl Pop3Transport {
    /// Create a transport; no connection is made until the first poll.
    pub fn new(config: Pop3Config) -> Self {
        Self {
            config,
            processed: RwLock::new(HashSet::new()),
        }
    }

    async fn open_session(&self) -> Result<Pop3Session> {
        let stream = connect(&self.config.host, self.config.port, self.config.ssl).await?;
        let mut session = Pop3Session::new(stream);

        session.read_status().await?; // server greeting
        session
            .command(&format!("USER {}", self.config.username))
            .await?;
        session
            .command(&format!("PASS {}", self.config.password))
            .await
            .map_err(|e| MailError::Auth(e.to_string()))?;

        Ok(session)
    }
}

#[async_trait::async_trait]
impl EmailTransport for Pop3Transport {
    async fn fetch_new(&self) -> Result<Vec<EmailMessage>> {
        let mut session = self.open_session().await?;
        let listing = session.uidl().await?;

        let processed = self.processed.read().await;
        let wanted: Vec<(u32, String)> = listing
            .into_iter()
            .filter(|(_, uid)| !processed.contains(uid))
            .collect();
        drop(processed);

        debug!("POP3 mailbox: {} unprocessed messages", wanted.len());

        let mut messages = Vec::with_capacity(wanted.len());
        for (number, uid) in wanted {
            let raw = session.retr(number).await?;
            match mime::parse_rfc822(&uid, &raw) {
                Ok(message) => messages.push(message),
                // One unreadable message must not wedge the whole mailbox.
                Err(e) => warn!("Skipping unparseable message {}: {}", uid, e),
            }
        }

        session.quit().await;
        Ok(messages)
    }

    async fn send_reply(&self, message_id: &str, _body: &str) -> Result<()> {
        warn!(
            "POP3 transport cannot send replies; dropping receipt for {}",
            message_id
        );
        Ok(())
    }

    async fn mark_processed(&self, message_id: &str) -> Result<()> {
        self.processed.write().await.insert(message_id.to_string());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "pop3"
    }
}

/// One POP3 conversation.
struct Pop3Session {
    stream: BufStream<BoxedStream>,
}

impl Pop3Session {
    fn new(stream: BoxedStream) -> Self {
        Self {
            stream: BufStream::new(stream),
        }
    }

    /// Read one `+OK`/`-ERR` status line.
    async fn read_status(&mut self) -> Result<String> {
        let mut line = String::new();
        self.stream.read_line(&mut line).await?;
        let line = line.trim_end().to_string();

        if line.starts_with("+OK") {
            Ok(line)
        } else {
            Err(MailError::pop3(line))
        }
    }

    /// Send a command and read its status line.
    async fn command(&mut self, cmd: &str) -> Result<String> {
        self.stream.write_all(cmd.as_bytes()).await?;
        self.stream.write_all(b"\r\n").await?;
        self.stream.flush().await?;
        self.read_status().await
    }

    /// Read a multiline response body up to the lone-dot terminator,
    /// reversing dot-stuffing.
    async fn read_multiline(&mut self) -> Result<Vec<u8>> {
        let mut body = Vec::new();
        loop {
            let mut line = Vec::new();
            let n = self.stream.read_until(b'\n', &mut line).await?;
            if n == 0 {
                return Err(MailError::pop3("connection closed mid-response"));
            }

            if line == b".\r\n" || line == b".\n" {
                return Ok(body);
            }

            if line.starts_with(b"..") {
                body.extend_from_slice(&line[1..]);
            } else {
                body.extend_from_slice(&line);
            }
        }
    }

    /// `UIDL`: message number and unique id pairs.
    async fn uidl(&mut self) -> Result<Vec<(u32, String)>> {
        self.command("UIDL").await?;
        let body = self.read_multiline().await?;
        let text = String::from_utf8_lossy(&body);

        let mut listing = Vec::new();
        for line in text.lines() {
            let mut parts = line.split_whitespace();
            let number = parts
                .next()
                .and_then(|n| n.parse::<u32>().ok())
                .ok_or_else(|| MailError::pop3(format!("bad UIDL line: {}", line)))?;
            let uid = parts
                .next()
                .ok_or_else(|| MailError::pop3(format!("bad UIDL line: {}", line)))?;
            listing.push((number, uid.to_string()));
        }
        Ok(listing)
    }

    /// `RETR n`: the full raw message.
    async fn retr(&mut self, number: u32) -> Result<Vec<u8>> {
        self.command(&format!("RETR {}", number)).await?;
        self.read_multiline().await
    }

    /// Best-effort `QUIT`.
    async fn quit(&mut self) {
        if let Err(e) = self.command("QUIT").await {
            info!("POP3 QUIT failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults_to_pop3s() {
        let config = Pop3Config::new("mail.example.com", "intake", "secret");
        assert_eq!(config.port, 995);
        assert!(config.ssl);
    }

    #[test]
    fn test_config_plain_variant() {
        let config = Pop3Config::new("mail.example.com", "intake", "secret")
            .port(110)
            .ssl(false);
        assert_eq!(config.port, 110);
        assert!(!config.ssl);
    }

    #[tokio::test]
    async fn test_mark_processed_is_in_memory() {
        let transport = Pop3Transport::new(Pop3Config::new("h", "u", "p"));
        transport.mark_processed("uid-1").await.unwrap();
        assert!(transport.processed.read().await.contains("uid-1"));
    }
}
