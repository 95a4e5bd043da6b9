//! Minimal IMAPS transport.
//!
//! Speaks LOGIN, SELECT, UID SEARCH UNSEEN, UID FETCH (BODY.PEEK[]) and
//! UID STORE +FLAGS (\Seen). Fetching peeks so the unseen flag survives a
//! crashed pipeline run; only an explicit `mark_processed` flags the
//! message seen. Replies go out through an SMTP sibling.

use std::collections::HashMap;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufStream};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::net::{connect, BoxedStream};
use crate::smtp::ReplyMailer;
use crate::{mime, EmailMessage, EmailTransport, MailError, Result};

/// IMAP configuration.
#[derive(Debug, Clone)]
pub struct ImapConfig {
    /// Server host.
    pub host: String,
    /// Server port (993 for implicit TLS).
    pub port: u16,
    /// Mailbox user.
    pub username: String,
    /// Mailbox password.
    pub password: String,
    /// Mailbox to poll.
    pub mailbox: String,
}

impl ImapConfig {
    /// Create a configuration with the IMAPS default port.
    pub fn new(
        host: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port: 993,
            username: username.into(),
            password: password.into(),
            mailbox: "INBOX".to_string(),
        }
    }

    /// Set the port.
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the mailbox name.
    pub fn mailbox(mut self, mailbox: impl Into<String>) -> Self {
        self.mailbox = mailbox.into();
        self
    }
}

/// Sender and subject kept for building a reply later.
#[derive(Debug, Clone)]
struct ReplyContext {
    sender: String,
    subject: String,
}

/// IMAP mailbox transport with an SMTP reply channel.
pub struct ImapTransport {
    config: ImapConfig,
    mailer: Option<ReplyMailer>,
    session: Mutex<Option<ImapSession>>,
    reply_contexts: RwLock<HashMap<String, ReplyContext>>,
}

impl ImapTransport {
    /// Create a transport. Without a mailer, replies are logged and dropped.
    pub fn new(config: ImapConfig, mailer: Option<ReplyMailer>) -> Self {
        Self {
            config,
            mailer,
            session: Mutex::new(None),
            reply_contexts: RwLock::new(HashMap::new()),
        }
    }

    /// Borrow the cached session, connecting and logging in if needed.
    async fn with_session<T, F>(&self, op: F) -> Result<T>
    where
        F: for<'a> FnOnce(&'a mut ImapSession) -> SessionFuture<'a, T>,
    {
        let mut guard = self.session.lock().await;

        if guard.is_none() {
            let stream = connect(&self.config.host, self.config.port, true).await?;
            let mut session = ImapSession::new(stream);
            session.greeting().await?;
            session
                .command(&format!(
                    "LOGIN {} {}",
                    quote(&self.config.username),
                    quote(&self.config.password)
                ))
                .await
                .map_err(|e| MailError::Auth(e.to_string()))?;
            session
                .command(&format!("SELECT {}", quote(&self.config.mailbox)))
                .await?;
            *guard = Some(session);
        }

        let session = guard.as_mut().expect("session populated above");
        let result = op(session).await;
        if result.is_err() {
            // Drop the session so the next call reconnects cleanly.
            *guard = None;
        }
        result
    }
}

#[async_trait::async_trait]
impl EmailTransport for ImapTransport {
    async fn fetch_new(&self) -> Result<Vec<EmailMessage>> {
        let uids = self
            .with_session(|session| Box::pin(session.uid_search_unseen()))
            .await?;

        debug!("IMAP mailbox: {} unseen messages", uids.len());

        let mut messages = Vec::with_capacity(uids.len());
        for uid in uids {
            let raw = {
                let uid = uid.clone();
                self.with_session(move |session| {
                    Box::pin(async move { session.uid_fetch_body(&uid).await })
                })
                .await?
            };
            match mime::parse_rfc822(&uid, &raw) {
                Ok(message) => messages.push(message),
                Err(e) => warn!("Skipping unparseable message {}: {}", uid, e),
            }
        }

        let mut contexts = self.reply_contexts.write().await;
        for message in &messages {
            contexts.insert(message.id.clone(), ReplyContext {
                sender: message.from.clone(),
                subject: message.subject.clone(),
            });
        }

        Ok(messages)
    }

    async fn send_reply(&self, message_id: &str, body: &str) -> Result<()> {
        let Some(mailer) = &self.mailer else {
            warn!(
                "IMAP transport has no SMTP sibling; dropping receipt for {}",
                message_id
            );
            return Ok(());
        };

        let context = self
            .reply_contexts
            .read()
            .await
            .get(message_id)
            .cloned()
            .ok_or_else(|| {
                MailError::imap(format!("no reply context for message {}", message_id))
            })?;

        let subject = format!("Re: {}", context.subject);
        mailer.send(&context.sender, &subject, body).await
    }

    async fn mark_processed(&self, message_id: &str) -> Result<()> {
        let uid = message_id.to_string();
        self.with_session(move |session| {
            Box::pin(async move { session.uid_mark_seen(&uid).await })
        })
        .await
    }

    fn name(&self) -> &'static str {
        "imap"
    }
}

/// Future borrowing the cached session for one operation.
type SessionFuture<'a, T> =
    std::pin::Pin<Box<dyn std::future::Future<Output = Result<T>> + Send + 'a>>;

/// Quote an IMAP astring argument.
fn quote(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

/// One IMAP conversation.
struct ImapSession {
    stream: BufStream<BoxedStream>,
    tag_counter: u32,
}

/// An untagged response line plus any literal that followed it.
struct UntaggedLine {
    line: String,
    literal: Option<Vec<u8>>,
}

impl ImapSession {
    fn new(stream: BoxedStream) -> Self {
        Self {
            stream: BufStream::new(stream),
            tag_counter: 0,
        }
    }

    async fn read_line(&mut self) -> Result<String> {
        let mut line = String::new();
        let n = self.stream.read_line(&mut line).await?;
        if n == 0 {
            return Err(MailError::imap("connection closed"));
        }
        Ok(line.trim_end().to_string())
    }

    /// Consume the server greeting.
    async fn greeting(&mut self) -> Result<()> {
        let line = self.read_line().await?;
        if line.starts_with("* OK") || line.starts_with("* PREAUTH") {
            Ok(())
        } else {
            Err(MailError::imap(line))
        }
    }

    /// Send a tagged command and collect untagged lines (with literals)
    /// until the tagged completion.
    async fn command(&mut self, cmd: &str) -> Result<Vec<UntaggedLine>> {
        self.tag_counter += 1;
        let tag = format!("a{}", self.tag_counter);

        self.stream.write_all(tag.as_bytes()).await?;
        self.stream.write_all(b" ").await?;
        self.stream.write_all(cmd.as_bytes()).await?;
        self.stream.write_all(b"\r\n").await?;
        self.stream.flush().await?;

        let mut untagged = Vec::new();
        loop {
            let line = self.read_line().await?;

            if let Some(status) = line.strip_prefix(&format!("{} ", tag)) {
                if status.starts_with("OK") {
                    return Ok(untagged);
                }
                return Err(MailError::imap(status.to_string()));
            }

            // A trailing {n} announces n literal bytes before the line
            // continues; the continuation (usually a lone `)`) is dropped.
            let literal = match parse_literal_length(&line) {
                Some(length) => {
                    let mut buffer = vec![0u8; length];
                    self.stream.read_exact(&mut buffer).await?;
                    self.read_line().await?;
                    Some(buffer)
                }
                None => None,
            };

            untagged.push(UntaggedLine { line, literal });
        }
    }

    /// `UID SEARCH UNSEEN`: unseen message UIDs.
    async fn uid_search_unseen(&mut self) -> Result<Vec<String>> {
        let lines = self.command("UID SEARCH UNSEEN").await?;

        for UntaggedLine { line, .. } in lines {
            if let Some(rest) = line.strip_prefix("* SEARCH") {
                return Ok(rest.split_whitespace().map(str::to_string).collect());
            }
        }
        Ok(Vec::new())
    }

    /// `UID FETCH uid (BODY.PEEK[])`: the raw message without touching
    /// the seen flag.
    async fn uid_fetch_body(&mut self, uid: &str) -> Result<Vec<u8>> {
        let lines = self
            .command(&format!("UID FETCH {} (BODY.PEEK[])", uid))
            .await?;

        lines
            .into_iter()
            .find_map(|entry| entry.literal)
            .ok_or_else(|| MailError::imap(format!("no body returned for UID {}", uid)))
    }

    /// `UID STORE uid +FLAGS (\Seen)`.
    async fn uid_mark_seen(&mut self, uid: &str) -> Result<()> {
        self.command(&format!("UID STORE {} +FLAGS.SILENT (\\Seen)", uid))
            .await?;
        Ok(())
    }
}

/// Extract `n` from a line ending in `{n}`.
fn parse_literal_length(line: &str) -> Option<usize> {
    let rest = line.strip_suffix('}')?;
    let open = rest.rfind('{')?;
    rest[open + 1..].parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_length_parsing() {
        assert_eq!(
            parse_literal_length("* 1 FETCH (UID 5 BODY[] {1234}"),
            Some(1234)
        );
        assert_eq!(parse_literal_length("* 1 FETCH (FLAGS (\\Seen))"), None);
        assert_eq!(parse_literal_length("{not-a-number}"), None);
    }

    #[test]
    fn test_quoting_escapes() {
        assert_eq!(quote("plain"), "\"plain\"");
        assert_eq!(quote("pa\"ss"), "\"pa\\\"ss\"");
        assert_eq!(quote("back\\slash"), "\"back\\\\slash\"");
    }

    #[test]
    fn test_config_defaults() {
        let config = ImapConfig::new("imap.example.com", "intake", "secret");
        assert_eq!(config.port, 993);
        assert_eq!(config.mailbox, "INBOX");
    }
}
