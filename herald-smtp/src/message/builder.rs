//! Renders a [`Message`] into RFC 5322 headers and a MIME body.
//!
//! The body is always `multipart/mixed`: one `multipart/alternative` part
//! holding the plain and/or HTML text, followed by one base64 part per
//! attachment.

use std::fmt::{self, Write as _};

use super::{
    encoding::{base64_lines, boundary, crlf_lines},
    model::{Message, find_header, upsert_header},
};

/// A rendered message, ready for signing and transmission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltMessage {
    sender: String,
    headers: Vec<(String, String)>,
    body: String,
    recipients: Vec<String>,
}

impl BuiltMessage {
    /// Envelope sender, used for MAIL FROM.
    #[must_use]
    pub fn sender(&self) -> &str {
        &self.sender
    }

    /// Header fields in emission order.
    #[must_use]
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    /// Everything after the blank line separating headers from content.
    #[must_use]
    pub fn body(&self) -> &str {
        &self.body
    }

    /// Envelope recipients: To, Cc and Bcc.
    #[must_use]
    pub fn recipients(&self) -> &[String] {
        &self.recipients
    }

    /// Inserts a header above all others, as trace and signature headers
    /// must be.
    pub fn prepend_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.insert(0, (name.into(), value.into()));
    }

    /// `Name: value` lines, each terminated by CRLF.
    #[must_use]
    pub fn header_block(&self) -> String {
        self.headers.iter().fold(String::new(), |mut block, (name, value)| {
            let _ = write!(block, "{name}: {value}\r\n");
            block
        })
    }

    /// The complete message as sent in the DATA phase.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        self.to_string().into_bytes()
    }
}

/// Renders the whole message, e.g. for previews.
impl fmt::Display for BuiltMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\r\n{}", self.header_block(), self.body)
    }
}

/// Renders `message` with its own `from` as sender.
#[must_use]
pub fn build(message: &Message) -> BuiltMessage {
    build_as(message, message.from.as_deref().unwrap_or_default())
}

/// Renders `message` on behalf of `sender` unless the message names its own.
#[must_use]
pub fn build_as(message: &Message, sender: &str) -> BuiltMessage {
    let sender = message.from.as_deref().unwrap_or(sender).to_string();
    let mixed = boundary();
    let alternative = boundary();

    BuiltMessage {
        headers: headers(message, &sender, &mixed),
        body: body(message, &mixed, &alternative),
        recipients: message.recipients(),
        sender,
    }
}

fn headers(message: &Message, sender: &str, mixed: &str) -> Vec<(String, String)> {
    let mut headers = vec![
        ("From".to_string(), sender.to_string()),
        ("To".to_string(), message.to.join(", ")),
    ];
    if !message.cc.is_empty() {
        headers.push(("Cc".to_string(), message.cc.join(", ")));
    }
    if let Some(reply_to) = &message.reply_to {
        headers.push(("Reply-To".to_string(), reply_to.clone()));
    }
    headers.push(("Subject".to_string(), message.subject.clone()));
    headers.push(("MIME-Version".to_string(), "1.0".to_string()));
    headers.push((
        "Content-Type".to_string(),
        format!("multipart/mixed; boundary=\"{mixed}\""),
    ));

    let mut set = |name: &str, value: String| upsert_header(&mut headers, name.to_string(), value);

    for (name, value) in message.headers() {
        set(name, value.clone());
    }
    if let Some(priority) = message.priority() {
        set("X-Priority", priority.x_priority().to_string());
        set("Importance", priority.importance().to_string());
    }
    if message.read_receipt() {
        set("Disposition-Notification-To", sender.to_string());
    }
    if message.delivery_receipt() {
        set("Return-Receipt-To", sender.to_string());
    }

    headers
}

fn body(message: &Message, mixed: &str, alternative: &str) -> String {
    let mut body = String::new();

    let _ = write!(
        body,
        "--{mixed}\r\nContent-Type: multipart/alternative; boundary=\"{alternative}\"\r\n\r\n"
    );
    for (subtype, text) in [("plain", &message.plain_body), ("html", &message.html_body)] {
        if text.is_empty() {
            continue;
        }
        let _ = write!(
            body,
            "--{alternative}\r\n\
             Content-Type: text/{subtype}; charset=\"UTF-8\"\r\n\
             Content-Transfer-Encoding: 8bit\r\n\r\n\
             {}\r\n",
            crlf_lines(text)
        );
    }
    let _ = write!(body, "--{alternative}--\r\n");

    for attachment in &message.attachments {
        let filename = &attachment.filename;
        let _ = write!(
            body,
            "--{mixed}\r\n\
             Content-Type: {}; name=\"{filename}\"\r\n\
             Content-Transfer-Encoding: base64\r\n\
             Content-Disposition: attachment; filename=\"{filename}\"\r\n",
            attachment.mime_type
        );
        if attachment.is_inline_image() {
            let _ = write!(body, "Content-ID: <{filename}>\r\n");
        }
        body.push_str("\r\n");
        body.push_str(&base64_lines(&attachment.data));
    }

    let _ = write!(body, "--{mixed}--\r\n");
    body
}
