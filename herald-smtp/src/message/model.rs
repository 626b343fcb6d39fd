//! The email value object handed to the builder.

use std::fmt;

/// Importance level, rendered as the `X-Priority` / `Importance` header pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Priority {
    Highest = 1,
    High = 2,
    Normal = 3,
    Low = 4,
    Lowest = 5,
}

impl Priority {
    /// Maps the numeric 1-5 scale; anything else means "no priority".
    #[must_use]
    pub const fn from_level(level: i32) -> Option<Self> {
        match level {
            1 => Some(Self::Highest),
            2 => Some(Self::High),
            3 => Some(Self::Normal),
            4 => Some(Self::Low),
            5 => Some(Self::Lowest),
            _ => None,
        }
    }

    #[must_use]
    pub const fn level(self) -> i32 {
        self as i32
    }

    #[must_use]
    pub const fn x_priority(self) -> &'static str {
        match self {
            Self::Highest => "1 (Highest)",
            Self::High => "2 (High)",
            Self::Normal => "3 (Normal)",
            Self::Low => "4 (Low)",
            Self::Lowest => "5 (Lowest)",
        }
    }

    #[must_use]
    pub const fn importance(self) -> &'static str {
        match self {
            Self::Highest | Self::High => "High",
            Self::Normal => "Normal",
            Self::Low | Self::Lowest => "Low",
        }
    }
}

/// A file carried as a base64 MIME part. The MIME type is taken as given.
#[derive(Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub data: Vec<u8>,
    pub mime_type: String,
}

impl Attachment {
    #[must_use]
    pub fn new(filename: impl Into<String>, mime_type: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            data: data.into(),
            mime_type: mime_type.into(),
        }
    }

    /// Images get a `Content-ID` so HTML bodies can reference them as
    /// `cid:<filename>`.
    #[must_use]
    pub fn is_inline_image(&self) -> bool {
        let Some((_, extension)) = self.filename.rsplit_once('.') else {
            return false;
        };
        ["png", "jpg", "jpeg", "gif"]
            .iter()
            .any(|image| extension.eq_ignore_ascii_case(image))
    }
}

impl fmt::Debug for Attachment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attachment")
            .field("filename", &self.filename)
            .field("mime_type", &self.mime_type)
            .field("len", &self.data.len())
            .finish()
    }
}

/// One email. Built up with the `add_*`/`set_*` helpers, then rendered by
/// [`super::build`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    /// Sender; when unset the mailer's configured address is used.
    pub from: Option<String>,
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
    pub reply_to: Option<String>,
    pub subject: String,
    pub plain_body: String,
    pub html_body: String,
    pub attachments: Vec<Attachment>,
    headers: Vec<(String, String)>,
    priority: Option<Priority>,
    read_receipt: bool,
    delivery_receipt: bool,
}

impl Message {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_from(&mut self, address: impl Into<String>) -> &mut Self {
        self.from = Some(address.into());
        self
    }

    pub fn add_to(&mut self, address: impl Into<String>) -> &mut Self {
        self.to.push(address.into());
        self
    }

    pub fn add_cc(&mut self, address: impl Into<String>) -> &mut Self {
        self.cc.push(address.into());
        self
    }

    pub fn add_bcc(&mut self, address: impl Into<String>) -> &mut Self {
        self.bcc.push(address.into());
        self
    }

    pub fn set_reply_to(&mut self, address: impl Into<String>) -> &mut Self {
        self.reply_to = Some(address.into());
        self
    }

    pub fn set_subject(&mut self, subject: impl Into<String>) -> &mut Self {
        self.subject = subject.into();
        self
    }

    pub fn set_plain_body(&mut self, body: impl Into<String>) -> &mut Self {
        self.plain_body = body.into();
        self
    }

    pub fn set_html_body(&mut self, body: impl Into<String>) -> &mut Self {
        self.html_body = body.into();
        self
    }

    pub fn add_attachment(&mut self, attachment: Attachment) -> &mut Self {
        self.attachments.push(attachment);
        self
    }

    /// Sets a custom header. Names compare case-insensitively; setting an
    /// existing one replaces it where it stands, otherwise it is appended.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        upsert_header(&mut self.headers, name.into(), value.into());
        self
    }

    /// Custom headers in emission order.
    #[must_use]
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    /// Sets the priority on the 1 (highest) to 5 (lowest) scale. Any other
    /// value clears it, so no priority headers are emitted.
    pub fn set_priority(&mut self, level: i32) -> &mut Self {
        self.priority = Priority::from_level(level);
        self
    }

    #[must_use]
    pub const fn priority(&self) -> Option<Priority> {
        self.priority
    }

    /// Requests a read receipt (`Disposition-Notification-To`).
    pub fn request_read_receipt(&mut self, enable: bool) -> &mut Self {
        self.read_receipt = enable;
        self
    }

    /// Requests a delivery receipt (`Return-Receipt-To`).
    pub fn request_delivery_receipt(&mut self, enable: bool) -> &mut Self {
        self.delivery_receipt = enable;
        self
    }

    #[must_use]
    pub const fn read_receipt(&self) -> bool {
        self.read_receipt
    }

    #[must_use]
    pub const fn delivery_receipt(&self) -> bool {
        self.delivery_receipt
    }

    /// Envelope recipients: To, then Cc, then Bcc. Duplicates are kept.
    #[must_use]
    pub fn recipients(&self) -> Vec<String> {
        self.to
            .iter()
            .chain(&self.cc)
            .chain(&self.bcc)
            .cloned()
            .collect()
    }
}

pub(crate) fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}

pub(crate) fn upsert_header(headers: &mut Vec<(String, String)>, name: String, value: String) {
    match headers
        .iter_mut()
        .find(|(key, _)| key.eq_ignore_ascii_case(&name))
    {
        Some(existing) => *existing = (name, value),
        None => headers.push((name, value)),
    }
}
