use std::borrow::Cow;

use base64::{Engine as _, engine::general_purpose::STANDARD};
use rand::{Rng, distr::Alphanumeric};

/// RFC 2045 limit on encoded line length.
pub const LINE_LENGTH: usize = 76;

const BOUNDARY_PREFIX: &str = "BOUNDARY-";
const BOUNDARY_RANDOM_LEN: usize = 32;

/// A fresh multipart boundary: a fixed marker followed by 32 random
/// alphanumerics from the thread-local CSPRNG.
#[must_use]
pub fn boundary() -> String {
    let mut boundary = String::with_capacity(BOUNDARY_PREFIX.len() + BOUNDARY_RANDOM_LEN);
    boundary.push_str(BOUNDARY_PREFIX);
    boundary.extend(
        rand::rng()
            .sample_iter(Alphanumeric)
            .take(BOUNDARY_RANDOM_LEN)
            .map(char::from),
    );
    boundary
}

/// Base64 with every line, including the last, terminated by CRLF and no line
/// longer than [`LINE_LENGTH`].
#[must_use]
pub fn base64_lines(data: &[u8]) -> String {
    let encoded = STANDARD.encode(data);
    let mut out = String::with_capacity(encoded.len() + encoded.len() / LINE_LENGTH * 2 + 2);

    let mut rest = encoded.as_str();
    while !rest.is_empty() {
        let (line, tail) = rest.split_at(rest.len().min(LINE_LENGTH));
        out.push_str(line);
        out.push_str("\r\n");
        rest = tail;
    }
    out
}

/// Rewrites every bare LF as CRLF, leaving existing CRLF pairs alone, so the
/// text matches what goes out on the wire.
#[must_use]
pub fn crlf_lines(text: &str) -> Cow<'_, str> {
    let bytes = text.as_bytes();
    let bare = bytes
        .iter()
        .enumerate()
        .filter(|&(i, &b)| b == b'\n' && (i == 0 || bytes[i - 1] != b'\r'))
        .count();
    if bare == 0 {
        return Cow::Borrowed(text);
    }

    let mut out = String::with_capacity(text.len() + bare);
    let mut previous = None;
    for c in text.chars() {
        if c == '\n' && previous != Some('\r') {
            out.push('\r');
        }
        out.push(c);
        previous = Some(c);
    }
    Cow::Owned(out)
}

/// `data:<mime>;base64,<payload>` for embedding content inline, e.g. in an
/// HTML body.
#[must_use]
pub fn data_uri(mime_type: &str, data: &[u8]) -> String {
    format!("data:{mime_type};base64,{}", STANDARD.encode(data))
}
