//! Outbound message assembly: RFC 5322 headers, text body, MIME attachments.

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use chrono::Utc;

/// Base64 lines are wrapped at the RFC 2045 limit.
const BASE64_LINE_WIDTH: usize = 76;

/// An attachment payload already read from disk.
#[derive(Debug, Clone)]
struct AttachmentPart {
    filename: String,
    bytes: Vec<u8>,
}

/// Builds the wire form of one outbound message.
///
/// With no attachments the result is a plain `text/plain; charset=utf-8`
/// message; with attachments it becomes `multipart/mixed` with base64 parts.
/// The output uses CRLF line endings throughout and has leading dots stuffed,
/// ready for the DATA phase.
#[derive(Debug, Clone)]
pub struct MessageBuilder<'a> {
    from: &'a str,
    to_name: &'a str,
    to: &'a str,
    subject: &'a str,
    body: &'a str,
    attachments: Vec<AttachmentPart>,
}

impl<'a> MessageBuilder<'a> {
    #[must_use]
    pub const fn new(
        from: &'a str,
        to_name: &'a str,
        to: &'a str,
        subject: &'a str,
        body: &'a str,
    ) -> Self {
        Self {
            from,
            to_name,
            to,
            subject,
            body,
            attachments: Vec::new(),
        }
    }

    /// Add one attachment payload.
    pub fn attach(&mut self, filename: String, bytes: Vec<u8>) {
        self.attachments.push(AttachmentPart { filename, bytes });
    }

    /// Render the complete message.
    #[must_use]
    pub fn build(&self) -> String {
        let date = Utc::now();
        let mut out = String::new();

        push_header(&mut out, "Date", &date.to_rfc2822());
        push_header(&mut out, "From", self.from);
        push_header(
            &mut out,
            "To",
            &format!("{} <{}>", encode_header_word(self.to_name), self.to),
        );
        push_header(&mut out, "Subject", &encode_header_word(self.subject));
        push_header(
            &mut out,
            "Message-ID",
            &format!("<{}.{}>", date.timestamp_micros(), domain_of(self.from)),
        );
        push_header(&mut out, "MIME-Version", "1.0");

        if self.attachments.is_empty() {
            push_header(&mut out, "Content-Type", "text/plain; charset=utf-8");
            push_header(&mut out, "Content-Transfer-Encoding", "8bit");
            out.push_str("\r\n");
            push_body_text(&mut out, self.body);
        } else {
            let boundary = format!("=_respite_{:x}", date.timestamp_micros());
            push_header(
                &mut out,
                "Content-Type",
                &format!("multipart/mixed; boundary=\"{boundary}\""),
            );
            out.push_str("\r\n");

            out.push_str(&format!("--{boundary}\r\n"));
            push_header(&mut out, "Content-Type", "text/plain; charset=utf-8");
            push_header(&mut out, "Content-Transfer-Encoding", "8bit");
            out.push_str("\r\n");
            push_body_text(&mut out, self.body);

            for part in &self.attachments {
                out.push_str(&format!("--{boundary}\r\n"));
                push_header(
                    &mut out,
                    "Content-Type",
                    &format!("application/octet-stream; name=\"{}\"", part.filename),
                );
                push_header(&mut out, "Content-Transfer-Encoding", "base64");
                push_header(
                    &mut out,
                    "Content-Disposition",
                    &format!("attachment; filename=\"{}\"", part.filename),
                );
                out.push_str("\r\n");

                let encoded = BASE64.encode(&part.bytes);
                for chunk in encoded.as_bytes().chunks(BASE64_LINE_WIDTH) {
                    // Base64 output is always valid ASCII.
                    out.push_str(std::str::from_utf8(chunk).unwrap_or_default());
                    out.push_str("\r\n");
                }
            }
            out.push_str(&format!("--{boundary}--\r\n"));
        }

        out
    }
}

fn push_header(out: &mut String, name: &str, value: &str) {
    out.push_str(name);
    out.push_str(": ");
    out.push_str(value);
    out.push_str("\r\n");
}

/// Normalize body lines to CRLF and stuff leading dots (RFC 5321 §4.5.2).
fn push_body_text(out: &mut String, body: &str) {
    for line in body.split('\n') {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.starts_with('.') {
            out.push('.');
        }
        out.push_str(line);
        out.push_str("\r\n");
    }
}

/// RFC 2047 encoded-word for non-ASCII header values; ASCII passes through.
fn encode_header_word(value: &str) -> String {
    if value.is_ascii() {
        value.to_string()
    } else {
        format!("=?utf-8?B?{}?=", BASE64.encode(value.as_bytes()))
    }
}

fn domain_of(address: &str) -> &str {
    address.split_once('@').map_or(address, |(_, domain)| domain)
}
