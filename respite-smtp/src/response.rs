//! SMTP reply parsing, including multi-line replies.

use crate::error::{ClientError, Result};

/// A complete server reply. Multi-line replies share one status code; the
/// final line uses a space separator, continuation lines a dash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub code: u16,
    pub lines: Vec<String>,
}

impl Reply {
    /// All message lines joined into one string.
    #[must_use]
    pub fn message(&self) -> String {
        self.lines.join(" ")
    }

    /// 2xx.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.code >= 200 && self.code < 300
    }

    /// 3xx: the server expects more input (354 after DATA, 334 during AUTH).
    #[must_use]
    pub const fn is_intermediate(&self) -> bool {
        self.code >= 300 && self.code < 400
    }

    /// 4xx or 5xx.
    #[must_use]
    pub const fn is_error(&self) -> bool {
        self.code >= 400 && self.code < 600
    }

    pub(crate) fn into_status_error(self) -> ClientError {
        ClientError::Status {
            code: self.code,
            message: self.message(),
        }
    }

    /// Try to parse one complete reply from the front of `buffer`.
    ///
    /// Returns the reply and the number of bytes consumed, or `None` when
    /// more data is needed.
    pub(crate) fn try_parse(buffer: &[u8]) -> Result<Option<(Self, usize)>> {
        let text = std::str::from_utf8(buffer)
            .map_err(|e| ClientError::Parse(format!("reply is not valid UTF-8: {e}")))?;

        let mut lines = Vec::new();
        let mut code = None;
        let mut consumed = 0;

        let mut rest = text;
        loop {
            let Some(end) = rest.find("\r\n") else {
                return Ok(None);
            };
            let line = &rest[..end];
            let (line_code, is_last, message) = parse_line(line)?;

            if let Some(code) = code
                && code != line_code
            {
                return Err(ClientError::Parse(format!(
                    "status code changed mid-reply: {code} then {line_code}"
                )));
            }
            code = Some(line_code);
            lines.push(message);
            consumed += end + 2;

            if is_last {
                let code = code.unwrap_or_default();
                return Ok(Some((Self { code, lines }, consumed)));
            }
            rest = &rest[end + 2..];
        }
    }
}

/// Split one reply line into code, final-line flag and message text.
fn parse_line(line: &str) -> Result<(u16, bool, String)> {
    if line.len() < 3 {
        return Err(ClientError::Parse(format!("reply line too short: '{line}'")));
    }

    let code = line[..3]
        .parse::<u16>()
        .map_err(|_| ClientError::Parse(format!("invalid status code in '{line}'")))?;

    let (is_last, message) = match line.as_bytes().get(3) {
        Some(b' ') => (true, line[4..].to_string()),
        Some(b'-') => (false, line[4..].to_string()),
        Some(c) => {
            return Err(ClientError::Parse(format!(
                "invalid separator '{}' in '{line}'",
                char::from(*c)
            )));
        }
        None => (true, String::new()),
    };

    Ok((code, is_last, message))
}
