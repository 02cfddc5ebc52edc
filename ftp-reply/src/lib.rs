// Copyright © 2026 the ftp-rs authors
//
// Permission is hereby granted, free of charge, to any person obtaining a copy
// of this software and associated documentation files (the “Software”), to
// deal in the Software without restriction, including without limitation the
// rights to use, copy, modify, merge, publish, distribute, sublicense, and/or
// sell copies of the Software, and to permit persons to whom the Software is
// furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in
// all copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED “AS IS”, WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
// AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING
// FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS
// IN THE SOFTWARE.

//! # FTP REPLY PARSING
//! **Based on RFC 959 §4.2**
//!
//! Turns raw, CRLF-stripped lines from an FTP control channel into a
//! structured [Reply], and provides the small set of auxiliary parsers
//! (PASV, PORT, SIZE, PWD) needed to drive a data channel and interpret the
//! handful of replies whose message carries a machine-readable payload.
//!
//! ---------------------------------------------------------------------------
//!
//! To use this crate:
//! - Accumulate lines from the control channel and pass them to
//!   [parse_reply] once a terminator line has been seen.
//! - Inspect the resulting [Reply] with its predicate methods.
//! - Use [pasv::parse_pasv_reply] / [pasv::format_port_argument] /
//!   [pasv::parse_size_reply] / [pasv::parse_pwd_reply] for the replies that
//!   carry a data-channel endpoint, a numeric size, or a quoted path.
//!
//! [Reply]: Reply
//! [parse_reply]: parse_reply

pub mod pasv;

pub use pasv::{format_port_argument, parse_pasv_reply, parse_pwd_reply, parse_size_reply};

/// ## REPLY
///
/// A structured FTP server reply: a three-digit [code], a human-readable
/// [message] (the per-line text after the code, joined with `\n` for
/// multiline replies), and the [lines] as received, preserved for
/// diagnostics.
///
/// [code]: Reply::code
/// [message]: Reply::message
/// [lines]: Reply::lines
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub code: u16,
    pub message: String,
    pub lines: Vec<String>,
}

impl Reply {
    /// 1xx — acknowledges that a data transfer is starting.
    pub fn is_preliminary(&self) -> bool {
        self.code / 100 == 1
    }

    /// 2xx — the requested action has succeeded.
    pub fn is_success(&self) -> bool {
        self.code / 100 == 2
    }

    /// 3xx — the command was accepted but further information is required.
    pub fn is_intermediate(&self) -> bool {
        self.code / 100 == 3
    }

    /// 4xx — the command failed for a reason the caller may retry.
    pub fn is_transient_error(&self) -> bool {
        self.code / 100 == 4
    }

    /// 5xx — the command failed permanently.
    pub fn is_permanent_error(&self) -> bool {
        self.code / 100 == 5
    }

    /// Either flavor of negative reply (4xx or 5xx).
    pub fn is_error(&self) -> bool {
        self.is_transient_error() || self.is_permanent_error()
    }
}

impl std::fmt::Display for Reply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.code, self.message)
    }
}

/// ## PARSE ERROR
///
/// Distinguishes the ways a sequence of lines can fail to form a valid
/// [Reply], preserving the offending text for logging.
///
/// [Reply]: Reply
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("empty reply")]
    Empty,

    #[error("malformed status line: {0:?}")]
    MalformedStatusLine(String),

    #[error("multiline reply never reached its terminator line")]
    UnterminatedMultiline,

    #[error("invalid PASV tuple in reply: {0:?}")]
    InvalidPasvTuple(String),

    #[error("invalid host address: {0:?}")]
    InvalidHostAddress(String),
}

/// ### PARSE REPLY
/// **Based on RFC 959 §4.2**
///
/// Parses a complete, ordered sequence of CRLF-stripped lines into a
/// [Reply].
///
/// The first line must begin with three ASCII digits, which become
/// [Reply::code]. If the fourth character of the first line is `-`, the
/// reply is multiline: further lines are expected until one begins with the
/// same three digits followed by a space, and [Reply::message] joins each
/// line's text (the part after the code prefix) with `\n`. A single-line
/// reply's message is simply the text after the first space.
///
/// This function does not read from a socket — callers are expected to
/// collect the lines first (see `ftp_client::control::ControlChannel::recv_reply`),
/// checking after each line whether a terminator has been reached.
///
/// [Reply]: Reply
pub fn parse_reply(lines: &[String]) -> Result<Reply, ParseError> {
    let first = lines.first().ok_or(ParseError::Empty)?;
    let code = parse_code(first)?;

    // Single-line reply: message is whatever follows the first space (if
    // any) on the first line.
    if lines.len() == 1 {
        let message = first.get(4..).unwrap_or("").to_string();
        return Ok(Reply {
            code,
            message,
            lines: lines.to_vec(),
        });
    }

    // Multiline reply: every line contributes its post-code text, joined by
    // newlines. The terminator line (matched by the caller via
    // `is_multiline_terminator`) is included like any other line.
    let mut parts = Vec::with_capacity(lines.len());
    for line in lines {
        parts.push(strip_code_prefix(line, code));
    }
    Ok(Reply {
        code,
        message: parts.join("\n"),
        lines: lines.to_vec(),
    })
}

/// Whether `line`'s first line marks the body as multiline (fourth
/// character is `-`).
pub fn is_multiline_start(first_line: &str) -> bool {
    first_line.as_bytes().get(3) == Some(&b'-')
}

/// Whether `line` is the terminator of a multiline reply begun with `code`
/// (it starts with the three digits of `code` followed by a space).
pub fn is_multiline_terminator(line: &str, code: u16) -> bool {
    let prefix = format!("{code:03}");
    line.len() >= 4 && line.starts_with(&prefix) && line.as_bytes()[3] == b' '
}

fn parse_code(first_line: &str) -> Result<u16, ParseError> {
    let digits = first_line
        .get(0..3)
        .ok_or_else(|| ParseError::MalformedStatusLine(first_line.to_string()))?;
    let code: u16 = digits
        .parse()
        .map_err(|_| ParseError::MalformedStatusLine(first_line.to_string()))?;
    if !(100..=599).contains(&code) {
        return Err(ParseError::MalformedStatusLine(first_line.to_string()));
    }
    Ok(code)
}

fn strip_code_prefix(line: &str, code: u16) -> &str {
    let prefix_with_dash = format!("{code:03}-");
    let prefix_with_space = format!("{code:03} ");
    if let Some(rest) = line.strip_prefix(&prefix_with_dash) {
        rest
    } else if let Some(rest) = line.strip_prefix(&prefix_with_space) {
        rest
    } else {
        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_line_reply() {
        let lines = vec!["220 Welcome".to_string()];
        let reply = parse_reply(&lines).unwrap();
        assert_eq!(reply.code, 220);
        assert_eq!(reply.message, "Welcome");
        assert!(reply.is_success());
    }

    #[test]
    fn multiline_reply_joins_with_newline() {
        let lines = vec![
            "220-Line1".to_string(),
            "220-Line2".to_string(),
            "220 Done".to_string(),
        ];
        let reply = parse_reply(&lines).unwrap();
        assert_eq!(reply.code, 220);
        assert_eq!(reply.message, "Line1\nLine2\nDone");
    }

    #[test]
    fn rejects_empty_input() {
        assert_eq!(parse_reply(&[]).unwrap_err(), ParseError::Empty);
    }

    #[test]
    fn rejects_non_numeric_code() {
        let lines = vec!["abc Welcome".to_string()];
        assert!(matches!(
            parse_reply(&lines),
            Err(ParseError::MalformedStatusLine(_))
        ));
    }

    #[test]
    fn rejects_out_of_range_code() {
        let lines = vec!["999 oh no".to_string()];
        assert!(matches!(
            parse_reply(&lines),
            Err(ParseError::MalformedStatusLine(_))
        ));
    }

    #[test]
    fn predicates_cover_every_class() {
        for (code, preliminary, success, intermediate, transient, permanent) in [
            (150u16, true, false, false, false, false),
            (226, false, true, false, false, false),
            (350, false, false, true, false, false),
            (426, false, false, false, true, false),
            (550, false, false, false, false, true),
        ] {
            let reply = Reply {
                code,
                message: String::new(),
                lines: vec![],
            };
            assert_eq!(reply.is_preliminary(), preliminary);
            assert_eq!(reply.is_success(), success);
            assert_eq!(reply.is_intermediate(), intermediate);
            assert_eq!(reply.is_transient_error(), transient);
            assert_eq!(reply.is_permanent_error(), permanent);
        }
    }
}
