//! ## AUXILIARY PARSERS
//!
//! Replies and arguments whose text carries a machine-readable payload:
//! the PASV data-channel endpoint, the PORT argument format (its inverse),
//! the SIZE byte count, and the PWD current-directory path.

use crate::{ParseError, Reply};

/// ### PARSE PASV REPLY
///
/// Extracts the first occurrence of `(h1,h2,h3,h4,p1,p2)` from a PASV
/// reply's message, where each element is in `0..=255`, and computes the
/// host as `"h1.h2.h3.h4"` and the port as `p1*256 + p2`.
pub fn parse_pasv_reply(reply: &Reply) -> Result<(String, u16), ParseError> {
    let message = &reply.message;
    let start = message
        .find('(')
        .ok_or_else(|| ParseError::InvalidPasvTuple(message.clone()))?;
    let end = message[start..]
        .find(')')
        .map(|offset| start + offset)
        .ok_or_else(|| ParseError::InvalidPasvTuple(message.clone()))?;

    let numbers: Vec<&str> = message[start + 1..end].split(',').collect();
    if numbers.len() != 6 {
        return Err(ParseError::InvalidPasvTuple(message.clone()));
    }

    let mut parts = [0u16; 6];
    for (slot, text) in parts.iter_mut().zip(numbers.iter()) {
        let value: u16 = text
            .trim()
            .parse()
            .map_err(|_| ParseError::InvalidPasvTuple(message.clone()))?;
        if value > 255 {
            return Err(ParseError::InvalidPasvTuple(message.clone()));
        }
        *slot = value;
    }

    let [h1, h2, h3, h4, p1, p2] = parts;
    let host = format!("{h1}.{h2}.{h3}.{h4}");
    let port = p1 * 256 + p2;
    Ok((host, port))
}

/// ### FORMAT PORT ARGUMENT
///
/// Inverse of [parse_pasv_reply]'s tuple extraction: splits an IPv4
/// address on `.` and emits the six comma-separated decimals expected by
/// the PORT command argument.
pub fn format_port_argument(host: &str, port: u16) -> Result<String, ParseError> {
    let octets: Vec<&str> = host.split('.').collect();
    if octets.len() != 4 || octets.iter().any(|o| o.parse::<u8>().is_err()) {
        return Err(ParseError::InvalidHostAddress(host.to_string()));
    }
    let p1 = port / 256;
    let p2 = port % 256;
    Ok(format!("{},{},{}", octets.join(","), p1, p2))
}

/// ### PARSE SIZE REPLY
///
/// Parses the trimmed message of a 213 reply as a non-negative integer;
/// yields `None` for any other reply code or unparsable message.
pub fn parse_size_reply(reply: &Reply) -> Option<u64> {
    if reply.code != 213 {
        return None;
    }
    reply.message.trim().parse().ok()
}

/// ### PARSE PWD REPLY
///
/// Extracts the first double-quoted substring from a 257 reply; yields
/// `None` for any other reply code or if no quoted substring is present.
pub fn parse_pwd_reply(reply: &Reply) -> Option<String> {
    if reply.code != 257 {
        return None;
    }
    let message = &reply.message;
    let start = message.find('"')?;
    let rest = &message[start + 1..];
    let end = rest.find('"')?;
    Some(rest[..end].to_string())
}
