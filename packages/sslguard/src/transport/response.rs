//! Minimal HTTP/1.1 response reading for `Connection: close` GETs

use std::io::{ErrorKind, Read};
use std::time::Instant;

use bytes::Bytes;
use http::StatusCode;

use super::FetchResponse;
use crate::error::TransportError;

/// Largest response body accepted (CA bundles are a few hundred KB)
pub const MAX_RESPONSE_SIZE: usize = 50 * 1024 * 1024;

/// Read a full response until the peer closes the connection
pub fn read_response<R: Read>(reader: &mut R, deadline: Instant) -> Result<FetchResponse, TransportError> {
    let mut raw = Vec::with_capacity(64 * 1024);
    let mut chunk = [0u8; 16 * 1024];

    loop {
        if Instant::now() > deadline {
            return Err(TransportError::timeout("response not completed before deadline"));
        }
        match reader.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                if raw.len() + n > MAX_RESPONSE_SIZE {
                    return Err(TransportError::protocol(format!(
                        "response too large (>{}MB)",
                        MAX_RESPONSE_SIZE / (1024 * 1024)
                    )));
                }
                raw.extend_from_slice(&chunk[..n]);
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            // Peers commonly close TLS without close_notify once the body is sent
            Err(e) if e.kind() == ErrorKind::UnexpectedEof && !raw.is_empty() => break,
            Err(e) => return Err(TransportError::io(&e)),
        }
    }

    parse_response(&raw)
}

/// Parse status line, headers and body out of a complete response
pub fn parse_response(raw: &[u8]) -> Result<FetchResponse, TransportError> {
    let header_end = find(raw, b"\r\n\r\n")
        .ok_or_else(|| TransportError::protocol("response has no header terminator"))?;
    let head = std::str::from_utf8(&raw[..header_end])
        .map_err(|_| TransportError::protocol("response headers are not valid UTF-8"))?;
    let body = &raw[header_end + 4..];

    let mut lines = head.split("\r\n");
    let status_line = lines.next().unwrap_or_default();
    let code = status_line
        .split_whitespace()
        .nth(1)
        .and_then(|code| code.parse::<u16>().ok())
        .ok_or_else(|| TransportError::protocol(format!("malformed status line '{status_line}'")))?;
    let status = StatusCode::from_u16(code)
        .map_err(|_| TransportError::protocol(format!("invalid status code {code}")))?;

    let mut chunked = false;
    let mut content_length = None;
    for line in lines {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        if name.eq_ignore_ascii_case("transfer-encoding") && value.to_ascii_lowercase().contains("chunked") {
            chunked = true;
        } else if name.eq_ignore_ascii_case("content-length") {
            content_length = value.parse::<usize>().ok();
        }
    }

    let body = if chunked {
        decode_chunked(body)?
    } else {
        match content_length {
            Some(len) if len < body.len() => body[..len].to_vec(),
            _ => body.to_vec(),
        }
    };

    Ok(FetchResponse::new(status, Bytes::from(body)))
}

fn decode_chunked(mut input: &[u8]) -> Result<Vec<u8>, TransportError> {
    let mut out = Vec::with_capacity(input.len());
    loop {
        let line_end = find(input, b"\r\n")
            .ok_or_else(|| TransportError::protocol("truncated chunk size line"))?;
        let size_line = std::str::from_utf8(&input[..line_end])
            .map_err(|_| TransportError::protocol("invalid chunk size line"))?;
        let size_hex = size_line.split(';').next().unwrap_or_default().trim();
        let size = usize::from_str_radix(size_hex, 16)
            .map_err(|_| TransportError::protocol(format!("invalid chunk size '{size_hex}'")))?;
        input = &input[line_end + 2..];
        if size == 0 {
            return Ok(out);
        }
        if input.len() < size {
            return Err(TransportError::protocol("truncated chunk body"));
        }
        out.extend_from_slice(&input[..size]);
        input = input.get(size + 2..).unwrap_or_default();
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_content_length_body() {
        let raw = b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\nConnection: close\r\n\r\nhello";
        let response = parse_response(raw).unwrap();
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(&response.body[..], b"hello");
    }

    #[test]
    fn decodes_chunked_body() {
        let raw = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n5\r\nhello\r\n6;ext=1\r\n world\r\n0\r\n\r\n";
        let response = parse_response(raw).unwrap();
        assert_eq!(&response.body[..], b"hello world");
    }

    #[test]
    fn rejects_missing_header_terminator() {
        let err = parse_response(b"HTTP/1.1 200 OK\r\n").unwrap_err();
        assert_eq!(err.kind, crate::error::TransportErrorKind::Protocol);
    }

    #[test]
    fn reader_stops_at_eof() {
        let raw: &[u8] = b"HTTP/1.1 404 Not Found\r\n\r\nmissing";
        let mut reader = raw;
        let deadline = Instant::now() + std::time::Duration::from_secs(5);
        let response = read_response(&mut reader, deadline).unwrap();
        assert_eq!(response.status, StatusCode::NOT_FOUND);
        assert_eq!(&response.body[..], b"missing");
    }
}
