//! Newline-delimited framing of the byte stream.
//!
//! Lines are read as raw bytes with an upper bound on their length, so a peer
//! that sends invalid UTF-8 gets the same treatment as one sending malformed
//! JSON, and a peer that never sends a newline cannot grow the buffer forever.
use std::io::{BufRead, Read};

use crate::result::Result;

/// One unit read off the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A complete line without its terminator.
    Line(String),
    /// A complete line that is not valid UTF-8.
    Invalid(String),
    /// More than the allowed number of bytes arrived without a newline.
    Oversized(usize),
}

/// Read the next frame, or `None` at end of stream.
///
/// A trailing `\r` is stripped. A final line without a newline before EOF is
/// still returned as a [`Frame::Line`].
pub fn read_frame<R: BufRead>(reader: &mut R, limit: usize) -> Result<Option<Frame>> {
    let mut buf = Vec::new();
    let read = reader
        .by_ref()
        .take(limit as u64 + 1)
        .read_until(b'\n', &mut buf)?;
    if read == 0 {
        return Ok(None);
    }

    if buf.last() == Some(&b'\n') {
        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
    } else if buf.len() > limit {
        return Ok(Some(Frame::Oversized(buf.len())));
    }

    Ok(Some(match String::from_utf8(buf) {
        Ok(line) => Frame::Line(line),
        Err(e) => Frame::Invalid(format!("invalid UTF-8: {}", e.utf8_error())),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn frames(input: &[u8], limit: usize) -> Vec<Frame> {
        let mut reader = Cursor::new(input.to_vec());
        let mut out = Vec::new();
        while let Some(frame) = read_frame(&mut reader, limit).unwrap() {
            out.push(frame);
        }
        out
    }

    #[test]
    fn splits_lines_and_strips_terminators() {
        assert_eq!(
            frames(b"one\r\ntwo\n\nlast", 64),
            [
                Frame::Line("one".to_string()),
                Frame::Line("two".to_string()),
                Frame::Line(String::new()),
                Frame::Line("last".to_string()),
            ]
        );
    }

    #[test]
    fn invalid_utf8_does_not_end_the_stream() {
        let read = frames(b"\xff\xfe garbage\n{\"ok\":1}\n", 64);
        assert_eq!(read.len(), 2);
        assert!(matches!(&read[0], Frame::Invalid(reason) if reason.contains("UTF-8")));
        assert_eq!(read[1], Frame::Line("{\"ok\":1}".to_string()));
    }

    #[test]
    fn long_line_without_newline_is_oversized() {
        let input = vec![b'a'; 100];
        let mut reader = Cursor::new(input);
        assert_eq!(read_frame(&mut reader, 10).unwrap(), Some(Frame::Oversized(11)));
    }

    #[test]
    fn line_of_exactly_the_limit_fits() {
        assert_eq!(
            frames(b"abcd\n", 4),
            [Frame::Line("abcd".to_string())]
        );
    }
}
