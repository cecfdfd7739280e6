//! Socket framing
//!
//! A request is the UTF-8 bytes of one JavaScript fragment followed by a
//! single `0x00`. A response is read up to its `0x00` terminator; every
//! `0x01` on the way hands what has accumulated so far to the flush sink
//! and starts over. What remains at the terminator is the JSON payload.
//!
//! Bytes are accumulated raw and decoded at each flush or terminator, so
//! multi-byte characters are never split.

use std::io::{BufRead, BufReader, ErrorKind, Read, Write};

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::backends::{BackendError, BackendResult, EvalResult};

/// Ends a request or a response
pub const TERMINATOR: u8 = 0x00;

/// Flushes side-channel output inside a response
pub const FLUSH: u8 = 0x01;

/// Send one request frame
pub fn write_frame<W: Write>(
    writer: &mut W,
    code: &str,
) -> BackendResult<()> {
    writer.write_all(code.as_bytes())?;
    writer.write_all(&[TERMINATOR])?;
    writer.flush()?;
    debug!("Sent {} byte request", code.len() + 1);
    Ok(())
}

/// Reads response frames from a byte stream
#[derive(Debug)]
pub struct FrameReader<R> {
    inner: BufReader<R>,
}

impl<R: Read> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner: BufReader::new(inner),
        }
    }

    /// Read up to the next terminator, returning the final payload
    ///
    /// The stream ending before a terminator means the runtime is gone.
    pub fn read_frame(
        &mut self,
        flush: &mut dyn FnMut(&str),
    ) -> BackendResult<String> {
        let mut acc: Vec<u8> = Vec::new();
        loop {
            let buf = match self.inner.fill_buf() {
                Ok(buf) => buf,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };
            if buf.is_empty() {
                return Err(BackendError::ConnectionClosed);
            }

            let mut consumed = 0;
            let mut done = false;
            for &byte in buf {
                consumed += 1;
                match byte {
                    FLUSH => {
                        flush(&String::from_utf8_lossy(&acc));
                        acc.clear();
                    }
                    TERMINATOR => {
                        done = true;
                        break;
                    }
                    other => acc.push(other),
                }
            }
            self.inner.consume(consumed);

            if done {
                debug!("Received {} byte response", acc.len());
                return Ok(String::from_utf8_lossy(&acc).into_owned());
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    status: String,
    #[serde(default)]
    value: Value,
}

/// Decode a response payload
///
/// The runtime answers `success` or `exception`; `error` is accepted too.
/// A missing or null value reads as `nil`.
pub fn decode_response(payload: &str) -> BackendResult<EvalResult> {
    let response: WireResponse = serde_json::from_str(payload)
        .map_err(|e| BackendError::Protocol(format!("{}: {:?}", e, payload)))?;
    let value = match response.value {
        Value::Null => "nil".to_string(),
        Value::String(s) => s,
        other => other.to_string(),
    };
    match response.status.as_str() {
        "success" => Ok(EvalResult::Success { value }),
        "exception" => Ok(EvalResult::Exception {
            value,
            stacktrace: None,
        }),
        "error" => Ok(EvalResult::Error {
            value,
            stacktrace: None,
        }),
        other => Err(BackendError::Protocol(format!("unknown status {:?}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::io::Cursor;

    fn read_all_frames(bytes: &[u8]) -> (Vec<String>, Vec<BackendResult<String>>) {
        let mut reader = FrameReader::new(Cursor::new(bytes.to_vec()));
        let mut flushed = Vec::new();
        let mut frames = Vec::new();
        loop {
            let frame = reader.read_frame(&mut |s: &str| flushed.push(s.to_string()));
            let closed = matches!(frame, Err(BackendError::ConnectionClosed));
            frames.push(frame);
            if closed {
                break;
            }
        }
        (flushed, frames)
    }

    #[test]
    fn test_flush_then_payload() {
        let (flushed, frames) = read_all_frames(b"he\x01llo\x00");
        assert_eq!(flushed, vec!["he"]);
        assert_eq!(frames[0].as_ref().unwrap(), "llo");
    }

    #[test]
    fn test_consecutive_frames() {
        let (flushed, frames) = read_all_frames(b"a\x00b\x01\x01c\x00");
        assert_eq!(flushed, vec!["b", ""]);
        assert_eq!(frames[0].as_ref().unwrap(), "a");
        assert_eq!(frames[1].as_ref().unwrap(), "c");
        assert!(matches!(frames[2], Err(BackendError::ConnectionClosed)));
    }

    #[test]
    fn test_eof_mid_frame_is_closed_connection() {
        let (_, frames) = read_all_frames(b"partial");
        assert!(matches!(frames[0], Err(BackendError::ConnectionClosed)));
    }

    #[test]
    fn test_multibyte_text_survives() {
        let (_, frames) = read_all_frames("λ→\u{0}".as_bytes());
        assert_eq!(frames[0].as_ref().unwrap(), "λ→");
    }

    #[test]
    fn test_write_frame_appends_terminator() {
        let mut out = Vec::new();
        write_frame(&mut out, "1+1").unwrap();
        assert_eq!(out, b"1+1\x00");
    }

    #[test]
    fn test_decode_response() {
        assert_eq!(
            decode_response(r#"{"status":"success","value":"3"}"#).unwrap(),
            EvalResult::success("3")
        );
        assert_eq!(
            decode_response(r#"{"status":"success","value":null}"#).unwrap(),
            EvalResult::success("nil")
        );
        assert_eq!(
            decode_response(r#"{"status":"exception","value":"boom"}"#).unwrap(),
            EvalResult::exception("boom", None)
        );
        assert!(matches!(
            decode_response(r#"{"status":"error","value":"bad"}"#).unwrap(),
            EvalResult::Error { .. }
        ));
        assert!(decode_response("not json").is_err());
        assert!(decode_response(r#"{"status":"odd"}"#).is_err());
    }

    proptest! {
        #[test]
        fn prop_flushes_arrive_in_order(chunks in proptest::collection::vec("[a-z ]{0,8}", 0..6), tail in "[a-z]{0,8}") {
            let mut bytes = Vec::new();
            for chunk in &chunks {
                bytes.extend_from_slice(chunk.as_bytes());
                bytes.push(FLUSH);
            }
            bytes.extend_from_slice(tail.as_bytes());
            bytes.push(TERMINATOR);

            let (flushed, frames) = read_all_frames(&bytes);
            prop_assert_eq!(flushed, chunks);
            prop_assert_eq!(frames[0].as_ref().unwrap(), &tail);
        }
    }
}
