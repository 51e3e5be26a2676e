//! Line-buffered server-sent events framing.

use bytes::BytesMut;

use crate::error::HttpError;

const DONE: &str = "[DONE]";
const DATA: &[u8] = b"data:";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseFrame {
    /// Payload of a `data:` line.
    Data(String),
    /// The `[DONE]` sentinel.
    Done,
}

/// Accumulates raw body bytes and cuts them into frames at line boundaries.
#[derive(Debug, Default)]
pub struct SseLineBuffer {
    buffer: BytesMut,
}

impl SseLineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `bytes` and returns the frames of every completed line.
    ///
    /// A `data:` line that is not valid UTF-8 yields an error and ends the
    /// batch; frames before it are returned in order.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<Result<SseFrame, HttpError>> {
        self.buffer.extend_from_slice(bytes);
        let mut frames = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line = self.buffer.split_to(pos + 1);
            match parse_line(&line) {
                Ok(Some(frame)) => frames.push(Ok(frame)),
                Ok(None) => {}
                Err(error) => {
                    frames.push(Err(error));
                    break;
                }
            }
        }
        frames
    }

    /// Flushes a trailing line that was not newline-terminated.
    pub fn finish(&mut self) -> Option<Result<SseFrame, HttpError>> {
        let rest = self.buffer.split();
        parse_line(&rest).transpose()
    }
}

fn parse_line(raw: &[u8]) -> Result<Option<SseFrame>, HttpError> {
    // Blank separators, `:` heartbeats and event/id/retry fields carry no data.
    let Some(data) = raw.trim_ascii_start().strip_prefix(DATA) else {
        return Ok(None);
    };
    let data = std::str::from_utf8(data)
        .map_err(|e| HttpError::Stream(format!("data line is not valid UTF-8: {e}")))?;
    Ok(match data.trim() {
        "" => None,
        DONE => Some(SseFrame::Done),
        payload => Some(SseFrame::Data(payload.to_string())),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frames(results: Vec<Result<SseFrame, HttpError>>) -> Vec<SseFrame> {
        results.into_iter().map(Result::unwrap).collect()
    }

    #[test]
    fn frames_split_across_chunks() {
        let mut buffer = SseLineBuffer::new();
        assert!(buffer.push(b"data: {\"a\"").is_empty());
        let pushed = frames(buffer.push(b":1}\n\ndata: {\"b\":2}\r\n"));
        assert_eq!(
            pushed,
            vec![SseFrame::Data("{\"a\":1}".to_string()), SseFrame::Data("{\"b\":2}".to_string())]
        );
    }

    #[test]
    fn comments_and_other_fields_are_ignored() {
        let mut buffer = SseLineBuffer::new();
        let pushed = frames(buffer.push(b": keep-alive\nevent: message\nid: 7\ndata:\ndata: [DONE]\n"));
        assert_eq!(pushed, vec![SseFrame::Done]);
    }

    #[test]
    fn finish_flushes_unterminated_line() {
        let mut buffer = SseLineBuffer::new();
        assert!(buffer.push(b"data: {}").is_empty());
        assert_eq!(buffer.finish().unwrap().unwrap(), SseFrame::Data("{}".to_string()));
        assert!(buffer.finish().is_none());
    }

    #[test]
    fn invalid_utf8_data_line_is_an_error() {
        let mut buffer = SseLineBuffer::new();
        let pushed = buffer.push(
            b"data: {\"n\":1}\ndata: {\"content\":\"a\xffb\"}\ndata: {\"n\":2}\n",
        );
        assert_eq!(pushed.len(), 2);
        assert_eq!(pushed[0].as_ref().unwrap(), &SseFrame::Data("{\"n\":1}".to_string()));
        assert!(matches!(pushed[1], Err(HttpError::Stream(_))));

        // Only data lines reach the decoder, so other fields are not checked.
        let mut buffer = SseLineBuffer::new();
        assert!(buffer.push(b": \xff\xfe\n").is_empty());

        let mut buffer = SseLineBuffer::new();
        assert!(buffer.push(b"data: \xc3").is_empty());
        assert!(matches!(buffer.finish(), Some(Err(HttpError::Stream(_)))));
    }
}
