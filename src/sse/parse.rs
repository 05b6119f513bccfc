//! Hand-rolled SSE frame parsing.
//!
//! The wire format is the SSE text protocol: frames of `field: value` lines
//! terminated by a blank line. Parsing is a pure function over a byte buffer
//! so it can be tested against literal byte sequences, decoupled from the
//! network read loop that feeds it.

/// One parsed SSE frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// The event type; defaults to `message` when the frame has no `event:` line
    pub event: String,
    /// Data payload; multiple `data:` lines are joined with `\n`
    pub data: String,
}

impl Frame {
    /// Whether the frame carries no payload (e.g. an unannotated heartbeat).
    ///
    /// Content-less frames are never dispatched but still count as successful
    /// traffic for backoff-reset purposes.
    #[must_use]
    pub fn is_content_less(&self) -> bool {
        self.data.is_empty()
    }
}

/// Extract all complete frames from `input`.
///
/// A frame is complete once its terminating blank line has arrived; anything
/// after the last blank line is left unconsumed so a frame split across chunk
/// boundaries is parsed exactly once. Returns the frames and the number of
/// bytes consumed.
#[must_use]
pub fn parse_frames(input: &[u8]) -> (Vec<Frame>, usize) {
    let mut frames = Vec::new();
    let mut frame_start = 0_usize;
    let mut cursor = 0_usize;

    while let Some(offset) = input[cursor..].iter().position(|&b| b == b'\n') {
        let line_end = cursor + offset;
        let mut line = &input[cursor..line_end];
        if line.last() == Some(&b'\r') {
            line = &line[..line.len() - 1];
        }

        if line.is_empty() {
            // Blank line: everything since the previous terminator is one frame.
            frames.push(build_frame(&input[frame_start..cursor]));
            cursor = line_end + 1;
            frame_start = cursor;
        } else {
            cursor = line_end + 1;
        }
    }

    (frames, frame_start)
}

/// Interpret a leftover partial frame at end of stream.
///
/// Some servers close the stream without sending the final blank line; a
/// buffered frame terminated by a single trailing newline is still usable.
/// Returns `None` when the buffer is empty or does not end at a line boundary.
#[must_use]
pub fn flush_frame(input: &[u8]) -> Option<Frame> {
    if input.is_empty() || input.last() != Some(&b'\n') {
        return None;
    }
    Some(build_frame(input))
}

/// Assemble a frame from the lines of one block (terminator excluded).
fn build_frame(block: &[u8]) -> Frame {
    let text = String::from_utf8_lossy(block);
    let mut event = None;
    let mut data: Vec<&str> = Vec::new();

    for raw in text.split('\n') {
        let line = raw.strip_suffix('\r').unwrap_or(raw);
        if let Some(value) = field_value(line, "event") {
            event = Some(value.to_owned());
        } else if let Some(value) = field_value(line, "data") {
            data.push(value);
        }
        // Comment lines and other fields (id, retry, ...) are ignored.
    }

    Frame {
        event: event.unwrap_or_else(|| "message".to_owned()),
        data: data.join("\n"),
    }
}

/// Match `line` against a `name:` prefix, case-insensitively, and return the
/// value with one optional leading space stripped.
fn field_value<'line>(line: &'line str, name: &str) -> Option<&'line str> {
    let (prefix, rest) = line.split_at_checked(name.len())?;
    if !prefix.eq_ignore_ascii_case(name) {
        return None;
    }
    let value = rest.strip_prefix(':')?;
    Some(value.strip_prefix(' ').unwrap_or(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOTIFICATION_BYTES: &[u8] = b"event: notification\ndata: {\"id\":\"abc\",\"title\":\"Hi\",\"message\":\"there\",\"created_at\":\"2024-01-01T00:00:00Z\"}\n\n";

    #[test]
    fn parses_literal_notification_frame() {
        let (frames, consumed) = parse_frames(NOTIFICATION_BYTES);

        assert_eq!(frames.len(), 1, "expected exactly one frame");
        assert_eq!(consumed, NOTIFICATION_BYTES.len());
        assert_eq!(frames[0].event, "notification");

        let payload: serde_json::Value =
            serde_json::from_str(&frames[0].data).expect("data should be valid JSON");
        assert_eq!(payload["id"], "abc");
        assert_eq!(payload["title"], "Hi");
        assert_eq!(payload["message"], "there");
        assert_eq!(payload["created_at"], "2024-01-01T00:00:00Z");
    }

    #[test]
    fn split_chunks_yield_identical_single_frame() {
        let (full_frames, _) = parse_frames(NOTIFICATION_BYTES);

        for split in 1..NOTIFICATION_BYTES.len() {
            let mut buffer = Vec::new();
            let mut frames = Vec::new();

            for chunk in [&NOTIFICATION_BYTES[..split], &NOTIFICATION_BYTES[split..]] {
                buffer.extend_from_slice(chunk);
                let (mut parsed, consumed) = parse_frames(&buffer);
                frames.append(&mut parsed);
                buffer.drain(..consumed);
            }

            assert_eq!(frames, full_frames, "split at byte {split} diverged");
        }
    }

    #[test]
    fn multiple_data_lines_are_joined_with_newlines() {
        let (frames, _) = parse_frames(b"data: first\ndata: second\ndata: third\n\n");

        assert_eq!(frames.len(), 1, "expected exactly one frame");
        assert_eq!(frames[0].data, "first\nsecond\nthird");
    }

    #[test]
    fn event_type_defaults_to_message() {
        let (frames, _) = parse_frames(b"data: hello\n\n");

        assert_eq!(frames[0].event, "message");
        assert_eq!(frames[0].data, "hello");
    }

    #[test]
    fn field_prefixes_match_case_insensitively() {
        let (frames, _) = parse_frames(b"EVENT: heartbeat\nData: x\n\n");

        assert_eq!(frames[0].event, "heartbeat");
        assert_eq!(frames[0].data, "x");
    }

    #[test]
    fn tolerates_crlf_line_endings() {
        let (frames, consumed) = parse_frames(b"event: notification\r\ndata: body\r\n\r\n");

        assert_eq!(frames.len(), 1, "expected exactly one frame");
        assert_eq!(frames[0].event, "notification");
        assert_eq!(frames[0].data, "body");
        assert_eq!(consumed, b"event: notification\r\ndata: body\r\n\r\n".len());
    }

    #[test]
    fn comments_and_unknown_fields_are_ignored() {
        let (frames, _) =
            parse_frames(b": keep-alive comment\nid: 17\nretry: 3000\ndata: payload\n\n");

        assert_eq!(frames.len(), 1, "expected exactly one frame");
        assert_eq!(frames[0].event, "message");
        assert_eq!(frames[0].data, "payload");
    }

    #[test]
    fn empty_data_frame_is_content_less() {
        let (frames, _) = parse_frames(b"event: heartbeat\n\n");

        assert_eq!(frames.len(), 1, "expected exactly one frame");
        assert!(frames[0].is_content_less());
    }

    #[test]
    fn value_without_space_after_colon_is_accepted() {
        let (frames, _) = parse_frames(b"event:connected\ndata:x\n\n");

        assert_eq!(frames[0].event, "connected");
        assert_eq!(frames[0].data, "x");
    }

    #[test]
    fn consumed_length_keeps_following_partial_frame() {
        let input = b"data: one\n\ndata: two (incompl";
        let (frames, consumed) = parse_frames(input);

        assert_eq!(frames.len(), 1, "expected exactly one frame");
        assert_eq!(frames[0].data, "one");
        assert_eq!(&input[consumed..], b"data: two (incompl");
    }

    #[test]
    fn two_frames_in_one_buffer() {
        let (frames, _) = parse_frames(b"event: connected\n\nevent: heartbeat\n\n");

        assert_eq!(frames.len(), 2, "expected two frames");
        assert_eq!(frames[0].event, "connected");
        assert_eq!(frames[1].event, "heartbeat");
    }

    #[test]
    fn flush_accepts_single_trailing_newline() {
        let frame = flush_frame(b"event: notification\ndata: tail\n")
            .expect("trailing newline should terminate the frame");

        assert_eq!(frame.event, "notification");
        assert_eq!(frame.data, "tail");
    }

    #[test]
    fn flush_rejects_unterminated_buffer() {
        assert!(flush_frame(b"data: no newline yet").is_none());
        assert!(flush_frame(b"").is_none());
    }
}
