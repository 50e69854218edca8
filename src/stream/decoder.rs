//! Incremental NDJSON decoding.
//!
//! Byte chunks arrive with no alignment guarantees: a multi-byte
//! UTF-8 character or a JSON line may straddle a chunk boundary. The
//! decoder carries both the undecoded byte remainder and the
//! unterminated line text across calls, so nothing is ever lost
//! between reads.

/// Streaming NDJSON decoder: UTF-8 carry + line buffer + per-line
/// JSON parse.
#[derive(Debug, Default)]
pub struct NdjsonDecoder {
    /// Bytes that did not yet form a complete UTF-8 character.
    carry: Vec<u8>,
    /// Decoded text not yet terminated by a newline.
    line_buf: String,
}

impl NdjsonDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk of bytes; returns every complete frame it
    /// finished. A line that fails to parse as JSON is dropped with a
    /// warning — one bad frame never aborts the stream.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<serde_json::Value> {
        self.carry.extend_from_slice(chunk);
        let text = drain_valid_utf8(&mut self.carry);
        self.line_buf.push_str(&text);

        let mut frames = Vec::new();
        while let Some(pos) = self.line_buf.find('\n') {
            let line: String = self.line_buf.drain(..=pos).collect();
            if let Some(frame) = parse_line(line.trim()) {
                frames.push(frame);
            }
        }
        frames
    }

    /// Flush a final unterminated line at end of stream.
    pub fn finish(&mut self) -> Option<serde_json::Value> {
        if !self.carry.is_empty() {
            let tail = String::from_utf8_lossy(&self.carry).into_owned();
            self.line_buf.push_str(&tail);
            self.carry.clear();
        }
        let line = std::mem::take(&mut self.line_buf);
        parse_line(line.trim())
    }

    /// Whether any partial data is buffered.
    pub fn is_empty(&self) -> bool {
        self.carry.is_empty() && self.line_buf.is_empty()
    }
}

fn parse_line(line: &str) -> Option<serde_json::Value> {
    if line.is_empty() {
        return None;
    }
    match serde_json::from_str(line) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(error = %e, "dropping unparseable stream line");
            None
        }
    }
}

/// Drain the longest valid UTF-8 prefix from `carry`, holding back an
/// incomplete trailing multi-byte character. Invalid byte sequences
/// mid-buffer are replaced with U+FFFD so a corrupt byte cannot wedge
/// the decoder.
fn drain_valid_utf8(carry: &mut Vec<u8>) -> String {
    let mut out = String::new();
    loop {
        match std::str::from_utf8(carry) {
            Ok(s) => {
                out.push_str(s);
                carry.clear();
                return out;
            }
            Err(e) => {
                let valid = e.valid_up_to();
                // Safe: the range was just validated.
                out.push_str(std::str::from_utf8(&carry[..valid]).unwrap_or(""));
                match e.error_len() {
                    None => {
                        // Incomplete trailing character: keep its bytes
                        // for the next chunk.
                        carry.drain(..valid);
                        return out;
                    }
                    Some(len) => {
                        out.push('\u{FFFD}');
                        carry.drain(..valid + len);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    // --- Line framing ---

    #[test]
    fn test_single_complete_line() {
        let mut decoder = NdjsonDecoder::new();
        let frames = decoder.push(b"{\"content\":\"Hi\"}\n");
        assert_eq!(frames, vec![json!({"content": "Hi"})]);
        assert!(decoder.is_empty());
    }

    #[test]
    fn test_line_split_across_two_chunks() {
        let mut decoder = NdjsonDecoder::new();
        assert!(decoder.push(b"{\"conte").is_empty());
        let frames = decoder.push(b"nt\":\"Hi\"}\n");
        assert_eq!(frames, vec![json!({"content": "Hi"})]);
    }

    #[test]
    fn test_two_lines_in_one_chunk() {
        let mut decoder = NdjsonDecoder::new();
        let frames = decoder.push(b"{\"content\":\"A\"}\n{\"content\":\"B\"}\n");
        assert_eq!(
            frames,
            vec![json!({"content": "A"}), json!({"content": "B"})]
        );
    }

    #[test]
    fn test_malformed_line_between_valid_lines() {
        let mut decoder = NdjsonDecoder::new();
        let frames = decoder.push(b"{\"content\":\"A\"}\nnot json at all\n{\"content\":\"B\"}\n");
        assert_eq!(
            frames,
            vec![json!({"content": "A"}), json!({"content": "B"})]
        );
    }

    #[test]
    fn test_empty_lines_are_skipped() {
        let mut decoder = NdjsonDecoder::new();
        let frames = decoder.push(b"\n\n{\"n\":1}\n\n");
        assert_eq!(frames, vec![json!({"n": 1})]);
    }

    // --- Multi-byte boundaries ---

    #[test]
    fn test_multibyte_char_split_across_chunks() {
        // "é" is 0xC3 0xA9; split between the two bytes.
        let encoded = "{\"content\":\"café\"}\n".as_bytes();
        let split_at = encoded.len() - 4; // inside the é
        let mut decoder = NdjsonDecoder::new();
        assert!(decoder.push(&encoded[..split_at]).is_empty());
        let frames = decoder.push(&encoded[split_at..]);
        assert_eq!(frames, vec![json!({"content": "café"})]);
    }

    #[test]
    fn test_four_byte_emoji_split_at_every_position() {
        let line = "{\"content\":\"🦀\"}\n".as_bytes();
        for split in 1..line.len() {
            let mut decoder = NdjsonDecoder::new();
            let mut frames = decoder.push(&line[..split]);
            frames.extend(decoder.push(&line[split..]));
            assert_eq!(
                frames,
                vec![json!({"content": "🦀"})],
                "failed at split {split}"
            );
        }
    }

    #[test]
    fn test_invalid_byte_does_not_wedge_decoder() {
        let mut decoder = NdjsonDecoder::new();
        // 0xFF is never valid UTF-8; the garbage line drops but the
        // following line still parses.
        let mut bytes = b"{\"bad\": \"".to_vec();
        bytes.push(0xFF);
        bytes.extend_from_slice(b"\n{\"content\":\"ok\"}\n");
        let frames = decoder.push(&bytes);
        assert_eq!(frames, vec![json!({"content": "ok"})]);
    }

    // --- finish() ---

    #[test]
    fn test_finish_flushes_unterminated_line() {
        let mut decoder = NdjsonDecoder::new();
        assert!(decoder.push(b"{\"done\":true}").is_empty());
        assert_eq!(decoder.finish(), Some(json!({"done": true})));
        assert!(decoder.is_empty());
    }

    #[test]
    fn test_finish_on_empty_decoder_is_none() {
        let mut decoder = NdjsonDecoder::new();
        assert!(decoder.finish().is_none());
    }

    #[test]
    fn test_finish_drops_unparseable_tail() {
        let mut decoder = NdjsonDecoder::new();
        decoder.push(b"{\"trunc");
        assert!(decoder.finish().is_none());
    }

    // --- Chunk fuzzing ---

    #[test]
    fn test_byte_at_a_time_delivery() {
        let payload = "{\"content\":\"héllo\"}\n{\"thinking\":\"…\"}\n{\"done\":true}\n";
        let mut decoder = NdjsonDecoder::new();
        let mut frames = Vec::new();
        for byte in payload.as_bytes() {
            frames.extend(decoder.push(std::slice::from_ref(byte)));
        }
        assert_eq!(
            frames,
            vec![
                json!({"content": "héllo"}),
                json!({"thinking": "…"}),
                json!({"done": true}),
            ]
        );
    }
}
