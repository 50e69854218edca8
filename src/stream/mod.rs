//! Streaming response assembly.
//!
//! One incremental-parsing pipeline serves both NDJSON consumers: the
//! chat stream (message deltas) and the upload stream (progress
//! frames). The driver reads byte chunks, feeds the decoder, and
//! applies finished frames to a sink under cooperative cancellation.

mod chat;
mod decoder;
mod upload;

pub use chat::{ChatAssembly, ChatFrame};
pub use decoder::NdjsonDecoder;
pub use upload::{UploadFrame, UploadProgress, UploadStatus};

use bytes::Bytes;
use futures::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::error::StreamError;

/// Consumer of parsed NDJSON frames.
pub trait FrameSink {
    fn apply_frame(&mut self, frame: serde_json::Value);
}

/// How a stream read loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    /// The backend closed the stream normally.
    Completed,
    /// The cancellation token fired; partially applied state is kept
    /// as final and no further frame is applied.
    Cancelled,
}

/// Drive a byte stream through the NDJSON decoder into a sink.
///
/// Cancellation is cooperative: when the token fires, the pending
/// read is abandoned and the stream is dropped, which releases the
/// underlying connection. A mid-stream transport error is reported as
/// `StreamError::Network` — distinct from cancellation — with
/// whatever frames arrived before it already applied.
pub async fn run_ndjson<S, E, K>(
    mut stream: S,
    sink: &mut K,
    token: &CancellationToken,
) -> Result<StreamEnd, StreamError>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: Into<StreamError>,
    K: FrameSink,
{
    let mut decoder = NdjsonDecoder::new();
    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => {
                // Returning drops the owned stream: the pending read is
                // abandoned and the underlying connection released, not
                // left dangling.
                return Ok(StreamEnd::Cancelled);
            }
            chunk = stream.next() => match chunk {
                Some(Ok(bytes)) => {
                    for frame in decoder.push(&bytes) {
                        sink.apply_frame(frame);
                    }
                }
                Some(Err(e)) => {
                    return Err(e.into());
                }
                None => {
                    if let Some(frame) = decoder.finish() {
                        sink.apply_frame(frame);
                    }
                    return Ok(StreamEnd::Completed);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    /// Sink that records every applied frame.
    #[derive(Default)]
    struct Recorder {
        frames: Vec<serde_json::Value>,
    }

    impl FrameSink for Recorder {
        fn apply_frame(&mut self, frame: serde_json::Value) {
            self.frames.push(frame);
        }
    }

    fn byte_stream(
        chunks: Vec<&'static [u8]>,
    ) -> impl Stream<Item = Result<Bytes, StreamError>> + Unpin {
        futures::stream::iter(
            chunks
                .into_iter()
                .map(|c| Ok(Bytes::from_static(c)))
                .collect::<Vec<_>>(),
        )
    }

    // --- Normal completion ---

    #[tokio::test]
    async fn test_frames_across_chunk_boundaries() {
        let stream = byte_stream(vec![b"{\"conte", b"nt\":\"Hi\"}\n"]);
        let mut sink = Recorder::default();
        let token = CancellationToken::new();

        let end = run_ndjson(stream, &mut sink, &token).await.unwrap();
        assert_eq!(end, StreamEnd::Completed);
        assert_eq!(sink.frames, vec![json!({"content": "Hi"})]);
    }

    #[tokio::test]
    async fn test_unterminated_final_line_is_flushed() {
        let stream = byte_stream(vec![b"{\"content\":\"A\"}\n{\"done\":true}"]);
        let mut sink = Recorder::default();
        let token = CancellationToken::new();

        run_ndjson(stream, &mut sink, &token).await.unwrap();
        assert_eq!(
            sink.frames,
            vec![json!({"content": "A"}), json!({"done": true})]
        );
    }

    // --- Errors ---

    #[tokio::test]
    async fn test_transport_error_is_network_not_cancelled() {
        let chunks: Vec<Result<Bytes, StreamError>> = vec![
            Ok(Bytes::from_static(b"{\"content\":\"A\"}\n")),
            Err(StreamError::Network("connection reset".to_string())),
        ];
        let stream = futures::stream::iter(chunks);
        let mut sink = Recorder::default();
        let token = CancellationToken::new();

        let err = run_ndjson(stream, &mut sink, &token).await.unwrap_err();
        assert!(!err.is_cancelled());
        // The frame before the failure was already applied.
        assert_eq!(sink.frames, vec![json!({"content": "A"})]);
    }

    // --- Cancellation ---

    #[tokio::test]
    async fn test_pre_cancelled_token_applies_nothing() {
        let stream = byte_stream(vec![b"{\"content\":\"A\"}\n"]);
        let mut sink = Recorder::default();
        let token = CancellationToken::new();
        token.cancel();

        let end = run_ndjson(stream, &mut sink, &token).await.unwrap();
        assert_eq!(end, StreamEnd::Cancelled);
        assert!(sink.frames.is_empty());
    }

    #[tokio::test]
    async fn test_cancellation_mid_stream_freezes_state() {
        // A channel-backed stream lets us cancel between chunks.
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel::<Result<Bytes, StreamError>>();
        let stream = tokio_stream::wrappers::UnboundedReceiverStream::new(rx);
        let mut sink = Recorder::default();
        let token = CancellationToken::new();

        tx.send(Ok(Bytes::from_static(b"{\"content\":\"partial\"}\n")))
            .unwrap();

        let cancel = token.clone();
        tokio::spawn(async move {
            // Let the first chunk apply, then cancel; the frame sent
            // after cancellation must never be applied.
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            cancel.cancel();
            let _ = tx.send(Ok(Bytes::from_static(b"{\"content\":\" more\"}\n")));
        });

        let end = run_ndjson(stream, &mut sink, &token).await.unwrap();
        assert_eq!(end, StreamEnd::Cancelled);
        assert_eq!(sink.frames, vec![json!({"content": "partial"})]);
    }
}
