//! Server-sent-event decoding for upstream streaming responses.
//!
//! Bytes are buffered until a full line is available so multi-byte
//! characters split across network chunks decode correctly.

use futures::{Stream, StreamExt};
use ragrelay_core::error::ProviderError;
use ragrelay_core::provider::StreamChunk;
use tokio::sync::mpsc;
use tracing::trace;

/// One decoded `data:` payload.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum SseData {
    Json(String),
    Done,
}

/// Incremental line decoder.
#[derive(Default)]
pub(crate) struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    /// Feed bytes and collect the complete `data:` payloads they finish.
    pub(crate) fn push(&mut self, bytes: &[u8]) -> Vec<SseData> {
        self.buffer.extend_from_slice(bytes);
        let mut out = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(data) = Self::decode_line(&line) {
                out.push(data);
            }
        }
        out
    }

    /// Whatever is left after the body ends without a trailing newline.
    pub(crate) fn finish(&mut self) -> Option<SseData> {
        let rest = std::mem::take(&mut self.buffer);
        Self::decode_line(&rest)
    }

    fn decode_line(raw: &[u8]) -> Option<SseData> {
        let line = String::from_utf8_lossy(raw);
        let line = line.trim_end_matches(['\r', '\n']);

        // Skip empty lines, comments and non-data fields
        let data = line.strip_prefix("data:")?.trim();
        if data.is_empty() {
            return None;
        }
        if data == "[DONE]" {
            return Some(SseData::Done);
        }
        Some(SseData::Json(data.to_string()))
    }
}

/// Forward a byte stream into a chunk channel until `[DONE]`, end of body,
/// a receive error, or the receiver going away.
///
/// `parse` turns one JSON payload into an optional chunk; a parse error is
/// forwarded and ends the stream.
pub(crate) async fn pump<S, B, E, F>(
    provider: String,
    mut body: S,
    tx: mpsc::Sender<Result<StreamChunk, ProviderError>>,
    parse: F,
) where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
    F: Fn(&str) -> Result<Option<StreamChunk>, ProviderError>,
{
    let mut decoder = SseDecoder::default();

    loop {
        let next = tokio::select! {
            _ = tx.closed() => return,
            next = body.next() => next,
        };

        let (payloads, finished) = match next {
            Some(Ok(bytes)) => (decoder.push(bytes.as_ref()), false),
            Some(Err(e)) => {
                let _ = tx.send(Err(ProviderError::StreamInterrupted(e.to_string()))).await;
                return;
            }
            None => (decoder.finish().into_iter().collect(), true),
        };

        for payload in payloads {
            let data = match payload {
                SseData::Done => return,
                SseData::Json(data) => data,
            };
            match parse(&data) {
                Ok(Some(chunk)) => {
                    if tx.send(Ok(chunk)).await.is_err() {
                        return; // receiver dropped
                    }
                }
                Ok(None) => trace!(provider = %provider, "Skipping empty SSE chunk"),
                Err(e) => {
                    let _ = tx.send(Err(e)).await;
                    return;
                }
            }
        }

        if finished {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_lines_split_across_pushes() {
        let mut decoder = SseDecoder::default();
        assert!(decoder.push(b"data: {\"a\"").is_empty());
        let out = decoder.push(b":1}\n\n: keep-alive\ndata: [DONE]\n");
        assert_eq!(out, vec![SseData::Json("{\"a\":1}".into()), SseData::Done]);
    }

    #[test]
    fn keeps_multibyte_characters_intact() {
        let mut decoder = SseDecoder::default();
        let line = "data: {\"c\":\"é\"}\n".as_bytes();
        let split = line.iter().position(|b| *b == 0xC3).unwrap() + 1;
        assert!(decoder.push(&line[..split]).is_empty());
        let out = decoder.push(&line[split..]);
        assert_eq!(out, vec![SseData::Json("{\"c\":\"é\"}".into())]);
    }

    #[test]
    fn finish_flushes_unterminated_line() {
        let mut decoder = SseDecoder::default();
        decoder.push(b"data: {\"x\":2}");
        assert_eq!(decoder.finish(), Some(SseData::Json("{\"x\":2}".into())));
    }

    #[tokio::test]
    async fn pump_forwards_until_done() {
        let body = futures::stream::iter(vec![
            Ok::<_, std::io::Error>(b"data: one\n".to_vec()),
            Ok(b"data: two\ndata: [DONE]\ndata: three\n".to_vec()),
        ]);
        let (tx, mut rx) = mpsc::channel(8);
        pump("test".into(), body, tx, |d| Ok(Some(StreamChunk::text(d)))).await;

        let mut seen = Vec::new();
        while let Some(Ok(chunk)) = rx.recv().await {
            seen.push(chunk.content.unwrap());
        }
        assert_eq!(seen, vec!["one", "two"]);
    }

    #[tokio::test]
    async fn pump_reports_transport_errors() {
        let body = futures::stream::iter(vec![
            Ok(b"data: one\n".to_vec()),
            Err(std::io::Error::other("connection reset")),
        ]);
        let (tx, mut rx) = mpsc::channel(8);
        pump("test".into(), body, tx, |d| Ok(Some(StreamChunk::text(d)))).await;

        assert!(rx.recv().await.unwrap().is_ok());
        let err = rx.recv().await.unwrap().unwrap_err();
        assert!(matches!(err, ProviderError::StreamInterrupted(_)));
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn pump_reports_malformed_chunks() {
        let body = futures::stream::iter(vec![Ok::<_, std::io::Error>(b"data: {oops\n".to_vec())]);
        let (tx, mut rx) = mpsc::channel(8);
        pump("test".into(), body, tx, |d| {
            serde_json::from_str::<serde_json::Value>(d)
                .map(|_| None)
                .map_err(|e| ProviderError::MalformedChunk(e.to_string()))
        })
        .await;
        assert!(matches!(
            rx.recv().await.unwrap(),
            Err(ProviderError::MalformedChunk(_))
        ));
    }
}
