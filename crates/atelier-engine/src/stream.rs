//! Bridge from a blocking chunk producer to an async stream.
//!
//! Wrapped inference backends typically expose token generation as a
//! blocking iterator. The bridge drains that iterator on a dedicated OS
//! thread into a bounded channel; the async side consumes the channel as a
//! [`ChatChunkStream`]. Errors cross the thread boundary as items, never as
//! panics; the channel closing is the completion sentinel.
//!
//! The producer thread is not forcibly terminated when the consumer goes
//! away: it finishes its current chunk, notices the closed channel on the
//! next send, and exits.

use atelier_core::engine::{ChatChunk, ChatChunkStream};
use atelier_core::error::{AtelierError, Result};
use tokio::sync::mpsc;

/// Runs a blocking chunk iterator on its own thread, returning the async
/// consumer side.
///
/// The producer stops at the first error item (after forwarding it) and
/// whenever the consumer has dropped the stream.
pub fn blocking_chunk_stream<I>(chunks: I, buffer: usize) -> ChatChunkStream
where
    I: IntoIterator<Item = Result<ChatChunk>> + Send + 'static,
    I::IntoIter: Send,
{
    let (tx, rx) = mpsc::channel::<Result<ChatChunk>>(buffer.max(1));

    let producer_tx = tx.clone();
    let spawned = std::thread::Builder::new()
        .name("atelier-chunk-producer".to_string())
        .spawn(move || {
            for item in chunks {
                let stop_after = item.is_err();
                if producer_tx.blocking_send(item).is_err() {
                    // Consumer is gone; run the current chunk to its end and stop.
                    break;
                }
                if stop_after {
                    break;
                }
            }
        });

    if let Err(e) = spawned {
        let _ = tx.try_send(Err(AtelierError::engine(format!(
            "failed to spawn chunk producer thread: {e}"
        ))));
    }
    drop(tx);

    Box::pin(futures::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|item| (item, rx))
    }))
}

/// Splits completed text into word-sized chunks, the shape backends without
/// native streaming fall back to.
pub fn text_chunks(text: &str) -> Vec<Result<ChatChunk>> {
    let mut chunks: Vec<Result<ChatChunk>> = text
        .split_inclusive(' ')
        .map(|word| {
            Ok(ChatChunk {
                delta: word.to_string(),
                finished: false,
            })
        })
        .collect();
    chunks.push(Ok(ChatChunk {
        delta: String::new(),
        finished: true,
    }));
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test(flavor = "multi_thread")]
    async fn test_chunks_arrive_in_order_and_channel_closes() {
        let chunks = text_chunks("one two three");
        let mut stream = blocking_chunk_stream(chunks, 2);

        let mut collected = String::new();
        let mut finished = false;
        while let Some(item) = stream.next().await {
            let chunk = item.unwrap();
            collected.push_str(&chunk.delta);
            finished = chunk.finished;
        }

        assert_eq!(collected, "one two three");
        assert!(finished);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_error_is_forwarded_as_item_and_ends_stream() {
        let chunks: Vec<Result<ChatChunk>> = vec![
            Ok(ChatChunk {
                delta: "partial".to_string(),
                finished: false,
            }),
            Err(AtelierError::engine("generator blew up")),
            Ok(ChatChunk {
                delta: "never sent".to_string(),
                finished: true,
            }),
        ];
        let mut stream = blocking_chunk_stream(chunks, 1);

        assert_eq!(stream.next().await.unwrap().unwrap().delta, "partial");
        let err = stream.next().await.unwrap().unwrap_err();
        assert!(matches!(err, AtelierError::Engine(_)));
        // The error ended the stream; the trailing chunk was never produced.
        assert!(stream.next().await.is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_dropped_consumer_stops_producer() {
        // An endless producer must exit once the consumer is dropped;
        // otherwise this test would leak a spinning thread per run.
        let endless = std::iter::repeat_with(|| {
            Ok(ChatChunk {
                delta: "x".to_string(),
                finished: false,
            })
        });
        let mut stream = blocking_chunk_stream(endless, 1);

        assert!(stream.next().await.is_some());
        drop(stream);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_empty_producer_is_just_the_sentinel() {
        let mut stream = blocking_chunk_stream(Vec::new(), 4);
        assert!(stream.next().await.is_none());
    }
}
