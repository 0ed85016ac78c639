//! Async driver for streamed answers.
//!
//! [`AnswerStream`] pulls chunks from a backend [`ByteStream`], feeds them
//! through a [`StreamDecoder`], and yields decoded events one at a time in
//! arrival order. The sequence is lazy, finite, and cannot be restarted:
//! after [`StreamEvent::End`] (or an abort) every call returns `None`.
//!
//! Cancellation is cooperative through a [`CancellationToken`]. Once the
//! token fires, the underlying byte stream is dropped (closing the HTTP
//! response) and no further events are produced, including any already
//! decoded but not yet returned.

use std::collections::VecDeque;

use futures_util::{stream, StreamExt};
use tokio_util::sync::CancellationToken;

use kbqa_core::decoder::{StreamDecoder, StreamEvent};
use kbqa_core::KbError;

use crate::backend::ByteStream;

pub struct AnswerStream {
    bytes: ByteStream,
    decoder: StreamDecoder,
    queued: VecDeque<StreamEvent>,
    cancel: CancellationToken,
    done: bool,
}

impl AnswerStream {
    pub fn new(bytes: ByteStream, cancel: CancellationToken) -> Self {
        Self {
            bytes,
            decoder: StreamDecoder::new(),
            queued: VecDeque::new(),
            cancel,
            done: false,
        }
    }

    /// Next decoded event.
    ///
    /// Returns `None` once the stream has ended or was aborted. A transport
    /// error is returned once and also ends the stream.
    pub async fn next_event(&mut self) -> Option<Result<StreamEvent, KbError>> {
        loop {
            if self.done {
                return None;
            }
            if self.cancel.is_cancelled() {
                self.abort();
                return None;
            }

            if let Some(event) = self.queued.pop_front() {
                if event == StreamEvent::End {
                    self.done = true;
                }
                return Some(Ok(event));
            }

            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => None,
                chunk = self.bytes.next() => Some(chunk),
            };

            match next {
                None => {
                    self.abort();
                    return None;
                }
                Some(Some(Ok(chunk))) => {
                    let events = self.decoder.push(&chunk);
                    self.queued.extend(events);
                }
                Some(Some(Err(e))) => {
                    self.abort();
                    return Some(Err(e));
                }
                Some(None) => {
                    let events = self.decoder.finish();
                    self.queued.extend(events);
                }
            }
        }
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Stop decoding and drop the underlying byte stream.
    fn abort(&mut self) {
        self.done = true;
        self.queued.clear();
        self.bytes = Box::pin(stream::empty());
        tracing::debug!("answer stream closed");
    }
}
