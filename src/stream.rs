//! Incremental presentation of a finished response.
//!
//! A [`ReplyStream`] yields successively longer prefixes of a response,
//! one word at a time, sleeping between words. It is lazy (nothing
//! happens until polled), finite, and cannot be restarted. Dropping it
//! stops production; it holds no resources beyond the text.

use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::stream::{self, BoxStream, Stream, StreamExt};

/// Accumulated word prefixes of `text`, without any delay.
///
/// `"a b c"` yields `"a"`, `"a b"`, `"a b c"`. Whitespace runs between
/// words are preserved as written.
pub fn word_prefixes(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut end = 0usize;
    let mut in_word = false;
    for (i, c) in text.char_indices() {
        if c.is_whitespace() {
            if in_word {
                out.push(text[..end].to_string());
                in_word = false;
            }
        } else {
            in_word = true;
            end = i + c.len_utf8();
        }
    }
    if in_word {
        out.push(text[..end].to_string());
    }
    out
}

pub struct ReplyStream {
    inner: BoxStream<'static, String>,
}

impl ReplyStream {
    pub fn new(text: &str, delay: Duration) -> Self {
        let prefixes = word_prefixes(text).into_iter();
        let inner = stream::unfold((prefixes, true), move |(mut it, first)| async move {
            let next = it.next()?;
            if !first && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            Some((next, (it, false)))
        })
        .boxed();
        Self { inner }
    }

    /// Drain the stream, returning the final (complete) fragment.
    pub async fn into_final(mut self) -> Option<String> {
        let mut last = None;
        while let Some(fragment) = self.inner.next().await {
            last = Some(fragment);
        }
        last
    }
}

impl Stream for ReplyStream {
    type Item = String;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<String>> {
        self.inner.as_mut().poll_next(cx)
    }
}

impl std::fmt::Debug for ReplyStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplyStream").finish_non_exhaustive()
    }
}
