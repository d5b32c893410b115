//! Response body relayed from upstream to the client.

use std::pin::Pin;
use std::task::{Context, Poll};

use axum::body::Body;
use bytes::Bytes;
use hyper::body::{Frame, SizeHint};

/// Wraps an upstream body.
///
/// With `flush_each`, the body reports `Pending` once after every data frame.
/// hyper flushes its write buffer whenever the body is not ready, so each
/// upstream chunk goes out on its own instead of being coalesced.
pub struct RelayBody {
    inner: Body,
    flush_each: bool,
    flush_pending: bool,
}

impl RelayBody {
    pub fn new(inner: Body, flush_each: bool) -> Self {
        Self {
            inner,
            flush_each,
            flush_pending: false,
        }
    }
}

impl hyper::body::Body for RelayBody {
    type Data = Bytes;
    type Error = axum::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        if this.flush_pending {
            this.flush_pending = false;
            cx.waker().wake_by_ref();
            return Poll::Pending;
        }

        match Pin::new(&mut this.inner).poll_frame(cx) {
            Poll::Ready(Some(Ok(frame))) => {
                if this.flush_each && frame.is_data() {
                    this.flush_pending = true;
                }
                Poll::Ready(Some(Ok(frame)))
            }
            Poll::Ready(Some(Err(e))) => {
                tracing::warn!(error = %e, "Upstream body failed after response headers were sent");
                Poll::Ready(Some(Err(e)))
            }
            other => other,
        }
    }

    fn is_end_stream(&self) -> bool {
        !self.flush_pending && self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}
