// ── Per-field subscription ──
//
// Subscription handle for a single streamed field. Streamed values skip
// the data map's version counter, so entities that care about one field
// listen here instead.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::Stream;
use serde_json::Value;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

/// Latest value pushed for one streaming field.
pub struct FieldStream {
    receiver: watch::Receiver<Option<Value>>,
}

impl FieldStream {
    pub(crate) fn new(receiver: watch::Receiver<Option<Value>>) -> Self {
        Self { receiver }
    }

    /// The most recent value, `None` until the first push.
    pub fn latest(&self) -> Option<Value> {
        self.receiver.borrow().clone()
    }

    /// Wait for the next push. Returns `None` once the data map is gone.
    pub async fn changed(&mut self) -> Option<Value> {
        self.receiver.changed().await.ok()?;
        self.receiver.borrow_and_update().clone()
    }

    pub fn into_stream(self) -> FieldWatchStream {
        FieldWatchStream {
            inner: WatchStream::from_changes(self.receiver),
        }
    }
}

/// `Stream` adapter yielding each pushed value.
pub struct FieldWatchStream {
    inner: WatchStream<Option<Value>>,
}

impl Stream for FieldWatchStream {
    type Item = Option<Value>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}
