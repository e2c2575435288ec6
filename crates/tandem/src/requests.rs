//! # Request Bus
//!
//! Correlates out-of-band queries with their answers.
//!
//! ```text
//! register() ──► (RequestId, RaycastTicket)
//!                     │                 ▲
//!         RAYCAST_REQUEST { id }        │ oneshot
//!                     ▼                 │
//!            RAYCAST_RESPONSE { id } ── resolve(id)
//! ```
//!
//! Every ticket resolves exactly once: with hits, or as cancelled when its
//! sender is dropped (teardown, fault).

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tandem_shared::{RaycastHitMessage, RequestId};
use tokio::sync::oneshot;

use crate::error::{SessionError, SessionResult};

/// Pending completions keyed by request id.
#[derive(Debug, Default)]
pub struct RequestBus {
    next_id: u64,
    pending: HashMap<RequestId, oneshot::Sender<Vec<RaycastHitMessage>>>,
}

impl RequestBus {
    /// Empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates an id and the ticket that will receive its answer.
    pub fn register(&mut self) -> (RequestId, RaycastTicket) {
        self.next_id += 1;
        let id = RequestId(self.next_id);
        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);
        (id, RaycastTicket { id, rx })
    }

    /// Completes `id`. Returns `false` for ids that are not pending.
    pub fn resolve(&mut self, id: RequestId, hits: Vec<RaycastHitMessage>) -> bool {
        let Some(tx) = self.pending.remove(&id) else {
            tracing::warn!(?id, "response for unknown request");
            return false;
        };
        if tx.send(hits).is_err() {
            tracing::debug!(?id, "ticket dropped before its response");
        }
        true
    }

    /// Drops one pending completion; its ticket reports cancelled.
    pub fn cancel(&mut self, id: RequestId) -> bool {
        self.pending.remove(&id).is_some()
    }

    /// Drops every pending completion.
    pub fn cancel_all(&mut self) -> usize {
        let n = self.pending.len();
        self.pending.clear();
        n
    }

    /// Requests awaiting an answer.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Answer to one ray query.
///
/// Awaitable, or polled with [`try_result`](Self::try_result) from a render
/// loop. Answers are routed when the session pumps notifications, so a
/// single-threaded caller must keep calling the session while it waits.
#[derive(Debug)]
pub struct RaycastTicket {
    id: RequestId,
    rx: oneshot::Receiver<Vec<RaycastHitMessage>>,
}

impl RaycastTicket {
    /// Correlation id.
    #[must_use]
    pub const fn id(&self) -> RequestId {
        self.id
    }

    /// The answer if it has arrived.
    ///
    /// Returns `None` while pending. Once this has returned `Some`, further
    /// calls report the ticket as cancelled.
    pub fn try_result(&mut self) -> Option<SessionResult<Vec<RaycastHitMessage>>> {
        match self.rx.try_recv() {
            Ok(hits) => Some(Ok(hits)),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(SessionError::Cancelled(self.id))),
        }
    }
}

impl Future for RaycastTicket {
    type Output = SessionResult<Vec<RaycastHitMessage>>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let id = self.id;
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|result| result.map_err(|_| SessionError::Cancelled(id)))
    }
}
