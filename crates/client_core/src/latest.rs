//! Latest-request-wins guarding for list fetches.
//!
//! Every fetch takes a ticket from a monotonically increasing counter. When
//! the response arrives it may publish only if no newer ticket has been
//! issued in the meantime. Superseded requests are not cancelled; their
//! responses are dropped.

use std::{
    future::Future,
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct RequestTicket(u64);

impl RequestTicket {
    pub fn id(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Default)]
pub struct RequestGuard {
    latest: AtomicU64,
}

impl RequestGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&self) -> RequestTicket {
        RequestTicket(self.latest.fetch_add(1, Ordering::SeqCst) + 1)
    }

    pub fn is_current(&self, ticket: RequestTicket) -> bool {
        self.latest.load(Ordering::SeqCst) == ticket.0
    }

    /// Hand back `value` only if `ticket` is still the newest request.
    pub fn accept<T>(&self, ticket: RequestTicket, value: T) -> Option<T> {
        if self.is_current(ticket) {
            Some(value)
        } else {
            debug!("latest: discarding stale response ticket={}", ticket.0);
            None
        }
    }

    /// Sleep for `delay`, then report whether `ticket` survived it.
    pub async fn wait_debounce(&self, ticket: RequestTicket, delay: Duration) -> bool {
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.is_current(ticket)
    }

    /// Run `fetch` under a fresh ticket and keep the result only if it is
    /// still the latest when it completes. Errors from stale requests are
    /// swallowed as well.
    pub async fn run<T, E, Fut>(&self, fetch: Fut) -> Option<Result<T, E>>
    where
        Fut: Future<Output = Result<T, E>>,
    {
        let ticket = self.begin();
        let result = fetch.await;
        self.accept(ticket, result)
    }
}
