use std::future::Future;
use std::ops::{Deref, DerefMut};
use std::pin::Pin;
use std::sync::{Mutex, PoisonError};
use std::task::{Context, Poll, ready};
use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;
use tracing::warn;

/// What one ticket passes to the next: the guarded value, or the place in
/// line of an earlier ticket that was abandoned before its turn.
#[derive(Debug)]
enum Handoff<T> {
    Value(T),
    After(oneshot::Receiver<Handoff<T>>),
}

/// A FIFO async lock built from a chain of one-shot hand-offs.
///
/// Each call to [`TicketLock::lock`] takes a ticket immediately and waits
/// for the previous holder to release. Critical sections therefore run in
/// call order regardless of how long each one takes. The guarded value
/// travels down the chain with the lock, so only the current holder can
/// reach it.
#[derive(Debug)]
pub struct TicketLock<T = ()> {
    tail: Mutex<oneshot::Receiver<Handoff<T>>>,
}

/// A queued place in a [`TicketLock`], resolving to the [`Release`] guard.
///
/// Dropping a ticket before it resolves gives up its place: the lock passes
/// straight through it to the next ticket once the earlier holder releases.
#[derive(Debug)]
#[must_use = "a ticket holds its place in line until awaited or dropped"]
pub struct Ticket<T = ()> {
    previous: Option<oneshot::Receiver<Handoff<T>>>,
    next: Option<oneshot::Sender<Handoff<T>>>,
}

/// Proof of holding a [`TicketLock`], dereferencing to the guarded value.
/// Releasing hands the lock to the next ticket; dropping the guard releases
/// as well, so a holder cannot forget to.
#[derive(Debug)]
pub struct Release<T: Default = ()> {
    value: T,
    next: Option<oneshot::Sender<Handoff<T>>>,
}

impl<T: Default> TicketLock<T> {
    pub fn new() -> Self {
        Self::with_value(T::default())
    }

    pub fn with_value(value: T) -> Self {
        let (tx, rx) = oneshot::channel();
        // The first ticket finds the lock already free.
        let _ = tx.send(Handoff::Value(value));
        Self { tail: Mutex::new(rx) }
    }

    /// Takes a ticket now and resolves once every earlier ticket released.
    pub fn lock(&self) -> Ticket<T> {
        let (tx, rx) = oneshot::channel();
        let previous = {
            let mut tail = self.tail.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *tail, rx)
        };
        Ticket {
            previous: Some(previous),
            next: Some(tx),
        }
    }

    /// Runs `f` inside the lock.
    pub async fn with<F, Fut, R>(&self, f: F) -> R
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = R>,
    {
        let release = self.lock().await;
        let out = f().await;
        release.release();
        out
    }
}

impl<T: Default> Default for TicketLock<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Default> Future for Ticket<T> {
    type Output = Release<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Release<T>> {
        let this = &mut *self;
        loop {
            let Some(previous) = this.previous.as_mut() else {
                // Polled after completion.
                return Poll::Pending;
            };
            let value = match ready!(Pin::new(previous).poll(cx)) {
                Ok(Handoff::After(earlier)) => {
                    this.previous = Some(earlier);
                    continue;
                }
                Ok(Handoff::Value(value)) => value,
                Err(_) => {
                    warn!("Lock holder vanished without releasing, value reset");
                    T::default()
                }
            };
            this.previous = None;
            return Poll::Ready(Release {
                value,
                next: this.next.take(),
            });
        }
    }
}

impl<T> Drop for Ticket<T> {
    fn drop(&mut self) {
        let (Some(mut previous), Some(next)) = (self.previous.take(), self.next.take()) else {
            return;
        };
        let handoff = match previous.try_recv() {
            Ok(handoff) => handoff,
            Err(TryRecvError::Empty) => Handoff::After(previous),
            Err(TryRecvError::Closed) => return,
        };
        let _ = next.send(handoff);
    }
}

impl<T: Default> Release<T> {
    pub fn release(mut self) {
        self.hand_off();
    }

    fn hand_off(&mut self) {
        if let Some(next) = self.next.take() {
            let _ = next.send(Handoff::Value(std::mem::take(&mut self.value)));
        }
    }
}

impl<T: Default> Deref for Release<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T: Default> DerefMut for Release<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.value
    }
}

impl<T: Default> Drop for Release<T> {
    fn drop(&mut self) {
        self.hand_off();
    }
}
