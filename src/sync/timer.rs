use futures::future::BoxFuture;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::debug;

pub type TickFn = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// Fixed-period repeating trigger.
///
/// Each tick spawns the callback on its own task, so a slow callback does
/// not delay the next tick and two ticks may overlap. Callbacks touching
/// shared state serialize themselves.
pub struct Timer {
    period: Duration,
    callback: TickFn,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Timer {
    pub fn new(period: Duration, callback: TickFn) -> Self {
        Self {
            period,
            callback,
            handle: Mutex::new(None),
        }
    }

    /// Starts ticking. Calling it on a running timer does nothing.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) {
        let mut handle = self.handle.lock().unwrap_or_else(PoisonError::into_inner);
        if handle.is_some() {
            return;
        }

        let period = self.period;
        let callback = self.callback.clone();
        *handle = Some(tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick of `interval` fires immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                tokio::spawn(callback());
            }
        }));
        debug!(period_ms = period.as_millis() as u64, "Timer started");
    }

    /// Stops ticking. Calling it on a stopped timer does nothing.
    pub fn stop(&self) {
        let mut handle = self.handle.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = handle.take() {
            handle.abort();
            debug!("Timer stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_timer(period_ms: u64) -> (Timer, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        let timer = Timer::new(
            Duration::from_millis(period_ms),
            Arc::new(move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
                .boxed()
            }),
        );
        (timer, count)
    }

    #[tokio::test]
    async fn test_ticks_while_running() {
        let (timer, count) = counting_timer(10);
        timer.start();
        tokio::time::sleep(Duration::from_millis(75)).await;
        timer.stop();
        assert!(count.load(Ordering::SeqCst) >= 3);
    }

    #[tokio::test]
    async fn test_start_and_stop_are_idempotent() {
        let (timer, count) = counting_timer(10);
        assert!(!timer.is_running());
        timer.start();
        timer.start();
        assert!(timer.is_running());
        timer.stop();
        timer.stop();
        assert!(!timer.is_running());

        tokio::time::sleep(Duration::from_millis(20)).await;
        let after_stop = count.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(count.load(Ordering::SeqCst), after_stop);
    }
}
