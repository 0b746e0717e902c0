use chrono::{DateTime, Utc};
use core::sync::atomic::{AtomicBool, Ordering};
use core::time::Duration;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Notify, Semaphore};

const LOG_TARGET: &str = "     guard";

/// Coordinates all API callers around one rate-limit budget.
///
/// Wrap in an `Arc` via [`RateGuard::new`], then call [`RateGuard::acquire`]
/// before each request. At most `max_concurrent` requests run simultaneously.
/// When any caller observes a throttle response it calls
/// [`RateGuard::pause_until_reset`] with the remote-disclosed reset time; every
/// worker then parks on the same window instead of sleeping redundantly.
///
/// When multiple callers pause concurrently, the longest pause wins. Shorter
/// pauses are ignored while a longer one is active.
#[derive(Debug)]
pub struct RateGuard {
    semaphore: Arc<Semaphore>,
    paused: AtomicBool,
    resume: Notify,
    /// When the current pause expires. Ensures the longest pause wins when
    /// overlapping `pause_for` calls race.
    resume_at: std::sync::Mutex<Option<Instant>>,
}

impl RateGuard {
    /// Create a guard allowing at most `max_concurrent` in-flight requests.
    pub fn new(max_concurrent: usize) -> Arc<Self> {
        Arc::new(Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            paused: AtomicBool::new(false),
            resume: Notify::new(),
            resume_at: std::sync::Mutex::new(None),
        })
    }

    /// Wait until unpaused, then acquire a request slot.
    ///
    /// The returned permit must be held for the duration of the request; when
    /// dropped the slot frees up for another caller.
    pub async fn acquire(&self) -> tokio::sync::OwnedSemaphorePermit {
        loop {
            if self.paused.load(Ordering::Acquire) {
                self.resume.notified().await;
                continue;
            }

            return Arc::clone(&self.semaphore)
                .acquire_owned()
                .await
                .expect("semaphore is never closed");
        }
    }

    /// Whether a pause window is currently active.
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    /// Minimum extension required for a new pause to override an active one.
    /// Prevents near-simultaneous callers that all observed the same reset
    /// time from each "winning" due to tiny `Instant::now()` drift.
    const MIN_PAUSE_EXTENSION: Duration = Duration::from_secs(1);

    /// Pause dispatch until the remote-disclosed reset instant.
    ///
    /// The sleep is the computed wall-clock delta to `reset_at`, floored at
    /// one second so an already-elapsed reset still yields a breather before
    /// the retry. Returns `true` when a new pause was actually established.
    pub fn pause_until_reset(self: &Arc<Self>, reset_at: DateTime<Utc>) -> bool {
        let delta = reset_at
            .signed_duration_since(Utc::now())
            .to_std()
            .unwrap_or(Duration::ZERO)
            .max(Self::MIN_PAUSE_EXTENSION);

        let paused = self.pause_for(delta);
        if paused {
            log::warn!(target: LOG_TARGET,
                "Rate limit hit; holding all requests until {} ({}s)",
                reset_at.with_timezone(&chrono::Local).format("%T"),
                delta.as_secs()
            );
        }

        paused
    }

    /// Pause dispatch for `duration`, then automatically resume.
    ///
    /// Requests already in flight are not interrupted. Callers waiting in
    /// [`acquire`](Self::acquire) stay parked until the duration elapses. If a
    /// similar or longer pause is already active this call is a no-op and
    /// returns `false`.
    pub fn pause_for(self: &Arc<Self>, duration: Duration) -> bool {
        let new_resume_at = Instant::now() + duration;

        {
            let mut guard = self.resume_at.lock().expect("lock not poisoned");
            if guard.is_some_and(|existing| existing + Self::MIN_PAUSE_EXTENSION >= new_resume_at) {
                return false; // an equivalent or longer pause is already active
            }
            *guard = Some(new_resume_at);
        }

        self.paused.store(true, Ordering::Release);
        let this = Arc::clone(self);
        drop(tokio::spawn(async move {
            tokio::time::sleep(duration).await;

            let should_resume = {
                let mut guard = this.resume_at.lock().expect("lock not poisoned");
                if guard.is_some_and(|t| Instant::now() >= t) {
                    *guard = None;
                    true
                } else {
                    false // a longer pause was scheduled after us
                }
            };

            if should_resume {
                this.paused.store(false, Ordering::Release);
                this.resume.notify_waiters();
            }
        }));

        true
    }
}
