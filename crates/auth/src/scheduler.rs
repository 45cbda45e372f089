//! Repeating timers for periodic reauthentication.

use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use gatehouse_core::TimerId;

/// Shortest interval a timer runs at; shorter requests (including zero) are raised to it.
pub const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Work run on every tick of a timer.
pub type Task = Arc<dyn Fn() + Send + Sync>;

/// Handle to an armed repeating timer.
///
/// Cancelling or dropping the handle stops the timer; a stopped timer never
/// fires again.
pub struct TimerHandle {
    id: TimerId,
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl TimerHandle {
    pub fn new(id: TimerId, cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            id,
            cancel: Some(Box::new(cancel)),
        }
    }

    pub fn id(&self) -> TimerId {
        self.id
    }

    pub fn cancel(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

impl core::fmt::Debug for TimerHandle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TimerHandle").field("id", &self.id).finish()
    }
}

/// Arms repeating timers. The first tick happens one `interval` after arming.
pub trait Scheduler: Send + Sync {
    fn schedule_repeating(&self, interval: Duration, task: Task) -> TimerHandle;
}

impl<S> Scheduler for Arc<S>
where
    S: Scheduler + ?Sized,
{
    fn schedule_repeating(&self, interval: Duration, task: Task) -> TimerHandle {
        (**self).schedule_repeating(interval, task)
    }
}

/// One background thread per timer.
///
/// The thread sleeps on a stop channel; the handle owns the sending side, so
/// cancelling or dropping it wakes the thread and ends it.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadScheduler;

impl Scheduler for ThreadScheduler {
    fn schedule_repeating(&self, interval: Duration, task: Task) -> TimerHandle {
        let id = TimerId::new();
        let interval = interval.max(MIN_INTERVAL);
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        let spawned = thread::Builder::new()
            .name(format!("reauth-{id}"))
            .spawn(move || {
                loop {
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => task(),
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                tracing::debug!(timer = %id, "reauthentication timer stopped");
            });

        if let Err(err) = spawned {
            tracing::error!(timer = %id, %err, "failed to spawn reauthentication timer thread");
        }

        TimerHandle::new(id, move || {
            let _ = stop_tx.send(());
        })
    }
}

struct ManualTimer {
    id: TimerId,
    interval: Duration,
    next_due: Duration,
    task: Task,
}

#[derive(Default)]
struct ManualClock {
    now: Duration,
    timers: Vec<ManualTimer>,
}

/// Deterministic scheduler driven by [`ManualScheduler::advance`].
///
/// Clones share the same clock, so a test can keep one clone and hand the
/// other to the engine.
#[derive(Clone, Default)]
pub struct ManualScheduler {
    clock: Arc<Mutex<ManualClock>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of timers armed and not yet cancelled.
    pub fn active_timers(&self) -> usize {
        self.clock.lock().map(|c| c.timers.len()).unwrap_or(0)
    }

    /// Time elapsed since the scheduler was created.
    pub fn now(&self) -> Duration {
        self.clock.lock().map(|c| c.now).unwrap_or_default()
    }

    /// Move the clock forward, running every tick that falls due in order.
    /// Returns the number of ticks run.
    pub fn advance(&self, by: Duration) -> usize {
        let Ok(clock) = self.clock.lock() else {
            return 0;
        };
        let target = clock.now + by;
        drop(clock);

        let mut fired = 0;
        loop {
            let task = {
                let Ok(mut clock) = self.clock.lock() else {
                    break;
                };
                let next = clock
                    .timers
                    .iter_mut()
                    .filter(|t| t.next_due <= target)
                    .min_by_key(|t| t.next_due)
                    .map(|timer| {
                        let due = timer.next_due;
                        timer.next_due = due + timer.interval;
                        (due, Arc::clone(&timer.task))
                    });
                match next {
                    Some((due, task)) => {
                        clock.now = due;
                        task
                    }
                    None => {
                        clock.now = target;
                        break;
                    }
                }
            };

            // Run outside the lock: the task may arm or cancel timers.
            task();
            fired += 1;
        }
        fired
    }
}

impl core::fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ManualScheduler")
            .field("now", &self.now())
            .field("active_timers", &self.active_timers())
            .finish()
    }
}

impl Scheduler for ManualScheduler {
    fn schedule_repeating(&self, interval: Duration, task: Task) -> TimerHandle {
        let id = TimerId::new();
        let interval = interval.max(MIN_INTERVAL);
        if let Ok(mut clock) = self.clock.lock() {
            let next_due = clock.now + interval;
            clock.timers.push(ManualTimer {
                id,
                interval,
                next_due,
                task,
            });
        }

        let clock = Arc::clone(&self.clock);
        TimerHandle::new(id, move || {
            if let Ok(mut clock) = clock.lock() {
                clock.timers.retain(|t| t.id != id);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter() -> (Arc<AtomicUsize>, Task) {
        let count = Arc::new(AtomicUsize::new(0));
        let task_count = Arc::clone(&count);
        (count, Arc::new(move || {
            task_count.fetch_add(1, Ordering::SeqCst);
        }))
    }

    #[test]
    fn manual_timer_fires_each_interval() {
        let scheduler = ManualScheduler::new();
        let (count, task) = counter();
        let _handle = scheduler.schedule_repeating(Duration::from_millis(100), task);

        assert_eq!(scheduler.advance(Duration::from_millis(99)), 0);
        assert_eq!(scheduler.advance(Duration::from_millis(1)), 1);
        assert_eq!(scheduler.advance(Duration::from_millis(250)), 2);
        assert_eq!(count.load(Ordering::SeqCst), 3);
        assert_eq!(scheduler.now(), Duration::from_millis(350));
    }

    #[test]
    fn cancel_and_drop_stop_manual_timers() {
        let scheduler = ManualScheduler::new();
        let (count, task) = counter();

        let handle = scheduler.schedule_repeating(Duration::from_millis(10), Arc::clone(&task));
        let dropped = scheduler.schedule_repeating(Duration::from_millis(10), task);
        assert_eq!(scheduler.active_timers(), 2);

        handle.cancel();
        drop(dropped);
        assert_eq!(scheduler.active_timers(), 0);

        assert_eq!(scheduler.advance(Duration::from_secs(1)), 0);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn thread_timer_fires_until_cancelled() {
        let (count, task) = counter();
        let handle = ThreadScheduler.schedule_repeating(Duration::from_millis(5), task);

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while count.load(Ordering::SeqCst) < 2 && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(count.load(Ordering::SeqCst) >= 2);

        handle.cancel();
        // Let a tick that was already running finish before sampling.
        thread::sleep(Duration::from_millis(20));
        let after_cancel = count.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(50));
        assert_eq!(count.load(Ordering::SeqCst), after_cancel);
    }

    #[test]
    fn zero_interval_thread_timer_is_clamped() {
        let (count, task) = counter();
        let started = std::time::Instant::now();
        let handle = ThreadScheduler.schedule_repeating(Duration::ZERO, task);

        thread::sleep(Duration::from_millis(50));
        handle.cancel();
        thread::sleep(Duration::from_millis(20));
        let elapsed_ms = started.elapsed().as_millis() as usize;

        let ticks = count.load(Ordering::SeqCst);
        assert!(ticks >= 1);
        assert!(ticks <= elapsed_ms, "{ticks} ticks in {elapsed_ms}ms");
    }

    #[test]
    fn zero_interval_manual_timer_is_clamped() {
        let scheduler = ManualScheduler::new();
        let (count, task) = counter();
        let _handle = scheduler.schedule_repeating(Duration::ZERO, task);

        assert_eq!(scheduler.advance(Duration::from_millis(3)), 3);
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }
}
