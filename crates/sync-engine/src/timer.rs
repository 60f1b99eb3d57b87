// crates/sync-engine/src/timer.rs
//! Restartable single-fire delay

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

#[derive(Default)]
struct TimerState {
    sleeper: Option<JoinHandle<()>>,
    running: Vec<JoinHandle<()>>,
}

/// Runs a piece of work once a delay has passed
///
/// Only one delay is armed at a time. When it elapses the work is spawned as
/// its own task, so a later `restart` or `cancel` never interrupts work that
/// has already started.
pub struct DebounceTimer {
    handle: Handle,
    delay: Duration,
    state: Arc<Mutex<TimerState>>,
}

impl DebounceTimer {
    pub fn new(handle: Handle, delay: Duration) -> Self {
        Self {
            handle,
            delay,
            state: Arc::new(Mutex::new(TimerState::default())),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Disarms any waiting delay and arms a fresh one for `work`
    pub fn restart<F>(&self, work: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut state = lock(&self.state);
        if let Some(sleeper) = state.sleeper.take() {
            sleeper.abort();
        }
        state.sleeper = Some(self.arm(work));
    }

    /// Arms a delay for `work` unless one is already waiting
    ///
    /// Returns false (and drops `work`) when a delay was already armed.
    pub fn start_if_idle<F>(&self, work: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut state = lock(&self.state);
        if state.sleeper.as_ref().is_some_and(|h| !h.is_finished()) {
            return false;
        }
        state.sleeper = Some(self.arm(work));
        true
    }

    /// Disarms the waiting delay, if any
    pub fn cancel(&self) {
        if let Some(sleeper) = lock(&self.state).sleeper.take() {
            sleeper.abort();
        }
    }

    /// True while a delay is armed and has not yet elapsed
    pub fn is_pending(&self) -> bool {
        lock(&self.state)
            .sleeper
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    /// Waits for work that has already been spawned by this timer
    pub async fn settle(&self) {
        loop {
            let running = std::mem::take(&mut lock(&self.state).running);
            if running.is_empty() {
                return;
            }
            for task in running {
                if let Err(e) = task.await {
                    log::warn!("Timer work ended abnormally: {}", e);
                }
            }
        }
    }

    fn arm<F>(&self, work: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let delay = self.delay;
        let handle = self.handle.clone();
        let state = Arc::clone(&self.state);

        self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            let task = handle.spawn(work);
            let mut state = lock(&state);
            state.running.retain(|h| !h.is_finished());
            state.running.push(task);
        })
    }
}

fn lock(state: &Mutex<TimerState>) -> MutexGuard<'_, TimerState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}
