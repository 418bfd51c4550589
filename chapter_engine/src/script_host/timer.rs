use std::io;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TimerError {
    #[error("spawning timer thread: {0}")]
    Spawn(#[from] io::Error),
}

/// Fires a callback once on its own thread unless dropped first.
///
/// Dropping the timer disarms it and waits for the thread to finish, so once
/// `drop` returns the callback has either run to completion or never will.
pub struct OneShotTimer {
    disarm: Option<Sender<()>>,
    worker: Option<JoinHandle<()>>,
}

impl OneShotTimer {
    pub fn schedule<F>(delay: Duration, on_fire: F) -> Result<Self, TimerError>
    where
        F: FnOnce() + Send + 'static,
    {
        let (tx, rx) = mpsc::channel::<()>();
        let worker = thread::Builder::new()
            .name("chapter_script_timer".to_string())
            .spawn(move || match rx.recv_timeout(delay) {
                Err(RecvTimeoutError::Timeout) => on_fire(),
                Ok(()) | Err(RecvTimeoutError::Disconnected) => {}
            })?;
        Ok(Self {
            disarm: Some(tx),
            worker: Some(worker),
        })
    }
}

impl Drop for OneShotTimer {
    fn drop(&mut self) {
        // closing the channel wakes the worker early
        self.disarm.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Instant;

    #[test]
    fn fires_after_delay() {
        let fired = Arc::new(AtomicBool::new(false));
        let flag = fired.clone();
        let timer = OneShotTimer::schedule(Duration::from_millis(20), move || {
            flag.store(true, Ordering::SeqCst);
        })
        .expect("timer spawns");
        thread::sleep(Duration::from_millis(200));
        assert!(fired.load(Ordering::SeqCst));
        drop(timer);
    }

    #[test]
    fn dropping_early_disarms_without_waiting_for_delay() {
        let fired = Arc::new(AtomicBool::new(false));
        let flag = fired.clone();
        let started = Instant::now();
        let timer = OneShotTimer::schedule(Duration::from_secs(30), move || {
            flag.store(true, Ordering::SeqCst);
        })
        .expect("timer spawns");
        drop(timer);
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(!fired.load(Ordering::SeqCst));
    }
}
