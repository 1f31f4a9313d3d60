//! Keyed debounce scheduler
//!
//! Every pending action lives in one table keyed by name, together with its
//! deadline. A single worker thread sleeps until the earliest deadline and
//! removes due entries under the lock before running them, so a reschedule
//! either replaces the entry before the worker sees it or arrives after the
//! action was taken. Actions run one at a time on the worker thread.

use std::collections::HashMap;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use parking_lot::{Condvar, Mutex};
use tracing::{debug, error};

type Action = Box<dyn FnOnce() + Send + 'static>;

struct Pending {
    deadline: Instant,
    action: Action,
}

#[derive(Default)]
struct Table {
    pending: HashMap<String, Pending>,
    shutdown: bool,
}

#[derive(Default)]
struct Shared {
    table: Mutex<Table>,
    wakeup: Condvar,
}

pub struct Debouncer {
    shared: Arc<Shared>,
    worker: Option<thread::JoinHandle<()>>,
}

impl Debouncer {
    pub fn new() -> Result<Self> {
        let shared = Arc::new(Shared::default());
        let worker_shared = Arc::clone(&shared);
        let worker = thread::Builder::new()
            .name("debounce".into())
            .spawn(move || run_worker(&worker_shared))
            .context("Failed to spawn debounce worker thread")?;

        Ok(Self {
            shared,
            worker: Some(worker),
        })
    }

    /// Run `action` once `delay` has passed without another call for `key`.
    /// A newer call replaces the older action.
    pub fn schedule<F>(&self, key: &str, delay: Duration, action: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut table = self.shared.table.lock();
        if table.shutdown {
            return;
        }
        let replaced = table
            .pending
            .insert(
                key.to_string(),
                Pending {
                    deadline: Instant::now() + delay,
                    action: Box::new(action),
                },
            )
            .is_some();
        debug!(key = %key, delay_ms = delay.as_millis() as u64, replaced, "Debounce scheduled");
        self.shared.wakeup.notify_one();
    }

    #[cfg(test)]
    pub fn is_pending(&self, key: &str) -> bool {
        self.shared.table.lock().pending.contains_key(key)
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        {
            let mut table = self.shared.table.lock();
            table.shutdown = true;
            table.pending.clear();
        }
        self.shared.wakeup.notify_all();

        if let Some(worker) = self.worker.take() {
            // An action dropping the last controller handle runs this on the worker itself
            if worker.thread().id() == thread::current().id() {
                return;
            }
            if worker.join().is_err() {
                error!("Debounce worker panicked");
            }
        }
    }
}

fn run_worker(shared: &Shared) {
    let mut table = shared.table.lock();
    loop {
        if table.shutdown {
            break;
        }

        let now = Instant::now();
        let due: Vec<String> = table
            .pending
            .iter()
            .filter(|(_, pending)| pending.deadline <= now)
            .map(|(key, _)| key.clone())
            .collect();

        if !due.is_empty() {
            let actions: Vec<(String, Action)> = due
                .into_iter()
                .filter_map(|key| table.pending.remove(&key).map(|p| (key, p.action)))
                .collect();

            drop(table);
            for (key, action) in actions {
                debug!(key = %key, "Debounce firing");
                action();
            }
            table = shared.table.lock();
            continue;
        }

        match table.pending.values().map(|p| p.deadline).min() {
            Some(deadline) => {
                shared.wakeup.wait_until(&mut table, deadline);
            }
            None => shared.wakeup.wait(&mut table),
        }
    }
    debug!("Debounce worker stopped");
}
