use std::hint::black_box;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tprofile_core::scope;

/// Threads alternating between a CPU-bound scope and a sleeping one until
/// stopped.
pub struct Workload {
    running: Arc<AtomicBool>,
    threads: Vec<JoinHandle<u64>>,
}

impl Workload {
    pub fn spawn(threads: usize) -> anyhow::Result<Self> {
        let running = Arc::new(AtomicBool::new(true));
        let mut handles = Vec::with_capacity(threads);
        for i in 0..threads {
            let running = Arc::clone(&running);
            let handle = thread::Builder::new()
                .name(format!("workload-{i}"))
                .spawn(move || worker(&running))?;
            handles.push(handle);
        }
        Ok(Self {
            running,
            threads: handles,
        })
    }

    /// Stop all threads and return the number of iterations they completed.
    pub fn finish(self) -> u64 {
        self.running.store(false, Ordering::Relaxed);
        self.threads
            .into_iter()
            .map(|h| h.join().unwrap_or(0))
            .sum()
    }
}

fn worker(running: &AtomicBool) -> u64 {
    let _scope = scope!("worker");
    let mut iterations = 0;
    while running.load(Ordering::Relaxed) {
        compute(Duration::from_millis(3));
        idle(Duration::from_millis(2));
        iterations += 1;
    }
    iterations
}

fn compute(budget: Duration) {
    let _scope = scope!("compute");
    let start = Instant::now();
    let mut acc = 0u64;
    while start.elapsed() < budget {
        for i in 0..1_000u64 {
            acc = acc.wrapping_mul(31).wrapping_add(i);
        }
        black_box(acc);
    }
}

fn idle(duration: Duration) {
    let _scope = scope!("sleep");
    thread::sleep(duration);
}
