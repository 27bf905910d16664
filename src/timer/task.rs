use std::future::Future;

use tokio::task::JoinHandle;

/// A spawned repeating callback that is aborted when dropped.
///
/// Whoever owns the value owns the callback: replacing or clearing the slot
/// that holds it cancels the task on every path, including teardown.
pub struct ScheduledTask {
    handle: JoinHandle<()>,
}

impl ScheduledTask {
    pub fn spawn<F>(future: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        Self {
            handle: tokio::spawn(future),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for ScheduledTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        sync::{
            atomic::{AtomicU32, Ordering},
            Arc,
        },
        time::Duration,
    };

    #[tokio::test(start_paused = true)]
    async fn dropping_the_task_stops_it() {
        let ticks = Arc::new(AtomicU32::new(0));
        let counter = ticks.clone();
        let task = ScheduledTask::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));
            loop {
                interval.tick().await;
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_millis(2_500)).await;
        let seen = ticks.load(Ordering::SeqCst);
        assert!(seen >= 2);

        drop(task);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), seen);
    }
}
