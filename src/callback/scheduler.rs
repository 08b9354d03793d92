//! Reconciler tick loop

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};

use crate::batch::BatchAdjuster;
use crate::callback::CallbackService;
use crate::clock::Clock;

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub interval: Duration,
    pub initial_batch_size: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { interval: Duration::from_secs(5), initial_batch_size: 100 }
    }
}

/// Invokes the (breaker-wrapped) reconciler on an interval, feeding each
/// pass's duration back into the batch adjuster.
pub struct CallbackScheduler {
    service: Arc<dyn CallbackService>,
    adjuster: Mutex<Box<dyn BatchAdjuster>>,
    clock: Arc<dyn Clock>,
    config: SchedulerConfig,
}

impl CallbackScheduler {
    pub fn new(
        service: Arc<dyn CallbackService>,
        adjuster: Box<dyn BatchAdjuster>,
        clock: Arc<dyn Clock>,
        config: SchedulerConfig,
    ) -> Self {
        Self { service, adjuster: Mutex::new(adjuster), clock, config }
    }

    /// Run until `shutdown` flips to true or its sender goes away.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut batch_size = self.config.initial_batch_size.max(1);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let started = Instant::now();
                    let horizon = self.clock.now_millis() as i64;

                    match self.service.send(horizon, batch_size).await {
                        Ok(()) => {
                            tracing::debug!(horizon, batch_size, "callback pass complete");
                        }
                        Err(err) if err.is_circuit_open() => {
                            tracing::warn!(%err, "callback pass rejected");
                        }
                        Err(err) => {
                            tracing::error!(%err, "callback pass failed");
                        }
                    }

                    let elapsed = started.elapsed();
                    batch_size = self
                        .adjuster
                        .lock()
                        .unwrap_or_else(|poisoned| poisoned.into_inner())
                        .adjust(elapsed)
                        .max(1);
                }
                changed = shutdown.changed() => {
                    match changed {
                        Ok(()) if !*shutdown.borrow() => continue,
                        _ => {
                            tracing::info!("callback scheduler stopping");
                            return;
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::Result;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingService {
        calls: AtomicUsize,
        batch_sizes: Mutex<Vec<usize>>,
    }

    #[async_trait]
    impl CallbackService for CountingService {
        async fn send(&self, _horizon_millis: i64, batch_size: usize) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.batch_sizes.lock().unwrap().push(batch_size);
            Ok(())
        }
    }

    struct DoublingAdjuster {
        size: usize,
    }

    impl BatchAdjuster for DoublingAdjuster {
        fn adjust(&mut self, _resp_time: Duration) -> usize {
            self.size *= 2;
            self.size
        }
    }

    #[tokio::test]
    async fn ticks_until_shutdown_and_applies_the_adjuster() {
        let service = Arc::new(CountingService {
            calls: AtomicUsize::new(0),
            batch_sizes: Mutex::new(Vec::new()),
        });
        let scheduler = Arc::new(CallbackScheduler::new(
            service.clone(),
            Box::new(DoublingAdjuster { size: 10 }),
            Arc::new(ManualClock::new(0)),
            SchedulerConfig { interval: Duration::from_millis(10), initial_batch_size: 10 },
        ));

        let (tx, rx) = watch::channel(false);
        let handle = {
            let scheduler = scheduler.clone();
            tokio::spawn(async move { scheduler.run(rx).await })
        };

        tokio::time::sleep(Duration::from_millis(60)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();

        let calls = service.calls.load(Ordering::SeqCst);
        assert!(calls >= 2, "expected at least two passes, got {calls}");

        let sizes = service.batch_sizes.lock().unwrap();
        assert_eq!(sizes[0], 10);
        assert_eq!(sizes[1], 20, "second pass uses the adjusted size");
    }

    #[tokio::test]
    async fn dropping_the_sender_stops_the_loop() {
        let service = Arc::new(CountingService {
            calls: AtomicUsize::new(0),
            batch_sizes: Mutex::new(Vec::new()),
        });
        let scheduler = Arc::new(CallbackScheduler::new(
            service,
            Box::new(DoublingAdjuster { size: 1 }),
            Arc::new(ManualClock::new(0)),
            SchedulerConfig { interval: Duration::from_millis(5), initial_batch_size: 1 },
        ));

        let (tx, rx) = watch::channel(false);
        let handle = {
            let scheduler = scheduler.clone();
            tokio::spawn(async move { scheduler.run(rx).await })
        };
        drop(tx);

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("scheduler should stop when the sender is dropped")
            .unwrap();
    }
}
