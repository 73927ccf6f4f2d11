use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Instant,
};

use log::{debug, info, warn};

use crate::{
    config::RefreshConfig,
    error::Error,
    gateway::HardwareGateway,
    pixel_buffer::PixelBuffer,
    worker::{Priority, StopToken, Worker},
};

#[derive(Debug, Default)]
pub struct RefreshStats {
    frames: AtomicU64,
    faults: AtomicU64,
    stale: AtomicU64,
    worst_interval_us: AtomicU64,
}
impl RefreshStats {
    /// Commits attempted, failed ones included.
    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }
    pub fn faults(&self) -> u64 {
        self.faults.load(Ordering::Relaxed)
    }
    /// Commits that repeated the previous frame because the buffer was busy.
    pub fn stale(&self) -> u64 {
        self.stale.load(Ordering::Relaxed)
    }
    /// Longest gap seen between two consecutive commits, in microseconds.
    pub fn worst_interval_us(&self) -> u64 {
        self.worst_interval_us.load(Ordering::Relaxed)
    }
}

/// Pushes the pixel buffer to the panel as often as the panel allows.
pub struct RefreshDriver<G> {
    buffer: Arc<PixelBuffer>,
    gateway: G,
    config: RefreshConfig,
    stats: Arc<RefreshStats>,
}
impl<G: HardwareGateway> RefreshDriver<G> {
    pub fn new(buffer: Arc<PixelBuffer>, gateway: G, config: RefreshConfig) -> Self {
        Self {
            buffer,
            gateway,
            config,
            stats: Arc::default(),
        }
    }

    pub fn stats(&self) -> Arc<RefreshStats> {
        Arc::clone(&self.stats)
    }

    pub fn spawn(self) -> Result<Worker<G>, Error> {
        Worker::spawn("refresh", Priority::RealTime, move |stop| self.run(&stop))
    }

    /// Runs until `stop` is requested and hands the gateway back. The panel is
    /// left showing the last frame.
    pub fn run(mut self, stop: &StopToken) -> G {
        let mut frame = self.buffer.snapshot();
        let mut last_commit: Option<Instant> = None;
        let mut last_report = Instant::now();

        while !stop.is_requested() {
            if !self
                .buffer
                .try_snapshot_into(&mut frame, self.config.lock_timeout)
            {
                self.stats.stale.fetch_add(1, Ordering::Relaxed);
            }

            let now = Instant::now();
            if let Some(last) = last_commit {
                let interval = now.duration_since(last).as_micros() as u64;
                self.stats
                    .worst_interval_us
                    .fetch_max(interval, Ordering::Relaxed);
            }
            last_commit = Some(now);

            if let Err(fault) = self.gateway.commit(&frame) {
                let faults = self.stats.faults.fetch_add(1, Ordering::Relaxed);
                if faults % 1000 == 0 {
                    warn!("commit failed ({} so far): {fault}", faults + 1);
                }
            }
            self.stats.frames.fetch_add(1, Ordering::Relaxed);

            if last_report.elapsed() >= self.config.stats_interval {
                debug!(
                    "refresh: {} frames, {} faults, {} stale, worst interval {}us",
                    self.stats.frames(),
                    self.stats.faults(),
                    self.stats.stale(),
                    self.stats.worst_interval_us()
                );
                last_report = Instant::now();
            }
        }

        info!("refresh loop stopped after {} frames", self.stats.frames());
        self.gateway
    }
}
