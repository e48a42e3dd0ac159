/*!
 * Progress accounting for download, decrypt and upload stages
 *
 * A [`ProgressTracker`] accumulates the bytes seen by one stage and logs a
 * throughput line at most once per [`LOG_INTERVAL`] of wall-clock time, no
 * matter how many chunks flow through it. [`Tracked`] wraps any reader
 * (async or blocking) and feeds the tracker without altering the bytes.
 *
 * Progress is observational only; nothing in the pipeline branches on it.
 */

use pin_project::pin_project;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, ReadBuf};
use tracing::info;

/// Minimum wall-clock time between two progress lines
pub const LOG_INTERVAL: Duration = Duration::from_secs(5);

const MIB: f64 = 1024.0 * 1024.0;

/// Point-in-time view of a stage's progress
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressSnapshot {
    pub bytes_processed: u64,
    pub total_bytes: u64,
    pub elapsed: Duration,
}

impl ProgressSnapshot {
    /// Percentage of `total_bytes` processed (0 when the total is unknown)
    pub fn percentage(&self) -> f64 {
        if self.total_bytes > 0 {
            (self.bytes_processed as f64 / self.total_bytes as f64) * 100.0
        } else {
            0.0
        }
    }

    /// Throughput in MiB per second
    pub fn rate_mbps(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.bytes_processed as f64 / MIB / secs
        } else {
            0.0
        }
    }
}

/// Byte accumulator for one stage
///
/// Shared through an `Arc` between the stage driver and the [`Tracked`]
/// stream feeding it; the byte count only ever grows.
#[derive(Debug)]
pub struct ProgressTracker {
    label: &'static str,
    total_bytes: u64,
    processed: AtomicU64,
    started: Instant,
    last_log: Mutex<Instant>,
    interval: Duration,
}

impl ProgressTracker {
    /// Start tracking a stage of `total_bytes` and log the start line
    pub fn start(label: &'static str, total_bytes: u64) -> Arc<Self> {
        Self::start_at(label, total_bytes, Instant::now(), LOG_INTERVAL)
    }

    /// Start tracking with an explicit clock origin and interval
    pub fn start_at(
        label: &'static str,
        total_bytes: u64,
        now: Instant,
        interval: Duration,
    ) -> Arc<Self> {
        info!(
            stage = label,
            total_bytes,
            "[{}] Starting: {:.2} MB",
            label,
            total_bytes as f64 / MIB
        );

        Arc::new(Self {
            label,
            total_bytes,
            processed: AtomicU64::new(0),
            started: now,
            last_log: Mutex::new(now),
            interval,
        })
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    pub fn bytes_processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    /// Account for `bytes` more bytes
    pub fn record(&self, bytes: u64) {
        self.record_at(bytes, Instant::now());
    }

    /// Account for `bytes` more bytes at time `now`.
    ///
    /// Returns the snapshot that was logged, if the interval had elapsed.
    pub fn record_at(&self, bytes: u64, now: Instant) -> Option<ProgressSnapshot> {
        self.processed.fetch_add(bytes, Ordering::Relaxed);

        let mut last_log = self
            .last_log
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if now.saturating_duration_since(*last_log) < self.interval {
            return None;
        }
        *last_log = now;
        drop(last_log);

        let snapshot = self.snapshot_at(now);
        info!(
            stage = self.label,
            bytes_processed = snapshot.bytes_processed,
            total_bytes = snapshot.total_bytes,
            "[{}] Progress: {:.2}/{:.2} MB ({:.1}%) @ {:.2} MB/s",
            self.label,
            snapshot.bytes_processed as f64 / MIB,
            snapshot.total_bytes as f64 / MIB,
            snapshot.percentage(),
            snapshot.rate_mbps()
        );
        Some(snapshot)
    }

    pub fn snapshot_at(&self, now: Instant) -> ProgressSnapshot {
        ProgressSnapshot {
            bytes_processed: self.bytes_processed(),
            total_bytes: self.total_bytes,
            elapsed: now.saturating_duration_since(self.started),
        }
    }

    /// Log the stage summary. Called on success and failure alike.
    pub fn finish(&self) -> ProgressSnapshot {
        let snapshot = self.snapshot_at(Instant::now());
        info!(
            stage = self.label,
            bytes_processed = snapshot.bytes_processed,
            elapsed_ms = snapshot.elapsed.as_millis() as u64,
            "[{}] Complete: {:.2} MB in {:.1}s ({:.2} MB/s)",
            self.label,
            snapshot.bytes_processed as f64 / MIB,
            snapshot.elapsed.as_secs_f64(),
            snapshot.rate_mbps()
        );
        snapshot
    }
}

/// Reader decorator that reports every byte it yields to a tracker
#[pin_project]
#[derive(Debug)]
pub struct Tracked<R> {
    #[pin]
    inner: R,
    progress: Arc<ProgressTracker>,
}

impl<R> Tracked<R> {
    pub fn new(inner: R, progress: Arc<ProgressTracker>) -> Self {
        Self { inner, progress }
    }

    pub fn progress(&self) -> &Arc<ProgressTracker> {
        &self.progress
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: AsyncRead> AsyncRead for Tracked<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.project();
        let before = buf.filled().len();
        let result = this.inner.poll_read(cx, buf);
        if let Poll::Ready(Ok(())) = &result {
            let read = buf.filled().len() - before;
            if read > 0 {
                this.progress.record(read as u64);
            }
        }
        result
    }
}

impl<R: io::Read> io::Read for Tracked<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let read = self.inner.read(buf)?;
        if read > 0 {
            self.progress.record(read as u64);
        }
        Ok(read)
    }
}
