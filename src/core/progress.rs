//! Throttled progress notification.
//!
//! The engine never touches a UI. It invokes a callback from whatever task
//! is running the copy; marshaling onto a display thread is the caller's job.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

use super::models::CopyProgress;

pub type ProgressCallback = Arc<dyn Fn(CopyProgress) + Send + Sync>;

/// Callback that forwards every event into an unbounded channel, for callers
/// that prefer to poll.
pub fn progress_channel() -> (ProgressCallback, mpsc::UnboundedReceiver<CopyProgress>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let callback: ProgressCallback = Arc::new(move |p| {
        let _ = tx.send(p);
    });
    (callback, rx)
}

/// Minimum spacing between unforced events. A zero interval lets every
/// event through.
#[derive(Debug)]
struct Throttle {
    interval: Duration,
    last: Option<Instant>,
}

impl Throttle {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    fn ready(&mut self) -> bool {
        self.ready_at(Instant::now())
    }

    fn ready_at(&mut self, now: Instant) -> bool {
        match self.last {
            Some(last) if now.saturating_duration_since(last) < self.interval => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }

    fn reset(&mut self) {
        self.last = None;
    }
}

/// Accumulates bytes for a run and emits at most one event per interval.
/// The final 100% event is always emitted.
pub struct ProgressReporter {
    callback: Option<ProgressCallback>,
    throttle: Throttle,
    started: Instant,
    total_bytes: u64,
    bytes_transferred: u64,
    status: String,
    finished: bool,
    completed: bool,
}

impl ProgressReporter {
    pub fn new(callback: Option<ProgressCallback>, interval: Duration) -> Self {
        Self {
            callback,
            throttle: Throttle::new(interval),
            started: Instant::now(),
            total_bytes: 0,
            bytes_transferred: 0,
            status: String::new(),
            finished: false,
            completed: false,
        }
    }

    /// Reporter that does nothing.
    pub fn silent() -> Self {
        Self::new(None, Duration::from_millis(50))
    }

    pub fn start(&mut self, total_bytes: u64) {
        self.total_bytes = total_bytes;
        self.bytes_transferred = 0;
        self.started = Instant::now();
        self.finished = false;
        self.completed = false;
        self.throttle.reset();
    }

    pub fn set_status(&mut self, status: impl Into<String>) {
        self.status = status.into();
        self.emit(false);
    }

    /// Count bytes read from the source.
    pub fn advance(&mut self, bytes: u64) {
        self.bytes_transferred += bytes;
        self.emit(false);
    }

    pub fn finish(&mut self, status: impl Into<String>) {
        if self.finished {
            return;
        }
        self.status = status.into();
        self.bytes_transferred = self.total_bytes;
        self.finished = true;
        self.completed = true;
        self.emit(true);
    }

    /// Final event for a run that stopped early; percentage stays where it was.
    pub fn halt(&mut self, status: impl Into<String>) {
        if self.finished {
            return;
        }
        self.status = status.into();
        self.finished = true;
        self.emit(true);
    }

    pub fn snapshot(&self) -> CopyProgress {
        let percent_complete = if self.completed {
            100.0
        } else if self.total_bytes == 0 {
            0.0
        } else {
            (self.bytes_transferred as f64 / self.total_bytes as f64 * 100.0).min(100.0)
        };

        let elapsed = self.started.elapsed().as_secs_f64();
        let throughput = if elapsed > 0.0 {
            self.bytes_transferred as f64 / (1024.0 * 1024.0) / elapsed
        } else {
            0.0
        };

        CopyProgress {
            percent_complete,
            bytes_transferred: self.bytes_transferred,
            total_bytes: self.total_bytes,
            throughput,
            status: self.status.clone(),
        }
    }

    fn emit(&mut self, force: bool) {
        if self.callback.is_none() || !(force || self.throttle.ready()) {
            return;
        }
        let snapshot = self.snapshot();
        if let Some(callback) = &self.callback {
            callback(snapshot);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reporter(interval: Duration) -> (ProgressReporter, mpsc::UnboundedReceiver<CopyProgress>) {
        let (callback, rx) = progress_channel();
        (ProgressReporter::new(Some(callback), interval), rx)
    }

    #[test]
    fn test_throttle_spacing() {
        let mut throttle = Throttle::new(Duration::from_millis(50));
        let t0 = Instant::now();

        assert!(throttle.ready_at(t0));
        assert!(!throttle.ready_at(t0 + Duration::from_millis(49)));
        assert!(throttle.ready_at(t0 + Duration::from_millis(50)));
        assert!(!throttle.ready_at(t0 + Duration::from_millis(60)));

        throttle.reset();
        assert!(throttle.ready_at(t0 + Duration::from_millis(61)));
    }

    #[test]
    fn test_zero_interval_never_throttles() {
        let mut throttle = Throttle::new(Duration::ZERO);
        let t0 = Instant::now();
        assert!(throttle.ready_at(t0));
        assert!(throttle.ready_at(t0));
    }

    #[test]
    fn test_throttles_but_always_emits_completion() {
        let (mut reporter, mut rx) = reporter(Duration::from_secs(60));
        reporter.start(1000);

        for _ in 0..10 {
            reporter.advance(50);
        }
        reporter.finish("done");

        let mut events = Vec::new();
        while let Ok(p) = rx.try_recv() {
            events.push(p);
        }

        assert_eq!(events.len(), 2);
        let last = events.last().unwrap();
        assert_eq!(last.percent_complete, 100.0);
        assert_eq!(last.bytes_transferred, 1000);
        assert_eq!(last.status, "done");
    }

    #[test]
    fn test_finish_emits_once() {
        let (mut reporter, mut rx) = reporter(Duration::from_secs(60));
        reporter.start(0);
        reporter.finish("done");
        reporter.finish("done again");

        assert_eq!(rx.try_recv().unwrap().percent_complete, 100.0);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_halt_does_not_claim_completion() {
        let (mut reporter, mut rx) = reporter(Duration::from_secs(60));
        reporter.start(1000);
        reporter.advance(100);
        reporter.halt("cancelled");
        reporter.finish("done");

        let mut last = None;
        while let Ok(p) = rx.try_recv() {
            last = Some(p);
        }
        let last = last.unwrap();
        assert_eq!(last.status, "cancelled");
        assert_eq!(last.percent_complete, 10.0);
    }

    #[test]
    fn test_percentage_tracks_bytes() {
        let mut reporter = ProgressReporter::silent();
        reporter.start(400);
        reporter.advance(100);
        assert_eq!(reporter.snapshot().percent_complete, 25.0);
    }
}
