use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LoopMetricsSnapshot {
    pub tps: f32,
    pub frame_time_ms: f32,
    pub total_ticks: u64,
    /// Frames whose backlog exceeded the per-frame tick cap since startup.
    pub clamped_frames: u64,
}

/// Interval counters for the headless loop. Interval fields reset on every
/// snapshot; `total_ticks` and `clamped_frames` run for the whole session.
#[derive(Debug)]
pub(crate) struct MetricsAccumulator {
    interval_start: Instant,
    interval: Duration,
    frames_in_interval: u32,
    ticks_in_interval: u32,
    frame_time_in_interval: Duration,
    total_ticks: u64,
    clamped_frames: u64,
}

impl MetricsAccumulator {
    pub(crate) fn new(interval: Duration) -> Self {
        Self {
            interval_start: Instant::now(),
            interval,
            frames_in_interval: 0,
            ticks_in_interval: 0,
            frame_time_in_interval: Duration::ZERO,
            total_ticks: 0,
            clamped_frames: 0,
        }
    }

    pub(crate) fn record_frame(&mut self, frame_dt: Duration) {
        self.frames_in_interval = self.frames_in_interval.saturating_add(1);
        self.frame_time_in_interval = self.frame_time_in_interval.saturating_add(frame_dt);
    }

    pub(crate) fn record_tick(&mut self) {
        self.ticks_in_interval = self.ticks_in_interval.saturating_add(1);
        self.total_ticks = self.total_ticks.saturating_add(1);
    }

    pub(crate) fn record_clamp(&mut self) {
        self.clamped_frames = self.clamped_frames.saturating_add(1);
    }

    pub(crate) fn total_ticks(&self) -> u64 {
        self.total_ticks
    }

    pub(crate) fn maybe_snapshot(&mut self, now: Instant) -> Option<LoopMetricsSnapshot> {
        let elapsed = now.saturating_duration_since(self.interval_start);
        if elapsed < self.interval {
            return None;
        }
        Some(self.take_snapshot(now, elapsed))
    }

    pub(crate) fn final_snapshot(&mut self, now: Instant) -> LoopMetricsSnapshot {
        let elapsed = now.saturating_duration_since(self.interval_start);
        self.take_snapshot(now, elapsed)
    }

    fn take_snapshot(&mut self, now: Instant, elapsed: Duration) -> LoopMetricsSnapshot {
        let elapsed_seconds = elapsed.as_secs_f32().max(f32::EPSILON);
        let frame_time_ms = match self.frames_in_interval {
            0 => 0.0,
            frames => self.frame_time_in_interval.as_secs_f32() / frames as f32 * 1000.0,
        };
        let snapshot = LoopMetricsSnapshot {
            tps: self.ticks_in_interval as f32 / elapsed_seconds,
            frame_time_ms,
            total_ticks: self.total_ticks,
            clamped_frames: self.clamped_frames,
        };

        self.interval_start = now;
        self.frames_in_interval = 0;
        self.ticks_in_interval = 0;
        self.frame_time_in_interval = Duration::ZERO;
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_computes_tps_and_frame_time() {
        let mut accumulator = MetricsAccumulator::new(Duration::from_secs(1));
        let base = Instant::now();

        accumulator.record_frame(Duration::from_millis(16));
        accumulator.record_frame(Duration::from_millis(16));
        for _ in 0..4 {
            accumulator.record_tick();
        }

        let snapshot = accumulator
            .maybe_snapshot(base + Duration::from_secs(1))
            .expect("snapshot should be emitted");

        assert!((snapshot.tps - 4.0).abs() < 0.05);
        assert!((snapshot.frame_time_ms - 16.0).abs() < 0.001);
        assert_eq!(snapshot.total_ticks, 4);
    }

    #[test]
    fn session_totals_survive_interval_reset() {
        let mut accumulator = MetricsAccumulator::new(Duration::from_secs(1));
        let base = Instant::now();
        accumulator.record_tick();
        accumulator.record_clamp();
        accumulator.maybe_snapshot(base + Duration::from_secs(2));
        accumulator.record_tick();

        let last = accumulator.final_snapshot(base + Duration::from_secs(3));
        assert_eq!(last.total_ticks, 2);
        assert_eq!(last.clamped_frames, 1);
        assert_eq!(accumulator.total_ticks(), 2);
    }

    #[test]
    fn snapshot_not_emitted_before_interval() {
        let mut accumulator = MetricsAccumulator::new(Duration::from_secs(1));
        let base = Instant::now();
        accumulator.record_frame(Duration::from_millis(16));

        assert!(accumulator
            .maybe_snapshot(base + Duration::from_millis(500))
            .is_none());
    }
}
