use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

const DEFAULT_WINDOW: Duration = Duration::from_secs(10);
const DEFAULT_MAX_POINTS: usize = 100;

/// Throughput over a sliding window of acknowledged offsets.
///
/// Offsets rather than byte deltas are recorded, so a server that
/// acknowledges less than was sent (or resynchronizes backwards) never
/// inflates the rate.
pub struct ThroughputMeter {
    inner: Mutex<MeterInner>,
}

struct MeterInner {
    /// `(acked offset, when it was acknowledged)`, oldest first.
    points: VecDeque<(u64, Instant)>,
    window: Duration,
    max_points: usize,
}

impl Default for ThroughputMeter {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW, DEFAULT_MAX_POINTS)
    }
}

impl ThroughputMeter {
    pub fn new(window: Duration, max_points: usize) -> Self {
        Self {
            inner: Mutex::new(MeterInner {
                points: VecDeque::new(),
                window,
                max_points: max_points.max(2),
            }),
        }
    }

    /// Records that the server has persisted everything below `acked`.
    ///
    /// An offset lower than the last one restarts the window from it.
    pub fn record(&self, acked: u64) {
        self.record_at(acked, Instant::now());
    }

    fn record_at(&self, acked: u64, now: Instant) {
        let mut m = self.inner.lock().unwrap();
        if m.points.back().is_some_and(|&(last, _)| acked < last) {
            m.points.clear();
        }
        m.points.push_back((acked, now));

        // Keep one point older than the window as the baseline.
        let window = m.window;
        while m.points.len() > 2
            && m.points
                .get(1)
                .is_some_and(|&(_, t)| now.duration_since(t) >= window)
        {
            m.points.pop_front();
        }
        while m.points.len() > m.max_points {
            m.points.pop_front();
        }
    }

    /// Bytes per second between the oldest and newest point; zero until two
    /// points at distinct instants exist.
    pub fn bytes_per_second(&self) -> f64 {
        let m = self.inner.lock().unwrap();
        let (Some(&(first, t0)), Some(&(last, t1))) = (m.points.front(), m.points.back()) else {
            return 0.0;
        };
        let elapsed = t1.duration_since(t0).as_secs_f64();
        if elapsed <= 0.0 {
            return 0.0;
        }
        last.saturating_sub(first) as f64 / elapsed
    }

    /// Time left to reach `total` at the current rate.
    pub fn eta(&self, total: u64) -> Option<Duration> {
        let rate = self.bytes_per_second();
        if rate <= 0.0 {
            return None;
        }
        let acked = self.last_offset().unwrap_or(0);
        Some(Duration::from_secs_f64(
            total.saturating_sub(acked) as f64 / rate,
        ))
    }

    pub fn last_offset(&self) -> Option<u64> {
        self.inner.lock().unwrap().points.back().map(|&(o, _)| o)
    }

    /// Forgets every point, then starts a new window at `offset`.
    pub fn restart(&self, offset: u64) {
        let mut m = self.inner.lock().unwrap();
        m.points.clear();
        m.points.push_back((offset, Instant::now()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_meter_has_no_rate() {
        let meter = ThroughputMeter::default();
        assert_eq!(meter.bytes_per_second(), 0.0);
        assert!(meter.eta(1000).is_none());
        assert_eq!(meter.last_offset(), None);
    }

    #[test]
    fn rate_from_offsets() {
        let meter = ThroughputMeter::default();
        let t0 = Instant::now();
        meter.record_at(0, t0);
        meter.record_at(262_144, t0 + Duration::from_secs(1));
        meter.record_at(524_288, t0 + Duration::from_secs(2));
        assert_eq!(meter.bytes_per_second(), 262_144.0);

        let eta = meter.eta(1_048_576).unwrap();
        assert_eq!(eta, Duration::from_secs(2));
    }

    #[test]
    fn regression_restarts_window() {
        let meter = ThroughputMeter::default();
        let t0 = Instant::now();
        meter.record_at(0, t0);
        meter.record_at(500_000, t0 + Duration::from_secs(1));
        meter.record_at(262_144, t0 + Duration::from_secs(2));
        assert_eq!(meter.last_offset(), Some(262_144));
        assert_eq!(meter.bytes_per_second(), 0.0);
    }

    #[test]
    fn old_points_fall_out_of_window() {
        let meter = ThroughputMeter::new(Duration::from_secs(10), 100);
        let t0 = Instant::now();
        meter.record_at(0, t0);
        meter.record_at(1_000, t0 + Duration::from_secs(1));
        // Slow start, then 1000 B/s.
        meter.record_at(2_000, t0 + Duration::from_secs(30));
        meter.record_at(12_000, t0 + Duration::from_secs(40));
        assert_eq!(meter.bytes_per_second(), 1_000.0);
    }

    #[test]
    fn point_count_is_bounded() {
        let meter = ThroughputMeter::new(Duration::from_secs(60), 5);
        let t0 = Instant::now();
        for i in 0..20u64 {
            meter.record_at(i * 10, t0 + Duration::from_millis(i));
        }
        assert_eq!(meter.inner.lock().unwrap().points.len(), 5);
    }

    #[test]
    fn restart_sets_baseline() {
        let meter = ThroughputMeter::default();
        meter.record(100);
        meter.record(200);
        meter.restart(4096);
        assert_eq!(meter.last_offset(), Some(4096));
        assert_eq!(meter.bytes_per_second(), 0.0);
    }
}
