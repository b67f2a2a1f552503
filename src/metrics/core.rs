//! Timing helpers shared by the component metrics

use std::time::Instant;

/// Records elapsed seconds into a histogram when dropped.
pub struct TimingGuard {
    start: Instant,
    histogram_name: &'static str,
}

impl TimingGuard {
    pub fn new(histogram_name: &'static str) -> Self {
        Self { start: Instant::now(), histogram_name }
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

impl Drop for TimingGuard {
    fn drop(&mut self) {
        ::metrics::histogram!(self.histogram_name).record(self.elapsed_secs());
    }
}

/// Start timing an operation; the duration is recorded when the guard drops.
pub fn time_operation(histogram_name: &'static str) -> TimingGuard {
    TimingGuard::new(histogram_name)
}
