/// Performance measurement utilities
/// Each occluder phase can be timed and logged for optimization analysis
pub mod profiling;

pub use profiling::{CounterSnapshot, FunctionCounters, FUNCTION_COUNTERS};

use std::time::{Duration, Instant};

/// Scope timer that logs its elapsed time at `debug` level when dropped
pub struct PerfTimer {
    name: &'static str,
    start: Instant,
}

impl PerfTimer {
    #[inline]
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            start: Instant::now(),
        }
    }

    #[inline]
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Drop for PerfTimer {
    fn drop(&mut self) {
        log::debug!("[PERF] {}: {}μs", self.name, self.elapsed().as_micros());
    }
}

/// Per-frame phase timings
#[derive(Debug, Clone, Copy, Default)]
pub struct PerfStats {
    pub classify_us: f64,
    pub transform_us: f64,
    pub binning_us: f64,
    pub total_us: f64,
}

impl PerfStats {
    pub fn new() -> Self {
        Self::default()
    }

    fn share(&self, phase_us: f64) -> f64 {
        if self.total_us > 0.0 {
            (phase_us / self.total_us) * 100.0
        } else {
            0.0
        }
    }

    pub fn log_summary(&self) {
        log::info!("========== OCCLUDER FRAME SUMMARY ==========");
        log::info!(
            "Classify:   {:8.2}μs ({:5.1}%)",
            self.classify_us,
            self.share(self.classify_us)
        );
        log::info!(
            "Transform:  {:8.2}μs ({:5.1}%)",
            self.transform_us,
            self.share(self.transform_us)
        );
        log::info!(
            "Binning:    {:8.2}μs ({:5.1}%)",
            self.binning_us,
            self.share(self.binning_us)
        );
        log::info!("Total:      {:8.2}μs", self.total_us);
    }
}

/// Macro for easy performance measurement
#[macro_export]
macro_rules! perf_scope {
    ($name:expr) => {
        let _timer = $crate::perf::PerfTimer::new($name);
    };
}
