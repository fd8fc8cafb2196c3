/// Function call counting for the occluder hot paths
/// Counters only advance when the `profiling` feature is enabled
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe performance counters for function call tracking
pub struct FunctionCounters {
    // Classification counters
    pub classify_calls: AtomicU64,
    pub frustum_rejected: AtomicU64,
    pub size_rejected: AtomicU64,

    // Transform counters
    pub transform_calls: AtomicU64,
    pub vertices_transformed: AtomicU64,

    // Binning counters
    pub triangles_processed: AtomicU64,
    pub triangles_culled: AtomicU64,
    pub triangles_offscreen: AtomicU64,
    pub bin_entries_written: AtomicU64,
    pub bin_entries_dropped: AtomicU64,

    // Gather counters
    pub triangles_gathered: AtomicU64,
}

impl FunctionCounters {
    pub const fn new() -> Self {
        Self {
            classify_calls: AtomicU64::new(0),
            frustum_rejected: AtomicU64::new(0),
            size_rejected: AtomicU64::new(0),
            transform_calls: AtomicU64::new(0),
            vertices_transformed: AtomicU64::new(0),
            triangles_processed: AtomicU64::new(0),
            triangles_culled: AtomicU64::new(0),
            triangles_offscreen: AtomicU64::new(0),
            bin_entries_written: AtomicU64::new(0),
            bin_entries_dropped: AtomicU64::new(0),
            triangles_gathered: AtomicU64::new(0),
        }
    }

    /// Reset all counters to zero
    pub fn reset(&self) {
        for counter in self.all() {
            counter.store(0, Ordering::Relaxed);
        }
    }

    fn all(&self) -> [&AtomicU64; 11] {
        [
            &self.classify_calls,
            &self.frustum_rejected,
            &self.size_rejected,
            &self.transform_calls,
            &self.vertices_transformed,
            &self.triangles_processed,
            &self.triangles_culled,
            &self.triangles_offscreen,
            &self.bin_entries_written,
            &self.bin_entries_dropped,
            &self.triangles_gathered,
        ]
    }

    /// Get snapshot of all counters
    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            classify_calls: self.classify_calls.load(Ordering::Relaxed),
            frustum_rejected: self.frustum_rejected.load(Ordering::Relaxed),
            size_rejected: self.size_rejected.load(Ordering::Relaxed),
            transform_calls: self.transform_calls.load(Ordering::Relaxed),
            vertices_transformed: self.vertices_transformed.load(Ordering::Relaxed),
            triangles_processed: self.triangles_processed.load(Ordering::Relaxed),
            triangles_culled: self.triangles_culled.load(Ordering::Relaxed),
            triangles_offscreen: self.triangles_offscreen.load(Ordering::Relaxed),
            bin_entries_written: self.bin_entries_written.load(Ordering::Relaxed),
            bin_entries_dropped: self.bin_entries_dropped.load(Ordering::Relaxed),
            triangles_gathered: self.triangles_gathered.load(Ordering::Relaxed),
        }
    }
}

impl Default for FunctionCounters {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of counter values at a point in time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub classify_calls: u64,
    pub frustum_rejected: u64,
    pub size_rejected: u64,
    pub transform_calls: u64,
    pub vertices_transformed: u64,
    pub triangles_processed: u64,
    pub triangles_culled: u64,
    pub triangles_offscreen: u64,
    pub bin_entries_written: u64,
    pub bin_entries_dropped: u64,
    pub triangles_gathered: u64,
}

impl CounterSnapshot {
    /// Log a formatted report at `info` level
    pub fn log_report(&self) {
        log::info!("=== Occluder Counters Report ===");
        log::info!("Classification:");
        log::info!("  classify calls:             {:12}", self.classify_calls);
        log::info!("  rejected by frustum:        {:12}", self.frustum_rejected);
        log::info!("  rejected by size:           {:12}", self.size_rejected);

        log::info!("Transform:");
        log::info!("  transform calls:            {:12}", self.transform_calls);
        log::info!("  vertices transformed:       {:12}", self.vertices_transformed);

        log::info!("Binning:");
        log::info!("  triangles processed:        {:12}", self.triangles_processed);
        log::info!("  triangles culled:           {:12}", self.triangles_culled);
        log::info!("  triangles off-screen:       {:12}", self.triangles_offscreen);
        log::info!("  bin entries written:        {:12}", self.bin_entries_written);
        log::info!("  bin entries dropped:        {:12}", self.bin_entries_dropped);
        if self.triangles_processed > 0 {
            let binned = self
                .triangles_processed
                .saturating_sub(self.triangles_culled + self.triangles_offscreen);
            let rate = (binned as f64 / self.triangles_processed as f64) * 100.0;
            log::info!("  binned rate:                {:11.2}%", rate);
        }

        log::info!("Gather:");
        log::info!("  triangles gathered:         {:12}", self.triangles_gathered);
    }
}

/// Global function counters instance
pub static FUNCTION_COUNTERS: FunctionCounters = FunctionCounters::new();

/// Macro for incrementing a counter (only when profiling feature is enabled)
#[macro_export]
macro_rules! count_call {
    ($counter:expr) => {
        #[cfg(feature = "profiling")]
        {
            $counter.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        }
    };
}

/// Macro for adding to a counter (only when profiling feature is enabled)
#[macro_export]
macro_rules! count_add {
    ($counter:expr, $value:expr) => {
        #[cfg(feature = "profiling")]
        {
            $counter.fetch_add($value as u64, std::sync::atomic::Ordering::Relaxed);
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_counters_snapshot_and_reset() {
        let counters = FunctionCounters::new();
        counters.classify_calls.fetch_add(3, Ordering::Relaxed);
        counters.bin_entries_written.fetch_add(40, Ordering::Relaxed);

        let snap = counters.snapshot();
        assert_eq!(snap.classify_calls, 3);
        assert_eq!(snap.bin_entries_written, 40);

        counters.reset();
        assert_eq!(counters.snapshot(), CounterSnapshot::default());
    }
}
