//! Build context collecting per-stage timings
//!
//! A context lives for the duration of one tile build. Stages are timed with
//! `start_timer`/`stop_timer` and the totals are reported through the `log`
//! facade once the build finishes.

use std::collections::HashMap;
use std::time::Duration;
use web_time::Instant;

/// Timer categories for performance profiling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TimerCategory {
    /// Whole tile build
    Total,
    /// Triangle rasterization
    Rasterization,
    /// Span filtering
    Filtering,
    /// Compact heightfield building and erosion
    CompactHeightfield,
    /// Distance field and region partitioning
    Regions,
    /// Contour tracing and simplification
    Contours,
    /// Polygon mesh generation
    PolyMesh,
    /// Detail mesh generation
    DetailMesh,
    /// Heightfield layer partitioning
    Layers,
    /// Tile cache decompression and obstacle marking
    TileCache,
}

#[derive(Debug, Clone, Copy, Default)]
struct TimerEntry {
    total: Duration,
    count: usize,
}

/// Context for Recast operations providing stage timing
#[derive(Debug)]
pub struct RecastContext {
    active_timers: HashMap<TimerCategory, Instant>,
    timers: HashMap<TimerCategory, TimerEntry>,
    enable_timing: bool,
}

impl Default for RecastContext {
    fn default() -> Self {
        Self::new()
    }
}

impl RecastContext {
    /// Creates a new context with timing enabled
    pub fn new() -> Self {
        Self {
            active_timers: HashMap::new(),
            timers: HashMap::new(),
            enable_timing: true,
        }
    }

    /// Enables or disables timing
    pub fn set_timing_enabled(&mut self, enabled: bool) {
        self.enable_timing = enabled;
    }

    /// Starts a timer for the given category
    pub fn start_timer(&mut self, category: TimerCategory) {
        if self.enable_timing {
            self.active_timers.insert(category, Instant::now());
        }
    }

    /// Stops a timer and accumulates its duration
    pub fn stop_timer(&mut self, category: TimerCategory) {
        if let Some(start) = self.active_timers.remove(&category) {
            let entry = self.timers.entry(category).or_default();
            entry.total += start.elapsed();
            entry.count += 1;
        }
    }

    /// Accumulated time spent in a category
    pub fn get_timer_duration(&self, category: TimerCategory) -> Option<Duration> {
        self.timers.get(&category).map(|e| e.total)
    }

    /// Number of completed timings recorded for a category
    pub fn get_timer_count(&self, category: TimerCategory) -> usize {
        self.timers.get(&category).map_or(0, |e| e.count)
    }

    /// Clears all recorded timings
    pub fn reset(&mut self) {
        self.active_timers.clear();
        self.timers.clear();
    }

    /// Emits the recorded timings at debug level, tagged with `label`
    pub fn log_timings(&self, label: &str) {
        if !log::log_enabled!(log::Level::Debug) {
            return;
        }
        let mut entries: Vec<_> = self.timers.iter().collect();
        entries.sort_by_key(|(category, _)| **category);
        for (category, entry) in entries {
            log::debug!(
                "{label}: {category:?} {:.3}ms ({} calls)",
                entry.total.as_secs_f64() * 1000.0,
                entry.count
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timer_accumulates() {
        let mut ctx = RecastContext::new();
        ctx.start_timer(TimerCategory::Regions);
        ctx.stop_timer(TimerCategory::Regions);
        ctx.start_timer(TimerCategory::Regions);
        ctx.stop_timer(TimerCategory::Regions);
        assert_eq!(ctx.get_timer_count(TimerCategory::Regions), 2);
        assert!(ctx.get_timer_duration(TimerCategory::Regions).is_some());
        assert!(ctx.get_timer_duration(TimerCategory::Contours).is_none());
    }

    #[test]
    fn test_disabled_timing_records_nothing() {
        let mut ctx = RecastContext::new();
        ctx.set_timing_enabled(false);
        ctx.start_timer(TimerCategory::Total);
        ctx.stop_timer(TimerCategory::Total);
        assert_eq!(ctx.get_timer_count(TimerCategory::Total), 0);
    }
}
