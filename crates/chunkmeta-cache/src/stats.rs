//! Per-plugin load and flush counters.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chunkmeta_world::PluginId;
use dashmap::DashMap;

#[derive(Default)]
struct Counters {
    chunks_hydrated: AtomicU64,
    records_hydrated: AtomicU64,
    hydration_nanos: AtomicU64,
    flushes: AtomicU64,
    flush_failures: AtomicU64,
    evictions: AtomicU64,
    migrations: AtomicU64,
}

/// Point-in-time copy of one plugin's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadStatsSnapshot {
    pub chunks_hydrated: u64,
    pub records_hydrated: u64,
    pub hydration_time: Duration,
    pub flushes: u64,
    pub flush_failures: u64,
    pub evictions: u64,
    /// Tracker records merged into freshly loaded chunks.
    pub migrations: u64,
}

impl LoadStatsSnapshot {
    pub fn average_hydration(&self) -> Duration {
        if self.chunks_hydrated == 0 {
            return Duration::ZERO;
        }
        let nanos = self.hydration_time.as_nanos() / u128::from(self.chunks_hydrated);
        Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }
}

#[derive(Default)]
pub struct LoadStatistics {
    plugins: DashMap<PluginId, Arc<Counters>>,
}

impl LoadStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    fn counters(&self, plugin: PluginId) -> Arc<Counters> {
        self.plugins.entry(plugin).or_default().value().clone()
    }

    pub fn record_hydration(&self, plugin: PluginId, records: usize, elapsed: Duration) {
        let c = self.counters(plugin);
        c.chunks_hydrated.fetch_add(1, Ordering::Relaxed);
        c.records_hydrated.fetch_add(records as u64, Ordering::Relaxed);
        c.hydration_nanos.fetch_add(
            u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX),
            Ordering::Relaxed,
        );
    }

    pub fn record_flush(&self, plugin: PluginId, ok: bool) {
        let c = self.counters(plugin);
        if ok {
            c.flushes.fetch_add(1, Ordering::Relaxed);
        } else {
            c.flush_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_eviction(&self, plugin: PluginId) {
        self.counters(plugin).evictions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_migration(&self, plugin: PluginId, records: usize) {
        self.counters(plugin)
            .migrations
            .fetch_add(records as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self, plugin: PluginId) -> LoadStatsSnapshot {
        let Some(c) = self.plugins.get(&plugin).map(|c| c.value().clone()) else {
            return LoadStatsSnapshot::default();
        };
        LoadStatsSnapshot {
            chunks_hydrated: c.chunks_hydrated.load(Ordering::Relaxed),
            records_hydrated: c.records_hydrated.load(Ordering::Relaxed),
            hydration_time: Duration::from_nanos(c.hydration_nanos.load(Ordering::Relaxed)),
            flushes: c.flushes.load(Ordering::Relaxed),
            flush_failures: c.flush_failures.load(Ordering::Relaxed),
            evictions: c.evictions.load(Ordering::Relaxed),
            migrations: c.migrations.load(Ordering::Relaxed),
        }
    }

    /// Snapshots for every plugin with at least one recorded event, ordered by id.
    pub fn all(&self) -> Vec<(PluginId, LoadStatsSnapshot)> {
        let mut ids: Vec<PluginId> = self.plugins.iter().map(|e| *e.key()).collect();
        ids.sort();
        ids.into_iter().map(|id| (id, self.snapshot(id))).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate_per_plugin() {
        let stats = LoadStatistics::new();
        stats.record_hydration(PluginId(1), 4, Duration::from_millis(2));
        stats.record_hydration(PluginId(1), 6, Duration::from_millis(4));
        stats.record_flush(PluginId(1), true);
        stats.record_flush(PluginId(1), false);
        stats.record_eviction(PluginId(2));
        stats.record_migration(PluginId(2), 3);

        let one = stats.snapshot(PluginId(1));
        assert_eq!(one.chunks_hydrated, 2);
        assert_eq!(one.records_hydrated, 10);
        assert_eq!(one.hydration_time, Duration::from_millis(6));
        assert_eq!(one.average_hydration(), Duration::from_millis(3));
        assert_eq!(one.flushes, 1);
        assert_eq!(one.flush_failures, 1);

        let two = stats.snapshot(PluginId(2));
        assert_eq!(two.evictions, 1);
        assert_eq!(two.migrations, 3);
        assert_eq!(two.chunks_hydrated, 0);

        let all = stats.all();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].0, PluginId(1));
    }

    #[test]
    fn average_survives_counts_beyond_u32() {
        let snapshot = LoadStatsSnapshot {
            chunks_hydrated: 1 << 32,
            hydration_time: Duration::from_secs(1 << 32),
            ..LoadStatsSnapshot::default()
        };
        assert_eq!(snapshot.average_hydration(), Duration::from_secs(1));
    }

    #[test]
    fn unknown_plugin_is_zero() {
        let stats = LoadStatistics::new();
        assert_eq!(stats.snapshot(PluginId(9)), LoadStatsSnapshot::default());
        assert_eq!(
            stats.snapshot(PluginId(9)).average_hydration(),
            Duration::ZERO
        );
    }
}
