use std::sync::RwLock;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

/// One host/database reading. `timestamp` is when the
/// sample was produced by [`HealthSource`], not when it was read.
#[derive(Debug, Clone, Copy)]
pub struct HealthSample {
    pub cpu_load: Option<f64>,
    pub io_wait_pct: Option<f64>,
    pub mem_used_pct: Option<f64>,
    pub db_pool_sat: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

/// Source of raw signals. Abstracted behind a trait (rather than reading
/// `/proc/loadavg` directly) so the monitor is testable without root/procfs
/// access and so the DB-pool signal can come from whatever pool
/// implementation a deployment uses.
pub trait HealthSource: Send + Sync {
    fn sample(&self) -> HealthSample;
}

#[derive(Debug, Clone, Copy)]
struct Zoned {
    value: Option<f64>,
    last_known: Option<(f64, Instant)>,
}

impl Zoned {
    fn new() -> Self {
        Self {
            value: None,
            last_known: None,
        }
    }

    fn update(&mut self, value: Option<f64>, now: Instant) {
        self.value = value;
        if let Some(v) = value {
            self.last_known = Some((v, now));
        }
    }

    /// Resolve the signal's normalized score contribution, honoring the
    /// "last known value for up to `sample_interval*3`, else neutral 50"
    /// staleness rule.
    fn resolve(&self, now: Instant, stale_after: Duration) -> (f64, bool) {
        if let Some(v) = self.value {
            return (v, false);
        }
        match self.last_known {
            Some((v, at)) if now.duration_since(at) <= stale_after => (v, false),
            _ => (50.0, true),
        }
    }
}

/// Composite health score producer (C1). Samples are process-wide and
/// read-mostly, protected with a reader-writer lock so recording a sample
/// never blocks a reader computing the score.
pub struct HealthMonitor {
    sample_interval: Duration,
    cpu: RwLock<Zoned>,
    io_wait: RwLock<Zoned>,
    mem: RwLock<Zoned>,
    db_pool: RwLock<Zoned>,
}

impl HealthMonitor {
    pub fn new(sample_interval: Duration) -> Self {
        Self {
            sample_interval,
            cpu: RwLock::new(Zoned::new()),
            io_wait: RwLock::new(Zoned::new()),
            mem: RwLock::new(Zoned::new()),
            db_pool: RwLock::new(Zoned::new()),
        }
    }

    /// Record a fresh [`HealthSample`]. Called on `sample_interval` by a
    /// background tick; never blocks a concurrent `score()` reader for
    /// longer than a single field replacement.
    pub fn record(&self, sample: HealthSample) {
        let now = Instant::now();
        self.cpu_mut_unwrap().update(sample.cpu_load, now);
        self.io_mut_unwrap().update(sample.io_wait_pct, now);
        self.mem_mut_unwrap().update(sample.mem_used_pct, now);
        self.db_mut_unwrap().update(sample.db_pool_sat, now);
    }

    fn cpu_mut_unwrap(&self) -> std::sync::RwLockWriteGuard<'_, Zoned> {
        self.cpu.write().unwrap_or_else(|e| e.into_inner())
    }
    fn io_mut_unwrap(&self) -> std::sync::RwLockWriteGuard<'_, Zoned> {
        self.io_wait.write().unwrap_or_else(|e| e.into_inner())
    }
    fn mem_mut_unwrap(&self) -> std::sync::RwLockWriteGuard<'_, Zoned> {
        self.mem.write().unwrap_or_else(|e| e.into_inner())
    }
    fn db_mut_unwrap(&self) -> std::sync::RwLockWriteGuard<'_, Zoned> {
        self.db_pool.write().unwrap_or_else(|e| e.into_inner())
    }

    /// `score() -> int in [0,100]`, higher is healthier. Never fails
    /// the caller: total signal unavailability degrades to a neutral 50
    /// rather than propagating an error.
    pub fn score(&self) -> u8 {
        let now = Instant::now();
        let stale_after = self.sample_interval * 3;

        let (cpu, cpu_stale) = self
            .cpu
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .resolve(now, stale_after);
        let (io, io_stale) = self
            .io_wait
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .resolve(now, stale_after);
        let (mem, mem_stale) = self
            .mem
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .resolve(now, stale_after);
        let (pool, pool_stale) = self
            .db_pool
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .resolve(now, stale_after);

        if cpu_stale && io_stale && mem_stale && pool_stale {
            warn!("health monitor: all signals unavailable, reporting degraded neutral score");
            return 50;
        }

        // `cpu` here already is the normalized 0-100 "load headroom"; raw
        // weighting happens where the sample is produced (see `Normalized`
        // below) to keep this function a pure combinator over 0-100 inputs.
        let weighted = cpu * 0.30 + io * 0.40 + mem * 0.10 + pool * 0.20;
        let score = weighted.round().clamp(0.0, 100.0) as u8;

        debug!(score, cpu, io, mem, pool, "health score computed");
        score
    }

    pub fn zone(&self) -> HealthZone {
        HealthZone::from_score(self.score())
    }
}

/// Safe/Warning/Critical discretization of the score.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthZone {
    Safe,
    Warning,
    Critical,
}

impl HealthZone {
    pub fn from_score(score: u8) -> Self {
        if score >= 67 {
            HealthZone::Safe
        } else if score >= 34 {
            HealthZone::Warning
        } else {
            HealthZone::Critical
        }
    }
}

/// Normalizes raw signal readings into a 0-100 "healthier is higher" scale,
/// so a [`HealthSource`] can report physical units (load average,
/// percentages) and let this function do the mapping once.
pub struct Normalized;

impl Normalized {
    pub fn cpu_load(load_1m: f64, cores: f64) -> f64 {
        if cores <= 0.0 {
            return 50.0;
        }
        (100.0 * (1.0 - load_1m / cores)).max(0.0)
    }

    pub fn io_wait(io_wait_pct: f64) -> f64 {
        (100.0 - io_wait_pct * 2.0).max(0.0)
    }

    pub fn mem_used(mem_used_pct: f64) -> f64 {
        (100.0 - mem_used_pct).max(0.0)
    }

    pub fn db_pool(pool_sat_pct: f64) -> f64 {
        (100.0 - pool_sat_pct).max(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(cpu: Option<f64>, io: Option<f64>, mem: Option<f64>, pool: Option<f64>) -> HealthSample {
        HealthSample {
            cpu_load: cpu,
            io_wait_pct: io,
            mem_used_pct: mem,
            db_pool_sat: pool,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn healthy_signals_score_safe() {
        let monitor = HealthMonitor::new(Duration::from_secs(5));
        monitor.record(sample(
            Some(Normalized::cpu_load(0.2, 8.0)),
            Some(Normalized::io_wait(1.0)),
            Some(Normalized::mem_used(20.0)),
            Some(Normalized::db_pool(10.0)),
        ));
        assert_eq!(monitor.zone(), HealthZone::Safe);
    }

    #[test]
    fn saturated_signals_score_critical() {
        let monitor = HealthMonitor::new(Duration::from_secs(5));
        monitor.record(sample(
            Some(Normalized::cpu_load(8.0, 8.0)),
            Some(Normalized::io_wait(50.0)),
            Some(Normalized::mem_used(98.0)),
            Some(Normalized::db_pool(95.0)),
        ));
        assert_eq!(monitor.zone(), HealthZone::Critical);
    }

    #[test]
    fn all_signals_missing_reports_neutral_fifty() {
        let monitor = HealthMonitor::new(Duration::from_secs(5));
        assert_eq!(monitor.score(), 50);
    }

    #[test]
    fn zone_boundaries() {
        assert_eq!(HealthZone::from_score(67), HealthZone::Safe);
        assert_eq!(HealthZone::from_score(66), HealthZone::Warning);
        assert_eq!(HealthZone::from_score(34), HealthZone::Warning);
        assert_eq!(HealthZone::from_score(33), HealthZone::Critical);
    }
}
