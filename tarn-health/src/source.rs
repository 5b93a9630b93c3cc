use chrono::Utc;
use sysinfo::System;
use tokio::sync::Mutex;

use crate::monitor::{HealthSample, HealthSource};

/// Default [`HealthSource`]: CPU load and memory pressure read off the host
/// via `sysinfo`. `io_wait_pct` and `db_pool_sat` stay `None` here: this
/// process has no io-wait counter and SurrealDB's `Any` engine doesn't
/// expose pool saturation, so the monitor's `Zoned` tracking just holds the
/// last known value for those signals.
pub struct SystemHealthSource {
    sys: Mutex<System>,
}

impl SystemHealthSource {
    pub fn new() -> Self {
        let mut sys = System::new_all();
        sys.refresh_all();
        Self { sys: Mutex::new(sys) }
    }
}

impl Default for SystemHealthSource {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthSource for SystemHealthSource {
    fn sample(&self) -> HealthSample {
        let Ok(mut sys) = self.sys.try_lock() else {
            return HealthSample {
                cpu_load: None,
                io_wait_pct: None,
                mem_used_pct: None,
                db_pool_sat: None,
                timestamp: Utc::now(),
            };
        };
        sys.refresh_all();

        let cpu_load = f64::from(sys.global_cpu_usage()) / 100.0;
        let total = sys.total_memory();
        let mem_used_pct = if total == 0 { None } else { Some(sys.used_memory() as f64 / total as f64) };

        HealthSample {
            cpu_load: Some(cpu_load),
            io_wait_pct: None,
            mem_used_pct,
            db_pool_sat: None,
            timestamp: Utc::now(),
        }
    }
}
