use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Process-wide counters, cloned into handlers through `AppState`.
#[derive(Clone)]
pub struct Metrics {
    pub searches_executed: Arc<AtomicU64>,
    pub search_tasks_failed: Arc<AtomicU64>,
    pub activity_feeds_served: Arc<AtomicU64>,
    pub activity_tasks_failed: Arc<AtomicU64>,
    pub reports_created: Arc<AtomicU64>,
    pub reports_updated: Arc<AtomicU64>,
    pub appointments_created: Arc<AtomicU64>,
    pub appointments_updated: Arc<AtomicU64>,
    pub appointments_deleted: Arc<AtomicU64>,
    pub constraint_violations: Arc<AtomicU64>,
    pub start_time: Instant,
}

fn counter() -> Arc<AtomicU64> {
    Arc::new(AtomicU64::new(0))
}

fn bump(c: &AtomicU64, n: u64) {
    c.fetch_add(n, Ordering::Relaxed);
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            searches_executed: counter(),
            search_tasks_failed: counter(),
            activity_feeds_served: counter(),
            activity_tasks_failed: counter(),
            reports_created: counter(),
            reports_updated: counter(),
            appointments_created: counter(),
            appointments_updated: counter(),
            appointments_deleted: counter(),
            constraint_violations: counter(),
            start_time: Instant::now(),
        }
    }

    pub fn inc_searches(&self) {
        bump(&self.searches_executed, 1);
    }

    pub fn add_search_failures(&self, n: u64) {
        bump(&self.search_tasks_failed, n);
    }

    pub fn inc_activity_feeds(&self) {
        bump(&self.activity_feeds_served, 1);
    }

    pub fn add_activity_failures(&self, n: u64) {
        bump(&self.activity_tasks_failed, n);
    }

    pub fn inc_reports_created(&self) {
        bump(&self.reports_created, 1);
    }

    pub fn inc_reports_updated(&self) {
        bump(&self.reports_updated, 1);
    }

    pub fn inc_appointments_created(&self) {
        bump(&self.appointments_created, 1);
    }

    pub fn inc_appointments_updated(&self) {
        bump(&self.appointments_updated, 1);
    }

    pub fn inc_appointments_deleted(&self) {
        bump(&self.appointments_deleted, 1);
    }

    pub fn inc_constraint_violations(&self) {
        bump(&self.constraint_violations, 1);
    }

    pub fn get_snapshot(&self) -> MetricsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        MetricsSnapshot {
            searches_executed: load(&self.searches_executed),
            search_tasks_failed: load(&self.search_tasks_failed),
            activity_feeds_served: load(&self.activity_feeds_served),
            activity_tasks_failed: load(&self.activity_tasks_failed),
            reports_created: load(&self.reports_created),
            reports_updated: load(&self.reports_updated),
            appointments_created: load(&self.appointments_created),
            appointments_updated: load(&self.appointments_updated),
            appointments_deleted: load(&self.appointments_deleted),
            constraint_violations: load(&self.constraint_violations),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Serialize)]
pub struct MetricsSnapshot {
    pub searches_executed: u64,
    pub search_tasks_failed: u64,
    pub activity_feeds_served: u64,
    pub activity_tasks_failed: u64,
    pub reports_created: u64,
    pub reports_updated: u64,
    pub appointments_created: u64,
    pub appointments_updated: u64,
    pub appointments_deleted: u64,
    pub constraint_violations: u64,
    pub uptime_seconds: u64,
}

impl MetricsSnapshot {
    /// Prometheus text exposition (version 0.0.4).
    pub fn to_prometheus(&self) -> String {
        let counters: [(&str, &str, u64); 10] = [
            ("searches_executed", "Search requests executed", self.searches_executed),
            ("search_tasks_failed", "Per-type search queries that failed", self.search_tasks_failed),
            ("activity_feeds_served", "Activity feeds served", self.activity_feeds_served),
            ("activity_tasks_failed", "Activity queries that failed", self.activity_tasks_failed),
            ("reports_created", "Mine reports created", self.reports_created),
            ("reports_updated", "Mine reports updated", self.reports_updated),
            ("appointments_created", "Party appointments created", self.appointments_created),
            ("appointments_updated", "Party appointments updated", self.appointments_updated),
            ("appointments_deleted", "Party appointments deleted", self.appointments_deleted),
            ("constraint_violations", "Writes rejected by database constraints", self.constraint_violations),
        ];
        let mut out = String::new();
        for (name, help, value) in counters {
            out.push_str(&format!(
                "# HELP mds_{name} {help}\n# TYPE mds_{name} counter\nmds_{name} {value}\n"
            ));
        }
        out.push_str(&format!(
            "# HELP mds_uptime_seconds Uptime seconds\n# TYPE mds_uptime_seconds gauge\nmds_uptime_seconds {}\n",
            self.uptime_seconds
        ));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_and_prometheus_output() {
        let m = Metrics::new();
        m.inc_searches();
        m.inc_searches();
        m.add_activity_failures(3);
        m.inc_constraint_violations();

        let snap = m.get_snapshot();
        assert_eq!(snap.searches_executed, 2);
        assert_eq!(snap.activity_tasks_failed, 3);
        assert_eq!(snap.constraint_violations, 1);

        let text = snap.to_prometheus();
        assert!(text.contains("mds_searches_executed 2\n"));
        assert!(text.contains("# TYPE mds_activity_tasks_failed counter"));
        assert!(text.contains("mds_uptime_seconds "));
    }
}
