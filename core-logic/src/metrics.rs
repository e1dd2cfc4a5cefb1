use chrono::Utc;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub timestamp: String,
    pub uptime_secs: u64,
    pub steps: StepMetrics,
    pub activity: ActivityMetrics,
}

#[derive(Debug, Clone, Serialize)]
pub struct StepMetrics {
    pub total: u64,
    pub progressed: u64,
    pub deferred: u64,
    pub failed: u64,
    pub avg_step_duration_ms: f64,
    pub max_step_duration_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ActivityMetrics {
    pub bridges_sent: u64,
    pub withdrawals: u64,
    pub wallets_finished: u64,
    pub usd_volume: f64,
}

/// Outcome category of one wallet step, as far as metrics care.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    Progressed,
    Deferred,
    Failed,
}

#[derive(Debug)]
pub struct MetricsCollector {
    steps_total: AtomicU64,
    steps_progressed: AtomicU64,
    steps_deferred: AtomicU64,
    steps_failed: AtomicU64,
    step_duration_sum_ms: AtomicU64,
    step_max_duration_ms: AtomicU64,
    bridges_sent: AtomicU64,
    withdrawals: AtomicU64,
    wallets_finished: AtomicU64,
    // USD volume kept in cents so it fits an atomic integer
    usd_volume_cents: AtomicU64,
    start_time: Instant,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self {
            steps_total: AtomicU64::new(0),
            steps_progressed: AtomicU64::new(0),
            steps_deferred: AtomicU64::new(0),
            steps_failed: AtomicU64::new(0),
            step_duration_sum_ms: AtomicU64::new(0),
            step_max_duration_ms: AtomicU64::new(0),
            bridges_sent: AtomicU64::new(0),
            withdrawals: AtomicU64::new(0),
            wallets_finished: AtomicU64::new(0),
            usd_volume_cents: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }
}

impl MetricsCollector {
    pub fn global() -> &'static Self {
        static INSTANCE: std::sync::OnceLock<MetricsCollector> = std::sync::OnceLock::new();
        INSTANCE.get_or_init(MetricsCollector::default)
    }

    pub fn record_step(&self, kind: StepKind, duration: Duration) {
        let duration_ms = duration.as_millis() as u64;
        self.steps_total.fetch_add(1, Ordering::SeqCst);
        self.step_duration_sum_ms
            .fetch_add(duration_ms, Ordering::SeqCst);
        self.step_max_duration_ms
            .fetch_max(duration_ms, Ordering::SeqCst);

        let counter = match kind {
            StepKind::Progressed => &self.steps_progressed,
            StepKind::Deferred => &self.steps_deferred,
            StepKind::Failed => &self.steps_failed,
        };
        counter.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_bridge(&self) {
        self.bridges_sent.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_withdrawal(&self) {
        self.withdrawals.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_wallet_finished(&self) {
        self.wallets_finished.fetch_add(1, Ordering::SeqCst);
    }

    pub fn add_usd_volume(&self, usd: f64) {
        if usd.is_finite() && usd > 0.0 {
            self.usd_volume_cents
                .fetch_add((usd * 100.0).round() as u64, Ordering::SeqCst);
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let total = self.steps_total.load(Ordering::SeqCst);
        let duration_sum = self.step_duration_sum_ms.load(Ordering::SeqCst);

        MetricsSnapshot {
            timestamp: Utc::now().to_rfc3339(),
            uptime_secs: self.uptime().as_secs(),
            steps: StepMetrics {
                total,
                progressed: self.steps_progressed.load(Ordering::SeqCst),
                deferred: self.steps_deferred.load(Ordering::SeqCst),
                failed: self.steps_failed.load(Ordering::SeqCst),
                avg_step_duration_ms: if total > 0 {
                    duration_sum as f64 / total as f64
                } else {
                    0.0
                },
                max_step_duration_ms: self.step_max_duration_ms.load(Ordering::SeqCst),
            },
            activity: ActivityMetrics {
                bridges_sent: self.bridges_sent.load(Ordering::SeqCst),
                withdrawals: self.withdrawals.load(Ordering::SeqCst),
                wallets_finished: self.wallets_finished.load(Ordering::SeqCst),
                usd_volume: self.usd_volume_cents.load(Ordering::SeqCst) as f64 / 100.0,
            },
        }
    }

    pub fn to_json(&self) -> String {
        let snapshot = self.snapshot();
        serde_json::to_string_pretty(&snapshot).unwrap_or_else(|_| "{}".to_string())
    }

    pub async fn export_to_file(&self, path: &str) -> std::io::Result<()> {
        let json = self.to_json();
        tokio::fs::write(path, json).await
    }

    pub fn steps_total(&self) -> u64 {
        self.steps_total.load(Ordering::SeqCst)
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_steps() {
        let metrics = MetricsCollector::default();

        metrics.record_step(StepKind::Progressed, Duration::from_millis(100));
        metrics.record_step(StepKind::Deferred, Duration::from_millis(20));
        metrics.record_step(StepKind::Failed, Duration::from_millis(300));

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.steps.total, 3);
        assert_eq!(snapshot.steps.progressed, 1);
        assert_eq!(snapshot.steps.deferred, 1);
        assert_eq!(snapshot.steps.failed, 1);
        assert_eq!(snapshot.steps.max_step_duration_ms, 300);
        assert!((snapshot.steps.avg_step_duration_ms - 140.0).abs() < 0.01);
    }

    #[test]
    fn test_usd_volume_ignores_negative() {
        let metrics = MetricsCollector::default();
        metrics.add_usd_volume(12.345);
        metrics.add_usd_volume(-5.0);
        metrics.add_usd_volume(f64::NAN);
        assert!((metrics.snapshot().activity.usd_volume - 12.35).abs() < 1e-9);
    }

    #[test]
    fn test_json_export() {
        let metrics = MetricsCollector::default();
        metrics.record_bridge();
        let json = metrics.to_json();
        assert!(json.contains("bridges_sent"));
        assert!(json.contains("steps"));
    }
}
