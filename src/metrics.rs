use std::{sync::RwLock, time::Duration};

use prometheus::{opts, Encoder, Gauge, HistogramVec, IntCounter, IntCounterVec, IntGauge, Registry, TextEncoder};

/// The three counters the spec defines, plus the ambient per-HTTP-request
/// telemetry the teacher's gateway carries for operability. `counts` is
/// the single lock guarding `totalRequests`/`totalBatches`; readers take a
/// read lock and snapshot both plus the derived average. The hold time is
/// counter arithmetic only — no I/O happens under this lock.
pub struct AppMetrics {
    counts: RwLock<Counts>,
    registry: Registry,
    requests_total: IntCounter,
    batches_total: IntCounter,
    batch_size_avg: Gauge,
    http_requests_total: IntCounterVec,
    http_request_duration_seconds: HistogramVec,
    http_inflight_requests: IntGauge,
}

#[derive(Default, Clone, Copy)]
struct Counts {
    total_requests: u64,
    total_batches: u64,
}

/// A consistent snapshot of the three spec'd counters.
#[derive(Debug, Clone, Copy)]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    pub total_batches: u64,
    pub avg_batch_size: f64,
}

pub struct InflightGuard<'a> {
    metrics: &'a AppMetrics,
}

impl AppMetrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let requests_total = IntCounter::new(
            "nexus_proxy_requests_total",
            "Total prediction requests accepted by the proxy",
        )
        .expect("valid requests_total metric");
        let batches_total = IntCounter::new(
            "nexus_proxy_batches_total",
            "Total batches dispatched to the backend",
        )
        .expect("valid batches_total metric");
        let batch_size_avg = Gauge::new(
            "nexus_proxy_batch_size_avg",
            "Mean requests per dispatched batch (totalRequests / totalBatches)",
        )
        .expect("valid batch_size_avg metric");

        let http_requests_total = IntCounterVec::new(
            opts!(
                "nexus_proxy_http_requests_total",
                "Total HTTP requests processed by the ingress layer"
            ),
            &["path", "method", "status"],
        )
        .expect("valid http_requests_total metric");
        let http_request_duration_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "nexus_proxy_http_request_duration_seconds",
                "Ingress HTTP request latency in seconds",
            ),
            &["path", "method"],
        )
        .expect("valid http_request_duration_seconds metric");
        let http_inflight_requests = IntGauge::new(
            "nexus_proxy_http_inflight_requests",
            "HTTP requests currently being served",
        )
        .expect("valid http_inflight_requests metric");

        registry
            .register(Box::new(requests_total.clone()))
            .expect("register requests_total");
        registry
            .register(Box::new(batches_total.clone()))
            .expect("register batches_total");
        registry
            .register(Box::new(batch_size_avg.clone()))
            .expect("register batch_size_avg");
        registry
            .register(Box::new(http_requests_total.clone()))
            .expect("register http_requests_total");
        registry
            .register(Box::new(http_request_duration_seconds.clone()))
            .expect("register http_request_duration_seconds");
        registry
            .register(Box::new(http_inflight_requests.clone()))
            .expect("register http_inflight_requests");

        Self {
            counts: RwLock::new(Counts::default()),
            registry,
            requests_total,
            batches_total,
            batch_size_avg,
            http_requests_total,
            http_request_duration_seconds,
            http_inflight_requests,
        }
    }

    /// Called by the batcher once per dispatched batch, after the batch
    /// has closed: `totalRequests += size`, `totalBatches += 1`.
    pub fn observe_batch(&self, size: u64) {
        let mut counts = self.counts.write().expect("metrics lock poisoned");
        counts.total_requests += size;
        counts.total_batches += 1;
        let avg = counts.total_requests as f64 / counts.total_batches as f64;
        drop(counts);

        self.requests_total.inc_by(size);
        self.batches_total.inc();
        self.batch_size_avg.set(avg);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let counts = self.counts.read().expect("metrics lock poisoned");
        let avg = if counts.total_batches == 0 {
            0.0
        } else {
            counts.total_requests as f64 / counts.total_batches as f64
        };

        MetricsSnapshot {
            total_requests: counts.total_requests,
            total_batches: counts.total_batches,
            avg_batch_size: avg,
        }
    }

    pub fn inflight_guard(&self) -> InflightGuard<'_> {
        self.http_inflight_requests.inc();
        InflightGuard { metrics: self }
    }

    pub fn observe_http_request(&self, path: &str, method: &str, status: u16, duration: Duration) {
        let status_label = status.to_string();
        self.http_requests_total
            .with_label_values(&[path, method, &status_label])
            .inc();
        self.http_request_duration_seconds
            .with_label_values(&[path, method])
            .observe(duration.as_secs_f64());
    }

    pub fn render(&self) -> Result<String, String> {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        let families = self.registry.gather();
        encoder
            .encode(&families, &mut buffer)
            .map_err(|error| error.to_string())?;
        String::from_utf8(buffer).map_err(|error| error.to_string())
    }
}

impl Default for AppMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for InflightGuard<'_> {
    fn drop(&mut self) {
        self.metrics.http_inflight_requests.dec();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn avg_batch_size_is_the_ratio_of_requests_to_batches() {
        let metrics = AppMetrics::new();
        metrics.observe_batch(4);
        metrics.observe_batch(2);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total_requests, 6);
        assert_eq!(snapshot.total_batches, 2);
        assert_eq!(snapshot.avg_batch_size, 3.0);
    }

    #[test]
    fn snapshot_before_any_batch_reports_zero_average() {
        let metrics = AppMetrics::new();
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.avg_batch_size, 0.0);
    }
}
