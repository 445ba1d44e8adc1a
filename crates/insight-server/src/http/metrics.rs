use insight_core::{CircuitState, Dependency, DependencyStatus, InsightObserver, UpstreamOutcome};
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::Histogram;
use prometheus_client::registry::Registry;
use std::time::Duration;

// ── Label types ────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct HttpLabel {
    pub route: String,
    pub method: String,
    pub status: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct RouteLabel {
    pub route: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct DependencyLabel {
    pub dependency: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct UpstreamLabel {
    pub dependency: String,
    pub outcome: String,
}

fn dependency_label(dependency: Dependency) -> DependencyLabel {
    DependencyLabel {
        dependency: dependency.as_str().to_string(),
    }
}

// ── Metrics registry ───────────────────────────────────────────────────────────

pub struct InsightMetrics {
    pub registry: Registry,

    // HTTP
    pub http_requests: Family<HttpLabel, Counter>,
    pub http_request_duration: Family<RouteLabel, Histogram>,

    // Cache
    pub cache_hits: Counter,
    pub cache_misses: Counter,
    pub cache_entries: Gauge,

    // Upstream calls
    pub upstream_calls: Family<UpstreamLabel, Counter>,
    pub upstream_duration: Family<DependencyLabel, Histogram>,

    // Protection layers
    pub circuit_rejections: Family<DependencyLabel, Counter>,
    pub bulkhead_rejections: Family<DependencyLabel, Counter>,
    pub circuit_open: Family<DependencyLabel, Gauge>,
    pub bulkhead_in_flight: Family<DependencyLabel, Gauge>,

    // Uptime (set on each scrape)
    pub uptime_seconds: Gauge,
}

impl InsightMetrics {
    pub fn new() -> Self {
        let mut registry = Registry::default();

        // HTTP
        let http_requests: Family<HttpLabel, Counter> = Family::default();
        registry.register(
            "insight_http_requests",
            "Total HTTP requests by route, method and status code",
            http_requests.clone(),
        );

        let http_request_duration: Family<RouteLabel, Histogram> =
            Family::new_with_constructor(|| {
                Histogram::new([0.01_f64, 0.05, 0.1, 0.25, 0.5, 1.0, 2.0, 5.0].into_iter())
            });
        registry.register(
            "insight_http_request_duration_seconds",
            "HTTP request duration in seconds by route",
            http_request_duration.clone(),
        );

        // Cache
        let cache_hits: Counter = Counter::default();
        registry.register(
            "insight_cache_hits",
            "Insights served from cache",
            cache_hits.clone(),
        );

        let cache_misses: Counter = Counter::default();
        registry.register(
            "insight_cache_misses",
            "Insight lookups that missed the cache",
            cache_misses.clone(),
        );

        let cache_entries: Gauge = Gauge::default();
        registry.register(
            "insight_cache_entries",
            "Entries currently held by the insight cache",
            cache_entries.clone(),
        );

        // Upstream
        let upstream_calls: Family<UpstreamLabel, Counter> = Family::default();
        registry.register(
            "insight_upstream_calls",
            "Guarded upstream calls by dependency and outcome",
            upstream_calls.clone(),
        );

        let upstream_duration: Family<DependencyLabel, Histogram> =
            Family::new_with_constructor(|| {
                Histogram::new([0.05_f64, 0.1, 0.25, 0.5, 1.0, 2.0, 5.0].into_iter())
            });
        registry.register(
            "insight_upstream_duration_seconds",
            "Guarded upstream call duration in seconds, retries included",
            upstream_duration.clone(),
        );

        // Protection layers
        let circuit_rejections: Family<DependencyLabel, Counter> = Family::default();
        registry.register(
            "insight_circuit_rejections",
            "Calls refused by an open circuit breaker",
            circuit_rejections.clone(),
        );

        let bulkhead_rejections: Family<DependencyLabel, Counter> = Family::default();
        registry.register(
            "insight_bulkhead_rejections",
            "Calls refused by a full bulkhead",
            bulkhead_rejections.clone(),
        );

        let circuit_open: Family<DependencyLabel, Gauge> = Family::default();
        registry.register(
            "insight_circuit_open",
            "1 while the dependency's circuit is open",
            circuit_open.clone(),
        );

        let bulkhead_in_flight: Family<DependencyLabel, Gauge> = Family::default();
        registry.register(
            "insight_bulkhead_in_flight",
            "Calls currently admitted by the dependency's bulkhead",
            bulkhead_in_flight.clone(),
        );

        // Uptime
        let uptime_seconds: Gauge = Gauge::default();
        registry.register(
            "insight_uptime_seconds",
            "Server uptime in seconds",
            uptime_seconds.clone(),
        );

        Self {
            registry,
            http_requests,
            http_request_duration,
            cache_hits,
            cache_misses,
            cache_entries,
            upstream_calls,
            upstream_duration,
            circuit_rejections,
            bulkhead_rejections,
            circuit_open,
            bulkhead_in_flight,
            uptime_seconds,
        }
    }

    pub fn observe_http(&self, route: &str, method: &str, status: u16, elapsed: Duration) {
        self.http_requests
            .get_or_create(&HttpLabel {
                route: route.to_string(),
                method: method.to_string(),
                status: status.to_string(),
            })
            .inc();
        self.http_request_duration
            .get_or_create(&RouteLabel {
                route: route.to_string(),
            })
            .observe(elapsed.as_secs_f64());
    }

    /// Refresh the scrape-time gauges.
    pub fn update_gauges(&self, statuses: &[DependencyStatus], cache_entries: usize, uptime: Duration) {
        for status in statuses {
            let label = dependency_label(status.dependency);
            let open = matches!(status.circuit, Some(CircuitState::Open));
            self.circuit_open.get_or_create(&label).set(i64::from(open));
            self.bulkhead_in_flight
                .get_or_create(&label)
                .set(status.in_flight as i64);
        }
        self.cache_entries.set(cache_entries as i64);
        self.uptime_seconds.set(uptime.as_secs() as i64);
    }

    /// Prometheus text exposition of every registered metric.
    pub fn encode(&self) -> Result<String, std::fmt::Error> {
        let mut body = String::new();
        prometheus_client::encoding::text::encode(&mut body, &self.registry)?;
        Ok(body)
    }
}

impl Default for InsightMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl InsightObserver for InsightMetrics {
    fn cache_hit(&self) {
        self.cache_hits.inc();
    }

    fn cache_miss(&self) {
        self.cache_misses.inc();
    }

    fn upstream_completed(&self, dependency: Dependency, outcome: UpstreamOutcome, elapsed: Duration) {
        self.upstream_calls
            .get_or_create(&UpstreamLabel {
                dependency: dependency.as_str().to_string(),
                outcome: outcome.as_str().to_string(),
            })
            .inc();
        self.upstream_duration
            .get_or_create(&dependency_label(dependency))
            .observe(elapsed.as_secs_f64());
    }

    fn circuit_rejected(&self, dependency: Dependency) {
        self.circuit_rejections
            .get_or_create(&dependency_label(dependency))
            .inc();
    }

    fn bulkhead_rejected(&self, dependency: Dependency) {
        self.bulkhead_rejections
            .get_or_create(&dependency_label(dependency))
            .inc();
    }
}
