use prometheus::{Counter, CounterVec, Histogram, HistogramOpts, Opts, Registry};
use std::sync::Arc;

/// Metrics collector for the admission service
#[derive(Clone)]
pub struct Metrics {
    registry: Arc<Registry>,

    // Admission metrics
    admit_requests: CounterVec,
    allowed_requests: CounterVec,
    denied_requests: CounterVec,

    // Store metrics
    store_errors: Counter,
    fail_open_admissions: Counter,

    // Service metrics
    request_duration: Histogram,
}

impl Metrics {
    /// Create a new metrics instance
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let admit_requests = CounterVec::new(
            Opts::new(
                "rolegate_admit_requests",
                "Total number of admission checks",
            ),
            &["role"],
        )?;

        let allowed_requests = CounterVec::new(
            Opts::new(
                "rolegate_allowed_requests",
                "Number of requests admitted within quota",
            ),
            &["role"],
        )?;

        let denied_requests = CounterVec::new(
            Opts::new(
                "rolegate_denied_requests",
                "Number of requests denied over quota",
            ),
            &["role"],
        )?;

        let store_errors = Counter::new(
            "rolegate_store_errors",
            "Number of counter store failures",
        )?;

        let fail_open_admissions = Counter::new(
            "rolegate_fail_open_admissions",
            "Number of requests admitted because the store failed in fail-open mode",
        )?;

        let request_duration = Histogram::with_opts(HistogramOpts::new(
            "rolegate_request_duration_seconds",
            "Duration of admission checks in seconds",
        ))?;

        registry.register(Box::new(admit_requests.clone()))?;
        registry.register(Box::new(allowed_requests.clone()))?;
        registry.register(Box::new(denied_requests.clone()))?;
        registry.register(Box::new(store_errors.clone()))?;
        registry.register(Box::new(fail_open_admissions.clone()))?;
        registry.register(Box::new(request_duration.clone()))?;

        Ok(Self {
            registry,
            admit_requests,
            allowed_requests,
            denied_requests,
            store_errors,
            fail_open_admissions,
            request_duration,
        })
    }

    /// Get the Prometheus registry for this metrics instance
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_admit_request(&self, role: &str) {
        self.admit_requests.with_label_values(&[role]).inc();
    }

    pub fn record_allowed(&self, role: &str) {
        self.allowed_requests.with_label_values(&[role]).inc();
    }

    pub fn record_denied(&self, role: &str) {
        self.denied_requests.with_label_values(&[role]).inc();
    }

    pub fn record_store_error(&self) {
        self.store_errors.inc();
    }

    pub fn record_fail_open_admission(&self) {
        self.fail_open_admissions.inc();
    }

    /// Create a timer for measuring admission check duration
    pub fn start_request_timer(&self) -> prometheus::HistogramTimer {
        self.request_duration.start_timer()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new().expect("Failed to create default metrics")
    }
}
