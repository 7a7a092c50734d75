use prometheus::{
    Encoder, GaugeVec, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub offers_total: IntCounterVec,
    pub assignment_latency_seconds: HistogramVec,
    pub offer_timeouts_total: IntCounter,
    pub watcher_failures_total: IntCounter,
    pub courier_utilization: GaugeVec,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let offers_total = IntCounterVec::new(
            Opts::new("offers_total", "Assignment attempts by outcome"),
            &["outcome"],
        )
        .expect("valid offers_total metric");

        let assignment_latency_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "assignment_latency_seconds",
                "Latency of candidate selection and offer commit in seconds",
            ),
            &["outcome"],
        )
        .expect("valid assignment_latency_seconds metric");

        let offer_timeouts_total = IntCounter::new(
            "offer_timeouts_total",
            "Offers that lapsed without acceptance",
        )
        .expect("valid offer_timeouts_total metric");

        let watcher_failures_total = IntCounter::new(
            "watcher_failures_total",
            "Expired orders the acceptance watcher failed to process",
        )
        .expect("valid watcher_failures_total metric");

        let courier_utilization = GaugeVec::new(
            Opts::new("courier_utilization", "Courier active load over cap [0..1]"),
            &["courier_id"],
        )
        .expect("valid courier_utilization metric");

        registry
            .register(Box::new(offers_total.clone()))
            .expect("register offers_total");
        registry
            .register(Box::new(assignment_latency_seconds.clone()))
            .expect("register assignment_latency_seconds");
        registry
            .register(Box::new(offer_timeouts_total.clone()))
            .expect("register offer_timeouts_total");
        registry
            .register(Box::new(watcher_failures_total.clone()))
            .expect("register watcher_failures_total");
        registry
            .register(Box::new(courier_utilization.clone()))
            .expect("register courier_utilization");

        Self {
            registry,
            offers_total,
            assignment_latency_seconds,
            offer_timeouts_total,
            watcher_failures_total,
            courier_utilization,
        }
    }

    pub fn record_assignment(&self, outcome: &str, elapsed_secs: f64) {
        self.offers_total.with_label_values(&[outcome]).inc();
        self.assignment_latency_seconds
            .with_label_values(&[outcome])
            .observe(elapsed_secs);
    }

    pub fn encode(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|err| format!("failed to encode metrics: {err}"))?;

        String::from_utf8(buffer).map_err(|err| format!("metrics are not valid utf8: {err}"))
    }
}
