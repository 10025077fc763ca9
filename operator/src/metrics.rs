use crate::Error;
use common::InMemoryChannel;
use kube::ResourceExt;
use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{counter::Counter, family::Family, gauge::Gauge, histogram::Histogram},
    registry::{Registry, Unit},
};
use std::sync::Arc;
use tokio::time::Instant;

#[derive(Clone)]
pub struct Metrics {
    pub channel: ReconcileMetrics,
    pub registry: Arc<Registry>,
}

impl Default for Metrics {
    fn default() -> Self {
        let mut registry = Registry::with_prefix("inmemorychannel_reconcile");
        let channel = ReconcileMetrics::default().register(&mut registry);
        Self {
            channel,
            registry: Arc::new(registry),
        }
    }
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ErrorLabels {
    pub instance: String,
    pub error: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ChannelLabels {
    pub namespace: String,
    pub instance: String,
}

#[derive(Clone)]
pub struct ReconcileMetrics {
    pub runs: Counter,
    pub failures: Family<ErrorLabels, Counter>,
    pub ready: Family<ChannelLabels, Gauge>,
    pub duration: Histogram,
}

impl Default for ReconcileMetrics {
    fn default() -> Self {
        Self {
            runs: Counter::default(),
            failures: Family::<ErrorLabels, Counter>::default(),
            ready: Family::<ChannelLabels, Gauge>::default(),
            duration: Histogram::new([0.01, 0.1, 0.25, 0.5, 1., 5., 15., 60.].into_iter()),
        }
    }
}

impl ReconcileMetrics {
    /// Register API metrics to start tracking them.
    pub fn register(self, r: &mut Registry) -> Self {
        r.register_with_unit(
            "duration",
            "reconcile duration",
            Unit::Seconds,
            self.duration.clone(),
        );
        r.register("failures", "reconciliation errors", self.failures.clone());
        r.register("runs", "reconciliations", self.runs.clone());
        r.register(
            "ready",
            "1 when the channel is ready for its current generation",
            self.ready.clone(),
        );
        self
    }

    pub fn reconcile_failure(&self, channel: &InMemoryChannel, e: &Error) {
        self.failures
            .get_or_create(&ErrorLabels {
                instance: channel.name_any(),
                error: e.metric_label(),
            })
            .inc();
    }

    pub fn set_ready(&self, channel: &InMemoryChannel, ready: bool) {
        self.ready
            .get_or_create(&ChannelLabels {
                namespace: channel.namespace().unwrap_or_default(),
                instance: channel.name_any(),
            })
            .set(i64::from(ready));
    }

    pub fn count_and_measure(&self) -> ReconcileMeasurer {
        self.runs.inc();
        ReconcileMeasurer {
            start: Instant::now(),
            metric: self.duration.clone(),
        }
    }
}

/// Smart function duration measurer
///
/// Relies on Drop to calculate duration and register the observation in the histogram
pub struct ReconcileMeasurer {
    start: Instant,
    metric: Histogram,
}

impl Drop for ReconcileMeasurer {
    fn drop(&mut self) {
        #[allow(clippy::cast_precision_loss)]
        let duration = self.start.elapsed().as_millis() as f64 / 1000.0;
        self.metric.observe(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::inmemorychannel::InMemoryChannelSpec;
    use prometheus_client::encoding::text::encode;

    #[test]
    fn test_metrics_are_exposed() {
        let metrics = Metrics::default();
        let mut imc = InMemoryChannel::new("events", InMemoryChannelSpec::default());
        imc.metadata.namespace = Some("default".to_string());
        {
            let _measure = metrics.channel.count_and_measure();
        }
        metrics.channel.set_ready(&imc, true);
        metrics
            .channel
            .reconcile_failure(&imc, &Error::MissingObjectKey(".metadata.namespace"));
        let mut buffer = String::new();
        encode(&mut buffer, &metrics.registry).unwrap();
        assert!(buffer.contains("inmemorychannel_reconcile_runs_total 1"));
        assert!(buffer.contains("inmemorychannel_reconcile_ready{namespace=\"default\",instance=\"events\"} 1"));
        assert!(buffer.contains("error=\"missingobjectkey\""));
        assert!(buffer.contains("inmemorychannel_reconcile_duration_seconds_count 1"));
    }
}
