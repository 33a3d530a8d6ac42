use metrics::{
    Counter, Gauge, Histogram, HistogramFn, Key, KeyName, Metadata, Recorder,
    SharedString, Unit,
};
use std::{
    collections::BTreeMap,
    fmt::Write,
    sync::{
        Arc, OnceLock, RwLock,
        atomic::{AtomicU64, Ordering},
    },
};
use tracing::{debug, warn};

/// Running count and sum of a histogram's samples.
#[derive(Debug, Default)]
struct Summary {
    count: AtomicU64,
    /// Bits of the `f64` sum.
    sum: AtomicU64,
}

impl Summary {
    fn sum(&self) -> f64 {
        f64::from_bits(self.sum.load(Ordering::Relaxed))
    }
}

impl HistogramFn for Summary {
    fn record(&self, value: f64) {
        self.count.fetch_add(1, Ordering::Relaxed);
        let _ = self.sum.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |bits| {
            Some((f64::from_bits(bits) + value).to_bits())
        });
    }
}

#[derive(Debug, Default)]
struct Registry {
    counters: RwLock<BTreeMap<String, Arc<AtomicU64>>>,
    gauges: RwLock<BTreeMap<String, Arc<AtomicU64>>>,
    histograms: RwLock<BTreeMap<String, Arc<Summary>>>,
}

/// Fetch the handle for `key` from `map`, creating it on first use.
fn handle<T: Default>(map: &RwLock<BTreeMap<String, Arc<T>>>, key: &Key) -> Arc<T> {
    let name = render_key(key);
    if let Some(existing) = map.read().ok().and_then(|map| map.get(&name).cloned()) {
        return existing;
    }
    match map.write() {
        Ok(mut map) => map.entry(name).or_default().clone(),
        // a poisoned map still hands out a working, unrecorded handle
        Err(_) => Arc::default(),
    }
}

fn render_key(key: &Key) -> String {
    let mut name = key.name().to_owned();
    let labels: Vec<_> =
        key.labels().map(|label| format!("{}=\"{}\"", label.key(), label.value())).collect();
    if !labels.is_empty() {
        let _ = write!(name, "{{{}}}", labels.join(","));
    }
    name
}

/// In-process metrics recorder.
///
/// Counters and gauges are kept as atomics, histograms as a sample count and
/// sum. [`BuilderRecorder::render`] produces a plain text snapshot, served by
/// the healthcheck server on `GET /metrics`.
#[derive(Debug, Clone, Default)]
pub struct BuilderRecorder {
    inner: Arc<Registry>,
}

impl BuilderRecorder {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value of the counter named `name`, if it was ever touched.
    pub fn counter_value(&self, name: &str) -> Option<u64> {
        let counters = self.inner.counters.read().ok()?;
        counters.get(name).map(|counter| counter.load(Ordering::Relaxed))
    }

    /// Number of samples recorded by the histogram named `name`.
    pub fn histogram_count(&self, name: &str) -> Option<u64> {
        let histograms = self.inner.histograms.read().ok()?;
        histograms.get(name).map(|summary| summary.count.load(Ordering::Relaxed))
    }

    /// Render every metric as `<name> <value>` lines, sorted by name.
    /// Histograms render as `<name>_count` and `<name>_sum`.
    pub fn render(&self) -> String {
        let mut out = String::new();
        if let Ok(counters) = self.inner.counters.read() {
            for (name, value) in counters.iter() {
                let _ = writeln!(out, "{name} {}", value.load(Ordering::Relaxed));
            }
        }
        if let Ok(gauges) = self.inner.gauges.read() {
            for (name, value) in gauges.iter() {
                let _ = writeln!(out, "{name} {}", f64::from_bits(value.load(Ordering::Relaxed)));
            }
        }
        if let Ok(histograms) = self.inner.histograms.read() {
            for (name, summary) in histograms.iter() {
                let _ = writeln!(out, "{name}_count {}", summary.count.load(Ordering::Relaxed));
                let _ = writeln!(out, "{name}_sum {}", summary.sum());
            }
        }
        out
    }
}

impl Recorder for BuilderRecorder {
    fn describe_counter(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}

    fn describe_gauge(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}

    fn describe_histogram(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}

    fn register_counter(&self, key: &Key, _: &Metadata<'_>) -> Counter {
        Counter::from_arc(handle(&self.inner.counters, key))
    }

    fn register_gauge(&self, key: &Key, _: &Metadata<'_>) -> Gauge {
        Gauge::from_arc(handle(&self.inner.gauges, key))
    }

    fn register_histogram(&self, key: &Key, _: &Metadata<'_>) -> Histogram {
        Histogram::from_arc(handle(&self.inner.histograms, key))
    }
}

static RECORDER: OnceLock<BuilderRecorder> = OnceLock::new();

/// Install the global metrics recorder, once. Later calls return the
/// recorder installed by the first.
///
/// If another recorder was installed globally first, the returned recorder
/// stays empty and a warning is logged.
pub fn install_recorder() -> BuilderRecorder {
    RECORDER
        .get_or_init(|| {
            let recorder = BuilderRecorder::new();
            match metrics::set_global_recorder(recorder.clone()) {
                Ok(()) => debug!("installed metrics recorder"),
                Err(_) => warn!("a metrics recorder was already installed"),
            }
            recorder
        })
        .clone()
}

/// The recorder installed by [`install_recorder`], if any.
pub fn installed_recorder() -> Option<&'static BuilderRecorder> {
    RECORDER.get()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{TestAccounts, by_sender, create_transfer_tx, test_builder};
    use alloy::primitives::{Address, U256};
    use metrics::{counter, gauge, histogram};
    use tokio_util::sync::CancellationToken;

    #[test]
    fn records_and_renders() {
        let recorder = BuilderRecorder::new();
        metrics::with_local_recorder(&recorder, || {
            counter!("relay.bids_received").increment(2);
            counter!("relay.bids_received").increment(1);
            counter!("relay.submitted_blocks", "relay" => "local").increment(1);
            gauge!("builder.pending").set(4.0);
            histogram!("builder.build_time_ms").record(3.0);
            histogram!("builder.build_time_ms").record(5.0);
        });

        assert_eq!(recorder.counter_value("relay.bids_received"), Some(3));
        assert_eq!(recorder.histogram_count("builder.build_time_ms"), Some(2));
        assert_eq!(recorder.counter_value("never.touched"), None);

        let rendered = recorder.render();
        assert!(rendered.contains("relay.bids_received 3\n"));
        assert!(rendered.contains("relay.submitted_blocks{relay=\"local\"} 1\n"));
        assert!(rendered.contains("builder.pending 4\n"));
        assert!(rendered.contains("builder.build_time_ms_count 2\n"));
        assert!(rendered.contains("builder.build_time_ms_sum 8\n"));
    }

    #[test]
    fn build_reports_to_recorder() {
        let accounts = TestAccounts::new();
        let tx = create_transfer_tx(&accounts.alice, Address::ZERO, U256::ZERO, 0, 1, 3).unwrap();
        let builder = test_builder(&accounts, 10, CancellationToken::new());

        let recorder = BuilderRecorder::new();
        let outcome =
            metrics::with_local_recorder(&recorder, || builder.build(vec![], by_sender([tx])));

        assert_eq!(outcome.block.tx_count(), 1);
        assert_eq!(recorder.counter_value("builder.included_txs"), Some(1));
        assert_eq!(recorder.histogram_count("builder.build_time_ms"), Some(1));
    }

    #[test]
    fn install_is_idempotent() {
        let first = install_recorder();
        let second = install_recorder();
        assert!(Arc::ptr_eq(&first.inner, &second.inner));
        assert!(installed_recorder().is_some());
    }
}
