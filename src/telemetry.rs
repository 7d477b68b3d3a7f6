use prometheus::{Encoder, Histogram, HistogramOpts, IntCounterVec, Opts, Registry, TextEncoder};
use std::collections::HashSet;

pub struct Metrics {
    request_counter: IntCounterVec,
    prediction_duration: Histogram,
    prediction_counter: IntCounterVec,
    pub registry: Registry,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let request_counter = IntCounterVec::new(
            Opts::new("ecg_requests_total", "Total number of requests"),
            &["route"],
        )?;

        let boundaries = generate_boundaries((50, 250, 500, 2000, 5000));

        let prediction_duration = Histogram::with_opts(
            HistogramOpts::new(
                "ecg_prediction_duration_ms",
                "Duration of ECG predictions in milliseconds",
            )
            .buckets(boundaries),
        )?;

        let prediction_counter = IntCounterVec::new(
            Opts::new("ecg_predictions_total", "Predictions per diagnosis label"),
            &["label"],
        )?;

        registry.register(Box::new(request_counter.clone()))?;
        registry.register(Box::new(prediction_duration.clone()))?;
        registry.register(Box::new(prediction_counter.clone()))?;

        Ok(Metrics {
            request_counter,
            prediction_duration,
            prediction_counter,
            registry,
        })
    }

    pub fn record_request(&self, route: &str) {
        self.request_counter.with_label_values(&[route]).inc();
    }

    pub fn record_prediction_duration(&self, duration_ms: u64) {
        self.prediction_duration.observe(duration_ms as f64);
    }

    pub fn record_prediction(&self, label: &str) {
        self.prediction_counter.with_label_values(&[label]).inc();
    }

    pub fn render(&self) -> Result<String, prometheus::Error> {
        let metric_families = self.registry.gather();

        let mut buffer = Vec::new();
        TextEncoder::new().encode(&metric_families, &mut buffer)?;

        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

fn generate_boundaries(parts: (i32, i32, i32, i32, i32)) -> Vec<f64> {
    let first_step: usize = 25;
    let middle_step: usize = 50;
    let end_step: usize = 250;
    let tail_step: usize = 1000;
    let first_part = (parts.0..=parts.1).step_by(first_step);
    let middle_part = (parts.1..=parts.2).step_by(middle_step);
    let end_part = (parts.2..=parts.3).step_by(end_step);
    let tail_part = (parts.3..=parts.4).step_by(tail_step);

    let mut seen = HashSet::new();
    first_part
        .chain(middle_part)
        .chain(end_part)
        .chain(tail_part)
        .filter(|&x| seen.insert(x))
        .map(|x| x as f64)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_boundaries() {
        let parts = (0, 50, 150, 650, 1650);
        let get = generate_boundaries(parts);
        let expected = vec![0.0, 25.0, 50.0, 100.0, 150.0, 400.0, 650.0, 1650.0];

        assert_eq!(get, expected);
    }

    #[test]
    fn test_render_exposes_recorded_metrics() {
        let metrics = Metrics::new().unwrap();
        metrics.record_request("/analyzer");
        metrics.record_prediction("Normal");
        metrics.record_prediction_duration(320);

        let text = metrics.render().unwrap();

        assert!(text.contains("ecg_requests_total{route=\"/analyzer\"} 1"));
        assert!(text.contains("ecg_predictions_total{label=\"Normal\"} 1"));
        assert!(text.contains("ecg_prediction_duration_ms_count 1"));
    }
}
