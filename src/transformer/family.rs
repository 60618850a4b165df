//! Metric families
//!
//! A [`MetricFamily`] is one named metric with a fixed, ordered label set and
//! the samples collected for it in a cycle.

/// Prometheus metric type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MetricKind {
    /// Value that can go up and down
    #[default]
    Gauge,
    /// Monotonically increasing value
    Counter,
}

impl MetricKind {
    /// Exposition format keyword
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Gauge => "gauge",
            MetricKind::Counter => "counter",
        }
    }
}

/// One sample: label values in the family's label order, plus the value
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub label_values: Vec<String>,
    pub value: f64,
}

/// A named metric and its samples
#[derive(Debug, Clone, PartialEq)]
pub struct MetricFamily {
    pub name: String,
    pub help: String,
    pub kind: MetricKind,
    pub label_names: Vec<&'static str>,
    pub samples: Vec<Sample>,
}

impl MetricFamily {
    /// Create an empty gauge family
    pub fn gauge(name: &str, help: &str, label_names: &[&'static str]) -> Self {
        Self::new(name, help, MetricKind::Gauge, label_names)
    }

    /// Create an empty counter family
    pub fn counter(name: &str, help: &str, label_names: &[&'static str]) -> Self {
        Self::new(name, help, MetricKind::Counter, label_names)
    }

    fn new(name: &str, help: &str, kind: MetricKind, label_names: &[&'static str]) -> Self {
        Self {
            name: name.to_string(),
            help: help.to_string(),
            kind,
            label_names: label_names.to_vec(),
            samples: Vec::new(),
        }
    }

    /// Append a sample
    ///
    /// `label_values` must line up with `label_names`.
    pub fn add_sample(&mut self, label_values: Vec<String>, value: f64) {
        debug_assert_eq!(
            label_values.len(),
            self.label_names.len(),
            "label arity mismatch for {}",
            self.name
        );
        self.samples.push(Sample {
            label_values,
            value,
        });
    }

    /// Builder-style [`add_sample`](Self::add_sample)
    pub fn with_sample(mut self, label_values: Vec<String>, value: f64) -> Self {
        self.add_sample(label_values, value);
        self
    }

    /// Value of the first sample whose labels contain all `pairs`
    pub fn value_of(&self, pairs: &[(&str, &str)]) -> Option<f64> {
        self.samples
            .iter()
            .find(|sample| {
                pairs.iter().all(|(name, value)| {
                    self.label_names
                        .iter()
                        .position(|n| n == name)
                        .is_some_and(|i| sample.label_values[i] == *value)
                })
            })
            .map(|sample| sample.value)
    }
}
