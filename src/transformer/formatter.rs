//! Prometheus Exposition Format output
//!
//! This module handles formatting of metric families into the text
//! exposition format (version 0.0.4).
//!
//! # Format Specification
//!
//! ```text
//! # HELP <metric_name> <help_text>
//! # TYPE <metric_name> <type>
//! <metric_name>{<label1>="<value1>",<label2>="<value2>"} <value>
//! ```

use std::fmt::Write;

use super::family::{MetricFamily, Sample};

/// Content type of the exposition text
pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Prometheus exposition format formatter
///
/// # Example
///
/// ```ignore
/// use prefect_exporter::transformer::{MetricFamily, PrometheusFormatter};
///
/// let family = MetricFamily::gauge("prefect_flows_total", "Prefect total flows", &[])
///     .with_sample(vec![], 3.0);
///
/// let output = PrometheusFormatter::new().format([family]);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct PrometheusFormatter;

impl PrometheusFormatter {
    /// Create a new formatter
    pub fn new() -> Self {
        Self
    }

    /// Format families into Prometheus exposition format
    ///
    /// - HELP and TYPE lines are emitted for every family, even one without
    ///   samples
    /// - Labels keep the family's declared order
    /// - Families and samples keep their input order
    pub fn format<I>(&self, families: I) -> String
    where
        I: IntoIterator<Item = MetricFamily>,
    {
        let mut output = String::new();
        for family in families {
            self.write_family(&mut output, &family);
        }
        output
    }

    /// Append one family to `output`
    pub fn write_family(&self, output: &mut String, family: &MetricFamily) {
        output.reserve(family.samples.len() * 100);

        // Writing to a String cannot fail
        let _ = writeln!(
            output,
            "# HELP {} {}",
            family.name,
            Self::escape_help(&family.help)
        );
        let _ = writeln!(output, "# TYPE {} {}", family.name, family.kind.as_str());

        for sample in &family.samples {
            Self::write_sample(output, family, sample);
            output.push('\n');
        }
    }

    /// Format a single sample line
    fn write_sample(output: &mut String, family: &MetricFamily, sample: &Sample) {
        output.push_str(&family.name);

        if !family.label_names.is_empty() {
            output.push('{');
            for (i, (name, value)) in family
                .label_names
                .iter()
                .zip(&sample.label_values)
                .enumerate()
            {
                if i > 0 {
                    output.push(',');
                }
                output.push_str(name);
                output.push_str("=\"");
                output.push_str(&Self::escape_label_value(value));
                output.push('"');
            }
            output.push('}');
        }

        output.push(' ');
        output.push_str(&Self::format_value(sample.value));
    }

    /// Format a numeric value for Prometheus
    ///
    /// - NaN → "NaN"
    /// - +Inf → "+Inf"
    /// - -Inf → "-Inf"
    /// - Integers are formatted without decimal point
    /// - Large/small floats use scientific notation
    fn format_value(value: f64) -> String {
        if value.is_nan() {
            "NaN".to_string()
        } else if value.is_infinite() {
            if value.is_sign_positive() {
                "+Inf".to_string()
            } else {
                "-Inf".to_string()
            }
        } else if value.fract() == 0.0 && value.abs() < 1e15 {
            format!("{}", value as i64)
        } else if value.abs() >= 1e6 || (value.abs() < 1e-3 && value != 0.0) {
            format!("{:e}", value)
        } else {
            format!("{}", value)
        }
    }

    /// Escapes backslash and newline characters.
    fn escape_help(help: &str) -> String {
        help.replace('\\', "\\\\").replace('\n', "\\n")
    }

    /// Escapes backslash, double-quote, and newline characters.
    fn escape_label_value(value: &str) -> String {
        let mut escaped = String::with_capacity(value.len());
        for c in value.chars() {
            match c {
                '\\' => escaped.push_str("\\\\"),
                '"' => escaped.push_str("\\\""),
                '\n' => escaped.push_str("\\n"),
                _ => escaped.push(c),
            }
        }
        escaped
    }
}
