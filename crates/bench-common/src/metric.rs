//! Explicitly-available metric values.
//!
//! A load generator may omit a metric line, or print a value that is not a
//! number. Neither case may be confused with a real zero: "0 failed requests"
//! and "failure count unknown" mean different things in a report. `Metric`
//! keeps the two apart all the way from parsing to rendering.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Marker written to session documents for a missing value.
pub const UNAVAILABLE: &str = "unavailable";

/// Marker shown in reports for a missing value.
pub const NOT_AVAILABLE: &str = "n/a";

/// A metric value that is either known or explicitly unavailable.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Metric<T> {
    Available(T),
    #[default]
    Unavailable,
}

impl<T> Metric<T> {
    pub fn is_available(&self) -> bool {
        matches!(self, Metric::Available(_))
    }

    pub fn as_ref(&self) -> Metric<&T> {
        match self {
            Metric::Available(v) => Metric::Available(v),
            Metric::Unavailable => Metric::Unavailable,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Metric<U> {
        match self {
            Metric::Available(v) => Metric::Available(f(v)),
            Metric::Unavailable => Metric::Unavailable,
        }
    }

    pub fn and_then<U>(self, f: impl FnOnce(T) -> Metric<U>) -> Metric<U> {
        match self {
            Metric::Available(v) => f(v),
            Metric::Unavailable => Metric::Unavailable,
        }
    }

    /// Format the value with `f`, or the `n/a` marker when unavailable.
    pub fn render_with(&self, f: impl FnOnce(&T) -> String) -> String {
        match self {
            Metric::Available(v) => f(v),
            Metric::Unavailable => NOT_AVAILABLE.to_string(),
        }
    }
}

impl<T: Copy> Metric<T> {
    pub fn value(&self) -> Option<T> {
        match self {
            Metric::Available(v) => Some(*v),
            Metric::Unavailable => None,
        }
    }
}

impl Metric<f64> {
    /// Build a float metric, treating NaN and infinities as unavailable.
    pub fn finite(value: f64) -> Self {
        if value.is_finite() {
            Metric::Available(value)
        } else {
            Metric::Unavailable
        }
    }

    /// Format with a fixed number of decimals, or `n/a`.
    pub fn render(&self, decimals: usize) -> String {
        self.render_with(|v| format!("{:.*}", decimals, v))
    }
}

impl<T> From<Option<T>> for Metric<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => Metric::Available(v),
            None => Metric::Unavailable,
        }
    }
}

impl<T: fmt::Display> fmt::Display for Metric<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Metric::Available(v) => v.fmt(f),
            Metric::Unavailable => f.write_str(NOT_AVAILABLE),
        }
    }
}

impl<T: Serialize> Serialize for Metric<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Metric::Available(v) => v.serialize(serializer),
            Metric::Unavailable => serializer.serialize_str(UNAVAILABLE),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum MetricRepr<T> {
    Value(T),
    Text(String),
    Null,
}

impl<'de, T> Deserialize<'de> for Metric<T>
where
    T: DeserializeOwned + FromStr,
{
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let repr = MetricRepr::<T>::deserialize(deserializer)?;
        Ok(match repr {
            MetricRepr::Value(v) => Metric::Available(v),
            MetricRepr::Text(text) => parse_text(&text),
            MetricRepr::Null => Metric::Unavailable,
        })
    }
}

/// Older consolidated-results files store metrics as formatted text such as
/// `"847.23"` or `"99.0%"`.
fn parse_text<T: FromStr>(text: &str) -> Metric<T> {
    let trimmed = text.trim().trim_end_matches('%').trim();
    if trimmed.is_empty()
        || trimmed.eq_ignore_ascii_case(UNAVAILABLE)
        || trimmed.eq_ignore_ascii_case(NOT_AVAILABLE)
    {
        return Metric::Unavailable;
    }
    trimmed.parse().ok().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unavailable_is_not_zero() {
        let zero: Metric<u64> = Metric::Available(0);
        let missing: Metric<u64> = Metric::Unavailable;
        assert_ne!(zero, missing);
        assert_eq!(zero.to_string(), "0");
        assert_eq!(missing.to_string(), "n/a");
    }

    #[test]
    fn test_finite_rejects_nan() {
        assert_eq!(Metric::<f64>::finite(f64::NAN), Metric::Unavailable);
        assert_eq!(Metric::<f64>::finite(f64::INFINITY), Metric::Unavailable);
        assert_eq!(Metric::<f64>::finite(1.5), Metric::Available(1.5));
    }

    #[test]
    fn test_serialize_markers() {
        let json = serde_json::to_string(&vec![Metric::Available(2.5), Metric::Unavailable]).unwrap();
        assert_eq!(json, r#"[2.5,"unavailable"]"#);
    }

    #[test]
    fn test_deserialize_legacy_text() {
        let values: Vec<Metric<f64>> =
            serde_json::from_str(r#"["847.23", "99.0%", "N/A", "", null, "abc", 12.5]"#).unwrap();
        assert_eq!(
            values,
            vec![
                Metric::Available(847.23),
                Metric::Available(99.0),
                Metric::Unavailable,
                Metric::Unavailable,
                Metric::Unavailable,
                Metric::Unavailable,
                Metric::Available(12.5),
            ]
        );
    }

    #[test]
    fn test_render_precision() {
        assert_eq!(Metric::Available(12.345).render(1), "12.3");
        assert_eq!(Metric::<f64>::Unavailable.render(1), "n/a");
    }
}
