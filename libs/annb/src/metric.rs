//! Distance metrics understood by datasets, engines and the runner.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Closed set of distance metrics.
///
/// L2 results are ordered by ascending squared distance, inner-product results
/// by descending score.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "&'static str")]
pub enum MetricType {
    InnerProduct,
    L2,
}

impl MetricType {
    /// Parse a metric from text, case-insensitively.
    ///
    /// Accepts `l2` / `euclidean` and `ip` / `inner_product`. Anything else is
    /// rejected; there is no default.
    pub fn from_text(text: &str) -> Result<Self> {
        match text.to_lowercase().as_str() {
            "l2" | "euclidean" => Ok(MetricType::L2),
            "ip" | "inner_product" => Ok(MetricType::InnerProduct),
            _ => Err(Error::UnknownMetric(text.to_string())),
        }
    }

    /// Parse the ann-benchmarks style `distance` attribute, where `angular`
    /// stands for inner product over normalized vectors.
    pub fn from_distance_text(text: &str) -> Result<Self> {
        if text.eq_ignore_ascii_case("angular") {
            return Ok(MetricType::InnerProduct);
        }
        Self::from_text(text)
    }

    /// Canonical text form, parseable by [`MetricType::from_text`].
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricType::InnerProduct => "inner_product",
            MetricType::L2 => "l2",
        }
    }

    /// Value written to the `distance` attribute of canonical cache files.
    pub fn distance_text(&self) -> &'static str {
        match self {
            MetricType::InnerProduct => "angular",
            MetricType::L2 => "euclidean",
        }
    }

    /// Short upper-case label used in stage keys.
    pub fn label(&self) -> &'static str {
        match self {
            MetricType::InnerProduct => "INNER_PRODUCT",
            MetricType::L2 => "L2",
        }
    }

    /// Score of `a` against `b` under this metric (squared L2 or dot product).
    #[inline]
    pub fn score(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            MetricType::L2 => annb_core::distance::euclidean_squared(a, b),
            MetricType::InnerProduct => annb_core::distance::dot(a, b),
        }
    }

    /// Whether `a` ranks ahead of `b`.
    #[inline]
    pub fn is_better(&self, a: f32, b: f32) -> bool {
        match self {
            MetricType::L2 => a < b,
            MetricType::InnerProduct => a > b,
        }
    }

    /// Distance reported for padding slots when fewer than k neighbors exist.
    pub fn worst(&self) -> f32 {
        match self {
            MetricType::L2 => f32::INFINITY,
            MetricType::InnerProduct => f32::NEG_INFINITY,
        }
    }
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for MetricType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_text(s)
    }
}

impl TryFrom<String> for MetricType {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::from_text(&value)
    }
}

impl From<MetricType> for &'static str {
    fn from(metric: MetricType) -> Self {
        metric.as_str()
    }
}
