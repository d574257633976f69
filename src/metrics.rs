//! Local request diagnostics: a bounded ring of recent calls.

use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// One completed (or failed) call through the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestMetric {
  pub path: String,
  pub method: String,
  pub duration_ms: u64,
  /// HTTP status of the final response; `None` for timeouts and transport failures.
  pub status: Option<u16>,
  /// Unix milliseconds when the call finished.
  pub timestamp: i64,
}

impl RequestMetric {
  pub fn is_error(&self) -> bool {
    !matches!(self.status, Some(200..=299))
  }
}

/// Aggregate view over the buffered metrics.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricsSummary {
  pub count: usize,
  pub errors: usize,
  pub avg_duration_ms: f64,
  pub max_duration_ms: u64,
}

/// Append-only buffer that drops the oldest entry once full.
#[derive(Debug)]
pub struct MetricsBuffer {
  capacity: usize,
  entries: Mutex<VecDeque<RequestMetric>>,
}

impl MetricsBuffer {
  pub fn new(capacity: usize) -> Self {
    Self {
      capacity,
      entries: Mutex::new(VecDeque::with_capacity(capacity)),
    }
  }

  fn entries(&self) -> MutexGuard<'_, VecDeque<RequestMetric>> {
    self.entries.lock().unwrap_or_else(PoisonError::into_inner)
  }

  pub fn record(&self, metric: RequestMetric) {
    if self.capacity == 0 {
      return;
    }
    let mut entries = self.entries();
    while entries.len() >= self.capacity {
      entries.pop_front();
    }
    entries.push_back(metric);
  }

  /// Oldest first.
  pub fn snapshot(&self) -> Vec<RequestMetric> {
    self.entries().iter().cloned().collect()
  }

  pub fn clear(&self) {
    self.entries().clear();
  }

  pub fn summary(&self) -> MetricsSummary {
    let entries = self.entries();
    if entries.is_empty() {
      return MetricsSummary::default();
    }

    let total: u64 = entries.iter().map(|m| m.duration_ms).sum();
    MetricsSummary {
      count: entries.len(),
      errors: entries.iter().filter(|m| m.is_error()).count(),
      avg_duration_ms: total as f64 / entries.len() as f64,
      max_duration_ms: entries.iter().map(|m| m.duration_ms).max().unwrap_or(0),
    }
  }
}
