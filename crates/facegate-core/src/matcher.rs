//! Probe-to-identity matching.
//!
//! [`match_probe`] is a pure function of the probe, an immutable snapshot of
//! active encodings and the configured thresholds. It performs no I/O and
//! holds no locks, so concurrent probes can share one snapshot freely.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
  Error, Result,
  encoding::{ActiveEncoding, FeatureVector},
  worker::WorkerId,
};

// ─── Metric ──────────────────────────────────────────────────────────────────

/// Distance between two feature vectors. Must match how the external encoder
/// was trained; fixed per deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
  #[default]
  Euclidean,
  /// `1 - cos θ`, in `[0, 2]`.
  Cosine,
}

impl DistanceMetric {
  /// Both slices must have the same length.
  pub fn distance(self, a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    match self {
      Self::Euclidean => a
        .iter()
        .zip(b)
        .map(|(x, y)| {
          let d = f64::from(*x) - f64::from(*y);
          d * d
        })
        .sum::<f64>()
        .sqrt() as f32,
      Self::Cosine => {
        let (mut dot, mut na, mut nb) = (0.0_f64, 0.0_f64, 0.0_f64);
        for (x, y) in a.iter().zip(b) {
          let (x, y) = (f64::from(*x), f64::from(*y));
          dot += x * y;
          na += x * x;
          nb += y * y;
        }
        if na == 0.0 || nb == 0.0 {
          // A zero vector has no direction; treat it as orthogonal.
          return 1.0;
        }
        (1.0 - dot / (na.sqrt() * nb.sqrt())) as f32
      }
    }
  }
}

// ─── Thresholds ──────────────────────────────────────────────────────────────

/// Decision thresholds. Tuned per deployment, never hardcoded.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchThresholds {
  pub metric:           DistanceMetric,
  /// Best distance at or below which a match may be accepted.
  pub accept_threshold: f32,
  /// Best distance above which the probe is rejected outright.
  pub reject_threshold: f32,
  /// Minimum gap between the best and the runner-up worker.
  pub ambiguity_margin: f32,
}

impl Default for MatchThresholds {
  fn default() -> Self {
    Self {
      metric:           DistanceMetric::Euclidean,
      accept_threshold: 0.4,
      reject_threshold: 0.6,
      ambiguity_margin: 0.1,
    }
  }
}

impl MatchThresholds {
  pub fn validate(&self) -> Result<()> {
    let finite = [self.accept_threshold, self.reject_threshold, self.ambiguity_margin]
      .iter()
      .all(|v| v.is_finite());
    if !finite {
      return Err(Error::InvalidThresholds("thresholds must be finite".into()));
    }
    if self.accept_threshold < 0.0 {
      return Err(Error::InvalidThresholds(
        "accept_threshold must not be negative".into(),
      ));
    }
    if self.reject_threshold < self.accept_threshold {
      return Err(Error::InvalidThresholds(format!(
        "reject_threshold ({}) is below accept_threshold ({})",
        self.reject_threshold, self.accept_threshold
      )));
    }
    if self.ambiguity_margin < 0.0 {
      return Err(Error::InvalidThresholds(
        "ambiguity_margin must not be negative".into(),
      ));
    }
    Ok(())
  }
}

// ─── Snapshot ────────────────────────────────────────────────────────────────

/// An immutable view of every active encoding, grouped by worker in worker
/// id order.
#[derive(Debug, Clone, Default)]
pub struct EncodingSnapshot {
  dimension: usize,
  workers:   Vec<(WorkerId, Vec<FeatureVector>)>,
  skipped:   usize,
}

impl EncodingSnapshot {
  /// Group `encodings` by worker. Encodings whose dimension differs from
  /// `dimension` (left over from a previous encoder) are skipped and counted.
  pub fn new(dimension: usize, encodings: Vec<ActiveEncoding>) -> Self {
    let mut grouped: BTreeMap<WorkerId, Vec<FeatureVector>> = BTreeMap::new();
    let mut skipped = 0;
    for enc in encodings {
      if enc.vector.dimension() != dimension {
        skipped += 1;
        continue;
      }
      grouped.entry(enc.worker_id).or_default().push(enc.vector);
    }
    Self { dimension, workers: grouped.into_iter().collect(), skipped }
  }

  pub fn dimension(&self) -> usize { self.dimension }

  pub fn worker_count(&self) -> usize { self.workers.len() }

  pub fn encoding_count(&self) -> usize {
    self.workers.iter().map(|(_, v)| v.len()).sum()
  }

  /// Encodings dropped because their dimension did not match.
  pub fn skipped(&self) -> usize { self.skipped }

  pub fn is_empty(&self) -> bool { self.workers.is_empty() }
}

// ─── Result ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchDecision {
  Accepted,
  RejectedLowConfidence,
  /// Too close to a second worker, or between the accept and reject
  /// thresholds. Not a match for attendance purposes.
  Ambiguous,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
  pub decision:           MatchDecision,
  /// The identified worker; set only when `decision` is `Accepted`.
  pub candidate:          Option<WorkerId>,
  /// The closest worker regardless of decision, for tuning logs.
  pub nearest:            Option<WorkerId>,
  /// Best-of-N distance to `nearest`; `None` if nothing is enrolled.
  pub distance:           Option<f32>,
  /// Best-of-N distance to the second-closest worker.
  pub runner_up_distance: Option<f32>,
  /// `1 - distance`, clamped to `[0, 1]`.
  pub confidence:         f32,
}

impl MatchResult {
  pub fn is_accepted(&self) -> bool { self.decision == MatchDecision::Accepted }

  fn empty() -> Self {
    Self {
      decision:           MatchDecision::RejectedLowConfidence,
      candidate:          None,
      nearest:            None,
      distance:           None,
      runner_up_distance: None,
      confidence:         0.0,
    }
  }
}

// ─── Matching ────────────────────────────────────────────────────────────────

/// Match `probe` against `snapshot`.
///
/// Each worker scores the minimum distance over its encodings. With `d_min`
/// the best worker's score and `d_second` the runner-up's:
///
/// - `d_min > reject_threshold` → rejected, no candidate;
/// - `d_min <= accept_threshold` and `d_second - d_min >= ambiguity_margin`
///   → accepted;
/// - anything else → ambiguous.
///
/// A probe of the wrong dimension or with non-finite components is refused
/// before any distance is computed. Ties go to the lower worker id.
pub fn match_probe(
  probe: &FeatureVector,
  snapshot: &EncodingSnapshot,
  thresholds: &MatchThresholds,
) -> Result<MatchResult> {
  probe.validate(snapshot.dimension)?;

  if snapshot.is_empty() {
    return Ok(MatchResult::empty());
  }

  let mut best: Option<(WorkerId, f32)> = None;
  let mut second: Option<f32> = None;

  for (worker_id, vectors) in &snapshot.workers {
    let score = vectors
      .iter()
      .map(|v| thresholds.metric.distance(probe.as_slice(), v.as_slice()))
      .fold(f32::INFINITY, f32::min);

    match best {
      Some((_, d)) if score >= d => {
        if second.is_none_or(|s| score < s) {
          second = Some(score);
        }
      }
      _ => {
        second = best.map(|(_, d)| d);
        best = Some((*worker_id, score));
      }
    }
  }

  let Some((nearest, d_min)) = best else {
    return Ok(MatchResult::empty());
  };

  let gap = second.map_or(f32::INFINITY, |d| d - d_min);
  let decision = if d_min > thresholds.reject_threshold {
    MatchDecision::RejectedLowConfidence
  } else if d_min <= thresholds.accept_threshold && gap >= thresholds.ambiguity_margin {
    MatchDecision::Accepted
  } else {
    MatchDecision::Ambiguous
  };

  Ok(MatchResult {
    decision,
    candidate: (decision == MatchDecision::Accepted).then_some(nearest),
    nearest: Some(nearest),
    distance: Some(d_min),
    runner_up_distance: second,
    confidence: (1.0 - d_min).clamp(0.0, 1.0),
  })
}
