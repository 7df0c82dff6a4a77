//! # Scoring: Candidate Quality Score
//!
//! Maps one candidate campaign to a quality score in `(-inf, 1.0]` from three
//! weighted components:
//!
//! | Component   | Input                                   | Shape |
//! |-------------|-----------------------------------------|-------|
//! | Relevance   | model score for (client, advertiser)     | `sigmoid(r / 1000)` |
//! | Profit      | `cpm * impressions_limit + cpc * clicks_limit` | `sigmoid(rev / 10000)` |
//! | Performance | delivered vs. limit for impressions and clicks | [`pacing_factor`] summed |
//!
//! Weights are normalized to sum to 1 on every call. The total is clamped
//! from above at 1.0 only: heavily overdelivered campaigns score below zero,
//! down to `-f64::MAX`. The result is always finite.
//!
//! Every score at or above [`BASE_THRESHOLD`] is appended to the scorer's
//! [`ScoreHistory`], whether or not the candidate ends up selected.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::threshold::{HistoryEntry, ScoreHistory, BASE_THRESHOLD};

const RELEVANCE_SCALE: f64 = 1000.0;
const REVENUE_SCALE: f64 = 10_000.0;
/// Delivery within this factor of the limit counts as reaching it.
const PACING_TOLERANCE: f64 = 1.05;
/// Flattens the pacing curve so it stays near 1.0 until delivery is almost done.
const PACING_EXPONENT: f64 = 0.1;

/// Raw component weights. Only their ratios matter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    pub profit: f64,
    pub relevance: f64,
    pub performance: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        ScoringWeights {
            profit: 0.4,
            relevance: 0.3,
            performance: 0.3,
        }
    }
}

impl ScoringWeights {
    /// Reject weights that cannot be normalized.
    pub fn validate(&self) -> Result<()> {
        for (name, w) in [
            ("profit", self.profit),
            ("relevance", self.relevance),
            ("performance", self.performance),
        ] {
            if !w.is_finite() || w < 0.0 {
                anyhow::bail!("scoring weight '{}' must be a finite non-negative number, got {}", name, w);
            }
        }
        if self.sum() <= 0.0 {
            anyhow::bail!("scoring weights must not all be zero");
        }
        Ok(())
    }

    fn sum(&self) -> f64 {
        self.profit + self.relevance + self.performance
    }

    /// `(profit, relevance, performance)` scaled to sum to 1.
    pub fn normalized(&self) -> (f64, f64, f64) {
        let total = self.sum();
        (
            self.profit / total,
            self.relevance / total,
            self.performance / total,
        )
    }
}

/// Everything the score depends on for one (client, campaign) pair.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AdSignals {
    pub relevance: i64,
    pub impressions: i64,
    pub impressions_target: i64,
    pub cost_per_impression: f64,
    pub clicks: i64,
    pub clicks_target: i64,
    pub cost_per_click: f64,
}

pub fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Credit for delivery progress of one counter.
///
/// - no limit (`target <= 0`): 1.0
/// - not yet within 5% of the limit: `((target - actual) / target) ^ 0.1`,
///   floored at 0 when `actual` is already slightly past the limit
/// - at or past 105% of the limit: `1 - e^|overshoot|`, saturating at
///   `-f64::MAX` instead of reaching `-inf`
pub fn pacing_factor(actual: i64, target: i64) -> f64 {
    if target <= 0 {
        return 1.0;
    }
    let target_f = target as f64;
    if ((actual + 1) as f64) < target_f * PACING_TOLERANCE {
        let remaining = ((target - actual) as f64 / target_f).max(0.0);
        return remaining.powf(PACING_EXPONENT);
    }
    let deviation = (actual - target) as f64 / target_f;
    (1.0 - deviation.abs().exp()).max(-f64::MAX)
}

/// Pure score computation, without touching any history.
pub fn compute_score(weights: &ScoringWeights, ad: &AdSignals) -> f64 {
    let (w_profit, w_relevance, w_performance) = weights.normalized();

    let relevance = sigmoid(ad.relevance as f64 / RELEVANCE_SCALE) * w_relevance;

    let revenue = ad.cost_per_impression * ad.impressions_target as f64
        + ad.cost_per_click * ad.clicks_target as f64;
    let profit = sigmoid(revenue / REVENUE_SCALE) * w_profit;

    let performance = if w_performance == 0.0 {
        0.0
    } else {
        ((pacing_factor(ad.impressions, ad.impressions_target)
            + pacing_factor(ad.clicks, ad.clicks_target))
            * w_performance)
            .max(-f64::MAX)
    };

    let total = profit + relevance + performance;
    if total > 1.0 {
        1.0
    } else {
        total
    }
}

/// Scoring engine with its rolling history of accepted scores.
///
/// One instance is shared by all requests of a process; the history and the
/// threshold derived from it are never persisted.
pub struct Scorer {
    weights: ScoringWeights,
    history: ScoreHistory,
}

impl Scorer {
    pub fn new(weights: ScoringWeights) -> Result<Self> {
        weights.validate()?;
        Ok(Scorer {
            weights,
            history: ScoreHistory::new(),
        })
    }

    pub fn weights(&self) -> ScoringWeights {
        self.weights
    }

    /// Score a candidate, recording it in the history if it clears the base bar.
    pub fn score(&self, ad: &AdSignals) -> f64 {
        let score = compute_score(&self.weights, ad);
        if score >= BASE_THRESHOLD {
            self.history.record(HistoryEntry {
                score,
                impressions: ad.impressions,
                clicks: ad.clicks,
                impressions_target: ad.impressions_target,
                clicks_target: ad.clicks_target,
            });
        }
        score
    }

    /// Current adaptive acceptance cutoff.
    pub fn threshold(&self) -> f64 {
        self.history.threshold()
    }

    pub fn history(&self) -> &ScoreHistory {
        &self.history
    }
}
