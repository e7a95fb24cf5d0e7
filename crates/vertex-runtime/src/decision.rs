//! Cost decision engine.
//!
//! Given scored candidates, always picks a free option that meets the quality
//! bar when one exists. Otherwise it falls back to the cheapest paid option
//! and marks the decision degraded. Every decision is appended to history.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;
use vertex_core::{Error, Result};
use vertex_store::ScoredModel;

use crate::scoring::quality_score;

pub const DEFAULT_QUALITY_THRESHOLD: f64 = 0.7;
const MAX_ALTERNATIVES: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CostTier {
    Free,
    Cheap,
    Moderate,
    Expensive,
}

impl CostTier {
    pub fn classify(cost_per_1k_tokens: f64) -> Self {
        if cost_per_1k_tokens <= 0.0 {
            CostTier::Free
        } else if cost_per_1k_tokens < 0.001 {
            CostTier::Cheap
        } else if cost_per_1k_tokens < 0.01 {
            CostTier::Moderate
        } else {
            CostTier::Expensive
        }
    }
}

/// One option presented to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub model_id: String,
    #[serde(default)]
    pub cost_per_1k_tokens: f64,
    pub quality_score: f64,
    #[serde(default)]
    pub params_millions: u64,
    #[serde(default)]
    pub downloads: u64,
}

impl Candidate {
    /// Candidate from a search hit, scored with [`quality_score`].
    pub fn from_scored(scored: &ScoredModel) -> Self {
        let r = &scored.record;
        Self {
            model_id: r.model_id.clone(),
            cost_per_1k_tokens: r.cost_per_1k_tokens,
            quality_score: quality_score(scored.similarity, r.downloads, r.params_millions),
            params_millions: r.params_millions,
            downloads: r.downloads,
        }
    }

    fn is_free(&self) -> bool {
        self.cost_per_1k_tokens == 0.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionAlternative {
    pub model_id: String,
    pub cost_per_1k_tokens: f64,
    pub quality_score: f64,
}

/// Immutable record of one evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub id: String,
    pub chosen_model_id: String,
    pub cost_per_1k_tokens: f64,
    pub cost_tier: CostTier,
    pub reasoning: String,
    pub alternatives: Vec<DecisionAlternative>,
    /// Cost per 1k tokens avoided versus the most expensive paid option.
    pub savings: f64,
    /// No free option existed; a paid model was chosen.
    pub degraded: bool,
    /// No candidate met the quality threshold.
    pub quality_warning: bool,
    pub paid_options_avoided: usize,
    pub timestamp: DateTime<Utc>,
}

impl Decision {
    /// Fail with `DegradedDecision` if this decision carries a cost.
    pub fn ensure_zero_cost(&self) -> Result<&Self> {
        if self.degraded {
            Err(Error::DegradedDecision(self.reasoning.clone()))
        } else {
            Ok(self)
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CostStatistics {
    pub total_cost: f64,
    pub total_decisions: usize,
    pub free_options_used: usize,
    pub paid_options_avoided: usize,
    pub total_savings: f64,
    pub average_savings_per_decision: f64,
    /// Share of decisions that chose a free option, in percent.
    pub cost_efficiency: f64,
    pub tokens_tracked: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct UsageRecord {
    pub tokens: u64,
    pub cost_per_1k_tokens: f64,
    pub cost: f64,
    pub timestamp: DateTime<Utc>,
}

/// `(quality desc, params asc, downloads desc)`, then id for a total order.
fn preference(a: &Candidate, b: &Candidate) -> Ordering {
    b.quality_score
        .total_cmp(&a.quality_score)
        .then(a.params_millions.cmp(&b.params_millions))
        .then(b.downloads.cmp(&a.downloads))
        .then_with(|| a.model_id.cmp(&b.model_id))
}

#[derive(Default)]
pub struct CostDecisionEngine {
    history: Mutex<Vec<Decision>>,
    ledger: Mutex<Vec<UsageRecord>>,
}

impl CostDecisionEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Choose among `candidates`. Fails only when `candidates` is empty.
    pub fn evaluate(&self, candidates: &[Candidate], quality_threshold: f64) -> Result<Decision> {
        if candidates.is_empty() {
            return Err(Error::NoCandidate("no options to evaluate".into()));
        }

        let mut pool: Vec<&Candidate> = candidates
            .iter()
            .filter(|c| c.quality_score >= quality_threshold)
            .collect();
        let quality_warning = pool.is_empty();
        if quality_warning {
            warn!(
                "No option meets quality threshold {:.2}, using all {}",
                quality_threshold,
                candidates.len()
            );
            pool = candidates.iter().collect();
        }

        let (mut free, mut paid): (Vec<&Candidate>, Vec<&Candidate>) =
            pool.into_iter().partition(|c| c.is_free());

        let decision = if !free.is_empty() {
            free.sort_by(|a, b| preference(a, b));
            let chosen = free[0];
            let savings = paid
                .iter()
                .map(|c| c.cost_per_1k_tokens)
                .fold(0.0, f64::max);

            let mut reasoning = format!(
                "Selected FREE option: {} (quality: {:.2}, params: {}M). Avoided {} paid options.",
                chosen.model_id,
                chosen.quality_score,
                chosen.params_millions,
                paid.len()
            );
            if savings > 0.0 {
                reasoning.push_str(&format!(" Saved ${:.4} per 1k tokens.", savings));
            }
            if quality_warning {
                reasoning.push_str(&format!(
                    " Warning: no option met quality threshold {:.2}.",
                    quality_threshold
                ));
            }
            info!("{}", reasoning);

            Decision {
                id: Uuid::new_v4().to_string(),
                chosen_model_id: chosen.model_id.clone(),
                cost_per_1k_tokens: 0.0,
                cost_tier: CostTier::Free,
                reasoning,
                alternatives: free
                    .iter()
                    .skip(1)
                    .take(MAX_ALTERNATIVES)
                    .map(|c| DecisionAlternative {
                        model_id: c.model_id.clone(),
                        cost_per_1k_tokens: c.cost_per_1k_tokens,
                        quality_score: c.quality_score,
                    })
                    .collect(),
                savings,
                degraded: false,
                quality_warning,
                paid_options_avoided: paid.len(),
                timestamp: Utc::now(),
            }
        } else {
            paid.sort_by(|a, b| {
                a.cost_per_1k_tokens
                    .total_cmp(&b.cost_per_1k_tokens)
                    .then_with(|| preference(a, b))
            });
            let chosen = paid[0];
            let cost = chosen.cost_per_1k_tokens;

            let mut reasoning = format!(
                "FALLBACK: No free options available. Selected cheapest paid option: {} at ${:.4} per 1k tokens. Index more free models to avoid costs.",
                chosen.model_id, cost
            );
            if quality_warning {
                reasoning.push_str(&format!(
                    " Warning: no option met quality threshold {:.2}.",
                    quality_threshold
                ));
            }
            warn!("{}", reasoning);

            Decision {
                id: Uuid::new_v4().to_string(),
                chosen_model_id: chosen.model_id.clone(),
                cost_per_1k_tokens: cost,
                cost_tier: CostTier::classify(cost),
                reasoning,
                alternatives: Vec::new(),
                savings: 0.0,
                degraded: true,
                quality_warning,
                paid_options_avoided: 0,
                timestamp: Utc::now(),
            }
        };

        self.history.lock().push(decision.clone());
        Ok(decision)
    }

    /// Record token usage against a per-1k price.
    pub fn track_usage(&self, tokens: u64, cost_per_1k_tokens: f64) -> UsageRecord {
        let cost = tokens as f64 / 1000.0 * cost_per_1k_tokens.max(0.0);
        if cost > 0.0 {
            warn!(
                "Cost incurred: ${:.6} ({} tokens @ ${:.4}/1k)",
                cost, tokens, cost_per_1k_tokens
            );
        } else {
            info!("Free usage: {} tokens", tokens);
        }
        let record = UsageRecord {
            tokens,
            cost_per_1k_tokens,
            cost,
            timestamp: Utc::now(),
        };
        self.ledger.lock().push(record.clone());
        record
    }

    /// The most recent `limit` decisions, oldest first.
    pub fn history(&self, limit: usize) -> Vec<Decision> {
        let history = self.history.lock();
        let skip = history.len().saturating_sub(limit);
        history[skip..].to_vec()
    }

    pub fn len(&self) -> usize {
        self.history.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn statistics(&self) -> CostStatistics {
        let history = self.history.lock();
        let ledger = self.ledger.lock();

        let total_decisions = history.len();
        let free_options_used = history.iter().filter(|d| !d.degraded).count();
        let total_savings: f64 = history.iter().map(|d| d.savings).sum();
        let per_decision = |x: f64| {
            if total_decisions == 0 {
                0.0
            } else {
                x / total_decisions as f64
            }
        };

        CostStatistics {
            total_cost: ledger.iter().map(|u| u.cost).sum(),
            total_decisions,
            free_options_used,
            paid_options_avoided: history.iter().map(|d| d.paid_options_avoided).sum(),
            total_savings,
            average_savings_per_decision: per_decision(total_savings),
            cost_efficiency: per_decision(free_options_used as f64 * 100.0),
            tokens_tracked: ledger.iter().map(|u| u.tokens).sum(),
        }
    }

    pub fn suggest_optimizations(&self) -> Vec<String> {
        let stats = self.statistics();
        let mut suggestions = Vec::new();

        if stats.total_cost > 0.0 {
            suggestions.push(format!(
                "Total cost is ${:.4}, not $0. Consider indexing more free models.",
                stats.total_cost
            ));
        }
        if stats.cost_efficiency < 100.0 {
            suggestions.push(format!(
                "Cost efficiency is {:.1}%. Aim for 100% by using only free models.",
                stats.cost_efficiency
            ));
        }

        let mut paid_models: BTreeMap<String, usize> = BTreeMap::new();
        for d in self.history.lock().iter().filter(|d| d.cost_per_1k_tokens > 0.0) {
            *paid_models.entry(d.chosen_model_id.clone()).or_default() += 1;
        }
        for (model, count) in paid_models {
            suggestions.push(format!(
                "Model '{}' was used {} times with cost. Find a free alternative and add it to the index.",
                model, count
            ));
        }

        if stats.total_decisions > 10 {
            let free_rate = stats.free_options_used as f64 / stats.total_decisions as f64;
            if free_rate < 0.9 {
                suggestions.push(
                    "Consider bulk indexing more free models to increase free option availability."
                        .to_string(),
                );
            }
        }

        if suggestions.is_empty() {
            suggestions.push("Cost optimization is optimal. Maintaining $0 cost.".to_string());
        }
        suggestions
    }

    /// Clear decision history and the usage ledger.
    pub fn reset(&self) {
        self.history.lock().clear();
        self.ledger.lock().clear();
        info!("Cost statistics reset");
    }
}
