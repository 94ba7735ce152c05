use crate::domain::{Action, EvaluationResult, FraudStatus, RiskFactor};

/// Composite scores are clamped to this ceiling.
pub const MAX_SCORE: u32 = 100;
/// Composite score at or above which a transaction is held for review.
pub const REVIEW_SCORE: u32 = 50;
/// Composite score at or above which a transaction is challenged.
pub const CHALLENGE_SCORE: u32 = 25;

/// Merges risk factors into one decision.
///
/// The result depends only on the multiset of factors: any permutation of
/// the same input yields an identical result.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScoreAggregator;

impl ScoreAggregator {
    pub fn new() -> Self {
        ScoreAggregator
    }

    pub fn aggregate(&self, mut factors: Vec<RiskFactor>) -> EvaluationResult {
        if factors.is_empty() {
            return EvaluationResult::clean();
        }

        factors.sort_by(|a, b| {
            b.score
                .cmp(&a.score)
                .then_with(|| a.rule_id.cmp(&b.rule_id))
                .then_with(|| a.rule_name.cmp(&b.rule_name))
                .then_with(|| a.details.cmp(&b.details))
                .then_with(|| a.action.cmp(&b.action))
                .then_with(|| a.severity.cmp(&b.severity))
                .then_with(|| a.rule_type.as_str().cmp(b.rule_type.as_str()))
        });

        let composite_score = factors
            .iter()
            .fold(0u32, |acc, f| acc.saturating_add(f.score))
            .min(MAX_SCORE);

        let declared = factors
            .iter()
            .fold(Action::Allow, |acc, f| acc.max(f.action));

        let (action, status) = Self::decide(declared, composite_score);

        EvaluationResult {
            composite_score,
            status,
            action,
            risk_factors: factors,
        }
    }

    /// Block is absolute. Otherwise the stronger of the declared action and
    /// the score band wins.
    fn decide(declared: Action, score: u32) -> (Action, FraudStatus) {
        if declared == Action::Block {
            (Action::Block, FraudStatus::Blocked)
        } else if declared == Action::Review || score >= REVIEW_SCORE {
            (Action::Review, FraudStatus::Review)
        } else if declared == Action::Challenge || score >= CHALLENGE_SCORE {
            (Action::Challenge, FraudStatus::Clean)
        } else {
            (Action::Allow, FraudStatus::Clean)
        }
    }
}
