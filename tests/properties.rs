use proptest::prelude::*;

use txrisk::domain::rule::TimeCondition;
use txrisk::domain::{Action, AlertType, FraudStatus, RiskFactor, RuleType, Severity};
use txrisk::engine::ScoreAggregator;
use txrisk::geo::{haversine_km, GeoPoint, EARTH_RADIUS_KM};

fn action() -> impl Strategy<Value = Action> {
    prop_oneof![
        Just(Action::Allow),
        Just(Action::Challenge),
        Just(Action::Review),
        Just(Action::Block),
    ]
}

fn severity() -> impl Strategy<Value = Severity> {
    prop_oneof![
        Just(Severity::Low),
        Just(Severity::Medium),
        Just(Severity::High),
        Just(Severity::Critical),
    ]
}

fn factor() -> impl Strategy<Value = RiskFactor> {
    (0u8..6, "[A-Z]{1,3}", action(), severity(), 0u32..=80, "[a-z ]{0,8}").prop_map(
        |(type_idx, id, action, severity, score, details)| {
            let rule_type = RuleType::ALL[type_idx as usize];
            RiskFactor {
                rule_id: id.clone(),
                rule_name: id.to_lowercase(),
                rule_type,
                severity,
                action,
                alert_type: AlertType::default_for(rule_type),
                score,
                details,
            }
        },
    )
}

fn point() -> impl Strategy<Value = GeoPoint> {
    (-90.0f64..=90.0, -180.0f64..=180.0).prop_map(|(lat, lon)| GeoPoint::new(lat, lon))
}

proptest! {
    #[test]
    fn composite_score_is_clamped_sum(factors in prop::collection::vec(factor(), 0..12)) {
        let sum: u32 = factors.iter().map(|f| f.score).sum();
        let result = ScoreAggregator.aggregate(factors);

        prop_assert!(result.composite_score <= 100);
        prop_assert_eq!(result.composite_score, sum.min(100));
    }

    #[test]
    fn block_is_absolute(
        mut factors in prop::collection::vec(factor(), 0..8),
        blocker in factor(),
    ) {
        factors.push(RiskFactor { action: Action::Block, ..blocker });
        let result = ScoreAggregator.aggregate(factors);

        prop_assert_eq!(result.action, Action::Block);
        prop_assert_eq!(result.status, FraudStatus::Blocked);
        prop_assert!(!result.allowed());
    }

    #[test]
    fn aggregation_ignores_input_order(
        (factors, shuffled) in prop::collection::vec(factor(), 0..10)
            .prop_flat_map(|v| (Just(v.clone()), Just(v).prop_shuffle()))
    ) {
        let a = ScoreAggregator.aggregate(factors);
        let b = ScoreAggregator.aggregate(shuffled);

        prop_assert_eq!(a, b);
    }

    #[test]
    fn action_never_weaker_than_declared(factors in prop::collection::vec(factor(), 1..8)) {
        let strongest = factors.iter().map(|f| f.action).max().unwrap_or_default();
        let result = ScoreAggregator.aggregate(factors);

        prop_assert!(result.action >= strongest);
    }

    #[test]
    fn haversine_symmetric_and_bounded(a in point(), b in point()) {
        let ab = haversine_km(a, b);
        let ba = haversine_km(b, a);

        prop_assert!((ab - ba).abs() < 1e-6);
        prop_assert!(ab >= 0.0);
        prop_assert!(ab <= std::f64::consts::PI * EARTH_RADIUS_KM + 1e-6);
    }

    #[test]
    fn haversine_identity(a in point()) {
        prop_assert!(haversine_km(a, a).abs() < 1e-9);
    }

    #[test]
    fn hour_window_matches_exactly_its_hours(start in 0u32..24, end in 0u32..=24) {
        let window = TimeCondition { start_hour: start, end_hour: end, threshold_multiplier: 1.0 };
        let matched = (0..24).filter(|h| window.contains_hour(*h)).count() as u32;

        let expected = if start <= end { end - start } else { 24 - start + end };
        prop_assert_eq!(matched, expected);
    }
}
