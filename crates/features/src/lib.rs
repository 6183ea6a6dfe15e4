//! Matching predicates and weight helpers for boost resolution.
//!
//! Provides pure functions used by the stores and the resolver:
//! - Weight range checks and clamping
//! - Airport code and cabin label normalization
//! - Scope, cabin and date-window matching against a `ResolveContext`

use boostflow_model::{
    BoostError, DateWindow, ResolveContext, Route, Rule, RuleOutcome, RuleScope, ALL_CABINS,
    MAX_WEIGHT, MIN_WEIGHT,
};
use chrono::NaiveDate;

/// Clamp a multiplier into [0.0, 2.0].
pub fn clamp_weight(value: f32) -> f32 {
    value.clamp(MIN_WEIGHT, MAX_WEIGHT)
}

/// Validate a caller-supplied multiplier and return it clamped.
///
/// Non-finite values are out of range.
pub fn check_weight(field: &str, value: f32) -> Result<f32, BoostError> {
    if !value.is_finite() || !(MIN_WEIGHT..=MAX_WEIGHT).contains(&value) {
        return Err(BoostError::OutOfRange {
            field: field.to_string(),
            value,
        });
    }
    Ok(clamp_weight(value))
}

/// Normalize an airport code for comparison.
pub fn normalize_airport_code(code: &str) -> String {
    code.trim().to_uppercase()
}

/// Normalize a route so both ends compare by uppercase code.
pub fn normalize_route(route: &Route) -> Route {
    Route::new(
        normalize_airport_code(&route.from),
        normalize_airport_code(&route.to),
    )
}

/// Check whether a rule scope covers the evaluated route.
///
/// Route scopes match only the exact directional pair. Without a route,
/// only `All` matches.
pub fn scope_matches(scope: &RuleScope, route: Option<&Route>) -> bool {
    match (scope, route) {
        (RuleScope::All, _) => true,
        (RuleScope::Route { from, to }, Some(route)) => {
            normalize_airport_code(from) == normalize_airport_code(&route.from)
                && normalize_airport_code(to) == normalize_airport_code(&route.to)
        }
        (RuleScope::Route { .. }, None) => false,
    }
}

/// True when a cabin list applies to every cabin (empty or contains "All").
pub fn covers_all_cabins(cabins: &[String]) -> bool {
    cabins.is_empty() || cabins.iter().any(|c| same_cabin(c, ALL_CABINS))
}

/// Check whether a cabin list covers the evaluated cabin.
pub fn cabin_matches(cabins: &[String], cabin: Option<&str>) -> bool {
    if covers_all_cabins(cabins) {
        return true;
    }
    match cabin {
        Some(cabin) => cabins.iter().any(|c| same_cabin(c, cabin)),
        None => false,
    }
}

fn same_cabin(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}

/// Check whether a date window is open on the evaluation date.
///
/// Bounded windows fail closed: a missing evaluation date or a missing
/// bound never matches.
pub fn date_window_matches(window: &DateWindow, date: Option<NaiveDate>) -> bool {
    if window.always_on {
        return true;
    }
    match (date, window.start, window.end) {
        (Some(date), Some(start), Some(end)) => start <= date && date <= end,
        _ => false,
    }
}

/// The first context filter a rule fails, checked in resolution order.
pub fn first_mismatch(rule: &Rule, context: &ResolveContext) -> Option<RuleOutcome> {
    if !rule.enabled {
        return Some(RuleOutcome::Disabled);
    }
    if !scope_matches(&rule.scope, context.route.as_ref()) {
        return Some(RuleOutcome::ScopeMismatch);
    }
    if !cabin_matches(&rule.cabins, context.cabin.as_deref()) {
        return Some(RuleOutcome::CabinMismatch);
    }
    if !date_window_matches(&rule.date_window, context.date) {
        return Some(RuleOutcome::OutsideDateWindow);
    }
    None
}

/// Check whether a rule passes every context filter.
pub fn rule_matches(rule: &Rule, context: &ResolveContext) -> bool {
    first_mismatch(rule, context).is_none()
}

/// The usable boost a rule defines for `category`.
///
/// Non-finite values count as undefined; the rest are clamped.
pub fn rule_boost(rule: &Rule, category: &str) -> Option<f32> {
    rule.boost_for(category)
        .filter(|w| w.is_finite())
        .map(clamp_weight)
}

#[cfg(test)]
mod tests {
    use super::*;
    use boostflow_model::{RuleDraft, RuleId};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn rule(draft: RuleDraft) -> Rule {
        Rule::from_draft(RuleId(1), draft, date(2025, 1, 1))
    }

    #[test]
    fn test_check_weight() {
        assert_eq!(check_weight("boostWeight", 1.5), Ok(1.5));
        assert_eq!(check_weight("boostWeight", 0.0), Ok(0.0));
        assert_eq!(check_weight("boostWeight", 2.0), Ok(2.0));
        assert!(matches!(
            check_weight("boostWeight", 2.01),
            Err(BoostError::OutOfRange { .. })
        ));
        assert!(check_weight("boostWeight", -0.1).is_err());
        assert!(check_weight("boostWeight", f32::NAN).is_err());
    }

    #[test]
    fn test_scope_is_directional() {
        let scope = RuleScope::Route {
            from: "DXB".into(),
            to: "CDG".into(),
        };
        assert!(scope_matches(&scope, Some(&Route::new("DXB", "CDG"))));
        assert!(scope_matches(&scope, Some(&Route::new("dxb", " cdg"))));
        assert!(!scope_matches(&scope, Some(&Route::new("CDG", "DXB"))));
        assert!(!scope_matches(&scope, Some(&Route::new("DXB", "LHR"))));
        assert!(!scope_matches(&scope, None));
        assert!(scope_matches(&RuleScope::All, None));
    }

    #[test]
    fn test_cabin_matching() {
        let economy = vec!["Economy".to_string()];
        assert!(cabin_matches(&economy, Some("Economy")));
        assert!(cabin_matches(&economy, Some("economy")));
        assert!(!cabin_matches(&economy, Some("Business")));
        assert!(!cabin_matches(&economy, None));

        assert!(cabin_matches(&[], Some("Business")));
        assert!(cabin_matches(&["All".to_string()], None));
    }

    #[test]
    fn test_date_window_inclusive() {
        let window = DateWindow::between(date(2025, 2, 1), date(2025, 2, 14));
        assert!(date_window_matches(&window, Some(date(2025, 2, 1))));
        assert!(date_window_matches(&window, Some(date(2025, 2, 14))));
        assert!(!date_window_matches(&window, Some(date(2025, 3, 1))));
        assert!(!date_window_matches(&window, None));
        assert!(date_window_matches(&DateWindow::always(), None));
    }

    #[test]
    fn test_open_ended_window_fails_closed() {
        let window = DateWindow {
            always_on: false,
            start: Some(date(2025, 1, 1)),
            end: None,
        };
        assert!(!date_window_matches(&window, Some(date(2025, 6, 1))));
    }

    #[test]
    fn test_first_mismatch_order() {
        let disabled = rule(RuleDraft::new("off").with_route("JFK", "LHR").disabled());
        let context = ResolveContext::new().with_route("DXB", "CDG");
        assert_eq!(first_mismatch(&disabled, &context), Some(RuleOutcome::Disabled));

        let routed = rule(RuleDraft::new("routed").with_route("JFK", "LHR"));
        assert_eq!(first_mismatch(&routed, &context), Some(RuleOutcome::ScopeMismatch));

        let open = rule(RuleDraft::new("open"));
        assert!(rule_matches(&open, &context));
    }

    #[test]
    fn test_rule_boost_clamps_and_skips_nan() {
        let r = rule(
            RuleDraft::new("r")
                .with_boost("Electronics", 3.0)
                .with_boost("Accessories", f32::NAN),
        );
        assert_eq!(rule_boost(&r, "Electronics"), Some(2.0));
        assert_eq!(rule_boost(&r, "Accessories"), None);
        assert_eq!(rule_boost(&r, "Snacks & Drinks"), None);
    }
}
