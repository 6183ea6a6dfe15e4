//! Explanation generation for boost resolutions.
//!
//! Converts resolution traces into human-readable explanations suitable
//! for display in the merchant dashboard and for audit logs.

use boostflow_model::{
    BoostLevel, BoostSource, PricePreference, ResolutionTrace, ResolveContext, ResolvedBoost,
    RuleOutcome, RuleVerdict,
};
use serde::{Deserialize, Serialize};

/// A structured explanation for one step of a resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Explanation {
    /// Short summary (1 line)
    pub summary: String,

    /// Detailed explanation (1-2 sentences)
    pub detail: String,

    /// Outcome label, e.g. "Applied" or "Route Mismatch"
    pub outcome: String,

    /// Evidence items supporting this explanation
    pub evidence: Vec<EvidenceItem>,
}

/// A piece of evidence supporting an explanation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceItem {
    /// Type of evidence
    pub kind: String,

    /// The specific value or match
    pub value: String,

    /// Optional context
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

impl EvidenceItem {
    fn new(kind: &str, value: impl Into<String>) -> Self {
        Self {
            kind: kind.to_string(),
            value: value.into(),
            context: None,
        }
    }
}

/// Render the evaluation context for display.
pub fn describe_context(context: &ResolveContext) -> String {
    let route = context
        .route
        .as_ref()
        .map(|r| format!("route {}", r))
        .unwrap_or_else(|| "no route".to_string());
    let cabin = context
        .cabin
        .as_ref()
        .map(|c| format!("cabin {}", c))
        .unwrap_or_else(|| "no cabin".to_string());
    let date = context
        .date
        .map(|d| format!("date {}", d))
        .unwrap_or_else(|| "no date".to_string());
    format!("{}, {}, {}", route, cabin, date)
}

/// Generate explanations for a whole trace: the outcome first, then one
/// entry per rule in precedence order.
pub fn explain_resolution(trace: &ResolutionTrace) -> Vec<Explanation> {
    let mut explanations = vec![explain_outcome(trace)];
    explanations.extend(
        trace
            .verdicts
            .iter()
            .map(|v| explain_verdict(v, &trace.resolved.category, &trace.context)),
    );
    explanations
}

fn explain_outcome(trace: &ResolutionTrace) -> Explanation {
    let resolved = &trace.resolved;
    let detail = match &resolved.source {
        BoostSource::Rule { name, .. } => format!(
            "Rule '{}' is the highest-precedence matching rule with a boost for '{}'. \
             It overrides the base weight of {:.2}x.",
            name, resolved.category, trace.base_weight
        ),
        BoostSource::BaseWeight => format!(
            "No matching rule defines a boost for '{}', so the category weight applies.",
            resolved.category
        ),
    };

    let mut evidence = vec![
        EvidenceItem::new("multiplier", format!("{:.2}", resolved.multiplier)),
        EvidenceItem {
            kind: "context".to_string(),
            value: describe_context(&trace.context),
            context: None,
        },
    ];
    if resolved.price_preference != PricePreference::None {
        evidence.push(EvidenceItem::new(
            "price_preference",
            price_label(resolved.price_preference),
        ));
    }

    Explanation {
        summary: summarize_boost(resolved),
        detail,
        outcome: "Resolved".to_string(),
        evidence,
    }
}

/// Generate explanation for a single rule verdict.
pub fn explain_verdict(
    verdict: &RuleVerdict,
    category: &str,
    context: &ResolveContext,
) -> Explanation {
    let name = &verdict.rule_name;
    let (summary, detail, evidence) = match &verdict.outcome {
        RuleOutcome::Applied { boost } => (
            format!("'{}' applied", name),
            format!(
                "'{}' matched {} and sets '{}' to {:.2}x.",
                name,
                describe_context(context),
                category,
                boost
            ),
            vec![EvidenceItem::new("boost", format!("{:.2}", boost))],
        ),

        RuleOutcome::Shadowed { by } => (
            format!("'{}' overridden by rule {}", name, by),
            format!(
                "'{}' matched and boosts '{}', but rule {} takes precedence. \
                 Rules do not stack; only the first match counts.",
                name, category, by
            ),
            vec![EvidenceItem {
                kind: "shadowed_by".to_string(),
                value: by.to_string(),
                context: Some(format!("priority {}", verdict.priority)),
            }],
        ),

        RuleOutcome::NoBoostForCategory => (
            format!("'{}' has no boost for '{}'", name, category),
            format!(
                "'{}' matched the context but does not target '{}'.",
                name, category
            ),
            vec![],
        ),

        RuleOutcome::Disabled => (
            format!("'{}' is disabled", name),
            "Disabled rules are kept but never take part in resolution.".to_string(),
            vec![],
        ),

        RuleOutcome::ScopeMismatch => (
            format!("'{}' targets a different route", name),
            match &context.route {
                Some(route) => format!(
                    "'{}' is scoped to another route than {}. Route scopes are directional.",
                    name, route
                ),
                None => format!(
                    "'{}' is scoped to a single route and no route was given.",
                    name
                ),
            },
            vec![],
        ),

        RuleOutcome::CabinMismatch => (
            format!("'{}' targets other cabins", name),
            format!(
                "'{}' does not cover {}.",
                name,
                context
                    .cabin
                    .as_deref()
                    .map(|c| format!("the {} cabin", c))
                    .unwrap_or_else(|| "an unspecified cabin".to_string())
            ),
            vec![],
        ),

        RuleOutcome::OutsideDateWindow => (
            format!("'{}' is outside its date window", name),
            match context.date {
                Some(date) => format!("'{}' is not active on {}.", name, date),
                None => format!(
                    "'{}' is time-bounded and no evaluation date was given.",
                    name
                ),
            },
            vec![],
        ),
    };

    let mut evidence = evidence;
    evidence.push(EvidenceItem::new("rule_id", verdict.rule_id.to_string()));

    Explanation {
        summary,
        detail,
        outcome: verdict.outcome.label().to_string(),
        evidence,
    }
}

fn price_label(preference: PricePreference) -> &'static str {
    match preference {
        PricePreference::None => "none",
        PricePreference::Lower => "prefers lower prices",
        PricePreference::Higher => "prefers higher prices",
    }
}

/// One-line summary of a resolved boost.
pub fn summarize_boost(resolved: &ResolvedBoost) -> String {
    let level = match resolved.level() {
        BoostLevel::High => "HIGH BOOST",
        BoostLevel::Normal => "NORMAL",
        BoostLevel::Low => "LOW BOOST",
    };

    let mut summary = match &resolved.source {
        BoostSource::Rule { name, .. } => {
            format!("{} {:.2}x via rule '{}'", level, resolved.multiplier, name)
        }
        BoostSource::BaseWeight => format!("{} {:.2}x (base weight)", level, resolved.multiplier),
    };

    if resolved.price_preference != PricePreference::None {
        summary.push_str(", ");
        summary.push_str(price_label(resolved.price_preference));
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use boostflow_model::RuleId;
    use chrono::NaiveDate;

    fn resolved(multiplier: f32, source: BoostSource) -> ResolvedBoost {
        ResolvedBoost {
            category: "Electronics".to_string(),
            multiplier,
            price_preference: PricePreference::None,
            source,
        }
    }

    #[test]
    fn test_summarize_rule_boost() {
        let mut r = resolved(
            1.8,
            BoostSource::Rule {
                id: RuleId(2),
                name: "Dubai Electronics".to_string(),
            },
        );
        assert_eq!(summarize_boost(&r), "HIGH BOOST 1.80x via rule 'Dubai Electronics'");

        r.price_preference = PricePreference::Lower;
        assert!(summarize_boost(&r).ends_with("prefers lower prices"));
    }

    #[test]
    fn test_summarize_base_weight() {
        assert_eq!(
            summarize_boost(&resolved(1.0, BoostSource::BaseWeight)),
            "NORMAL 1.00x (base weight)"
        );
        assert!(summarize_boost(&resolved(0.5, BoostSource::BaseWeight)).starts_with("LOW BOOST"));
    }

    #[test]
    fn test_explain_resolution_order() {
        let context = ResolveContext::new()
            .with_route("DXB", "LHR")
            .with_cabin("Economy")
            .on(NaiveDate::from_ymd_opt(2025, 1, 20).unwrap());
        let trace = ResolutionTrace {
            resolved: resolved(
                1.5,
                BoostSource::Rule {
                    id: RuleId(1),
                    name: "R1".to_string(),
                },
            ),
            context,
            base_weight: 1.0,
            verdicts: vec![
                RuleVerdict {
                    rule_id: RuleId(2),
                    rule_name: "R2".to_string(),
                    priority: 1,
                    outcome: RuleOutcome::ScopeMismatch,
                },
                RuleVerdict {
                    rule_id: RuleId(1),
                    rule_name: "R1".to_string(),
                    priority: 2,
                    outcome: RuleOutcome::Applied { boost: 1.5 },
                },
            ],
        };

        let explanations = explain_resolution(&trace);
        assert_eq!(explanations.len(), 3);
        assert_eq!(explanations[0].outcome, "Resolved");
        assert!(explanations[1].detail.contains("DXB→LHR"));
        assert_eq!(explanations[2].outcome, "Applied");
        assert!(explanations[2].detail.contains("1.50x"));
    }

    #[test]
    fn test_describe_missing_context() {
        assert_eq!(
            describe_context(&ResolveContext::new()),
            "no route, no cabin, no date"
        );
    }
}
