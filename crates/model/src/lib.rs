//! Core domain model for boostflow category ranking.
//!
//! This crate defines the fundamental types used throughout the system:
//! - `Category`: a product taxonomy bucket and its boost multiplier
//! - `Rule` / `RuleDraft`: scoped, time-windowed boost overrides
//! - `ResolveContext`: route, cabin and date a resolution is evaluated in
//! - `ResolvedBoost` / `RuleVerdict`: resolution output and its audit trail
//! - `BoostError`: the error taxonomy shared by every crate

use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use serde::{de, Deserialize, Deserializer, Serialize};
use thiserror::Error;

/// Lowest boost multiplier a category or rule may carry.
pub const MIN_WEIGHT: f32 = 0.0;
/// Highest boost multiplier a category or rule may carry.
pub const MAX_WEIGHT: f32 = 2.0;
/// Multiplier that leaves a category's ranking untouched.
pub const NEUTRAL_WEIGHT: f32 = 1.0;
/// Weights strictly below this are reported as "Low".
pub const LOW_THRESHOLD: f32 = 0.7;
/// Weights strictly above this are reported as "High".
pub const HIGH_THRESHOLD: f32 = 1.3;
/// Cabin label that makes a rule apply to every cabin.
pub const ALL_CABINS: &str = "All";
/// Suffix appended to the name of a duplicated rule.
pub const COPY_MARKER: &str = " (Copy)";
/// Priority given to drafts that do not set one.
pub const DEFAULT_PRIORITY: u32 = 5;

/// Stable identifier of a category.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CategoryId(pub String);

impl From<&str> for CategoryId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for CategoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a custom rule. Assigned in increasing order, never reused.
///
/// Serialized as a number. The dashboard writes ids as numeric strings
/// (`"1"`, or a millisecond timestamp), so both forms are accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct RuleId(pub u64);

impl<'de> Deserialize<'de> for RuleId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(u64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Number(n) => Ok(Self(n)),
            Raw::Text(text) => text
                .trim()
                .parse()
                .map(Self)
                .map_err(|_| de::Error::custom(format!("invalid rule id: {:?}", text))),
        }
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A product taxonomy bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: CategoryId,

    /// Display label; rules address categories by this name
    pub name: String,

    /// Current multiplier, always within [0.0, 2.0]
    pub boost_weight: f32,

    /// Baseline restored on reset
    pub default_weight: f32,
}

impl Category {
    /// Create a category sitting at its default weight.
    pub fn new(id: impl Into<String>, name: impl Into<String>, default_weight: f32) -> Self {
        Self {
            id: CategoryId(id.into()),
            name: name.into(),
            boost_weight: default_weight,
            default_weight,
        }
    }

    pub fn is_at_default(&self) -> bool {
        self.boost_weight == self.default_weight
    }

    pub fn level(&self) -> BoostLevel {
        BoostLevel::from_weight(self.boost_weight)
    }
}

/// Coarse label shown next to a weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoostLevel {
    /// Suppressed (below 0.7)
    Low,
    Normal,
    /// Promoted (above 1.3)
    High,
}

impl BoostLevel {
    pub fn from_weight(weight: f32) -> Self {
        if weight < LOW_THRESHOLD {
            Self::Low
        } else if weight > HIGH_THRESHOLD {
            Self::High
        } else {
            Self::Normal
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Normal => "Normal",
            Self::High => "High",
        }
    }
}

/// A directional origin → destination airport pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Route {
    pub from: String,
    pub to: String,
}

impl Route {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}→{}", self.from, self.to)
    }
}

/// Route applicability of a rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RuleScope {
    /// Every route
    All,
    /// Exactly one directional pair; `from→to` does not cover `to→from`
    Route { from: String, to: String },
}

impl Default for RuleScope {
    fn default() -> Self {
        Self::All
    }
}

/// Temporal bound of a rule. Both ends are inclusive calendar dates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DateWindow {
    #[serde(default = "default_true")]
    pub always_on: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<NaiveDate>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<NaiveDate>,
}

impl DateWindow {
    pub fn always() -> Self {
        Self {
            always_on: true,
            start: None,
            end: None,
        }
    }

    pub fn between(start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            always_on: false,
            start: Some(start),
            end: Some(end),
        }
    }
}

impl Default for DateWindow {
    fn default() -> Self {
        Self::always()
    }
}

fn default_true() -> bool {
    true
}

/// Price hint handed to the ranking stage alongside the multiplier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PricePreference {
    #[default]
    None,
    /// Favor cheaper products
    Lower,
    /// Favor pricier products
    Higher,
}

/// What a rule changes when it wins.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleTargets {
    /// Category name → multiplier
    #[serde(default)]
    pub category_boosts: BTreeMap<String, f32>,

    #[serde(default)]
    pub price_preference: PricePreference,
}

/// A custom ranking override as stored in a rule set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    pub id: RuleId,
    pub name: String,
    pub enabled: bool,
    #[serde(default)]
    pub scope: RuleScope,

    /// Empty, or containing "All", means every cabin
    #[serde(default)]
    pub cabins: Vec<String>,

    #[serde(default)]
    pub date_window: DateWindow,

    /// Lower value wins; 1 is evaluated first
    pub priority: u32,

    #[serde(default)]
    pub targets: RuleTargets,

    /// Display only; never consulted during resolution
    pub last_updated: NaiveDate,
}

impl Rule {
    /// Build a stored rule from a draft.
    pub fn from_draft(id: RuleId, draft: RuleDraft, last_updated: NaiveDate) -> Self {
        Self {
            id,
            name: draft.name,
            enabled: draft.enabled,
            scope: draft.scope,
            cabins: draft.cabins,
            date_window: draft.date_window,
            priority: draft.priority,
            targets: draft.targets,
            last_updated,
        }
    }

    /// The editable fields of this rule.
    pub fn to_draft(&self) -> RuleDraft {
        RuleDraft {
            name: self.name.clone(),
            enabled: self.enabled,
            scope: self.scope.clone(),
            cabins: self.cabins.clone(),
            date_window: self.date_window.clone(),
            priority: self.priority,
            targets: self.targets.clone(),
        }
    }

    /// The boost this rule defines for `category`, if any.
    pub fn boost_for(&self, category: &str) -> Option<f32> {
        self.targets.category_boosts.get(category).copied()
    }
}

/// The caller-supplied fields of a rule, used for create and update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleDraft {
    pub name: String,

    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub scope: RuleScope,

    #[serde(default)]
    pub cabins: Vec<String>,

    #[serde(default)]
    pub date_window: DateWindow,

    #[serde(default = "default_priority")]
    pub priority: u32,

    #[serde(default)]
    pub targets: RuleTargets,
}

fn default_priority() -> u32 {
    DEFAULT_PRIORITY
}

impl RuleDraft {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            scope: RuleScope::All,
            cabins: Vec::new(),
            date_window: DateWindow::always(),
            priority: DEFAULT_PRIORITY,
            targets: RuleTargets::default(),
        }
    }

    pub fn with_route(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.scope = RuleScope::Route {
            from: from.into(),
            to: to.into(),
        };
        self
    }

    pub fn with_cabins<I, S>(mut self, cabins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cabins = cabins.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_window(mut self, window: DateWindow) -> Self {
        self.date_window = window;
        self
    }

    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_boost(mut self, category: impl Into<String>, weight: f32) -> Self {
        self.targets.category_boosts.insert(category.into(), weight);
        self
    }

    pub fn with_price_preference(mut self, preference: PricePreference) -> Self {
        self.targets.price_preference = preference;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// Runtime context a resolution is evaluated in.
///
/// Every field is optional: a missing route only matches rules scoped to
/// all routes, a missing cabin only matches rules that cover every cabin,
/// and a missing date only matches always-on rules.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResolveContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route: Option<Route>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cabin: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
}

impl ResolveContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_route(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.route = Some(Route::new(from, to));
        self
    }

    pub fn with_cabin(mut self, cabin: impl Into<String>) -> Self {
        self.cabin = Some(cabin.into());
        self
    }

    pub fn on(mut self, date: NaiveDate) -> Self {
        self.date = Some(date);
        self
    }
}

/// Where an effective boost came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BoostSource {
    /// No matching rule defined the category; the table weight applies
    BaseWeight,
    /// The highest-precedence matching rule that defines the category
    Rule { id: RuleId, name: String },
}

/// The effective boost for one category in one context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedBoost {
    pub category: String,
    pub multiplier: f32,
    pub price_preference: PricePreference,
    pub source: BoostSource,
}

impl ResolvedBoost {
    pub fn level(&self) -> BoostLevel {
        BoostLevel::from_weight(self.multiplier)
    }

    pub fn winning_rule(&self) -> Option<RuleId> {
        match &self.source {
            BoostSource::Rule { id, .. } => Some(*id),
            BoostSource::BaseWeight => None,
        }
    }
}

/// Why a rule did or did not contribute to a resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum RuleOutcome {
    /// This rule supplied the effective boost
    Applied { boost: f32 },
    /// Matched and defined a boost, but a higher-precedence rule won
    Shadowed { by: RuleId },
    /// Matched the context but has no boost for the category
    NoBoostForCategory,
    Disabled,
    ScopeMismatch,
    CabinMismatch,
    OutsideDateWindow,
}

impl RuleOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Applied { .. } => "Applied",
            Self::Shadowed { .. } => "Shadowed",
            Self::NoBoostForCategory => "No Boost For Category",
            Self::Disabled => "Disabled",
            Self::ScopeMismatch => "Route Mismatch",
            Self::CabinMismatch => "Cabin Mismatch",
            Self::OutsideDateWindow => "Outside Date Window",
        }
    }

    /// Whether the rule passed every context filter.
    pub fn matched(&self) -> bool {
        matches!(
            self,
            Self::Applied { .. } | Self::Shadowed { .. } | Self::NoBoostForCategory
        )
    }
}

/// Verdict for a single rule within a trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleVerdict {
    pub rule_id: RuleId,
    pub rule_name: String,
    pub priority: u32,
    pub outcome: RuleOutcome,
}

/// A resolution together with the per-rule verdicts that produced it.
///
/// Verdicts are listed in precedence order (priority, then creation).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionTrace {
    pub resolved: ResolvedBoost,
    pub context: ResolveContext,
    pub base_weight: f32,
    pub verdicts: Vec<RuleVerdict>,
}

/// A product entering the ranking stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductCandidate {
    pub sku: String,
    #[serde(default)]
    pub name: String,
    /// Category name, as used by rules
    pub category: String,
    /// Relevance score from retrieval
    pub base_score: f32,
    #[serde(default)]
    pub price: f32,
}

impl ProductCandidate {
    pub fn new(sku: impl Into<String>, category: impl Into<String>, base_score: f32) -> Self {
        Self {
            sku: sku.into(),
            name: String::new(),
            category: category.into(),
            base_score,
            price: 0.0,
        }
    }

    pub fn with_price(mut self, price: f32) -> Self {
        self.price = price;
        self
    }
}

/// A product after its category boost has been applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedProduct {
    pub product: ProductCandidate,
    pub boost: f32,
    /// `base_score * boost`
    pub score: f32,
    pub price_preference: PricePreference,
}

/// One entry of a weights save request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeightEntry {
    pub category_id: CategoryId,
    pub boost_weight: f32,
}

/// Optional cabin/route context attached to a weights save.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cabin_class: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route: Option<Route>,
}

/// Body of `PUT /merchants/{id}/category-weights`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightsUpdate {
    pub weights: Vec<WeightEntry>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<SaveContext>,
}

/// Complete configuration of one merchant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MerchantSettings {
    pub merchant_id: String,

    #[serde(default)]
    pub categories: Vec<Category>,

    #[serde(default = "default_global_boost")]
    pub global_boost: f32,

    #[serde(default)]
    pub rules: Vec<Rule>,
}

fn default_global_boost() -> f32 {
    NEUTRAL_WEIGHT
}

/// Errors raised by the boost model.
///
/// Every failing mutation leaves the prior state untouched.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BoostError {
    /// Bad input shape, e.g. a zero priority
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("{field} {value} is outside the allowed range [0, 2]")]
    OutOfRange { field: String, value: f32 },

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// Resolution asked for a category the weight table does not hold
    #[error("unknown category: {0}")]
    InvalidCategory(String),

    #[error("persistence failure: {message}")]
    Persistence { message: String, retryable: bool },
}

impl BoostError {
    pub fn category_not_found(id: &CategoryId) -> Self {
        Self::NotFound {
            kind: "category",
            id: id.to_string(),
        }
    }

    pub fn rule_not_found(id: RuleId) -> Self {
        Self::NotFound {
            kind: "rule",
            id: id.to_string(),
        }
    }

    /// Whether retrying the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Persistence { retryable: true, .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_boost_level_thresholds() {
        assert_eq!(BoostLevel::from_weight(0.69), BoostLevel::Low);
        assert_eq!(BoostLevel::from_weight(0.7), BoostLevel::Normal);
        assert_eq!(BoostLevel::from_weight(1.3), BoostLevel::Normal);
        assert_eq!(BoostLevel::from_weight(1.31), BoostLevel::High);
        assert_eq!(BoostLevel::High.label(), "High");
    }

    #[test]
    fn test_rule_parses_dashboard_json() {
        let json = r#"{
            "id": 2,
            "name": "Electronics Discount Push",
            "enabled": true,
            "scope": { "type": "all" },
            "cabins": ["Economy"],
            "dateWindow": { "start": "2025-01-15", "end": "2025-01-31", "alwaysOn": false },
            "priority": 2,
            "targets": { "categoryBoosts": { "Electronics": 1.5 }, "pricePreference": "lower" },
            "lastUpdated": "2025-01-08"
        }"#;
        let rule: Rule = serde_json::from_str(json).unwrap();

        assert_eq!(rule.id, RuleId(2));
        assert_eq!(rule.scope, RuleScope::All);
        assert_eq!(rule.date_window, DateWindow::between(date(2025, 1, 15), date(2025, 1, 31)));
        assert_eq!(rule.boost_for("Electronics"), Some(1.5));
        assert_eq!(rule.targets.price_preference, PricePreference::Lower);
    }

    #[test]
    fn test_rule_id_accepts_dashboard_strings() {
        let ids: Vec<RuleId> = serde_json::from_str(r#"[3, "1", "1736500000000"]"#).unwrap();
        assert_eq!(ids, vec![RuleId(3), RuleId(1), RuleId(1_736_500_000_000)]);
        assert_eq!(serde_json::to_string(&RuleId(7)).unwrap(), "7");

        assert!(serde_json::from_str::<RuleId>(r#""rule-1""#).is_err());
        assert!(serde_json::from_str::<RuleId>("-1").is_err());

        let json = r#"{
            "id": "2",
            "name": "Electronics Discount Push",
            "enabled": true,
            "priority": 2,
            "lastUpdated": "2025-01-08"
        }"#;
        let rule: Rule = serde_json::from_str(json).unwrap();
        assert_eq!(rule.id, RuleId(2));
    }

    #[test]
    fn test_route_scope_serialization() {
        let scope = RuleScope::Route {
            from: "DXB".into(),
            to: "CDG".into(),
        };
        let json = serde_json::to_value(&scope).unwrap();
        assert_eq!(json, serde_json::json!({ "type": "route", "from": "DXB", "to": "CDG" }));
    }

    #[test]
    fn test_draft_defaults() {
        let draft: RuleDraft = serde_json::from_str(r#"{ "name": "Bare" }"#).unwrap();
        assert_eq!(draft, RuleDraft::new("Bare"));
        assert_eq!(draft.priority, DEFAULT_PRIORITY);
        assert!(draft.date_window.always_on);
    }

    #[test]
    fn test_rule_draft_round_trip_keeps_fields() {
        let draft = RuleDraft::new("Fragrance")
            .with_route("DXB", "CDG")
            .with_cabins(["Business"])
            .with_priority(1)
            .with_boost("Fragrance & Beauty", 1.8);
        let rule = Rule::from_draft(RuleId(7), draft.clone(), date(2025, 1, 10));
        assert_eq!(rule.to_draft(), draft);
    }

    #[test]
    fn test_error_retryable() {
        let timeout = BoostError::Persistence {
            message: "timed out".into(),
            retryable: true,
        };
        assert!(timeout.is_retryable());
        assert!(!BoostError::rule_not_found(RuleId(1)).is_retryable());
        assert_eq!(BoostError::rule_not_found(RuleId(1)).to_string(), "rule not found: 1");
    }
}
