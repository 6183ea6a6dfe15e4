//! Boost resolution and boosted product ranking.
//!
//! `RuleResolver` combines the category weight table with the custom rule
//! set to compute the effective multiplier for a category in a given
//! route/cabin/date context. `rerank_products` applies those multipliers
//! to retrieval scores for the ranking stage.

use std::cmp::Ordering;
use std::collections::HashMap;

use boostflow_features::{first_mismatch, rule_boost, rule_matches};
use boostflow_model::{
    BoostError, BoostSource, Category, PricePreference, ProductCandidate, RankedProduct,
    ResolutionTrace, ResolveContext, ResolvedBoost, Rule, RuleOutcome, RuleVerdict,
};
use boostflow_store::{CategoryWeightTable, CustomRuleSet, MerchantStore};

/// Resolves effective category boosts against a snapshot of both stores.
///
/// Rules never stack: the highest-precedence matching rule that defines a
/// boost for the category wins, otherwise the table weight applies.
#[derive(Debug, Clone, Copy)]
pub struct RuleResolver<'a> {
    weights: &'a CategoryWeightTable,
    rules: &'a CustomRuleSet,
}

impl<'a> RuleResolver<'a> {
    pub fn new(weights: &'a CategoryWeightTable, rules: &'a CustomRuleSet) -> Self {
        Self { weights, rules }
    }

    pub fn from_store(store: &'a MerchantStore) -> Self {
        Self::new(&store.weights, &store.rules)
    }

    /// Rules sorted by priority, earliest created first on ties.
    fn precedence_order(&self) -> Vec<&'a Rule> {
        let mut ordered: Vec<&Rule> = self.rules.iter().collect();
        ordered.sort_by_key(|r| (r.priority, r.id));
        ordered
    }

    fn category(&self, name: &str) -> Result<&'a Category, BoostError> {
        self.weights
            .get_by_name(name)
            .ok_or_else(|| BoostError::InvalidCategory(name.to_string()))
    }

    /// Effective boost and price preference for one category.
    ///
    /// Fails only when the category is not in the weight table.
    pub fn resolve(
        &self,
        category: &str,
        context: &ResolveContext,
    ) -> Result<ResolvedBoost, BoostError> {
        let category = self.category(category)?;
        Ok(self.resolve_category(category, context))
    }

    fn resolve_category(&self, category: &Category, context: &ResolveContext) -> ResolvedBoost {
        let winner = self
            .precedence_order()
            .into_iter()
            .filter(|rule| rule_matches(rule, context))
            .find_map(|rule| rule_boost(rule, &category.name).map(|boost| (rule, boost)));

        let resolved = match winner {
            Some((rule, boost)) => ResolvedBoost {
                category: category.name.clone(),
                multiplier: boost,
                price_preference: rule.targets.price_preference,
                source: BoostSource::Rule {
                    id: rule.id,
                    name: rule.name.clone(),
                },
            },
            None => base_boost(category),
        };

        tracing::trace!(
            category = %category.name,
            multiplier = resolved.multiplier,
            rule = ?resolved.winning_rule(),
            "Resolved category boost"
        );
        resolved
    }

    /// Effective boost for every category, in table order.
    pub fn resolve_all(&self, context: &ResolveContext) -> Vec<ResolvedBoost> {
        self.weights
            .iter()
            .map(|category| self.resolve_category(category, context))
            .collect()
    }

    /// Resolve one category and record a verdict for every rule.
    pub fn resolve_with_trace(
        &self,
        category: &str,
        context: &ResolveContext,
    ) -> Result<ResolutionTrace, BoostError> {
        let category = self.category(category)?;

        let mut resolved = base_boost(category);
        let mut verdicts = Vec::with_capacity(self.rules.len());

        for rule in self.precedence_order() {
            let outcome = match first_mismatch(rule, context) {
                Some(mismatch) => mismatch,
                None => match (rule_boost(rule, &category.name), resolved.winning_rule()) {
                    (None, _) => RuleOutcome::NoBoostForCategory,
                    (Some(_), Some(winner)) => RuleOutcome::Shadowed { by: winner },
                    (Some(boost), None) => {
                        resolved = ResolvedBoost {
                            category: category.name.clone(),
                            multiplier: boost,
                            price_preference: rule.targets.price_preference,
                            source: BoostSource::Rule {
                                id: rule.id,
                                name: rule.name.clone(),
                            },
                        };
                        RuleOutcome::Applied { boost }
                    }
                },
            };

            verdicts.push(RuleVerdict {
                rule_id: rule.id,
                rule_name: rule.name.clone(),
                priority: rule.priority,
                outcome,
            });
        }

        Ok(ResolutionTrace {
            resolved,
            context: context.clone(),
            base_weight: category.boost_weight,
            verdicts,
        })
    }
}

fn base_boost(category: &Category) -> ResolvedBoost {
    ResolvedBoost {
        category: category.name.clone(),
        multiplier: category.boost_weight,
        price_preference: PricePreference::None,
        source: BoostSource::BaseWeight,
    }
}

/// Configuration for the ranking stage.
#[derive(Debug, Clone, Default)]
pub struct RerankConfig {
    /// Boost for products whose category is not in the weight table.
    /// `None` drops such products.
    pub unknown_category_boost: Option<f32>,
}

/// Apply resolved category boosts to product scores and sort.
///
/// Products are ordered by boosted score descending. Equal scores are
/// grouped by price preference (`Lower`, then `Higher`, then none); within
/// a group, `Lower` puts cheaper products first, `Higher` dearer ones
/// first, and `None` keeps input order.
pub fn rerank_products(
    resolver: &RuleResolver<'_>,
    context: &ResolveContext,
    products: Vec<ProductCandidate>,
    config: &RerankConfig,
) -> Vec<RankedProduct> {
    let mut cache: HashMap<String, Option<(f32, PricePreference)>> = HashMap::new();

    let mut ranked: Vec<RankedProduct> = products
        .into_iter()
        .filter_map(|product| {
            let resolved = *cache.entry(product.category.clone()).or_insert_with(|| {
                match resolver.resolve(&product.category, context) {
                    Ok(r) => Some((r.multiplier, r.price_preference)),
                    Err(_) => config
                        .unknown_category_boost
                        .map(|boost| (boost, PricePreference::None)),
                }
            });

            let Some((boost, price_preference)) = resolved else {
                tracing::warn!(
                    sku = %product.sku,
                    category = %product.category,
                    "Dropping product with unknown category"
                );
                return None;
            };

            Some(RankedProduct {
                score: product.base_score * boost,
                boost,
                price_preference,
                product,
            })
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| {
                preference_rank(a.price_preference).cmp(&preference_rank(b.price_preference))
            })
            .then_with(|| price_order(a, b))
    });

    ranked
}

fn preference_rank(preference: PricePreference) -> u8 {
    match preference {
        PricePreference::Lower => 0,
        PricePreference::Higher => 1,
        PricePreference::None => 2,
    }
}

/// Price order between two products sharing a price preference.
fn price_order(a: &RankedProduct, b: &RankedProduct) -> Ordering {
    let cheaper_first = a.product.price.total_cmp(&b.product.price);
    match a.price_preference {
        PricePreference::Lower => cheaper_first,
        PricePreference::Higher => cheaper_first.reverse(),
        PricePreference::None => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use boostflow_model::{CategoryId, DateWindow, RuleDraft, RuleId};
    use boostflow_store::fixtures::seed_categories;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn weights() -> CategoryWeightTable {
        CategoryWeightTable::from_categories(seed_categories()).unwrap()
    }

    /// R1: all routes, Economy, priority 2, Electronics 1.5.
    /// R2: DXB→CDG, every cabin, priority 1, Electronics 1.8.
    fn scenario_rules() -> CustomRuleSet {
        let mut rules = CustomRuleSet::new();
        rules
            .create(
                RuleDraft::new("R1")
                    .with_cabins(["Economy"])
                    .with_priority(2)
                    .with_boost("Electronics", 1.5),
            )
            .unwrap();
        rules
            .create(
                RuleDraft::new("R2")
                    .with_route("DXB", "CDG")
                    .with_priority(1)
                    .with_boost("Electronics", 1.8)
                    .with_price_preference(PricePreference::Higher),
            )
            .unwrap();
        rules
    }

    fn economy_on(from: &str, to: &str) -> ResolveContext {
        ResolveContext::new()
            .with_route(from, to)
            .with_cabin("Economy")
            .on(date(2025, 1, 20))
    }

    #[test]
    fn test_lower_priority_number_wins() {
        let weights = weights();
        let rules = scenario_rules();
        let resolver = RuleResolver::new(&weights, &rules);

        let resolved = resolver
            .resolve("Electronics", &economy_on("DXB", "CDG"))
            .unwrap();
        assert_eq!(resolved.multiplier, 1.8);
        assert_eq!(resolved.winning_rule(), Some(RuleId(2)));
        assert_eq!(resolved.price_preference, PricePreference::Higher);

        let resolved = resolver
            .resolve("Electronics", &economy_on("DXB", "LHR"))
            .unwrap();
        assert_eq!(resolved.multiplier, 1.5);
        assert_eq!(resolved.winning_rule(), Some(RuleId(1)));
    }

    #[test]
    fn test_route_is_directional() {
        let weights = weights();
        let rules = scenario_rules();
        let resolver = RuleResolver::new(&weights, &rules);

        let resolved = resolver
            .resolve("Electronics", &economy_on("CDG", "DXB"))
            .unwrap();
        assert_eq!(resolved.winning_rule(), Some(RuleId(1)));
    }

    #[test]
    fn test_priority_tie_goes_to_earlier_rule() {
        let weights = weights();
        let mut rules = CustomRuleSet::new();
        let a = rules
            .create(RuleDraft::new("A").with_priority(2).with_boost("Accessories", 1.4))
            .unwrap();
        rules
            .create(RuleDraft::new("B").with_priority(2).with_boost("Accessories", 0.6))
            .unwrap();
        let resolver = RuleResolver::new(&weights, &rules);

        let resolved = resolver
            .resolve("Accessories", &ResolveContext::new())
            .unwrap();
        assert_eq!(resolved.multiplier, 1.4);
        assert_eq!(resolved.winning_rule(), Some(a));
    }

    #[test]
    fn test_expired_window_falls_back_to_base() {
        let mut weights = weights();
        weights.set_weight(&CategoryId::from("4"), 0.9).unwrap();
        let mut rules = CustomRuleSet::new();
        rules
            .create(
                RuleDraft::new("Seasonal Snacks")
                    .with_window(DateWindow::between(date(2025, 2, 1), date(2025, 2, 14)))
                    .with_boost("Snacks & Drinks", 1.6),
            )
            .unwrap();
        let resolver = RuleResolver::new(&weights, &rules);

        let context = ResolveContext::new().on(date(2025, 3, 1));
        let resolved = resolver.resolve("Snacks & Drinks", &context).unwrap();
        assert_eq!(resolved.multiplier, 0.9);
        assert_eq!(resolved.source, BoostSource::BaseWeight);
        assert_eq!(resolved.price_preference, PricePreference::None);

        let inside = ResolveContext::new().on(date(2025, 2, 14));
        assert_eq!(resolver.resolve("Snacks & Drinks", &inside).unwrap().multiplier, 1.6);
    }

    #[test]
    fn test_missing_date_skips_dated_rules() {
        let weights = weights();
        let mut rules = CustomRuleSet::new();
        rules
            .create(
                RuleDraft::new("Dated")
                    .with_priority(1)
                    .with_window(DateWindow::between(date(2025, 1, 1), date(2030, 1, 1)))
                    .with_boost("Electronics", 0.5),
            )
            .unwrap();
        rules
            .create(RuleDraft::new("Always").with_priority(2).with_boost("Electronics", 1.2))
            .unwrap();
        let resolver = RuleResolver::new(&weights, &rules);

        let resolved = resolver.resolve("Electronics", &ResolveContext::new()).unwrap();
        assert_eq!(resolved.multiplier, 1.2);
    }

    #[test]
    fn test_disabled_rule_excluded_but_kept() {
        let weights = weights();
        let mut rules = scenario_rules();
        rules.set_enabled(RuleId(2), false).unwrap();
        let resolver = RuleResolver::new(&weights, &rules);

        let resolved = resolver
            .resolve("Electronics", &economy_on("DXB", "CDG"))
            .unwrap();
        assert_eq!(resolved.winning_rule(), Some(RuleId(1)));
        assert!(rules.get(RuleId(2)).is_some());
    }

    #[test]
    fn test_rule_without_category_boost_does_not_block() {
        let weights = weights();
        let mut rules = CustomRuleSet::new();
        rules
            .create(
                RuleDraft::new("Fragrance only")
                    .with_priority(1)
                    .with_boost("Fragrance & Beauty", 1.9)
                    .with_price_preference(PricePreference::Lower),
            )
            .unwrap();
        rules
            .create(RuleDraft::new("Electronics").with_priority(3).with_boost("Electronics", 1.3))
            .unwrap();
        let resolver = RuleResolver::new(&weights, &rules);

        let resolved = resolver.resolve("Electronics", &ResolveContext::new()).unwrap();
        assert_eq!(resolved.multiplier, 1.3);
        assert_eq!(resolved.price_preference, PricePreference::None);
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let weights = weights();
        let rules = scenario_rules();
        let resolver = RuleResolver::new(&weights, &rules);
        let context = economy_on("DXB", "CDG");

        let first = resolver.resolve("Electronics", &context).unwrap();
        let second = resolver.resolve("Electronics", &context).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_unknown_category() {
        let weights = weights();
        let rules = scenario_rules();
        let resolver = RuleResolver::new(&weights, &rules);

        assert_eq!(
            resolver.resolve("Liquor", &ResolveContext::new()),
            Err(BoostError::InvalidCategory("Liquor".to_string()))
        );
    }

    #[test]
    fn test_resolve_all_covers_table() {
        let weights = weights();
        let rules = scenario_rules();
        let resolver = RuleResolver::new(&weights, &rules);

        let all = resolver.resolve_all(&economy_on("DXB", "CDG"));
        assert_eq!(all.len(), 8);
        assert_eq!(all[1].category, "Electronics");
        assert_eq!(all[1].multiplier, 1.8);
        assert!(all
            .iter()
            .filter(|r| r.category != "Electronics")
            .all(|r| r.source == BoostSource::BaseWeight));
    }

    #[test]
    fn test_trace_agrees_with_resolve() {
        let weights = weights();
        let mut rules = scenario_rules();
        rules
            .create(RuleDraft::new("Off").with_priority(1).disabled())
            .unwrap();
        let resolver = RuleResolver::new(&weights, &rules);
        let context = economy_on("DXB", "CDG");

        let trace = resolver.resolve_with_trace("Electronics", &context).unwrap();
        assert_eq!(trace.resolved, resolver.resolve("Electronics", &context).unwrap());

        let outcomes: Vec<_> = trace
            .verdicts
            .iter()
            .map(|v| (v.rule_id, v.outcome.clone()))
            .collect();
        assert_eq!(
            outcomes,
            vec![
                (RuleId(2), RuleOutcome::Applied { boost: 1.8 }),
                (RuleId(3), RuleOutcome::Disabled),
                (RuleId(1), RuleOutcome::Shadowed { by: RuleId(2) }),
            ]
        );
    }

    #[test]
    fn test_rerank_applies_boosts() {
        let weights = weights();
        let rules = scenario_rules();
        let resolver = RuleResolver::new(&weights, &rules);

        let products = vec![
            ProductCandidate::new("PERF-01", "Fragrance & Beauty", 1.0),
            ProductCandidate::new("HEAD-02", "Electronics", 0.7),
            ProductCandidate::new("MYST-03", "Liquor", 5.0),
        ];
        let ranked = rerank_products(
            &resolver,
            &economy_on("DXB", "CDG"),
            products,
            &RerankConfig::default(),
        );

        let skus: Vec<_> = ranked.iter().map(|r| r.product.sku.as_str()).collect();
        assert_eq!(skus, vec!["HEAD-02", "PERF-01"]);
        assert!((ranked[0].score - 0.7 * 1.8).abs() < 1e-6);
    }

    #[test]
    fn test_rerank_higher_preference_puts_dearer_first() {
        let weights = weights();
        let rules = scenario_rules();
        let resolver = RuleResolver::new(&weights, &rules);

        let products = vec![
            ProductCandidate::new("CHEAP", "Electronics", 1.0).with_price(49.0),
            ProductCandidate::new("PRICEY", "Electronics", 1.0).with_price(899.0),
        ];
        let ranked = rerank_products(
            &resolver,
            &economy_on("DXB", "CDG"),
            products,
            &RerankConfig::default(),
        );
        assert_eq!(ranked[0].product.sku, "PRICEY");
    }

    #[test]
    fn test_rerank_ties_with_mixed_preferences() {
        let weights = weights();
        let mut rules = CustomRuleSet::new();
        rules
            .create(
                RuleDraft::new("Cheap electronics")
                    .with_boost("Electronics", 1.0)
                    .with_price_preference(PricePreference::Lower),
            )
            .unwrap();
        let resolver = RuleResolver::new(&weights, &rules);

        // Equal scores throughout; electronics prices descend so input
        // order is the reverse of the expected order.
        let mut products = Vec::new();
        for i in 0..40 {
            products.push(
                ProductCandidate::new(format!("ELEC-{i}"), "Electronics", 1.0)
                    .with_price((39 - i) as f32),
            );
            products.push(
                ProductCandidate::new(format!("ACC-{i}"), "Accessories", 1.0)
                    .with_price(i as f32),
            );
        }

        let ranked = rerank_products(
            &resolver,
            &ResolveContext::new(),
            products,
            &RerankConfig::default(),
        );
        assert_eq!(ranked.len(), 80);

        let electronics: Vec<f32> = ranked[..40].iter().map(|r| r.product.price).collect();
        let expected: Vec<f32> = (0..40).map(|p| p as f32).collect();
        assert_eq!(electronics, expected);
        assert!(ranked[..40]
            .iter()
            .all(|r| r.price_preference == PricePreference::Lower));

        // No preference: input order is kept.
        let accessories: Vec<&str> = ranked[40..].iter().map(|r| r.product.sku.as_str()).collect();
        let expected: Vec<String> = (0..40).map(|i| format!("ACC-{i}")).collect();
        assert_eq!(accessories, expected);
    }

    #[test]
    fn test_rerank_keeps_unknown_with_configured_boost() {
        let weights = weights();
        let rules = CustomRuleSet::new();
        let resolver = RuleResolver::new(&weights, &rules);
        let config = RerankConfig {
            unknown_category_boost: Some(1.0),
        };

        let ranked = rerank_products(
            &resolver,
            &ResolveContext::new(),
            vec![ProductCandidate::new("MYST-03", "Liquor", 2.0)],
            &config,
        );
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].score, 2.0);
    }
}
