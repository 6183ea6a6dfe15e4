//! Ordered collection of custom ranking rules.

use boostflow_backend_http::SettingsBackend;
use boostflow_features::normalize_airport_code;
use boostflow_model::{BoostError, Rule, RuleDraft, RuleId, RuleScope, COPY_MARKER};
use chrono::{NaiveDate, Utc};

/// Custom rules in creation order.
///
/// Ids come from a counter that only moves forward, so an id is never
/// handed out twice even after the rule holding it is removed.
#[derive(Debug, Clone)]
pub struct CustomRuleSet {
    rules: Vec<Rule>,
    next_id: u64,
}

impl Default for CustomRuleSet {
    fn default() -> Self {
        Self::new()
    }
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

/// Check and normalize a draft before it touches the collection.
fn validate(mut draft: RuleDraft) -> Result<RuleDraft, BoostError> {
    if draft.priority == 0 {
        return Err(BoostError::Validation(
            "priority must be a positive integer".to_string(),
        ));
    }

    if let RuleScope::Route { from, to } = &draft.scope {
        let from = normalize_airport_code(from);
        let to = normalize_airport_code(to);
        if from.is_empty() || to.is_empty() {
            return Err(BoostError::Validation(
                "route scope needs both airport codes".to_string(),
            ));
        }
        draft.scope = RuleScope::Route { from, to };
    }

    draft.cabins = draft
        .cabins
        .into_iter()
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .collect();

    Ok(draft)
}

impl CustomRuleSet {
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            next_id: 1,
        }
    }

    /// Load a persisted collection. Ids must be unique; new ids continue
    /// after the highest loaded one.
    pub fn from_rules(mut rules: Vec<Rule>) -> Result<Self, BoostError> {
        rules.sort_by_key(|r| r.id);
        if let Some(pair) = rules.windows(2).find(|w| w[0].id == w[1].id) {
            return Err(BoostError::Validation(format!(
                "duplicate rule id {}",
                pair[0].id
            )));
        }
        if let Some(rule) = rules.iter().find(|r| r.priority == 0) {
            return Err(BoostError::Validation(format!(
                "rule {} has priority 0",
                rule.id
            )));
        }

        let next_id = rules.last().map_or(1, |r| r.id.0 + 1);
        Ok(Self { rules, next_id })
    }

    pub async fn load<B: SettingsBackend>(
        backend: &B,
        merchant_id: &str,
    ) -> Result<Self, BoostError> {
        let rules = backend.load_rules(merchant_id).await?;
        Self::from_rules(rules)
    }

    pub fn get(&self, id: RuleId) -> Option<&Rule> {
        self.rules.iter().find(|r| r.id == id)
    }

    /// Rules in creation order.
    pub fn iter(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Create a rule stamped with today's date.
    pub fn create(&mut self, draft: RuleDraft) -> Result<RuleId, BoostError> {
        self.create_on(draft, today())
    }

    /// Create a rule stamped with `date`.
    pub fn create_on(&mut self, draft: RuleDraft, date: NaiveDate) -> Result<RuleId, BoostError> {
        let draft = validate(draft)?;
        let id = self.allocate_id();
        self.rules.push(Rule::from_draft(id, draft, date));

        tracing::debug!(rule = %id, "Created rule");
        Ok(id)
    }

    /// Replace a rule's fields, keeping its id.
    pub fn update(&mut self, id: RuleId, draft: RuleDraft) -> Result<(), BoostError> {
        self.update_on(id, draft, today())
    }

    pub fn update_on(
        &mut self,
        id: RuleId,
        draft: RuleDraft,
        date: NaiveDate,
    ) -> Result<(), BoostError> {
        let index = self.index_of(id)?;
        let draft = validate(draft)?;
        self.rules[index] = Rule::from_draft(id, draft, date);

        tracing::debug!(rule = %id, "Updated rule");
        Ok(())
    }

    /// Copy a rule under a fresh id; the name gets the copy marker.
    pub fn duplicate(&mut self, id: RuleId) -> Result<RuleId, BoostError> {
        let index = self.index_of(id)?;
        let new_id = self.allocate_id();

        let mut copy = self.rules[index].clone();
        copy.id = new_id;
        copy.name.push_str(COPY_MARKER);
        self.rules.push(copy);

        tracing::debug!(rule = %id, copy = %new_id, "Duplicated rule");
        Ok(new_id)
    }

    /// Create a rule through the settings service, which assigns its id,
    /// and add the stored result.
    pub async fn create_persisted<B: SettingsBackend>(
        &mut self,
        backend: &B,
        merchant_id: &str,
        draft: RuleDraft,
    ) -> Result<RuleId, BoostError> {
        let draft = validate(draft)?;
        let rule = match backend.create_rule(merchant_id, &draft).await {
            Ok(rule) => rule,
            Err(e) => {
                tracing::warn!(
                    merchant = merchant_id,
                    backend = backend.name(),
                    error = %e,
                    "Creating rule failed"
                );
                return Err(e.into());
            }
        };
        self.adopt(rule)
    }

    /// Duplicate a rule through the settings service and add the copy.
    pub async fn duplicate_persisted<B: SettingsBackend>(
        &mut self,
        backend: &B,
        merchant_id: &str,
        id: RuleId,
    ) -> Result<RuleId, BoostError> {
        self.index_of(id)?;
        let copy = match backend.duplicate_rule(merchant_id, id).await {
            Ok(copy) => copy,
            Err(e) => {
                tracing::warn!(
                    merchant = merchant_id,
                    backend = backend.name(),
                    rule = %id,
                    error = %e,
                    "Duplicating rule failed"
                );
                return Err(e.into());
            }
        };
        self.adopt(copy)
    }

    /// Add a rule whose id was assigned elsewhere; local ids continue
    /// after it.
    fn adopt(&mut self, rule: Rule) -> Result<RuleId, BoostError> {
        if self.get(rule.id).is_some() {
            return Err(BoostError::Validation(format!(
                "duplicate rule id {}",
                rule.id
            )));
        }
        let id = rule.id;
        self.next_id = self.next_id.max(id.0 + 1);
        self.rules.push(rule);

        tracing::debug!(rule = %id, "Added persisted rule");
        Ok(id)
    }

    /// Remove a rule. Returns whether it existed.
    pub fn remove(&mut self, id: RuleId) -> bool {
        let before = self.rules.len();
        self.rules.retain(|r| r.id != id);
        before != self.rules.len()
    }

    /// Remove every listed rule, ignoring unknown ids. Returns how many
    /// were removed.
    pub fn remove_many(&mut self, ids: &[RuleId]) -> usize {
        let before = self.rules.len();
        self.rules.retain(|r| !ids.contains(&r.id));
        let removed = before - self.rules.len();

        tracing::debug!(requested = ids.len(), removed, "Removed rules");
        removed
    }

    pub fn set_enabled(&mut self, id: RuleId, enabled: bool) -> Result<(), BoostError> {
        let index = self.index_of(id)?;
        self.rules[index].enabled = enabled;
        Ok(())
    }

    /// Set `enabled` on every listed rule, ignoring unknown ids. Returns how
    /// many rules were touched.
    pub fn set_enabled_many(&mut self, ids: &[RuleId], enabled: bool) -> usize {
        let mut touched = 0;
        for rule in self.rules.iter_mut().filter(|r| ids.contains(&r.id)) {
            rule.enabled = enabled;
            touched += 1;
        }
        touched
    }

    /// Flip a rule's `enabled` flag and return the new value.
    pub fn toggle(&mut self, id: RuleId) -> Result<bool, BoostError> {
        let index = self.index_of(id)?;
        let rule = &mut self.rules[index];
        rule.enabled = !rule.enabled;
        Ok(rule.enabled)
    }

    fn allocate_id(&mut self) -> RuleId {
        let id = RuleId(self.next_id);
        self.next_id += 1;
        id
    }

    fn index_of(&self, id: RuleId) -> Result<usize, BoostError> {
        self.rules
            .iter()
            .position(|r| r.id == id)
            .ok_or_else(|| BoostError::rule_not_found(id))
    }
}
