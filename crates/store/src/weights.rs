//! Per-category boost multipliers.

use boostflow_backend_http::SettingsBackend;
use boostflow_features::check_weight;
use boostflow_model::{
    BoostError, BoostLevel, Category, CategoryId, SaveContext, WeightEntry, WeightsUpdate,
    NEUTRAL_WEIGHT,
};

/// One boost multiplier per category, plus the global bulk-set scalar.
///
/// The dirty flag tracks mutations that have not been confirmed by a save.
#[derive(Debug, Clone)]
pub struct CategoryWeightTable {
    categories: Vec<Category>,
    global_boost: f32,
    unsaved: bool,
}

impl Default for CategoryWeightTable {
    fn default() -> Self {
        Self::new()
    }
}

impl CategoryWeightTable {
    pub fn new() -> Self {
        Self {
            categories: Vec::new(),
            global_boost: NEUTRAL_WEIGHT,
            unsaved: false,
        }
    }

    /// Build a table from a seeded or persisted taxonomy.
    pub fn from_categories(categories: Vec<Category>) -> Result<Self, BoostError> {
        let mut table = Self::new();
        for category in categories {
            table.add_category(category)?;
        }
        Ok(table)
    }

    /// Add a category. Ids and names must be unique.
    pub fn add_category(&mut self, category: Category) -> Result<(), BoostError> {
        if category.name.trim().is_empty() {
            return Err(BoostError::Validation("category name is empty".to_string()));
        }
        if self.get(&category.id).is_some() {
            return Err(BoostError::Validation(format!(
                "duplicate category id {}",
                category.id
            )));
        }
        if self.get_by_name(&category.name).is_some() {
            return Err(BoostError::Validation(format!(
                "duplicate category name {}",
                category.name
            )));
        }
        let default_weight = check_weight("defaultWeight", category.default_weight)?;
        let boost_weight = check_weight("boostWeight", category.boost_weight)?;

        self.categories.push(Category {
            boost_weight,
            default_weight,
            ..category
        });
        Ok(())
    }

    pub fn get(&self, id: &CategoryId) -> Option<&Category> {
        self.categories.iter().find(|c| &c.id == id)
    }

    pub fn get_by_name(&self, name: &str) -> Option<&Category> {
        self.categories.iter().find(|c| c.name == name)
    }

    /// Categories in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Category> {
        self.categories.iter()
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    pub fn global_boost(&self) -> f32 {
        self.global_boost
    }

    pub(crate) fn restore_global_boost(&mut self, value: f32) -> Result<(), BoostError> {
        self.global_boost = check_weight("globalBoost", value)?;
        Ok(())
    }

    /// Label for a category's current weight.
    pub fn level(&self, id: &CategoryId) -> Option<BoostLevel> {
        self.get(id).map(Category::level)
    }

    /// Set one category's multiplier.
    pub fn set_weight(&mut self, id: &CategoryId, value: f32) -> Result<(), BoostError> {
        let value = check_weight("boostWeight", value)?;
        let category = self.find_mut(id)?;
        category.boost_weight = value;
        self.unsaved = true;

        tracing::debug!(category = %id, weight = value, "Set category weight");
        Ok(())
    }

    /// Restore one category to its default weight.
    ///
    /// The table is clean afterwards only if every category is back at its
    /// default.
    pub fn reset_one(&mut self, id: &CategoryId) -> Result<(), BoostError> {
        let category = self.find_mut(id)?;
        category.boost_weight = category.default_weight;
        self.unsaved = self.differs_from_defaults();

        tracing::debug!(category = %id, "Reset category weight");
        Ok(())
    }

    /// Restore every category and the global boost to their defaults.
    pub fn reset_all(&mut self) {
        for category in &mut self.categories {
            category.boost_weight = category.default_weight;
        }
        self.global_boost = NEUTRAL_WEIGHT;
        self.unsaved = false;

        tracing::debug!(categories = self.categories.len(), "Reset all category weights");
    }

    /// Overwrite every category's multiplier with `value`.
    ///
    /// This is a bulk set: per-category differences are discarded.
    pub fn apply_global(&mut self, value: f32) -> Result<(), BoostError> {
        let value = check_weight("globalBoost", value)?;
        self.global_boost = value;
        for category in &mut self.categories {
            category.boost_weight = value;
        }
        self.unsaved = true;

        tracing::debug!(weight = value, "Applied global boost");
        Ok(())
    }

    /// True while a mutation has not been confirmed by a save.
    pub fn is_dirty(&self) -> bool {
        self.unsaved
    }

    /// True if any category differs from its default weight.
    pub fn differs_from_defaults(&self) -> bool {
        self.categories.iter().any(|c| !c.is_at_default())
    }

    /// The request body that persists the current weights.
    pub fn to_update(&self, context: Option<SaveContext>) -> WeightsUpdate {
        WeightsUpdate {
            weights: self
                .categories
                .iter()
                .map(|c| WeightEntry {
                    category_id: c.id.clone(),
                    boost_weight: c.boost_weight,
                })
                .collect(),
            context,
        }
    }

    /// Persist the current weights.
    ///
    /// On failure the table stays dirty and the backend error is returned as
    /// a `Persistence` error.
    pub async fn save<B: SettingsBackend>(
        &mut self,
        backend: &B,
        merchant_id: &str,
        context: Option<SaveContext>,
    ) -> Result<(), BoostError> {
        let update = self.to_update(context);

        if let Err(e) = backend.save_weights(merchant_id, &update).await {
            tracing::warn!(
                merchant = merchant_id,
                backend = backend.name(),
                error = %e,
                "Saving category weights failed"
            );
            return Err(e.into());
        }

        self.unsaved = false;
        tracing::info!(
            merchant = merchant_id,
            categories = update.weights.len(),
            "Saved category weights"
        );
        Ok(())
    }

    /// Replace the table with the merchant's persisted taxonomy.
    pub async fn load<B: SettingsBackend>(
        backend: &B,
        merchant_id: &str,
    ) -> Result<Self, BoostError> {
        let categories = backend.load_weights(merchant_id).await?;
        Self::from_categories(categories)
    }

    fn find_mut(&mut self, id: &CategoryId) -> Result<&mut Category, BoostError> {
        self.categories
            .iter_mut()
            .find(|c| &c.id == id)
            .ok_or_else(|| BoostError::category_not_found(id))
    }
}
