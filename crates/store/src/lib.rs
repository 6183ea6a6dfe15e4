//! In-memory stores for category weights and custom rules.
//!
//! `CategoryWeightTable` and `CustomRuleSet` are independent leaf stores;
//! `MerchantStore` bundles both for one merchant and converts to and from
//! the `MerchantSettings` snapshot used for persistence.

pub mod fixtures;
mod rules;
mod weights;

pub use rules::CustomRuleSet;
pub use weights::CategoryWeightTable;

use boostflow_backend_http::SettingsBackend;
use boostflow_model::{BoostError, MerchantSettings};

/// Weights and rules of a single merchant.
#[derive(Debug, Clone)]
pub struct MerchantStore {
    pub merchant_id: String,
    pub weights: CategoryWeightTable,
    pub rules: CustomRuleSet,
}

impl MerchantStore {
    pub fn from_settings(settings: MerchantSettings) -> Result<Self, BoostError> {
        let mut weights = CategoryWeightTable::from_categories(settings.categories)?;
        weights.restore_global_boost(settings.global_boost)?;
        let rules = CustomRuleSet::from_rules(settings.rules)?;

        Ok(Self {
            merchant_id: settings.merchant_id,
            weights,
            rules,
        })
    }

    pub fn to_settings(&self) -> MerchantSettings {
        MerchantSettings {
            merchant_id: self.merchant_id.clone(),
            categories: self.weights.iter().cloned().collect(),
            global_boost: self.weights.global_boost(),
            rules: self.rules.iter().cloned().collect(),
        }
    }

    /// Fetch both stores for a merchant from a settings backend.
    pub async fn load<B: SettingsBackend>(
        backend: &B,
        merchant_id: &str,
    ) -> Result<Self, BoostError> {
        let weights = CategoryWeightTable::load(backend, merchant_id).await?;
        let rules = CustomRuleSet::load(backend, merchant_id).await?;
        tracing::info!(
            merchant = merchant_id,
            backend = backend.name(),
            categories = weights.len(),
            rules = rules.len(),
            "Loaded merchant settings"
        );

        Ok(Self {
            merchant_id: merchant_id.to_string(),
            weights,
            rules,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use boostflow_backend_http::MemoryBackend;
    use boostflow_model::RuleId;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_settings_round_trip() {
        let mut settings = fixtures::demo_settings();
        settings.global_boost = 1.2;
        let store = MerchantStore::from_settings(settings.clone()).unwrap();
        assert_eq!(store.weights.global_boost(), 1.2);
        assert!(!store.weights.is_dirty());
        assert_eq!(store.to_settings(), settings);
    }

    #[test]
    fn test_settings_reject_bad_global_boost() {
        let mut settings = fixtures::demo_settings();
        settings.global_boost = 4.0;
        assert!(matches!(
            MerchantStore::from_settings(settings),
            Err(BoostError::OutOfRange { .. })
        ));
    }

    #[tokio::test]
    async fn test_load_from_backend() {
        let backend = MemoryBackend::with_settings(fixtures::demo_settings());
        let store = MerchantStore::load(&backend, fixtures::DEMO_MERCHANT_ID)
            .await
            .unwrap();
        assert_eq!(store.weights.len(), 8);
        assert_eq!(store.rules.len(), 3);
        assert!(store.rules.get(RuleId(3)).is_some());

        assert!(MerchantStore::load(&backend, "unknown").await.is_err());
    }
}
