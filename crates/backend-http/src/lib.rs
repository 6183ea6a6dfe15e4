//! Merchant settings service backends.
//!
//! Provides the `SettingsBackend` trait, its HTTP implementation and an
//! in-memory implementation. The stores persist through this trait so the
//! boost model stays independent of where settings actually live.

use std::collections::{HashMap, VecDeque};
use std::future::Future;

use boostflow_model::{
    BoostError, Category, MerchantSettings, Rule, RuleDraft, RuleId, WeightsUpdate, COPY_MARKER,
};
use boostflow_query::{ApiDialect, ApiOperation, Endpoint, HttpMethod, MerchantApiDialect, QueryError};
use reqwest::StatusCode;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};

/// Errors from settings backend operations.
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    /// HTTP 400, e.g. an out-of-range weight
    #[error("Request rejected: {0}")]
    Rejected(String),

    /// HTTP 409, another writer got there first
    #[error("Write conflict: {0}")]
    Conflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(#[from] QueryError),

    #[error("Backend not available")]
    Unavailable,
}

impl BackendError {
    /// Transient failures worth retrying unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Connection(_) | Self::Timeout(_) | Self::Unavailable
        )
    }
}

impl From<BackendError> for BoostError {
    fn from(err: BackendError) -> Self {
        BoostError::Persistence {
            retryable: err.is_retryable(),
            message: err.to_string(),
        }
    }
}

/// Trait for settings backends (HTTP service, in-memory, etc.)
pub trait SettingsBackend {
    /// Fetch the category table of a merchant.
    fn load_weights(
        &self,
        merchant_id: &str,
    ) -> impl Future<Output = Result<Vec<Category>, BackendError>> + Send;

    /// Persist category weights.
    fn save_weights(
        &self,
        merchant_id: &str,
        update: &WeightsUpdate,
    ) -> impl Future<Output = Result<(), BackendError>> + Send;

    /// Fetch the custom rules of a merchant.
    fn load_rules(
        &self,
        merchant_id: &str,
    ) -> impl Future<Output = Result<Vec<Rule>, BackendError>> + Send;

    /// Create a rule. The service assigns its id and returns it stored.
    fn create_rule(
        &self,
        merchant_id: &str,
        draft: &RuleDraft,
    ) -> impl Future<Output = Result<Rule, BackendError>> + Send;

    /// Copy an existing rule under a service-assigned id.
    fn duplicate_rule(
        &self,
        merchant_id: &str,
        id: RuleId,
    ) -> impl Future<Output = Result<Rule, BackendError>> + Send;

    /// Replace an existing rule.
    fn save_rule(
        &self,
        merchant_id: &str,
        rule: &Rule,
    ) -> impl Future<Output = Result<(), BackendError>> + Send;

    /// Delete a rule. Deleting a missing rule is not an error.
    fn delete_rule(
        &self,
        merchant_id: &str,
        id: RuleId,
    ) -> impl Future<Output = Result<(), BackendError>> + Send;

    /// Check if the backend is healthy.
    fn health_check(&self) -> impl Future<Output = Result<(), BackendError>> + Send;

    /// Get the backend name for logging.
    fn name(&self) -> &'static str;
}

/// HTTP settings service configuration.
#[derive(Debug, Clone)]
pub struct HttpBackendConfig {
    /// Base URL of the settings service
    pub base_url: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for HttpBackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080".to_string(),
            timeout_secs: 10,
        }
    }
}

/// Settings service reached over HTTP.
pub struct HttpBackend {
    config: HttpBackendConfig,
    client: reqwest::Client,
    dialect: MerchantApiDialect,
}

impl HttpBackend {
    /// Create a new HTTP backend.
    pub fn new(config: HttpBackendConfig) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| BackendError::Connection(e.to_string()))?;

        Ok(Self {
            config,
            client,
            dialect: MerchantApiDialect,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn request(&self, endpoint: &Endpoint) -> reqwest::RequestBuilder {
        let url = self.url(&endpoint.path);
        match endpoint.method {
            HttpMethod::Get => self.client.get(url),
            HttpMethod::Post => self.client.post(url),
            HttpMethod::Put => self.client.put(url),
            HttpMethod::Delete => self.client.delete(url),
        }
    }

    async fn send(
        &self,
        merchant_id: &str,
        op: ApiOperation,
        body: Option<serde_json::Value>,
    ) -> Result<reqwest::Response, BackendError> {
        let endpoint = self.dialect.translate(merchant_id, op)?;

        tracing::debug!(
            method = endpoint.method.as_str(),
            path = %endpoint.path,
            "Calling settings service"
        );

        let mut request = self.request(&endpoint);
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await.map_err(transport_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, body));
        }

        Ok(response)
    }
}

fn transport_error(err: reqwest::Error) -> BackendError {
    if err.is_timeout() {
        BackendError::Timeout(err.to_string())
    } else if err.is_connect() {
        BackendError::Connection(err.to_string())
    } else {
        BackendError::RequestFailed(err.to_string())
    }
}

/// Map a non-success HTTP status to a backend error.
fn status_error(status: StatusCode, body: String) -> BackendError {
    match status {
        StatusCode::BAD_REQUEST => BackendError::Rejected(body),
        StatusCode::NOT_FOUND => BackendError::NotFound(body),
        StatusCode::CONFLICT => BackendError::Conflict(body),
        StatusCode::SERVICE_UNAVAILABLE => BackendError::Unavailable,
        StatusCode::GATEWAY_TIMEOUT | StatusCode::REQUEST_TIMEOUT => BackendError::Timeout(body),
        _ => BackendError::RequestFailed(format!("HTTP {}: {}", status, body)),
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<serde_json::Value, BackendError> {
    serde_json::to_value(value).map_err(|e| BackendError::ParseError(e.to_string()))
}

impl SettingsBackend for HttpBackend {
    async fn load_weights(&self, merchant_id: &str) -> Result<Vec<Category>, BackendError> {
        self.send(merchant_id, ApiOperation::ListWeights, None)
            .await?
            .json()
            .await
            .map_err(|e| BackendError::ParseError(e.to_string()))
    }

    async fn save_weights(
        &self,
        merchant_id: &str,
        update: &WeightsUpdate,
    ) -> Result<(), BackendError> {
        let body = to_json(update)?;
        self.send(merchant_id, ApiOperation::SaveWeights, Some(body))
            .await?;
        Ok(())
    }

    async fn load_rules(&self, merchant_id: &str) -> Result<Vec<Rule>, BackendError> {
        self.send(merchant_id, ApiOperation::ListRules, None)
            .await?
            .json()
            .await
            .map_err(|e| BackendError::ParseError(e.to_string()))
    }

    async fn create_rule(&self, merchant_id: &str, draft: &RuleDraft) -> Result<Rule, BackendError> {
        let body = to_json(draft)?;
        self.send(merchant_id, ApiOperation::CreateRule, Some(body))
            .await?
            .json()
            .await
            .map_err(|e| BackendError::ParseError(e.to_string()))
    }

    async fn duplicate_rule(&self, merchant_id: &str, id: RuleId) -> Result<Rule, BackendError> {
        self.send(merchant_id, ApiOperation::DuplicateRule(id), None)
            .await?
            .json()
            .await
            .map_err(|e| BackendError::ParseError(e.to_string()))
    }

    async fn save_rule(&self, merchant_id: &str, rule: &Rule) -> Result<(), BackendError> {
        let body = to_json(rule)?;
        self.send(merchant_id, ApiOperation::UpdateRule(rule.id), Some(body))
            .await?;
        Ok(())
    }

    async fn delete_rule(&self, merchant_id: &str, id: RuleId) -> Result<(), BackendError> {
        match self.send(merchant_id, ApiOperation::DeleteRule(id), None).await {
            Ok(_) | Err(BackendError::NotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn health_check(&self) -> Result<(), BackendError> {
        let response = self
            .client
            .get(self.url("/health"))
            .send()
            .await
            .map_err(transport_error)?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(BackendError::Unavailable)
        }
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

/// Settings held in process memory, keyed by merchant id.
///
/// Failures queued with [`MemoryBackend::fail_next`] are returned by the
/// next write calls in order. Writes to an unknown merchant fail with
/// `NotFound`.
#[derive(Default)]
pub struct MemoryBackend {
    merchants: RwLock<HashMap<String, StoredMerchant>>,
    failures: Mutex<VecDeque<BackendError>>,
}

struct StoredMerchant {
    settings: MerchantSettings,
    next_rule_id: u64,
}

impl StoredMerchant {
    fn new(settings: MerchantSettings) -> Self {
        let next_rule_id = settings.rules.iter().map(|r| r.id.0).max().unwrap_or(0) + 1;
        Self {
            settings,
            next_rule_id,
        }
    }

    fn allocate_rule_id(&mut self) -> RuleId {
        let id = RuleId(self.next_rule_id);
        self.next_rule_id += 1;
        id
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a backend pre-populated with one merchant.
    pub fn with_settings(settings: MerchantSettings) -> Self {
        let mut merchants = HashMap::new();
        merchants.insert(settings.merchant_id.clone(), StoredMerchant::new(settings));
        Self {
            merchants: RwLock::new(merchants),
            failures: Mutex::default(),
        }
    }

    /// Make the next write fail with `err`.
    pub async fn fail_next(&self, err: BackendError) {
        self.failures.lock().await.push_back(err);
    }

    /// Snapshot of what is stored for a merchant.
    pub async fn settings(&self, merchant_id: &str) -> Option<MerchantSettings> {
        self.merchants
            .read()
            .await
            .get(merchant_id)
            .map(|m| m.settings.clone())
    }

    async fn injected_failure(&self) -> Result<(), BackendError> {
        match self.failures.lock().await.pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

fn unknown_merchant(merchant_id: &str) -> BackendError {
    BackendError::NotFound(format!("merchant {}", merchant_id))
}

fn today() -> chrono::NaiveDate {
    chrono::Utc::now().date_naive()
}

impl SettingsBackend for MemoryBackend {
    async fn load_weights(&self, merchant_id: &str) -> Result<Vec<Category>, BackendError> {
        self.merchants
            .read()
            .await
            .get(merchant_id)
            .map(|m| m.settings.categories.clone())
            .ok_or_else(|| unknown_merchant(merchant_id))
    }

    async fn save_weights(
        &self,
        merchant_id: &str,
        update: &WeightsUpdate,
    ) -> Result<(), BackendError> {
        self.injected_failure().await?;

        let mut merchants = self.merchants.write().await;
        let settings = &mut merchants
            .get_mut(merchant_id)
            .ok_or_else(|| unknown_merchant(merchant_id))?
            .settings;

        // Unknown ids are rejected before anything is written.
        for entry in &update.weights {
            if !settings.categories.iter().any(|c| c.id == entry.category_id) {
                return Err(BackendError::Rejected(format!(
                    "unknown category {}",
                    entry.category_id
                )));
            }
        }
        for entry in &update.weights {
            if let Some(category) = settings
                .categories
                .iter_mut()
                .find(|c| c.id == entry.category_id)
            {
                category.boost_weight = entry.boost_weight;
            }
        }
        Ok(())
    }

    async fn load_rules(&self, merchant_id: &str) -> Result<Vec<Rule>, BackendError> {
        self.merchants
            .read()
            .await
            .get(merchant_id)
            .map(|m| m.settings.rules.clone())
            .ok_or_else(|| unknown_merchant(merchant_id))
    }

    async fn create_rule(&self, merchant_id: &str, draft: &RuleDraft) -> Result<Rule, BackendError> {
        self.injected_failure().await?;

        let mut merchants = self.merchants.write().await;
        let merchant = merchants
            .get_mut(merchant_id)
            .ok_or_else(|| unknown_merchant(merchant_id))?;

        let id = merchant.allocate_rule_id();
        let rule = Rule::from_draft(id, draft.clone(), today());
        merchant.settings.rules.push(rule.clone());
        Ok(rule)
    }

    async fn duplicate_rule(&self, merchant_id: &str, id: RuleId) -> Result<Rule, BackendError> {
        self.injected_failure().await?;

        let mut merchants = self.merchants.write().await;
        let merchant = merchants
            .get_mut(merchant_id)
            .ok_or_else(|| unknown_merchant(merchant_id))?;

        let mut copy = merchant
            .settings
            .rules
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .ok_or_else(|| BackendError::NotFound(format!("rule {}", id)))?;
        copy.id = merchant.allocate_rule_id();
        copy.name.push_str(COPY_MARKER);
        merchant.settings.rules.push(copy.clone());
        Ok(copy)
    }

    async fn save_rule(&self, merchant_id: &str, rule: &Rule) -> Result<(), BackendError> {
        self.injected_failure().await?;

        let mut merchants = self.merchants.write().await;
        let merchant = merchants
            .get_mut(merchant_id)
            .ok_or_else(|| unknown_merchant(merchant_id))?;
        let existing = merchant
            .settings
            .rules
            .iter_mut()
            .find(|r| r.id == rule.id)
            .ok_or_else(|| BackendError::NotFound(format!("rule {}", rule.id)))?;
        *existing = rule.clone();
        Ok(())
    }

    async fn delete_rule(&self, merchant_id: &str, id: RuleId) -> Result<(), BackendError> {
        self.injected_failure().await?;

        if let Some(merchant) = self.merchants.write().await.get_mut(merchant_id) {
            merchant.settings.rules.retain(|r| r.id != id);
        }
        Ok(())
    }

    async fn health_check(&self) -> Result<(), BackendError> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
