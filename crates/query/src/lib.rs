//! Request translation for the merchant settings API.
//!
//! Converts abstract operations into backend-specific requests:
//! - Merchant REST endpoints (`/merchants/{id}/...`)
//! - Operator-supplied resolution queries (route/cabin/date strings)

use boostflow_features::normalize_airport_code;
use boostflow_model::{ResolveContext, Route, RuleId};
use chrono::NaiveDate;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QueryError {
    #[error("Empty merchant id")]
    EmptyMerchant,
    #[error("Invalid merchant id: {0}")]
    InvalidMerchant(String),
    #[error("Empty category")]
    EmptyCategory,
    #[error("Invalid route: {0} (expected e.g. DXB-CDG)")]
    InvalidRoute(String),
    #[error("Invalid date: {0} (expected YYYY-MM-DD)")]
    InvalidDate(String),
}

/// Operations exposed by the merchant settings service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiOperation {
    ListWeights,
    SaveWeights,
    ListRules,
    CreateRule,
    UpdateRule(RuleId),
    DeleteRule(RuleId),
    DuplicateRule(RuleId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }
}

/// A method + path pair, relative to the service base URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub method: HttpMethod,
    pub path: String,
}

/// Trait for translating operations to a backend's request syntax.
pub trait ApiDialect {
    /// The output type (usually an endpoint or a structured request)
    type Output;

    /// Translate an operation on one merchant to this dialect
    fn translate(&self, merchant_id: &str, op: ApiOperation) -> Result<Self::Output, QueryError>;
}

/// REST dialect of the merchant settings service.
#[derive(Debug, Default)]
pub struct MerchantApiDialect;

impl ApiDialect for MerchantApiDialect {
    type Output = Endpoint;

    fn translate(&self, merchant_id: &str, op: ApiOperation) -> Result<Endpoint, QueryError> {
        let merchant = check_merchant_id(merchant_id)?;
        let base = format!("/merchants/{}", merchant);

        let (method, path) = match op {
            ApiOperation::ListWeights => (HttpMethod::Get, format!("{}/category-weights", base)),
            ApiOperation::SaveWeights => (HttpMethod::Put, format!("{}/category-weights", base)),
            ApiOperation::ListRules => (HttpMethod::Get, format!("{}/rules", base)),
            ApiOperation::CreateRule => (HttpMethod::Post, format!("{}/rules", base)),
            ApiOperation::UpdateRule(id) => (HttpMethod::Put, format!("{}/rules/{}", base, id)),
            ApiOperation::DeleteRule(id) => (HttpMethod::Delete, format!("{}/rules/{}", base, id)),
            ApiOperation::DuplicateRule(id) => {
                (HttpMethod::Post, format!("{}/rules/{}:duplicate", base, id))
            }
        };

        Ok(Endpoint { method, path })
    }
}

/// Merchant ids end up in URL paths; only a safe character set is allowed.
fn check_merchant_id(merchant_id: &str) -> Result<&str, QueryError> {
    let trimmed = merchant_id.trim();
    if trimmed.is_empty() {
        return Err(QueryError::EmptyMerchant);
    }
    let safe = trimmed
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !safe {
        return Err(QueryError::InvalidMerchant(merchant_id.to_string()));
    }
    Ok(trimmed)
}

/// Parse a route such as `DXB-CDG`, `DXB>CDG` or `DXB→CDG`.
pub fn parse_route(text: &str) -> Result<Route, QueryError> {
    let invalid = || QueryError::InvalidRoute(text.to_string());

    let mut parts = text.split(['-', '>', '→']);
    let from = parts.next().ok_or_else(invalid)?;
    let to = parts.next().ok_or_else(invalid)?;
    if parts.next().is_some() {
        return Err(invalid());
    }

    let from = normalize_airport_code(from);
    let to = normalize_airport_code(to);
    let valid = |code: &str| !code.is_empty() && code.chars().all(|c| c.is_ascii_alphanumeric());
    if !valid(&from) || !valid(&to) {
        return Err(invalid());
    }

    Ok(Route::new(from, to))
}

/// Parse an ISO calendar date.
pub fn parse_date(text: &str) -> Result<NaiveDate, QueryError> {
    NaiveDate::parse_from_str(text.trim(), "%Y-%m-%d")
        .map_err(|_| QueryError::InvalidDate(text.to_string()))
}

/// A resolution request assembled from loose operator input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveQuery {
    pub category: String,
    pub context: ResolveContext,
}

impl ResolveQuery {
    pub fn parse(
        category: &str,
        route: Option<&str>,
        cabin: Option<&str>,
        date: Option<&str>,
    ) -> Result<Self, QueryError> {
        let category = category.trim();
        if category.is_empty() {
            return Err(QueryError::EmptyCategory);
        }

        Ok(Self {
            category: category.to_string(),
            context: parse_context(route, cabin, date)?,
        })
    }
}

/// Assemble a resolution context; blank cabins count as absent.
pub fn parse_context(
    route: Option<&str>,
    cabin: Option<&str>,
    date: Option<&str>,
) -> Result<ResolveContext, QueryError> {
    Ok(ResolveContext {
        route: route.map(parse_route).transpose()?,
        cabin: cabin
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string),
        date: date.map(parse_date).transpose()?,
    })
}
