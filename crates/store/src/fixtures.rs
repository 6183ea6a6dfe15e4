//! Seed taxonomy and demo data for the duty-free catalogue.

use boostflow_model::{
    Category, DateWindow, MerchantSettings, Rule, RuleDraft, RuleId, NEUTRAL_WEIGHT,
};
use chrono::NaiveDate;

pub const DEMO_MERCHANT_ID: &str = "EDU-12345";

/// Cabin labels offered to rule editors.
pub const CABIN_CLASSES: [&str; 4] = ["Economy", "Premium Economy", "Business", "First Class"];

/// Airports served by the demo merchant (IATA code, name).
pub const AIRPORTS: [(&str, &str); 8] = [
    ("DXB", "Dubai International"),
    ("JFK", "New York JFK"),
    ("LHR", "London Heathrow"),
    ("CDG", "Paris Charles de Gaulle"),
    ("SIN", "Singapore Changi"),
    ("HND", "Tokyo Haneda"),
    ("SYD", "Sydney"),
    ("LAX", "Los Angeles"),
];

const TAXONOMY: [&str; 8] = [
    "Fragrance & Beauty",
    "Electronics",
    "Baby & Kids",
    "Snacks & Drinks",
    "Accessories",
    "Fashion & Apparel",
    "Watches & Jewelry",
    "Travel Essentials",
];

/// The fixed category taxonomy, ids "1" through "8", all neutral.
pub fn seed_categories() -> Vec<Category> {
    TAXONOMY
        .iter()
        .enumerate()
        .map(|(i, name)| Category::new((i + 1).to_string(), *name, NEUTRAL_WEIGHT))
        .collect()
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    // Literal dates below are all valid.
    NaiveDate::from_ymd_opt(y, m, d).unwrap_or_default()
}

/// Three sample rules covering a routed, a dated and a disabled rule.
pub fn demo_rules() -> Vec<Rule> {
    vec![
        Rule::from_draft(
            RuleId(1),
            RuleDraft::new("Premium Fragrance Boost - Dubai Routes")
                .with_route("DXB", "CDG")
                .with_cabins(["Business", "First Class"])
                .with_priority(1)
                .with_boost("Fragrance & Beauty", 1.8),
            date(2025, 1, 10),
        ),
        Rule::from_draft(
            RuleId(2),
            RuleDraft::new("Electronics Discount Push")
                .with_cabins(["Economy"])
                .with_window(DateWindow::between(date(2025, 1, 15), date(2025, 1, 31)))
                .with_priority(2)
                .with_boost("Electronics", 1.5),
            date(2025, 1, 8),
        ),
        Rule::from_draft(
            RuleId(3),
            RuleDraft::new("Seasonal Snacks Promotion")
                .with_route("JFK", "LHR")
                .with_cabins(["All"])
                .with_window(DateWindow::between(date(2025, 2, 1), date(2025, 2, 14)))
                .with_priority(3)
                .with_boost("Snacks & Drinks", 1.6)
                .disabled(),
            date(2025, 1, 5),
        ),
    ]
}

pub fn demo_settings() -> MerchantSettings {
    MerchantSettings {
        merchant_id: DEMO_MERCHANT_ID.to_string(),
        categories: seed_categories(),
        global_boost: NEUTRAL_WEIGHT,
        rules: demo_rules(),
    }
}
