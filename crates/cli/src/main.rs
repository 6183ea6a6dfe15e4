//! Operator CLI for category boost settings.
//!
//! Usage:
//!     boostctl resolve Electronics --route DXB-CDG --cabin Economy --explain
//!     boostctl resolve --route JFK-LHR --date 2025-02-03
//!     boostctl rerank --products products.json --route DXB-CDG
//!     boostctl --state merchant.json weights set 2 1.4
//!     boostctl --backend-url http://127.0.0.1:8080 weights save --cabin Economy
//!     boostctl rules duplicate 1

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use boostflow_backend_http::{HttpBackend, HttpBackendConfig, SettingsBackend};
use boostflow_explain::{explain_resolution, summarize_boost};
use boostflow_model::{
    CategoryId, MerchantSettings, ProductCandidate, ResolveContext, Rule, RuleDraft, RuleId,
    RuleScope, SaveContext,
};
use boostflow_query::{parse_context, parse_route, ResolveQuery};
use boostflow_rerank::{rerank_products, RerankConfig, RuleResolver};
use boostflow_store::fixtures::{demo_settings, DEMO_MERCHANT_ID};
use boostflow_store::MerchantStore;
use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "boostctl")]
#[command(about = "Inspect and edit category boost settings")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Merchant settings JSON file (built-in demo data if omitted)
    #[arg(long, global = true)]
    state: Option<PathBuf>,

    /// Settings service URL; settings are loaded from and saved to it
    #[arg(long, global = true)]
    backend_url: Option<String>,

    /// Merchant id used with the settings service
    #[arg(long, global = true, default_value = DEMO_MERCHANT_ID)]
    merchant: String,

    /// Settings service timeout in seconds
    #[arg(long, global = true, default_value = "10")]
    timeout_secs: u64,

    /// Output format
    #[arg(short, long, global = true, value_enum, default_value = "text")]
    format: OutputFormat,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Args)]
struct ContextArgs {
    /// Route as ORIGIN-DESTINATION, e.g. DXB-CDG
    #[arg(short, long)]
    route: Option<String>,

    /// Cabin class, e.g. Economy
    #[arg(short, long)]
    cabin: Option<String>,

    /// Evaluation date (YYYY-MM-DD), defaults to today
    #[arg(short, long)]
    date: Option<String>,

    /// Evaluate without a date; only always-on rules apply
    #[arg(long, conflicts_with = "date")]
    undated: bool,
}

impl ContextArgs {
    fn with_default_date(&self, mut context: ResolveContext) -> ResolveContext {
        if context.date.is_none() && !self.undated {
            context.date = Some(chrono::Utc::now().date_naive());
        }
        context
    }

    fn context(&self) -> Result<ResolveContext> {
        let context = parse_context(
            self.route.as_deref(),
            self.cabin.as_deref(),
            self.date.as_deref(),
        )?;
        Ok(self.with_default_date(context))
    }

    fn query(&self, category: &str) -> Result<ResolveQuery> {
        let mut query = ResolveQuery::parse(
            category,
            self.route.as_deref(),
            self.cabin.as_deref(),
            self.date.as_deref(),
        )?;
        query.context = self.with_default_date(query.context);
        Ok(query)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve the effective boost of one category, or of every category
    Resolve {
        /// Category name; all categories if omitted
        category: Option<String>,

        #[command(flatten)]
        context: ContextArgs,

        /// Show why each rule did or did not apply
        #[arg(long)]
        explain: bool,
    },

    /// Rank products from a JSON file by boosted score
    Rerank {
        /// Path to a JSON array of products
        #[arg(short, long)]
        products: PathBuf,

        #[command(flatten)]
        context: ContextArgs,

        /// Boost for products with unknown categories (dropped if unset)
        #[arg(long)]
        unknown_boost: Option<f32>,
    },

    /// Show or edit category weights
    Weights {
        #[command(subcommand)]
        action: Option<WeightsAction>,
    },

    /// Show or edit custom rules
    Rules {
        #[command(subcommand)]
        action: Option<RulesAction>,
    },

    /// Check settings service health
    Health,
}

#[derive(Subcommand)]
enum WeightsAction {
    /// List categories and weights
    List,
    /// Set one category's weight
    Set { category_id: String, value: f32 },
    /// Overwrite every category's weight
    Global { value: f32 },
    /// Reset one category, or all categories, to default
    Reset { category_id: Option<String> },
    /// Push current weights to the settings service
    Save {
        #[arg(long)]
        cabin: Option<String>,
        #[arg(long)]
        route: Option<String>,
    },
}

#[derive(Subcommand)]
enum RulesAction {
    /// List rules in creation order
    List,
    /// Create a rule from a JSON draft file
    Add {
        #[arg(long)]
        file: PathBuf,
    },
    /// Replace a rule's fields from a JSON draft file
    Update {
        id: u64,
        #[arg(long)]
        file: PathBuf,
    },
    /// Copy a rule under a new id
    Duplicate { id: u64 },
    /// Enable rules
    Enable { ids: Vec<u64> },
    /// Disable rules
    Disable { ids: Vec<u64> },
    /// Flip a rule's enabled flag
    Toggle { id: u64 },
    /// Delete rules
    Remove { ids: Vec<u64> },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging; stdout is reserved for command output
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("boostflow=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    if let Commands::Health = cli.command {
        return run_health(&cli).await;
    }

    let mut session = Session::open(&cli).await?;
    let format = cli.format;

    match cli.command {
        Commands::Resolve {
            category,
            context,
            explain,
        } => run_resolve(&session, category.as_deref(), &context, explain, format)?,
        Commands::Rerank {
            products,
            context,
            unknown_boost,
        } => run_rerank(&session, &products, &context, unknown_boost, format)?,
        Commands::Weights { action } => {
            run_weights(&mut session, action.unwrap_or(WeightsAction::List), format).await?
        }
        Commands::Rules { action } => {
            run_rules(&mut session, action.unwrap_or(RulesAction::List), format).await?
        }
        // Answered before any settings are loaded
        Commands::Health => {}
    }

    Ok(())
}

/// Loaded merchant state and where changes go.
struct Session {
    store: MerchantStore,
    state_path: Option<PathBuf>,
    backend: Option<HttpBackend>,
}

impl Session {
    async fn open(cli: &Cli) -> Result<Self> {
        let backend = match &cli.backend_url {
            Some(url) => Some(connect(url, cli.timeout_secs)?),
            None => None,
        };

        let store = match (&backend, &cli.state) {
            (Some(backend), _) => MerchantStore::load(backend, &cli.merchant).await?,
            (None, Some(path)) => read_state(path)?,
            (None, None) => MerchantStore::from_settings(demo_settings())?,
        };

        Ok(Self {
            store,
            state_path: cli.state.clone(),
            backend,
        })
    }

    fn resolver(&self) -> RuleResolver<'_> {
        RuleResolver::from_store(&self.store)
    }

    fn write_state(&self) -> Result<()> {
        if let Some(path) = &self.state_path {
            let json = serde_json::to_string_pretty(&self.store.to_settings())?;
            fs::write(path, json)
                .with_context(|| format!("writing state to {}", path.display()))?;
        }
        Ok(())
    }

    fn is_ephemeral(&self) -> bool {
        self.state_path.is_none() && self.backend.is_none()
    }

    async fn persist_weights(&mut self, context: Option<SaveContext>) -> Result<()> {
        if let Some(backend) = &self.backend {
            self.store
                .weights
                .save(backend, &self.store.merchant_id, context)
                .await?;
        }
        self.write_state()
    }

    async fn persist_rules(&self, changed: &[RuleId], removed: &[RuleId]) -> Result<()> {
        if let Some(backend) = &self.backend {
            let merchant = &self.store.merchant_id;
            for id in changed {
                if let Some(rule) = self.store.rules.get(*id) {
                    backend.save_rule(merchant, rule).await?;
                }
            }
            for id in removed {
                backend.delete_rule(merchant, *id).await?;
            }
        }
        self.write_state()
    }
}

fn connect(url: &str, timeout_secs: u64) -> Result<HttpBackend> {
    let config = HttpBackendConfig {
        base_url: url.to_string(),
        timeout_secs,
    };
    Ok(HttpBackend::new(config)?)
}

fn read_state(path: &Path) -> Result<MerchantStore> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("reading state from {}", path.display()))?;
    let settings: MerchantSettings = serde_json::from_str(&raw)
        .with_context(|| format!("parsing state in {}", path.display()))?;
    Ok(MerchantStore::from_settings(settings)?)
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn run_resolve(
    session: &Session,
    category: Option<&str>,
    args: &ContextArgs,
    explain: bool,
    format: OutputFormat,
) -> Result<()> {
    let resolver = session.resolver();

    let Some(category) = category else {
        let context = args.context()?;
        let all = resolver.resolve_all(&context);
        if format == OutputFormat::Json {
            return print_json(&all);
        }
        for resolved in &all {
            println!("{:<22} {}", resolved.category, summarize_boost(resolved));
        }
        return Ok(());
    };

    let query = args.query(category)?;
    let trace = resolver.resolve_with_trace(&query.category, &query.context)?;

    if format == OutputFormat::Json {
        return if explain {
            print_json(&trace)
        } else {
            print_json(&trace.resolved)
        };
    }

    println!("{}: {}", trace.resolved.category, summarize_boost(&trace.resolved));
    if explain {
        for explanation in explain_resolution(&trace).iter().skip(1) {
            println!("  [{}] {}", explanation.outcome, explanation.summary);
            println!("      {}", explanation.detail);
        }
    }
    Ok(())
}

fn run_rerank(
    session: &Session,
    products: &Path,
    args: &ContextArgs,
    unknown_boost: Option<f32>,
    format: OutputFormat,
) -> Result<()> {
    let products: Vec<ProductCandidate> = read_json(products)?;
    let total = products.len();
    let context = args.context()?;
    let config = RerankConfig {
        unknown_category_boost: unknown_boost,
    };

    let ranked = rerank_products(&session.resolver(), &context, products, &config);

    if format == OutputFormat::Json {
        return print_json(&ranked);
    }

    for (i, item) in ranked.iter().enumerate() {
        println!(
            "{:>3}. {:<12} {:<22} score {:.3} (base {:.3} x {:.2})",
            i + 1,
            item.product.sku,
            item.product.category,
            item.score,
            item.product.base_score,
            item.boost
        );
    }
    println!("---");
    println!("Ranked {} of {} products", ranked.len(), total);
    Ok(())
}

async fn run_weights(
    session: &mut Session,
    action: WeightsAction,
    format: OutputFormat,
) -> Result<()> {
    match action {
        WeightsAction::List => {}
        WeightsAction::Set { category_id, value } => {
            session
                .store
                .weights
                .set_weight(&CategoryId(category_id), value)?;
            session.persist_weights(None).await?;
        }
        WeightsAction::Global { value } => {
            session.store.weights.apply_global(value)?;
            session.persist_weights(None).await?;
        }
        WeightsAction::Reset { category_id } => {
            match category_id {
                Some(id) => session.store.weights.reset_one(&CategoryId(id))?,
                None => session.store.weights.reset_all(),
            }
            session.persist_weights(None).await?;
        }
        WeightsAction::Save { cabin, route } => {
            if session.backend.is_none() {
                bail!("weights save needs --backend-url");
            }
            let context = SaveContext {
                cabin_class: cabin,
                route: route.as_deref().map(parse_route).transpose()?,
            };
            let context = (context != SaveContext::default()).then_some(context);
            session.persist_weights(context).await?;
        }
    }

    let weights = &session.store.weights;
    if format == OutputFormat::Json {
        let categories: Vec<_> = weights.iter().collect();
        return print_json(&categories);
    }

    println!("{:<4} {:<22} {:>6} {:>8}  Level", "ID", "Category", "Weight", "Default");
    for category in weights.iter() {
        println!(
            "{:<4} {:<22} {:>6.2} {:>8.2}  {}",
            category.id,
            category.name,
            category.boost_weight,
            category.default_weight,
            category.level().label()
        );
    }
    println!("---");
    println!(
        "Global boost: {:.2} | Unsaved changes: {}",
        weights.global_boost(),
        if weights.is_dirty() { "yes" } else { "no" }
    );
    if session.is_ephemeral() {
        println!("(demo data; pass --state or --backend-url to keep changes)");
    }
    Ok(())
}

async fn run_rules(session: &mut Session, action: RulesAction, format: OutputFormat) -> Result<()> {
    let Session { store, backend, .. } = &mut *session;
    let merchant = store.merchant_id.as_str();
    let rules = &mut store.rules;
    let to_ids = |ids: Vec<u64>| ids.into_iter().map(RuleId).collect::<Vec<_>>();

    let mutated = !matches!(action, RulesAction::List);

    // Created and duplicated rules get their ids from the settings service
    // when one is configured, so they are already stored there.
    let (changed, removed) = match action {
        RulesAction::List => (vec![], vec![]),
        RulesAction::Add { file } => {
            let draft: RuleDraft = read_json(&file)?;
            match backend.as_ref() {
                Some(backend) => {
                    rules.create_persisted(backend, merchant, draft).await?;
                    (vec![], vec![])
                }
                None => (vec![rules.create(draft)?], vec![]),
            }
        }
        RulesAction::Update { id, file } => {
            let draft: RuleDraft = read_json(&file)?;
            rules.update(RuleId(id), draft)?;
            (vec![RuleId(id)], vec![])
        }
        RulesAction::Duplicate { id } => match backend.as_ref() {
            Some(backend) => {
                rules.duplicate_persisted(backend, merchant, RuleId(id)).await?;
                (vec![], vec![])
            }
            None => (vec![rules.duplicate(RuleId(id))?], vec![]),
        },
        RulesAction::Enable { ids } => {
            let ids = to_ids(ids);
            rules.set_enabled_many(&ids, true);
            (ids, vec![])
        }
        RulesAction::Disable { ids } => {
            let ids = to_ids(ids);
            rules.set_enabled_many(&ids, false);
            (ids, vec![])
        }
        RulesAction::Toggle { id } => {
            rules.toggle(RuleId(id))?;
            (vec![RuleId(id)], vec![])
        }
        RulesAction::Remove { ids } => {
            let ids = to_ids(ids);
            let count = rules.remove_many(&ids);
            tracing::info!(removed = count, "Removed rules");
            (vec![], ids)
        }
    };

    session.persist_rules(&changed, &removed).await?;

    let rules = &session.store.rules;
    if format == OutputFormat::Json {
        let all: Vec<_> = rules.iter().collect();
        return print_json(&all);
    }

    for rule in rules.iter() {
        println!("{}", describe_rule(rule));
    }
    println!("---");
    println!("Total: {} rules", rules.len());
    if session.is_ephemeral() && mutated {
        println!("(demo data; pass --state or --backend-url to keep changes)");
    }
    Ok(())
}

async fn run_health(cli: &Cli) -> Result<()> {
    let Some(url) = &cli.backend_url else {
        bail!("health needs --backend-url");
    };
    let backend = connect(url, cli.timeout_secs)?;
    print!("Checking {} backend at {}... ", backend.name(), url);
    io::stdout().flush()?;

    match backend.health_check().await {
        Ok(()) => {
            println!("OK");
            Ok(())
        }
        Err(e) => {
            println!("FAILED: {}", e);
            std::process::exit(1);
        }
    }
}

fn describe_scope(scope: &RuleScope) -> String {
    match scope {
        RuleScope::All => "all routes".to_string(),
        RuleScope::Route { from, to } => format!("{}→{}", from, to),
    }
}

fn describe_rule(rule: &Rule) -> String {
    let cabins = if rule.cabins.is_empty() {
        "All".to_string()
    } else {
        rule.cabins.join(", ")
    };
    let window = if rule.date_window.always_on {
        "always on".to_string()
    } else {
        format!(
            "{} to {}",
            rule.date_window
                .start
                .map(|d| d.to_string())
                .unwrap_or_else(|| "?".to_string()),
            rule.date_window
                .end
                .map(|d| d.to_string())
                .unwrap_or_else(|| "?".to_string())
        )
    };
    let boosts = rule
        .targets
        .category_boosts
        .iter()
        .map(|(name, w)| format!("{} {:.2}x", name, w))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "#{} [{}] p{} {}\n     scope: {} | cabins: {} | window: {} | updated {}\n     boosts: {} | price: {:?}",
        rule.id,
        if rule.enabled { "on " } else { "off" },
        rule.priority,
        rule.name,
        describe_scope(&rule.scope),
        cabins,
        window,
        rule.last_updated,
        if boosts.is_empty() { "none".to_string() } else { boosts },
        rule.targets.price_preference
    )
}
