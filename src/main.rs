//! Wallet ledger gateway binary.
//!
//! ```text
//! wallet_ledger [--env dev] [--port 8080] [--memory] [--mock-provider]
//! ```
//!
//! - `--memory`: in-process store instead of PostgreSQL (state lost on exit)
//! - `--mock-provider`: in-process payment provider instead of Paystack

use anyhow::Context;
use std::sync::Arc;

use wallet_ledger::api_auth::{ApiKeyStore, PgApiKeyStore};
use wallet_ledger::config::AppConfig;
use wallet_ledger::db::Database;
use wallet_ledger::funding::{MockProvider, PaymentProvider, PaystackClient};
use wallet_ledger::gateway::{self, state::AppState};
use wallet_ledger::ledger::{LedgerStore, MemoryStore, PgLedgerStore};

fn get_env() -> String {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if (args[i] == "--env" || args[i] == "-e") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }
    "dev".to_string()
}

/// Get port override from command line (--port argument)
fn get_port_override() -> Option<u16> {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if args[i] == "--port" && i + 1 < args.len() {
            return args[i + 1].parse().ok();
        }
    }
    None
}

fn use_memory_store() -> bool {
    std::env::args().any(|a| a == "--memory")
}

fn use_mock_provider() -> bool {
    std::env::args().any(|a| a == "--mock-provider")
}

type Stores = (
    Arc<dyn LedgerStore>,
    Arc<dyn ApiKeyStore>,
    Option<Arc<Database>>,
);

async fn build_stores(config: &AppConfig) -> anyhow::Result<Stores> {
    if use_memory_store() {
        tracing::warn!("Using in-memory ledger store; balances are lost on exit");
        let store = Arc::new(MemoryStore::new(config.ledger.currency.clone()));
        return Ok((store.clone(), store, None));
    }

    let url = config
        .postgres_url
        .as_deref()
        .context("postgres_url is not configured (use --memory for a throwaway store)")?;
    let db = Arc::new(
        Database::connect(url)
            .await
            .context("Failed to connect to PostgreSQL")?,
    );
    db.init_schema()
        .await
        .context("Failed to apply ledger schema")?;
    tracing::info!("PostgreSQL connected and schema initialized");

    Ok((
        Arc::new(PgLedgerStore::new(db.clone(), config.ledger.currency.clone())),
        Arc::new(PgApiKeyStore::new(db.clone())),
        Some(db),
    ))
}

fn build_provider(config: &AppConfig) -> anyhow::Result<Arc<dyn PaymentProvider>> {
    if use_mock_provider() {
        tracing::warn!("Using mock payment provider");
        return Ok(Arc::new(MockProvider::new(config.paystack.webhook_secret())));
    }
    let client = PaystackClient::new(config.paystack.clone())
        .context("Failed to build Paystack client")?;
    Ok(Arc::new(client))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = get_env();
    let app_config = AppConfig::load(&env).context("Failed to load configuration")?;
    let _log_guard = wallet_ledger::logging::init_logging(&app_config);

    tracing::info!("Starting wallet ledger in {} mode", env);

    let (ledger, keys, db) = build_stores(&app_config).await?;
    let provider = build_provider(&app_config)?;
    let state = Arc::new(AppState::new(&app_config, ledger, keys, provider, db));

    let port = get_port_override().unwrap_or(app_config.gateway.port);
    gateway::run_server(&app_config.gateway.host, port, state)
        .await
        .context("Gateway server error")?;
    Ok(())
}
