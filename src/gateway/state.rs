use std::sync::Arc;

use crate::api_auth::{ApiKeyService, ApiKeyStore, CredentialResolver};
use crate::config::AppConfig;
use crate::db::Database;
use crate::funding::{DepositInitiator, PaymentProvider, SettlementReconciler, TransferEngine};
use crate::ledger::LedgerStore;
use crate::money::AmountPolicy;
use crate::user_auth::TokenService;

/// Gateway application state (shared across requests)
pub struct AppState {
    pub ledger: Arc<dyn LedgerStore>,
    pub resolver: CredentialResolver,
    pub api_keys: ApiKeyService,
    pub tokens: Arc<TokenService>,
    pub transfers: TransferEngine,
    pub deposits: DepositInitiator,
    pub settlement: SettlementReconciler,
    /// PostgreSQL handle for health checks; `None` in memory mode
    pub db: Option<Arc<Database>>,
    /// Gate for the internal session endpoint; `None` disables it
    pub internal_secret: Option<String>,
}

impl AppState {
    pub fn new(
        config: &AppConfig,
        ledger: Arc<dyn LedgerStore>,
        keys: Arc<dyn ApiKeyStore>,
        provider: Arc<dyn PaymentProvider>,
        db: Option<Arc<Database>>,
    ) -> Self {
        let auth = &config.auth;
        let policy = AmountPolicy::new(config.ledger.min_amount);
        let tokens = Arc::new(TokenService::new(&auth.jwt_secret, auth.token_ttl_minutes));

        Self {
            resolver: CredentialResolver::new(keys.clone(), tokens.clone(), &auth.api_key_prefix),
            api_keys: ApiKeyService::new(keys, &auth.api_key_prefix, auth.max_api_keys_per_user),
            tokens,
            transfers: TransferEngine::new(ledger.clone(), policy),
            deposits: DepositInitiator::new(ledger.clone(), provider.clone(), policy),
            settlement: SettlementReconciler::new(ledger.clone(), provider),
            ledger,
            db,
            internal_secret: auth.internal_secret.clone(),
        }
    }
}
