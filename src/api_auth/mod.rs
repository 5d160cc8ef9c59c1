//! Credential gating for wallet operations.
//!
//! ## Components
//! - `capability`: permission names and the capability check
//! - `api_key`: key generation, expiry choices and lifecycle service
//! - `repository`: API key storage (digest only)
//! - `resolver`: presented credential → `Principal`
//! - `middleware`: Axum authentication middleware
//! - `handlers`: key management endpoints

pub mod api_key;
pub mod capability;
pub mod handlers;
pub mod middleware;
pub mod repository;
pub mod resolver;

pub use api_key::{ApiKeyService, ExpiryChoice, IssuedApiKey, digest_api_key, generate_api_key};
pub use capability::{Capability, CapabilitySet, check};
pub use middleware::auth_middleware;
pub use repository::{ApiKeyRecord, ApiKeyStore, PgApiKeyStore};
pub use resolver::{
    API_KEY_HEADER, CredentialKind, CredentialResolver, PresentedCredentials, Principal,
};
