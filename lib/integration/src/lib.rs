//! Vendor adapter framework for syncbridge.
//!
//! This crate provides:
//!
//! - **Adapter contract**: [`VendorAdapter`], the uniform CRUD surface over
//!   one vendor API, with vendor-neutral [`QueryOptions`] and normalized
//!   [`PaginatedResult`]s
//! - **Credentials**: [`Authenticator`] strategies (static key, OAuth2 client
//!   credentials, OAuth2 refresh token), the per-adapter [`TokenLifecycle`]
//!   cache and pluggable [`CredentialStore`] persistence
//! - **Retry**: [`RetryExecutor`], one re-authentication on a rejected token
//! - **Vendors**: Salesforce and HubSpot adapters, selected through
//!   [`VendorSettings`] and [`build_adapter`]

pub mod adapter;
pub mod auth;
pub mod credential;
pub mod error;
mod http;
pub mod query;
pub mod reference;
pub mod registry;
pub mod retry;
pub mod token;
pub mod vendors;

pub use adapter::{ASSOCIATIONS_KEY, Association, VendorAdapter, split_associations};
pub use auth::{
    AuthStrategy, Authenticator, ClientAuthMethod, ClientCredentialsAuth, InitialGrant,
    OAuthClientConfig, RefreshTokenAuth, StaticKeyAuth,
};
pub use credential::{
    CredentialStore, DEFAULT_REFRESH_BUFFER_MS, InMemoryCredentialStore, VendorCredential,
    credential_key,
};
pub use error::{AdapterResult, CredentialError, ErrorKind, StandardError};
pub use query::{
    Comparison, DEFAULT_LIMIT, PaginatedResult, Pagination, Predicate, QueryOptions, Sort,
    SortDirection,
};
pub use reference::{RefData, RefUrlTemplate};
pub use registry::{VendorSettings, build_adapter};
pub use retry::RetryExecutor;
pub use token::{TokenLifecycle, TokenState};
pub use vendors::{
    HubspotAdapter, HubspotAuth, HubspotSettings, SalesforceAdapter, SalesforceSettings,
};
