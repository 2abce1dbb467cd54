//! Fail-closed bearer token authorization
//!
//! This crate decides whether the caller behind an inbound bearer token may
//! proceed. A token is accepted only after:
//!
//! 1. its RS256 signature has been verified against a key from a remote
//!    JSON Web Key Set (JWKS), fetched lazily and refreshed when a token
//!    names an unknown key ID;
//! 2. its `client_id` has been found in the allow list of known clients; and
//! 3. the [`AuthorizationPolicy`] has granted access, either because the
//!    token carries an allowed OAuth2 scope (machine-to-machine tokens) or
//!    because the user behind the token holds an allowed role, as reported
//!    by an identity provider through a [`UserAttributesLookup`].
//!
//! The [`Authorizer`] ties these together and is the only place where errors
//! are collapsed into a decision. Any failure, including a panic in a
//! collaborator, results in a denial without context.
//!
//! ```no_run
//! use bearer_gate::{AllowList, Authorizer, AuthorizerConfig, AuthorizerRequest};
//! # use bearer_gate::{JwtRef, LookupError, UserAttributes, UserAttributesLookup};
//! # struct Idp;
//! # #[async_trait::async_trait]
//! # impl UserAttributesLookup for Idp {
//! #     async fn user_attributes(&self, _: &JwtRef) -> Result<UserAttributes, LookupError> {
//! #         Ok(UserAttributes::new())
//! #     }
//! # }
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AuthorizerConfig::new("https://idp.example.com/.well-known/jwks.json")
//!     .with_clients("my-client".parse()?)
//!     .with_scopes("orders/read".parse()?)
//!     .with_roles(AllowList::from_delimited("admin,editor", ','));
//!
//! let authorizer = Authorizer::from_config(&config, Idp)?;
//!
//! let request = AuthorizerRequest::new().with_header("authorization", "Bearer eyJ…");
//! let decision = authorizer.handle(&request).await;
//! println!("{}", serde_json::to_string(&decision)?);
//! # Ok(())
//! # }
//! ```
//!
//! # Feature flags
//!
//! * `rustls-tls` (default): use `rustls` for HTTPS calls to the JWKS endpoint
//! * `default-tls`: use the platform TLS implementation instead
//! * `test-util`: expose [`test_util`] for minting test keys and tokens

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(
    missing_docs,
    unused_import_braces,
    unused_imports,
    unused_qualifications
)]
#![deny(
    missing_debug_implementations,
    trivial_casts,
    trivial_numeric_casts,
    unsafe_code,
    unused_must_use
)]

mod allow;
mod authorizer;
mod claims;
mod config;
mod decision;
mod error;
mod keys;
mod lookup;
mod policy;
mod verifier;

#[cfg(any(test, feature = "test-util"))]
#[cfg_attr(docsrs, doc(cfg(feature = "test-util")))]
pub mod test_util;

pub use aliri::{Jwt, JwtRef};

pub use allow::AllowList;
pub use authorizer::{Authorizer, AuthorizerRequest};
pub use claims::{Claims, ClientId, ClientIdRef};
pub use config::AuthorizerConfig;
pub use decision::{AuthorizationDecision, DecisionContext};
pub use error::{Error, ErrorKind};
pub use keys::{KeyResolutionError, KeyResolver};
pub use lookup::{LookupError, UserAttributes, UserAttributesLookup};
pub use policy::{AuthorizationPolicy, DEFAULT_GROUP_CLAIM, DEFAULT_ROLES_ATTRIBUTE};
pub use verifier::{TokenVerifier, ALGORITHM};
