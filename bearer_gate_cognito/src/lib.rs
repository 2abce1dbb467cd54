//! Amazon Cognito support for `bearer_gate`
//!
//! Provides the pieces needed to authorize tokens issued by a Cognito user
//! pool: the pool's well-known URLs, a [`UserAttributesLookup`][bearer_gate::UserAttributesLookup]
//! backed by the `GetUser` operation, and [`Settings`] that assemble a
//! ready-to-use [`Authorizer`][bearer_gate::Authorizer] from the command line
//! or the environment.
//!
//! ```no_run
//! use bearer_gate::AuthorizerRequest;
//! use bearer_gate_cognito::Settings;
//! use clap::Parser;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let authorizer = Settings::parse().into_authorizer()?;
//!
//! let request = AuthorizerRequest::new().with_header("authorization", "Bearer eyJ…");
//! let decision = authorizer.handle(&request).await;
//! # Ok(())
//! # }
//! ```

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

mod lookup;
mod pool;
mod settings;

pub use lookup::{CognitoUserAttributes, GET_USER_TARGET};
pub use pool::UserPool;
pub use settings::{Settings, SettingsError};
