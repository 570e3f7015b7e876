//! Mercato — native sign-in client for the Mercato commerce platform.
//!
//! This crate implements the OIDC Authorization Code + PKCE flow against the
//! platform's Keycloak-compatible identity provider, with encrypted local
//! session storage. The `mercato` binary wraps it in a small CLI; the
//! library surface is used by the platform's other native tooling.
//!
//! # Quick start
//!
//! ```no_run
//! use mercato::auth::{AuthClient, AuthorizeOptions, SystemBrowser};
//!
//! # async fn example() -> Result<(), mercato::auth::AuthError> {
//! let client = AuthClient::new(
//!     "https://id.mercato.example/realms/mercato",
//!     "mercato-cli",
//!     "http://127.0.0.1:8732/callback",
//!     vec!["openid".into(), "offline_access".into()],
//! );
//! let tokens = client
//!     .login(&SystemBrowser::default(), &AuthorizeOptions::default())
//!     .await?;
//! println!("signed in until {}", tokens.expires_at_unix);
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod build_info;
pub mod config;
pub mod error;
pub mod render;
#[cfg(test)]
pub mod testsupport;
