//! GitHub App authentication and the HTTP transport behind it.

mod client;
pub mod credential;
#[cfg(test)]
pub(crate) mod mock;
mod outcome;
pub mod permissions;
pub mod token;

pub use client::{GitHubApi, GitHubClient, NewRepository, OAuthCodeExchange};
pub use credential::{CredentialError, CredentialMinter, SignedAssertion};
pub use outcome::RemoteOutcome;
pub use permissions::{AccessLevel, PermissionSet, PermissionVerifier, PermissionsUnavailable};
pub use token::{InstallationToken, TokenExchangeError, TokenExchanger};
