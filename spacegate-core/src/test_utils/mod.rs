//! Test support: fixtures, provisioner doubles and assertions
//!
//! Built for unit tests and behind the `test-utils` feature, which the
//! integration tests enable through the dev-dependency on this crate.

pub mod assertions;
pub mod async_helpers;
pub mod doubles;
pub mod fixtures;

pub use assertions::*;
pub use async_helpers::*;
pub use doubles::*;
pub use fixtures::*;
