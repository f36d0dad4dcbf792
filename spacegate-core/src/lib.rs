pub mod config;
pub mod core_space;
pub mod logging;
pub mod metrics;
pub mod telemetry;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use config::Config;
pub use core_space::{
    OrganizationManager, SpaceContext, SpaceEnumerator, SpaceError, SpaceResolver, SpaceResult,
};
pub use logging::{init_logging, LogLevel};
