//! Async test helpers

use std::future::Future;
use tokio::time::{timeout, Duration};

/// Await `future`, panicking if it takes longer than `duration`
pub async fn within<F: Future>(duration: Duration, future: F) -> F::Output {
    match timeout(duration, future).await {
        Ok(output) => output,
        Err(_) => panic!("operation did not finish within {:?}", duration),
    }
}
