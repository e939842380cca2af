pub mod ingest;
pub mod transform;

use crate::error::{PipelineError, PipelineResult};
use crate::retry::RetryPolicy;
use std::future::Future;

/// Opens a store, retrying failed handshakes under `policy`.
///
/// # Errors
/// Returns [`PipelineError::ConnectionExhausted`] with the last driver error
/// once every attempt has failed.
pub async fn connect_with_retry<S, F, Fut>(policy: &RetryPolicy, connect: F) -> PipelineResult<S>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<S, sqlx::Error>>,
{
    policy
        .run("Database connection", connect)
        .await
        .map_err(|(attempts, source)| PipelineError::ConnectionExhausted { attempts, source })
}
