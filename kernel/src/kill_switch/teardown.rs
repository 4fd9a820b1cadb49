//! External teardown hooks invoked when a branch is killed.
//!
//! Hooks stop whatever the branch had running outside this process, such as
//! its subordinate process or its filesystem checkout. A failing hook never
//! prevents the branch from being marked Killed.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::join_all;
use tracing::{debug, warn};

use crate::branch_manager::BranchState;

/// Errors reported by a teardown hook.
#[derive(Debug, thiserror::Error)]
pub enum TeardownError {
    /// The hook could not release its resource.
    #[error("Teardown failed: {0}")]
    Failed(String),
    /// I/O error while releasing a resource.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A cleanup step run for every killed branch.
#[async_trait]
pub trait TeardownHook: Send + Sync {
    /// Name used in logs and teardown reports.
    fn name(&self) -> &str;

    /// Releases the resources held for `branch`.
    ///
    /// # Errors
    ///
    /// Returns `TeardownError` if the resource could not be released.
    async fn teardown(&self, branch: &BranchState) -> Result<(), TeardownError>;
}

/// Runs every hook concurrently and returns the names of those that failed.
pub(crate) async fn run_hooks(hooks: &[Arc<dyn TeardownHook>], branch: &BranchState) -> Vec<String> {
    let results = join_all(hooks.iter().map(|hook| async move {
        let result = hook.teardown(branch).await;
        (hook.name().to_string(), result)
    }))
    .await;

    results
        .into_iter()
        .filter_map(|(name, result)| match result {
            Ok(()) => {
                debug!(branch_id = %branch.id(), hook = %name, "Teardown hook finished");
                None
            }
            Err(e) => {
                warn!(branch_id = %branch.id(), hook = %name, error = %e, "Teardown hook failed");
                metrics::counter!("killswitch_teardown_hook_failures_total", "hook" => name.clone())
                    .increment(1);
                Some(name)
            }
        })
        .collect()
}
