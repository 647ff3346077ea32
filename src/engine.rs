use std::sync::Mutex;

use async_trait::async_trait;
use log::debug;

use crate::error::{MutationError, StoreError};
use crate::model::MutationStatus;

/// Callbacks driving one kind of optimistic mutation.
///
/// `on_optimistic` runs synchronously before the authoritative operation
/// starts; `on_error` is responsible for rolling back whatever it changed.
/// `on_settled` always runs last, on both paths.
#[async_trait]
pub trait MutationHooks: Send + Sync {
    type Vars: Send + Sync;
    type Output: Send;

    async fn operation(&self, vars: &Self::Vars) -> Result<Self::Output, StoreError>;

    fn on_optimistic(&self, vars: &Self::Vars);

    fn on_success(&self, _output: &Self::Output, _vars: &Self::Vars) {}

    fn on_error(&self, error: &MutationError, vars: &Self::Vars);

    fn on_settled(
        &self,
        _output: Option<&Self::Output>,
        _error: Option<&MutationError>,
        _vars: &Self::Vars,
    ) {
    }
}

/// Runs an authoritative async operation with an optimistic local transition
/// applied up front, and guarantees the rollback hook fires on failure.
///
/// No retry, no queuing: concurrent `mutate` calls interleave freely and the
/// shared status flags are last-write-wins. The status lock is only ever held
/// across field writes, never across an await.
pub struct MutationEngine {
    status: Mutex<MutationStatus>,
}

impl MutationEngine {
    pub fn new() -> Self {
        Self {
            status: Mutex::new(MutationStatus::default()),
        }
    }

    pub fn status(&self) -> MutationStatus {
        self.status.lock().unwrap().clone()
    }

    /// Clears the status flags unconditionally. Does not undo any optimistic
    /// update; callers must already have rolled back through `on_error`.
    pub fn reset(&self) {
        *self.status.lock().unwrap() = MutationStatus::default();
    }

    pub async fn mutate<H: MutationHooks>(
        &self,
        hooks: &H,
        vars: H::Vars,
    ) -> Result<H::Output, MutationError> {
        self.set_status(MutationStatus {
            is_loading: true,
            is_optimistic: true,
            error: None,
        });

        hooks.on_optimistic(&vars);

        match hooks.operation(&vars).await {
            Ok(output) => {
                self.set_status(MutationStatus::default());

                hooks.on_success(&output, &vars);
                hooks.on_settled(Some(&output), None, &vars);

                Ok(output)
            }
            Err(store_error) => {
                debug!("mutation rejected: {store_error}");
                let error = MutationError::from(store_error);

                self.set_status(MutationStatus {
                    is_loading: false,
                    is_optimistic: false,
                    error: Some(error.clone()),
                });

                hooks.on_error(&error, &vars);
                hooks.on_settled(None, Some(&error), &vars);

                Err(error)
            }
        }
    }

    fn set_status(&self, status: MutationStatus) {
        *self.status.lock().unwrap() = status;
    }
}

impl Default for MutationEngine {
    fn default() -> Self {
        Self::new()
    }
}
