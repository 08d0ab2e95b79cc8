use crate::{
    driver::TestDriver,
    framework::{CleanupFn, Framework, FrameworkError},
};
use thiserror::Error;

/// Everything a suite needs to address the driver deployed for one test
/// case. It lives exactly as long as that test case.
pub struct PerTestConfig<'a> {
    pub driver: &'a dyn TestDriver,

    /// Prefix for the names of objects the test creates.
    pub prefix: String,

    pub framework: &'a dyn Framework,
}

#[derive(Debug, Error)]
#[error("{action}: {source}")]
pub struct CleanupError {
    pub action: String,

    #[source]
    pub source: FrameworkError,
}

/// Owns the teardown of whatever `prepare_test` deployed.
///
/// [`CleanupHandle::release`] runs the teardown and reports its result.
/// A handle that is dropped without being released (early return, panic
/// in the test body) runs the teardown from `Drop` and logs a failure,
/// so the teardown happens exactly once on every path.
pub struct CleanupHandle {
    action: String,
    cleanup: Option<CleanupFn>,
}

impl CleanupHandle {
    pub fn new(action: impl Into<String>, cleanup: CleanupFn) -> Self {
        Self {
            action: action.into(),
            cleanup: Some(cleanup),
        }
    }

    /// A handle with nothing to tear down.
    #[cfg(test)]
    pub(crate) fn noop() -> Self {
        Self {
            action: String::new(),
            cleanup: None,
        }
    }

    pub fn release(mut self) -> Result<(), CleanupError> {
        self.run()
    }

    fn run(&mut self) -> Result<(), CleanupError> {
        let Some(cleanup) = self.cleanup.take() else {
            return Ok(());
        };

        log::info!("{}", self.action);
        cleanup().map_err(|source| CleanupError {
            action: self.action.clone(),
            source,
        })
    }
}

impl Drop for CleanupHandle {
    fn drop(&mut self) {
        if self.cleanup.is_none() {
            return;
        }

        log::warn!("cleanup handle dropped without release: {}", self.action);
        if let Err(err) = self.run() {
            log::error!("{}", err);
        }
    }
}
