use crate::patch::PatchError;
use kube::core::DynamicObject;
use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum FrameworkError {
    #[error("failed to load manifests from {path}: {source}")]
    Load {
        path: String,
        #[source]
        source: BoxError,
    },

    #[error("failed to create {kind} {name}: {source}")]
    Create {
        kind: String,
        name: String,
        #[source]
        source: BoxError,
    },

    #[error("failed to delete {kind} {name}: {source}")]
    Delete {
        kind: String,
        name: String,
        #[source]
        source: BoxError,
    },

    #[error(transparent)]
    Patch(#[from] PatchError),
}

/// Undoes a deployment made by [`Framework::create_from_manifests`].
pub type CleanupFn = Box<dyn FnOnce() -> Result<(), FrameworkError> + Send>;

/// Called for every object right before it is created in the cluster.
pub type PatchFn<'a> = &'a dyn Fn(&mut DynamicObject) -> Result<(), PatchError>;

/// The cluster test framework the harness runs inside of.
///
/// One framework instance backs exactly one test case: it owns the test
/// namespace and the unique name that keeps cluster-scoped objects of
/// different runs apart.
pub trait Framework {
    /// A token unique to this test run, e.g. the generated namespace name.
    fn unique_name(&self) -> &str;

    /// The namespace namespaced objects of this test are created in.
    fn namespace(&self) -> &str;

    /// Parses the given manifest files into generic objects, in file order.
    fn load_from_manifests(&self, paths: &[&str]) -> Result<Vec<DynamicObject>, FrameworkError>;

    /// Scopes objects to this test run (namespaces, unique names).
    fn patch_items(&self, items: &mut [DynamicObject]) -> Result<(), FrameworkError>;

    /// Loads, patches and creates every object of the given manifests,
    /// calling `patch` on each one before creation. The returned function
    /// removes everything that was created.
    fn create_from_manifests(
        &self,
        patch: PatchFn<'_>,
        paths: &[&str],
    ) -> Result<CleanupFn, FrameworkError>;
}
