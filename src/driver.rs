use crate::{
    framework::{Framework, FrameworkError},
    lifecycle::{CleanupHandle, PerTestConfig},
    patch::PatchError,
    patterns::{TestPattern, FILE_SIZE_SMALL},
};
use k8s_openapi::api::storage::v1::StorageClass;
use maplit::btreeset;
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
};
use thiserror::Error;
use typed_builder::TypedBuilder;

/// Optional driver features that suites check before running.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Capability {
    /// Data survives pod restarts.
    Persistence,
    /// Raw block volumes.
    Block,
    /// Ownership is changed to the pod's fsGroup.
    FsGroup,
    /// Binaries on the volume can be executed.
    Exec,
    /// Volumes can be populated from a snapshot.
    DataSource,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize, TypedBuilder)]
#[serde(rename_all = "camelCase")]
pub struct DriverInfo {
    /// Must be unique among the drivers of a test run.
    #[builder(setter(into))]
    pub name: String,

    #[builder(default, setter(into))]
    #[serde(default)]
    pub feature_tag: String,

    #[builder(default = FILE_SIZE_SMALL)]
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,

    /// The empty string stands for the default fsType.
    #[builder(default = btreeset! { String::new() })]
    #[serde(default = "default_supported_fs_type")]
    pub supported_fs_type: BTreeSet<String>,

    #[builder(default)]
    #[serde(default)]
    pub capabilities: BTreeMap<Capability, bool>,
}

fn default_max_file_size() -> u64 {
    FILE_SIZE_SMALL
}

fn default_supported_fs_type() -> BTreeSet<String> {
    btreeset! { String::new() }
}

impl DriverInfo {
    /// Capabilities which are not listed are not supported.
    pub fn has_capability(&self, capability: Capability) -> bool {
        self.capabilities.get(&capability).copied().unwrap_or(false)
    }

    pub fn supports_fs_type(&self, fs_type: &str) -> bool {
        self.supported_fs_type.contains(fs_type)
    }
}

/// Why a test case is not run.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Skip(pub String);

impl fmt::Display for Skip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("driver {driver}: expected exactly one object in {path}, found {count}")]
    ManifestCount {
        driver: String,
        path: String,
        count: usize,
    },

    #[error("driver {driver}: object from {path} is a {kind}, not a StorageClass")]
    NotAStorageClass {
        driver: String,
        path: String,
        kind: String,
    },

    #[error("driver {driver}: invalid StorageClass in {path}: {source}")]
    InvalidStorageClass {
        driver: String,
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("driver {driver}: failed to prepare objects from {path}: {source}")]
    Manifest {
        driver: String,
        path: String,
        #[source]
        source: FrameworkError,
    },

    #[error("driver {driver}: failed to patch objects from {path}: {source}")]
    Patch {
        driver: String,
        path: String,
        #[source]
        source: PatchError,
    },

    #[error("deploying driver {driver} from [{manifests}]: {source}")]
    Deploy {
        driver: String,
        manifests: String,
        #[source]
        source: FrameworkError,
    },
}

/// The contract every storage driver under test implements.
pub trait TestDriver {
    fn driver_info(&self) -> &DriverInfo;

    /// Lets the driver veto patterns the generic checks let through.
    fn skip_unsupported_test(&self, pattern: &TestPattern) -> Result<(), Skip>;

    /// Deploys the driver for one test case. The returned handle undoes
    /// the deployment and has to be released once the test is done.
    fn prepare_test<'a>(
        &'a self,
        framework: &'a dyn Framework,
    ) -> Result<(PerTestConfig<'a>, CleanupHandle), DriverError>;

    /// Drivers that can provision volumes through a storage class return
    /// themselves here.
    fn as_dynamic_pv(&self) -> Option<&dyn DynamicPvTestDriver> {
        None
    }
}

pub trait DynamicPvTestDriver: TestDriver {
    /// Returns a storage class that provisions volumes with this driver.
    /// Creating it in the cluster is up to the caller.
    fn dynamic_provision_storage_class(
        &self,
        config: &PerTestConfig<'_>,
        fs_type: &str,
    ) -> Result<StorageClass, DriverError>;

    fn claim_size(&self) -> &str;
}

/// Names the test context of a driver, e.g. `[Driver: pmem-csi]`.
pub fn driver_name_with_feature_tags(driver: &dyn TestDriver) -> String {
    let info = driver.driver_info();
    format!("[Driver: {}]{}", info.name, info.feature_tag)
}
