//! Runs generic volume test suites against CSI drivers that are deployed
//! from manifests, narrowing the pattern catalogue to what each driver
//! can actually do.

pub mod config;
pub mod driver;
pub mod framework;
pub mod lifecycle;
pub mod manifest_driver;
pub mod patch;
pub mod patterns;
pub mod suite;
pub mod suites;

pub use config::{ConfigError, HarnessConfig};
pub use driver::{
    driver_name_with_feature_tags, Capability, DriverError, DriverInfo, DynamicPvTestDriver,
    Skip, TestDriver,
};
pub use framework::{CleanupFn, Framework, FrameworkError};
pub use lifecycle::{CleanupError, CleanupHandle, PerTestConfig};
pub use manifest_driver::{init_pmem_csi, pmem_csi, ManifestDriver};
pub use patch::{patch_csi_deployment, FinalPatchCsiOptions, PatchCsiOptions, PatchError};
pub use patterns::{tune_csi_patterns, TestPattern, TestVolType};
pub use suite::{
    define_test_suites, skip_unsupported_test, DriverContext, TestOutcome, TestReport, TestSuite,
};
