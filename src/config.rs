use crate::{
    driver::{DynamicPvTestDriver, TestDriver},
    manifest_driver::ManifestDriver,
    patterns::PatternFilter,
    suite::{DriverContext, SuiteInit},
};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeSet, fs, path::Path};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse harness configuration: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("driver {0} is declared more than once")]
    DuplicateDriver(String),

    #[error("driver {0} has no storage class manifest")]
    MissingStorageClass(String),

    #[error("driver {0} has no claim size")]
    MissingClaimSize(String),
}

/// The drivers a test run is made of, usually read from a YAML file:
///
/// ```yaml
/// drivers:
///   - driverInfo:
///       name: pmem-csi
///       capabilities:
///         persistence: true
///     scManifest: deploy/kubernetes-1.13/pmem-storageclass-ext4.yaml
///     claimSize: 1Mi
/// ```
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HarnessConfig {
    #[serde(default)]
    pub drivers: Vec<ManifestDriver>,
}

impl HarnessConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;

        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let yaml = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;

        Self::from_yaml_str(&yaml)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut names = BTreeSet::new();

        for driver in &self.drivers {
            let name = &driver.driver_info().name;

            if !names.insert(name.as_str()) {
                return Err(ConfigError::DuplicateDriver(name.clone()));
            }
            if driver.sc_manifest().is_empty() {
                return Err(ConfigError::MissingStorageClass(name.clone()));
            }
            if driver.claim_size().is_empty() {
                return Err(ConfigError::MissingClaimSize(name.clone()));
            }
        }

        Ok(())
    }

    /// One test context per configured driver.
    pub fn into_contexts(self, suites: &[SuiteInit], filter: PatternFilter) -> Vec<DriverContext> {
        self.drivers
            .into_iter()
            .map(|driver| DriverContext::define(Box::new(driver), suites, filter))
            .collect()
    }
}
