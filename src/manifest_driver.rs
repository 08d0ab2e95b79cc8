use crate::{
    driver::{Capability, DriverError, DriverInfo, DynamicPvTestDriver, Skip, TestDriver},
    framework::Framework,
    lifecycle::{CleanupHandle, PerTestConfig},
    patch::{patch_csi_deployment, FinalPatchCsiOptions, PatchCsiOptions},
    patterns::{TestPattern, FILE_SIZE_MEDIUM},
};
use k8s_openapi::api::storage::v1::StorageClass;
use kube::core::DynamicObject;
use maplit::{btreemap, btreeset};
use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

pub const DEFAULT_PREFIX: &str = "csi";

fn default_prefix() -> String {
    DEFAULT_PREFIX.to_owned()
}

/// A CSI driver that is deployed from manifest files and provisions
/// volumes dynamically through a storage class loaded from another
/// manifest file.
///
/// The driver keeps no per-test state: each call to
/// [`TestDriver::prepare_test`] hands out its own [`CleanupHandle`].
#[derive(Clone, Debug, Deserialize, Serialize, TypedBuilder)]
#[serde(rename_all = "camelCase")]
pub struct ManifestDriver {
    driver_info: DriverInfo,

    #[builder(default)]
    #[serde(default)]
    patch_options: PatchCsiOptions,

    /// Runtime deployment of the driver. The storage class is not part
    /// of it.
    #[builder(default)]
    #[serde(default)]
    manifests: Vec<String>,

    #[builder(setter(into))]
    sc_manifest: String,

    #[builder(setter(into))]
    claim_size: String,

    #[builder(default = default_prefix(), setter(into))]
    #[serde(default = "default_prefix")]
    prefix: String,
}

impl ManifestDriver {
    pub fn patch_options(&self) -> &PatchCsiOptions {
        &self.patch_options
    }

    pub fn manifests(&self) -> &[String] {
        &self.manifests
    }

    pub fn sc_manifest(&self) -> &str {
        &self.sc_manifest
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn final_patch_options(&self, framework: &dyn Framework) -> FinalPatchCsiOptions {
        self.patch_options.finalize(framework.unique_name())
    }

    fn name(&self) -> &str {
        &self.driver_info.name
    }

    fn storage_class_from(&self, item: DynamicObject) -> Result<StorageClass, DriverError> {
        let (api_version, kind) = item
            .types
            .as_ref()
            .map(|t| (t.api_version.as_str(), t.kind.as_str()))
            .unwrap_or_default();

        if api_version != <StorageClass as k8s_openapi::Resource>::API_VERSION
            || kind != <StorageClass as k8s_openapi::Resource>::KIND
        {
            return Err(DriverError::NotAStorageClass {
                driver: self.name().to_owned(),
                path: self.sc_manifest.clone(),
                kind: format!("{}/{}", api_version, kind),
            });
        }

        serde_json::to_value(&item)
            .and_then(serde_json::from_value)
            .map_err(|source| DriverError::InvalidStorageClass {
                driver: self.name().to_owned(),
                path: self.sc_manifest.clone(),
                source,
            })
    }
}

impl TestDriver for ManifestDriver {
    fn driver_info(&self) -> &DriverInfo {
        &self.driver_info
    }

    fn skip_unsupported_test(&self, _pattern: &TestPattern) -> Result<(), Skip> {
        Ok(())
    }

    fn prepare_test<'a>(
        &'a self,
        framework: &'a dyn Framework,
    ) -> Result<(PerTestConfig<'a>, CleanupHandle), DriverError> {
        log::info!("deploying {} driver", self.name());

        let config = PerTestConfig {
            driver: self,
            prefix: self.prefix.clone(),
            framework,
        };

        let options = self.final_patch_options(framework);
        let manifests: Vec<&str> = self.manifests.iter().map(String::as_str).collect();

        let cleanup = framework
            .create_from_manifests(
                &|item: &mut DynamicObject| patch_csi_deployment(&options, item),
                &manifests,
            )
            .map_err(|source| DriverError::Deploy {
                driver: self.name().to_owned(),
                manifests: self.manifests.join(", "),
                source,
            })?;

        Ok((
            config,
            CleanupHandle::new(format!("uninstalling {} driver", self.name()), cleanup),
        ))
    }

    fn as_dynamic_pv(&self) -> Option<&dyn DynamicPvTestDriver> {
        Some(self)
    }
}

impl DynamicPvTestDriver for ManifestDriver {
    /// The storage class manifest decides the fsType, so the requested one
    /// is not applied.
    fn dynamic_provision_storage_class(
        &self,
        config: &PerTestConfig<'_>,
        _fs_type: &str,
    ) -> Result<StorageClass, DriverError> {
        let framework = config.framework;
        let manifest_error = |source| DriverError::Manifest {
            driver: self.name().to_owned(),
            path: self.sc_manifest.clone(),
            source,
        };

        let items = framework
            .load_from_manifests(&[self.sc_manifest.as_str()])
            .map_err(manifest_error)?;

        let [mut item]: [DynamicObject; 1] =
            items
                .try_into()
                .map_err(|items: Vec<DynamicObject>| DriverError::ManifestCount {
                    driver: self.name().to_owned(),
                    path: self.sc_manifest.clone(),
                    count: items.len(),
                })?;

        framework
            .patch_items(std::slice::from_mut(&mut item))
            .map_err(manifest_error)?;

        patch_csi_deployment(&self.final_patch_options(framework), &mut item).map_err(
            |source| DriverError::Patch {
                driver: self.name().to_owned(),
                path: self.sc_manifest.clone(),
                source,
            },
        )?;

        self.storage_class_from(item)
    }

    fn claim_size(&self) -> &str {
        &self.claim_size
    }
}

/// The PMEM-CSI driver as deployed by its own repository.
///
/// Renaming is not enabled: there is only one instance of the registry
/// and on each node the driver assumes exclusive control of the PMEM, so
/// tests have to run sequentially, each one creating and removing the
/// driver deployment.
pub fn pmem_csi() -> ManifestDriver {
    ManifestDriver::builder()
        .driver_info(
            DriverInfo::builder()
                .name("pmem-csi")
                .max_file_size(FILE_SIZE_MEDIUM)
                .supported_fs_type(btreeset! { String::new() })
                .capabilities(btreemap! {
                    Capability::Persistence => true,
                    Capability::FsGroup => true,
                    Capability::Exec => true,
                })
                .build(),
        )
        .sc_manifest("deploy/kubernetes-1.13/pmem-storageclass-ext4.yaml")
        .claim_size("1Mi")
        .prefix("pmem")
        .build()
}

pub fn init_pmem_csi() -> Box<dyn TestDriver> {
    Box::new(pmem_csi())
}
