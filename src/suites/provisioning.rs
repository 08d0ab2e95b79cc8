use crate::{
    lifecycle::PerTestConfig,
    patterns::{TestPattern, DEFAULT_FS_DYNAMIC_PV},
    suite::{SuiteError, TestSuite, TestSuiteInfo},
};
use k8s_openapi::{
    api::{
        core::v1::{PersistentVolumeClaim, PersistentVolumeClaimSpec, VolumeResourceRequirements},
        storage::v1::StorageClass,
    },
    apimachinery::pkg::{api::resource::Quantity, apis::meta::v1::ObjectMeta},
};
use maplit::btreemap;

/// Checks that a driver hands out a usable storage class and that a claim
/// can be built against it.
pub struct ProvisioningTestSuite {
    info: TestSuiteInfo,
}

pub fn init_provisioning_test_suite() -> Box<dyn TestSuite> {
    Box::new(ProvisioningTestSuite {
        info: TestSuiteInfo {
            name: "provisioning".to_owned(),
            feature_tag: String::new(),
            test_patterns: vec![DEFAULT_FS_DYNAMIC_PV.clone()],
        },
    })
}

/// A `ReadWriteOnce` claim of `claim_size` against `storage_class`.
pub fn claim(
    claim_size: &str,
    namespace: &str,
    prefix: &str,
    storage_class: &StorageClass,
) -> PersistentVolumeClaim {
    PersistentVolumeClaim {
        metadata: ObjectMeta {
            generate_name: Some(format!("{}-pvc-", prefix)),
            namespace: Some(namespace.to_owned()),
            ..Default::default()
        },
        spec: Some(PersistentVolumeClaimSpec {
            access_modes: Some(vec!["ReadWriteOnce".to_owned()]),
            resources: Some(VolumeResourceRequirements {
                requests: Some(btreemap! {
                    "storage".to_owned() => Quantity(claim_size.to_owned()),
                }),
                ..Default::default()
            }),
            storage_class_name: storage_class.metadata.name.clone(),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn check(condition: bool, message: impl FnOnce() -> String) -> Result<(), SuiteError> {
    if condition {
        Ok(())
    } else {
        Err(SuiteError::Assertion(message()))
    }
}

impl TestSuite for ProvisioningTestSuite {
    fn info(&self) -> &TestSuiteInfo {
        &self.info
    }

    fn execute(&self, config: &PerTestConfig<'_>, pattern: &TestPattern) -> Result<(), SuiteError> {
        let driver = config
            .driver
            .as_dynamic_pv()
            .ok_or_else(|| SuiteError::Unsupported {
                driver: config.driver.driver_info().name.clone(),
                vol_type: pattern.vol_type,
            })?;

        let storage_class = driver.dynamic_provision_storage_class(config, &pattern.fs_type)?;
        let sc_name = storage_class.metadata.name.clone().unwrap_or_default();

        check(!sc_name.is_empty(), || "storage class has no name".to_owned())?;
        check(!storage_class.provisioner.is_empty(), || {
            format!("storage class {} has no provisioner", sc_name)
        })?;

        let claim_size = driver.claim_size();
        check(!claim_size.is_empty(), || "claim size is empty".to_owned())?;

        let pvc = claim(
            claim_size,
            config.framework.namespace(),
            &config.prefix,
            &storage_class,
        );
        let spec = pvc.spec.unwrap_or_default();
        check(spec.storage_class_name.as_deref() == Some(sc_name.as_str()), || {
            format!("claim does not reference storage class {}", sc_name)
        })?;

        log::info!(
            "claim of {} in {} uses storage class {} provisioned by {}",
            claim_size,
            config.framework.namespace(),
            sc_name,
            storage_class.provisioner
        );

        Ok(())
    }
}
