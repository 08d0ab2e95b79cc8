use crate::{
    driver::{driver_name_with_feature_tags, DriverError, Skip, TestDriver},
    framework::Framework,
    lifecycle::{CleanupError, PerTestConfig},
    patterns::{PatternFilter, TestPattern, TestVolType},
};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct TestSuiteInfo {
    pub name: String,
    pub feature_tag: String,
    pub test_patterns: Vec<TestPattern>,
}

#[derive(Debug, Error)]
pub enum SuiteError {
    #[error(transparent)]
    Driver(#[from] DriverError),

    #[error("driver {driver} does not support {vol_type} volumes")]
    Unsupported { driver: String, vol_type: TestVolType },

    #[error("assertion failed: {0}")]
    Assertion(String),
}

/// A behavioral test suite written against the driver contract.
pub trait TestSuite {
    fn info(&self) -> &TestSuiteInfo;

    /// Runs the suite's assertions for one pattern against a driver that
    /// has already been deployed for this test case.
    fn execute(&self, config: &PerTestConfig<'_>, pattern: &TestPattern)
        -> Result<(), SuiteError>;
}

pub type SuiteInit = fn() -> Box<dyn TestSuite>;
pub type DriverInit = fn() -> Box<dyn TestDriver>;

/// Checks that are common to every driver, followed by the driver's own
/// [`TestDriver::skip_unsupported_test`].
pub fn skip_unsupported_test(driver: &dyn TestDriver, pattern: &TestPattern) -> Result<(), Skip> {
    let info = driver.driver_info();

    if let Some(snapshot_type) = pattern.snapshot_type {
        return Err(Skip(format!(
            "Driver {} doesn't support snapshot type {} -- skipping",
            info.name, snapshot_type
        )));
    }

    let supported = match pattern.vol_type {
        TestVolType::DynamicPV => driver.as_dynamic_pv().is_some(),
        TestVolType::InlineVolume | TestVolType::PreprovisionedPV => false,
    };
    if !supported {
        return Err(Skip(format!(
            "Driver {} doesn't support {} -- skipping",
            info.name, pattern.vol_type
        )));
    }

    if !info.supports_fs_type(&pattern.fs_type) {
        return Err(Skip(format!(
            "Driver {} doesn't support {:?} -- skipping",
            info.name, pattern.fs_type
        )));
    }

    driver.skip_unsupported_test(pattern)
}

#[derive(Clone, Debug)]
pub struct TestCase {
    pub name: String,
    pub pattern: TestPattern,
    suite: usize,
}

#[derive(Debug)]
pub enum TestOutcome {
    Passed,
    Skipped(Skip),
    Failed(SuiteError),
}

/// The result of one test case. A failing teardown is reported next to
/// the outcome of the test body, never in place of it.
#[derive(Debug)]
pub struct TestReport {
    pub name: String,
    pub outcome: TestOutcome,
    pub cleanup_error: Option<CleanupError>,
}

impl TestReport {
    pub fn succeeded(&self) -> bool {
        !matches!(self.outcome, TestOutcome::Failed(_)) && self.cleanup_error.is_none()
    }
}

/// All test cases of one driver.
pub struct DriverContext {
    name: String,
    driver: Box<dyn TestDriver>,
    suites: Vec<Box<dyn TestSuite>>,
    test_cases: Vec<TestCase>,
}

impl DriverContext {
    /// Registers one test case per suite and per pattern of that suite
    /// which survives `filter`.
    pub fn define(driver: Box<dyn TestDriver>, suites: &[SuiteInit], filter: PatternFilter) -> Self {
        let suites: Vec<Box<dyn TestSuite>> = suites.iter().map(|init| init()).collect();

        let test_cases = suites
            .iter()
            .enumerate()
            .flat_map(|(index, suite)| {
                let info = suite.info();
                filter(&info.test_patterns)
                    .into_iter()
                    .map(move |pattern| TestCase {
                        name: format!(
                            "[Testpattern: {}] {}{}",
                            pattern, info.name, info.feature_tag
                        ),
                        pattern,
                        suite: index,
                    })
            })
            .collect();

        Self {
            name: driver_name_with_feature_tags(driver.as_ref()),
            driver,
            suites,
            test_cases,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn driver(&self) -> &dyn TestDriver {
        self.driver.as_ref()
    }

    pub fn test_cases(&self) -> &[TestCase] {
        &self.test_cases
    }

    /// Runs every test case one after another, each with a framework of
    /// its own. The driver is never deployed twice at the same time.
    pub fn run<F, N>(&self, mut new_framework: N) -> Vec<TestReport>
    where
        F: Framework,
        N: FnMut(&TestCase) -> F,
    {
        self.test_cases
            .iter()
            .map(|test_case| {
                let framework = new_framework(test_case);
                self.run_test_case(test_case, &framework)
            })
            .collect()
    }

    pub fn run_test_case(&self, test_case: &TestCase, framework: &dyn Framework) -> TestReport {
        let name = format!("{} {}", self.name, test_case.name);

        // Skip before deploying anything.
        if let Err(skip) = skip_unsupported_test(self.driver.as_ref(), &test_case.pattern) {
            log::info!("{}: {}", name, skip);
            return TestReport {
                name,
                outcome: TestOutcome::Skipped(skip),
                cleanup_error: None,
            };
        }

        let (config, cleanup) = match self.driver.prepare_test(framework) {
            Ok(prepared) => prepared,
            Err(err) => {
                log::error!("{}: {}", name, err);
                return TestReport {
                    name,
                    outcome: TestOutcome::Failed(err.into()),
                    cleanup_error: None,
                };
            }
        };

        let outcome = match self.suites[test_case.suite].execute(&config, &test_case.pattern) {
            Ok(()) => TestOutcome::Passed,
            Err(err) => {
                log::error!("{}: {}", name, err);
                TestOutcome::Failed(err)
            }
        };
        drop(config);

        let cleanup_error = cleanup.release().err();
        if let Some(err) = &cleanup_error {
            log::error!("{}: cleanup failed: {}", name, err);
        }

        TestReport {
            name,
            outcome,
            cleanup_error,
        }
    }
}

/// Builds the test contexts for an explicit list of drivers and suites.
pub fn define_test_suites(
    drivers: &[DriverInit],
    suites: &[SuiteInit],
    filter: PatternFilter,
) -> Vec<DriverContext> {
    drivers
        .iter()
        .map(|init| DriverContext::define(init(), suites, filter))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        driver::{DriverInfo, DynamicPvTestDriver},
        lifecycle::CleanupHandle,
        patterns::{
            tune_csi_patterns, DEFAULT_FS_DYNAMIC_PV, DEFAULT_FS_INLINE_VOLUME,
            DEFAULT_FS_PREPROVISIONED_PV, DYNAMIC_SNAPSHOT, EXT4_DYNAMIC_PV,
        },
    };
    use k8s_openapi::api::storage::v1::StorageClass;
    use kube::core::DynamicObject;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    struct StaticDriver {
        info: DriverInfo,
        dynamic: bool,
        veto: Option<String>,
    }

    impl StaticDriver {
        fn new(dynamic: bool) -> Self {
            Self {
                info: DriverInfo::builder().name("fake").build(),
                dynamic,
                veto: None,
            }
        }
    }

    impl TestDriver for StaticDriver {
        fn driver_info(&self) -> &DriverInfo {
            &self.info
        }

        fn skip_unsupported_test(&self, _pattern: &TestPattern) -> Result<(), Skip> {
            match &self.veto {
                Some(reason) => Err(Skip(reason.clone())),
                None => Ok(()),
            }
        }

        fn prepare_test<'a>(
            &'a self,
            framework: &'a dyn Framework,
        ) -> Result<(PerTestConfig<'a>, CleanupHandle), DriverError> {
            Ok((
                PerTestConfig {
                    driver: self,
                    prefix: "fake".into(),
                    framework,
                },
                CleanupHandle::noop(),
            ))
        }

        fn as_dynamic_pv(&self) -> Option<&dyn DynamicPvTestDriver> {
            if self.dynamic {
                Some(self)
            } else {
                None
            }
        }
    }

    impl DynamicPvTestDriver for StaticDriver {
        fn dynamic_provision_storage_class(
            &self,
            _config: &PerTestConfig<'_>,
            _fs_type: &str,
        ) -> Result<StorageClass, DriverError> {
            Ok(StorageClass::default())
        }

        fn claim_size(&self) -> &str {
            "1Mi"
        }
    }

    struct NullFramework;

    impl Framework for NullFramework {
        fn unique_name(&self) -> &str {
            "e2e-null"
        }

        fn namespace(&self) -> &str {
            "e2e-null"
        }

        fn load_from_manifests(
            &self,
            _paths: &[&str],
        ) -> Result<Vec<DynamicObject>, crate::framework::FrameworkError> {
            Ok(vec![])
        }

        fn patch_items(
            &self,
            _items: &mut [DynamicObject],
        ) -> Result<(), crate::framework::FrameworkError> {
            Ok(())
        }

        fn create_from_manifests(
            &self,
            _patch: crate::framework::PatchFn<'_>,
            _paths: &[&str],
        ) -> Result<crate::framework::CleanupFn, crate::framework::FrameworkError> {
            Ok(Box::new(|| Ok(())))
        }
    }

    struct PatternSuite {
        info: TestSuiteInfo,
        fail: bool,
    }

    impl TestSuite for PatternSuite {
        fn info(&self) -> &TestSuiteInfo {
            &self.info
        }

        fn execute(
            &self,
            _config: &PerTestConfig<'_>,
            _pattern: &TestPattern,
        ) -> Result<(), SuiteError> {
            if self.fail {
                return Err(SuiteError::Assertion("expected failure".into()));
            }
            Ok(())
        }
    }

    fn init_volumes_suite() -> Box<dyn TestSuite> {
        Box::new(PatternSuite {
            info: TestSuiteInfo {
                name: "volumes".into(),
                feature_tag: String::new(),
                test_patterns: vec![
                    DEFAULT_FS_INLINE_VOLUME.clone(),
                    DEFAULT_FS_PREPROVISIONED_PV.clone(),
                    DEFAULT_FS_DYNAMIC_PV.clone(),
                    EXT4_DYNAMIC_PV.clone(),
                ],
            },
            fail: false,
        })
    }

    fn init_failing_suite() -> Box<dyn TestSuite> {
        Box::new(PatternSuite {
            info: TestSuiteInfo {
                name: "failing".into(),
                feature_tag: "[Feature:Failing]".into(),
                test_patterns: vec![DEFAULT_FS_DYNAMIC_PV.clone()],
            },
            fail: true,
        })
    }

    fn init_dynamic_driver() -> Box<dyn TestDriver> {
        Box::new(StaticDriver::new(true))
    }

    #[rstest]
    #[case(&DEFAULT_FS_DYNAMIC_PV, true, None)]
    #[case(&DEFAULT_FS_DYNAMIC_PV, false, Some("Driver fake doesn't support DynamicPV -- skipping"))]
    #[case(&DEFAULT_FS_INLINE_VOLUME, true, Some("Driver fake doesn't support InlineVolume -- skipping"))]
    #[case(&DEFAULT_FS_PREPROVISIONED_PV, true, Some("Driver fake doesn't support PreprovisionedPV -- skipping"))]
    #[case(&EXT4_DYNAMIC_PV, true, Some("Driver fake doesn't support \"ext4\" -- skipping"))]
    #[case(&DYNAMIC_SNAPSHOT, true, Some("Driver fake doesn't support snapshot type DynamicSnapshot -- skipping"))]
    fn test_skip_unsupported_test(
        #[case] pattern: &TestPattern,
        #[case] dynamic: bool,
        #[case] expected: Option<&str>,
    ) {
        let driver = StaticDriver::new(dynamic);

        let result = skip_unsupported_test(&driver, pattern);

        assert_eq!(result.err().map(|skip| skip.0), expected.map(String::from));
    }

    #[test]
    fn test_skip_unsupported_test_consults_driver_last() {
        let mut driver = StaticDriver::new(true);
        driver.veto = Some("no PMEM on this node".into());

        let result = skip_unsupported_test(&driver, &DEFAULT_FS_DYNAMIC_PV);

        assert_eq!(result, Err(Skip("no PMEM on this node".into())));
    }

    #[test]
    fn test_define_registers_filtered_patterns() {
        let context = DriverContext::define(
            init_dynamic_driver(),
            &[init_volumes_suite, init_failing_suite],
            tune_csi_patterns,
        );

        let names: Vec<&str> = context
            .test_cases()
            .iter()
            .map(|case| case.name.as_str())
            .collect();

        assert_eq!(context.name(), "[Driver: fake]");
        assert_eq!(
            names,
            vec![
                "[Testpattern: Dynamic PV (default fs)] volumes",
                "[Testpattern: Dynamic PV (ext4)] volumes",
                "[Testpattern: Dynamic PV (default fs)] failing[Feature:Failing]",
            ]
        );
    }

    #[test]
    fn test_run_reports_each_case() {
        let context = DriverContext::define(
            init_dynamic_driver(),
            &[init_volumes_suite, init_failing_suite],
            tune_csi_patterns,
        );

        let reports = context.run(|_| NullFramework);

        assert_eq!(reports.len(), 3);
        assert!(matches!(reports[0].outcome, TestOutcome::Passed));
        assert!(matches!(reports[1].outcome, TestOutcome::Skipped(_)));
        assert!(matches!(
            reports[2].outcome,
            TestOutcome::Failed(SuiteError::Assertion(_))
        ));
        assert!(reports[0].succeeded());
        assert!(reports[1].succeeded());
        assert!(!reports[2].succeeded());
        assert_eq!(
            reports[0].name,
            "[Driver: fake] [Testpattern: Dynamic PV (default fs)] volumes"
        );
    }

    #[test]
    fn test_define_test_suites_one_context_per_driver() {
        fn init_static_driver() -> Box<dyn TestDriver> {
            Box::new(StaticDriver::new(false))
        }

        let contexts = define_test_suites(
            &[init_dynamic_driver, init_static_driver],
            &[init_volumes_suite],
            tune_csi_patterns,
        );

        assert_eq!(contexts.len(), 2);
        assert_eq!(contexts[0].test_cases().len(), 2);
        assert_eq!(contexts[1].test_cases().len(), 2);
        assert!(contexts[1].driver().as_dynamic_pv().is_none());
    }
}
