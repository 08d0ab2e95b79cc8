pub mod provisioning;

pub use provisioning::{init_provisioning_test_suite, ProvisioningTestSuite};
