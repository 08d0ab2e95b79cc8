use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The way a volume is handed to a pod under test.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum TestVolType {
    InlineVolume,
    PreprovisionedPV,
    DynamicPV,
}

impl fmt::Display for TestVolType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TestVolType::InlineVolume => "InlineVolume",
            TestVolType::PreprovisionedPV => "PreprovisionedPV",
            TestVolType::DynamicPV => "DynamicPV",
        };

        f.write_str(name)
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum TestSnapshotType {
    DynamicCreatedSnapshot,
}

impl fmt::Display for TestSnapshotType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestSnapshotType::DynamicCreatedSnapshot => f.write_str("DynamicSnapshot"),
        }
    }
}

/// Mirrors the `volumeMode` field of a persistent volume.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum VolumeMode {
    Filesystem,
    Block,
}

/// One volume-provisioning shape a test suite can be run with.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct TestPattern {
    pub name: String,
    pub feature_tag: String,
    pub vol_type: TestVolType,
    pub fs_type: String,
    pub vol_mode: Option<VolumeMode>,
    pub snapshot_type: Option<TestSnapshotType>,
}

impl TestPattern {
    fn new(name: &str, vol_type: TestVolType) -> Self {
        Self {
            name: name.to_owned(),
            feature_tag: String::new(),
            vol_type,
            fs_type: String::new(),
            vol_mode: None,
            snapshot_type: None,
        }
    }

    fn fs_type(mut self, fs_type: &str) -> Self {
        self.fs_type = fs_type.to_owned();
        self
    }

    fn feature_tag(mut self, feature_tag: &str) -> Self {
        self.feature_tag = feature_tag.to_owned();
        self
    }

    fn vol_mode(mut self, vol_mode: VolumeMode) -> Self {
        self.vol_mode = Some(vol_mode);
        self
    }

    fn snapshot_type(mut self, snapshot_type: TestSnapshotType) -> Self {
        self.snapshot_type = Some(snapshot_type);
        self
    }
}

impl fmt::Display for TestPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.name, self.feature_tag)
    }
}

pub const MI_B: u64 = 1024 * 1024;
pub const GI_B: u64 = 1024 * MI_B;

pub const FILE_SIZE_SMALL: u64 = MI_B;
pub const FILE_SIZE_MEDIUM: u64 = 100 * MI_B;
pub const FILE_SIZE_LARGE: u64 = GI_B;

pub static DEFAULT_FS_INLINE_VOLUME: Lazy<TestPattern> =
    Lazy::new(|| TestPattern::new("Inline-volume (default fs)", TestVolType::InlineVolume));
pub static DEFAULT_FS_PREPROVISIONED_PV: Lazy<TestPattern> = Lazy::new(|| {
    TestPattern::new(
        "Pre-provisioned PV (default fs)",
        TestVolType::PreprovisionedPV,
    )
});
pub static DEFAULT_FS_DYNAMIC_PV: Lazy<TestPattern> =
    Lazy::new(|| TestPattern::new("Dynamic PV (default fs)", TestVolType::DynamicPV));

pub static EXT3_INLINE_VOLUME: Lazy<TestPattern> = Lazy::new(|| {
    TestPattern::new("Inline-volume (ext3)", TestVolType::InlineVolume).fs_type("ext3")
});
pub static EXT3_PREPROVISIONED_PV: Lazy<TestPattern> = Lazy::new(|| {
    TestPattern::new("Pre-provisioned PV (ext3)", TestVolType::PreprovisionedPV).fs_type("ext3")
});
pub static EXT3_DYNAMIC_PV: Lazy<TestPattern> =
    Lazy::new(|| TestPattern::new("Dynamic PV (ext3)", TestVolType::DynamicPV).fs_type("ext3"));

pub static EXT4_INLINE_VOLUME: Lazy<TestPattern> = Lazy::new(|| {
    TestPattern::new("Inline-volume (ext4)", TestVolType::InlineVolume).fs_type("ext4")
});
pub static EXT4_PREPROVISIONED_PV: Lazy<TestPattern> = Lazy::new(|| {
    TestPattern::new("Pre-provisioned PV (ext4)", TestVolType::PreprovisionedPV).fs_type("ext4")
});
pub static EXT4_DYNAMIC_PV: Lazy<TestPattern> =
    Lazy::new(|| TestPattern::new("Dynamic PV (ext4)", TestVolType::DynamicPV).fs_type("ext4"));

// xfs runs are slow enough to be tagged out of the default set.
pub static XFS_INLINE_VOLUME: Lazy<TestPattern> = Lazy::new(|| {
    TestPattern::new("Inline-volume (xfs)", TestVolType::InlineVolume)
        .fs_type("xfs")
        .feature_tag("[Slow]")
});
pub static XFS_PREPROVISIONED_PV: Lazy<TestPattern> = Lazy::new(|| {
    TestPattern::new("Pre-provisioned PV (xfs)", TestVolType::PreprovisionedPV)
        .fs_type("xfs")
        .feature_tag("[Slow]")
});
pub static XFS_DYNAMIC_PV: Lazy<TestPattern> = Lazy::new(|| {
    TestPattern::new("Dynamic PV (xfs)", TestVolType::DynamicPV)
        .fs_type("xfs")
        .feature_tag("[Slow]")
});

pub static FS_VOL_MODE_PREPROVISIONED_PV: Lazy<TestPattern> = Lazy::new(|| {
    TestPattern::new(
        "Pre-provisioned PV (filesystem volmode)",
        TestVolType::PreprovisionedPV,
    )
    .vol_mode(VolumeMode::Filesystem)
});
pub static FS_VOL_MODE_DYNAMIC_PV: Lazy<TestPattern> = Lazy::new(|| {
    TestPattern::new("Dynamic PV (filesystem volmode)", TestVolType::DynamicPV)
        .vol_mode(VolumeMode::Filesystem)
});
pub static BLOCK_VOL_MODE_PREPROVISIONED_PV: Lazy<TestPattern> = Lazy::new(|| {
    TestPattern::new(
        "Pre-provisioned PV (block volmode)",
        TestVolType::PreprovisionedPV,
    )
    .vol_mode(VolumeMode::Block)
});
pub static BLOCK_VOL_MODE_DYNAMIC_PV: Lazy<TestPattern> = Lazy::new(|| {
    TestPattern::new("Dynamic PV (block volmode)", TestVolType::DynamicPV)
        .vol_mode(VolumeMode::Block)
});

pub static DYNAMIC_SNAPSHOT: Lazy<TestPattern> = Lazy::new(|| {
    TestPattern::new("Dynamic Snapshot", TestVolType::DynamicPV)
        .snapshot_type(TestSnapshotType::DynamicCreatedSnapshot)
});

/// Every pattern known to the harness.
pub fn all_patterns() -> Vec<TestPattern> {
    [
        &DEFAULT_FS_INLINE_VOLUME,
        &DEFAULT_FS_PREPROVISIONED_PV,
        &DEFAULT_FS_DYNAMIC_PV,
        &EXT3_INLINE_VOLUME,
        &EXT3_PREPROVISIONED_PV,
        &EXT3_DYNAMIC_PV,
        &EXT4_INLINE_VOLUME,
        &EXT4_PREPROVISIONED_PV,
        &EXT4_DYNAMIC_PV,
        &XFS_INLINE_VOLUME,
        &XFS_PREPROVISIONED_PV,
        &XFS_DYNAMIC_PV,
        &FS_VOL_MODE_PREPROVISIONED_PV,
        &FS_VOL_MODE_DYNAMIC_PV,
        &BLOCK_VOL_MODE_PREPROVISIONED_PV,
        &BLOCK_VOL_MODE_DYNAMIC_PV,
        &DYNAMIC_SNAPSHOT,
    ]
    .into_iter()
    .map(|pattern| TestPattern::clone(pattern))
    .collect()
}

/// Narrows a pattern list to the patterns a pattern filter keeps.
pub type PatternFilter = fn(&[TestPattern]) -> Vec<TestPattern>;

/// Keeps every pattern, for drivers that can back any volume type.
pub fn all_supported(patterns: &[TestPattern]) -> Vec<TestPattern> {
    patterns.to_vec()
}

/// Drops the patterns that CSI drivers deployed from manifests cannot
/// run: they only provision through a storage class, so inline volumes
/// and pre-provisioned PVs are never possible. Order is preserved.
pub fn tune_csi_patterns(patterns: &[TestPattern]) -> Vec<TestPattern> {
    patterns
        .iter()
        .filter(|pattern| {
            !matches!(
                pattern.vol_type,
                TestVolType::InlineVolume | TestVolType::PreprovisionedPV
            )
        })
        .cloned()
        .collect()
}
