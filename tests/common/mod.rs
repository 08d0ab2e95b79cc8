#![allow(dead_code)]

use csi_driver_conformance::{framework::PatchFn, CleanupFn, Framework, FrameworkError};
use kube::core::DynamicObject;
use serde::Deserialize;
use std::{
    collections::BTreeMap,
    fs,
    path::Path,
    sync::{Arc, Mutex},
};

const CLUSTER_SCOPED_KINDS: &[&str] = &[
    "StorageClass",
    "ClusterRole",
    "ClusterRoleBinding",
    "CSIDriver",
    "Namespace",
];

/// `(kind, namespace, name)`
pub type ObjectKey = (String, Option<String>, String);

pub fn fixture(path: &str) -> String {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(path)
        .display()
        .to_string()
}

fn key(object: &DynamicObject) -> ObjectKey {
    (
        object
            .types
            .as_ref()
            .map(|t| t.kind.clone())
            .unwrap_or_default(),
        object.metadata.namespace.clone(),
        object.metadata.name.clone().unwrap_or_default(),
    )
}

fn is_cluster_scoped(object: &DynamicObject) -> bool {
    object
        .types
        .as_ref()
        .is_some_and(|t| CLUSTER_SCOPED_KINDS.contains(&t.kind.as_str()))
}

/// An in-memory stand-in for the objects stored in a cluster, shared by
/// every framework of a test run.
#[derive(Clone, Default)]
pub struct FakeCluster {
    objects: Arc<Mutex<BTreeMap<ObjectKey, DynamicObject>>>,
}

impl FakeCluster {
    pub fn keys(&self) -> Vec<ObjectKey> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.lock().unwrap().is_empty()
    }

    pub fn get(&self, kind: &str, namespace: Option<&str>, name: &str) -> Option<DynamicObject> {
        self.objects
            .lock()
            .unwrap()
            .get(&(
                kind.to_owned(),
                namespace.map(str::to_owned),
                name.to_owned(),
            ))
            .cloned()
    }

    /// Objects of one kind, in key order.
    pub fn objects_of_kind(&self, kind: &str) -> Vec<DynamicObject> {
        self.objects
            .lock()
            .unwrap()
            .iter()
            .filter(|((k, _, _), _)| k == kind)
            .map(|(_, object)| object.clone())
            .collect()
    }
}

pub struct FakeFramework {
    unique_name: String,
    cluster: FakeCluster,
    pub fail_create: bool,
    pub fail_delete: bool,
}

impl FakeFramework {
    pub fn new(cluster: &FakeCluster, unique_name: &str) -> Self {
        Self {
            unique_name: unique_name.to_owned(),
            cluster: cluster.clone(),
            fail_create: false,
            fail_delete: false,
        }
    }

    fn load(path: &str) -> Result<Vec<DynamicObject>, FrameworkError> {
        let load_error = |source: Box<dyn std::error::Error + Send + Sync>| FrameworkError::Load {
            path: path.to_owned(),
            source,
        };

        let yaml = fs::read_to_string(path).map_err(|e| load_error(e.into()))?;

        let mut objects = Vec::new();
        for document in serde_yaml::Deserializer::from_str(&yaml) {
            let value = serde_yaml::Value::deserialize(document).map_err(|e| load_error(e.into()))?;
            if value.is_null() {
                continue;
            }

            objects.push(serde_yaml::from_value(value).map_err(|e| load_error(e.into()))?);
        }

        Ok(objects)
    }
}

impl Framework for FakeFramework {
    fn unique_name(&self) -> &str {
        &self.unique_name
    }

    fn namespace(&self) -> &str {
        &self.unique_name
    }

    fn load_from_manifests(&self, paths: &[&str]) -> Result<Vec<DynamicObject>, FrameworkError> {
        let mut objects = Vec::new();
        for path in paths {
            objects.extend(Self::load(path)?);
        }

        Ok(objects)
    }

    fn patch_items(&self, items: &mut [DynamicObject]) -> Result<(), FrameworkError> {
        for item in items {
            if is_cluster_scoped(item) {
                let name = item.metadata.name.clone().unwrap_or_default();
                item.metadata.name = Some(format!("{}-{}", name, self.unique_name));
            } else {
                item.metadata.namespace = Some(self.unique_name.clone());
            }
        }

        Ok(())
    }

    fn create_from_manifests(
        &self,
        patch: PatchFn<'_>,
        paths: &[&str],
    ) -> Result<CleanupFn, FrameworkError> {
        let mut items = self.load_from_manifests(paths)?;
        self.patch_items(&mut items)?;

        let mut created = Vec::new();
        let result = items.into_iter().try_for_each(|mut item| {
            patch(&mut item)?;

            let key = key(&item);
            let mut objects = self.cluster.objects.lock().unwrap();
            if self.fail_create || objects.contains_key(&key) {
                return Err(FrameworkError::Create {
                    kind: key.0,
                    name: key.2,
                    source: "object already exists or creation is disabled".into(),
                });
            }

            objects.insert(key.clone(), item);
            created.push(key);
            Ok(())
        });

        if let Err(err) = result {
            let mut objects = self.cluster.objects.lock().unwrap();
            for key in &created {
                objects.remove(key);
            }
            return Err(err);
        }

        let cluster = self.cluster.clone();
        let fail_delete = self.fail_delete;
        Ok(Box::new(move || {
            let mut objects = cluster.objects.lock().unwrap();
            for key in created.into_iter().rev() {
                if fail_delete {
                    return Err(FrameworkError::Delete {
                        kind: key.0,
                        name: key.2,
                        source: "deletion is disabled".into(),
                    });
                }
                objects.remove(&key);
            }

            Ok(())
        }))
    }
}
