use k8s_openapi::api::{
    apps::v1::{DaemonSet, Deployment, ReplicaSet, StatefulSet},
    core::v1::{Container, PodSpec, Volume},
    storage::v1::StorageClass,
};
use kube::core::DynamicObject;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use typed_builder::TypedBuilder;

/// A `new_driver_name` ending in this character gets the unique name of
/// the test run appended once the run is known.
pub const UNIQUE_NAME_SEPARATOR: char = '-';

#[derive(Debug, Error)]
pub enum PatchError {
    #[error("object {0} has no apiVersion/kind")]
    MissingTypeMeta(String),

    #[error("failed to convert {kind} {name}: {source}")]
    Conversion {
        kind: String,
        name: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Describes how the objects of a CSI driver deployment are rewritten so
/// that the driver runs under a test-specific name.
///
/// This is the declared form; it has to be turned into
/// [`FinalPatchCsiOptions`] with [`PatchCsiOptions::finalize`] before it
/// can be applied.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize, TypedBuilder)]
#[serde(rename_all = "camelCase", default)]
pub struct PatchCsiOptions {
    /// The driver name used in the original manifests.
    #[builder(default, setter(into))]
    pub old_driver_name: String,

    /// The driver name to use instead, possibly ending in
    /// [`UNIQUE_NAME_SEPARATOR`].
    #[builder(default, setter(into))]
    pub new_driver_name: String,

    /// Container which gets `--drivername=<new name>` appended.
    #[builder(default, setter(into))]
    pub driver_container_name: String,

    /// Container which gets `--provisioner=<new name>` appended.
    #[builder(default, setter(into))]
    pub provisioner_container_name: String,

    /// Pins the driver pods to this node when set.
    #[builder(default, setter(into))]
    pub node_name: String,
}

impl PatchCsiOptions {
    pub fn finalize(&self, unique_name: &str) -> FinalPatchCsiOptions {
        let mut options = self.clone();

        // The unique name does not exist yet when drivers are declared.
        if options.new_driver_name.ends_with(UNIQUE_NAME_SEPARATOR) {
            options.new_driver_name.push_str(unique_name);
        }

        FinalPatchCsiOptions(options)
    }
}

/// Patch options with the driver name resolved for one test run.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FinalPatchCsiOptions(PatchCsiOptions);

impl FinalPatchCsiOptions {
    #[cfg(test)]
    pub(crate) fn options(&self) -> &PatchCsiOptions {
        &self.0
    }

    pub fn new_driver_name(&self) -> &str {
        &self.0.new_driver_name
    }

    fn rename(&self) -> bool {
        let o = &self.0;
        !o.old_driver_name.is_empty()
            && !o.new_driver_name.is_empty()
            && o.old_driver_name != o.new_driver_name
    }

    fn patch_volumes(&self, volumes: &mut [Volume]) {
        if !self.rename() {
            return;
        }

        let o = &self.0;
        for host_path in volumes.iter_mut().filter_map(|v| v.host_path.as_mut()) {
            // Plugin directories like /var/lib/kubelet/plugins/<driver>.
            let patched = match host_path.path.rsplit_once('/') {
                Some((dir, file)) if file == o.old_driver_name => {
                    Some(format!("{}/{}", dir, o.new_driver_name))
                }
                None if host_path.path == o.old_driver_name => Some(o.new_driver_name.clone()),
                _ => None,
            };

            if let Some(path) = patched {
                log::debug!("re-pointing host path {} to {}", host_path.path, path);
                host_path.path = path;
            }
        }
    }

    fn patch_containers(&self, containers: &mut [Container]) {
        let o = &self.0;
        let rename = self.rename();
        let old_segment = format!("/{}/", o.old_driver_name);
        let new_segment = format!("/{}/", o.new_driver_name);

        for container in containers {
            if let (true, Some(args)) = (rename, container.args.as_mut()) {
                for arg in args.iter_mut() {
                    *arg = arg.replacen(&old_segment, &new_segment, 1);
                }
            }

            if o.new_driver_name.is_empty() || container.name.is_empty() {
                continue;
            }

            let flag = if container.name == o.driver_container_name {
                "--drivername"
            } else if container.name == o.provisioner_container_name {
                // The provisioner name has to match the driver name.
                "--provisioner"
            } else {
                continue;
            };

            container
                .args
                .get_or_insert_with(Vec::new)
                .push(format!("{}={}", flag, o.new_driver_name));
        }
    }

    fn patch_pod_spec(&self, spec: &mut PodSpec) {
        self.patch_containers(&mut spec.containers);
        if let Some(volumes) = spec.volumes.as_mut() {
            self.patch_volumes(volumes);
        }
        if !self.0.node_name.is_empty() {
            spec.node_name = Some(self.0.node_name.clone());
        }
    }
}

trait PodSpecMut {
    fn pod_spec_mut(&mut self) -> Option<&mut PodSpec>;
}

impl PodSpecMut for Deployment {
    fn pod_spec_mut(&mut self) -> Option<&mut PodSpec> {
        self.spec.as_mut().and_then(|s| s.template.spec.as_mut())
    }
}

impl PodSpecMut for DaemonSet {
    fn pod_spec_mut(&mut self) -> Option<&mut PodSpec> {
        self.spec.as_mut().and_then(|s| s.template.spec.as_mut())
    }
}

impl PodSpecMut for StatefulSet {
    fn pod_spec_mut(&mut self) -> Option<&mut PodSpec> {
        self.spec.as_mut().and_then(|s| s.template.spec.as_mut())
    }
}

impl PodSpecMut for ReplicaSet {
    fn pod_spec_mut(&mut self) -> Option<&mut PodSpec> {
        self.spec
            .as_mut()
            .and_then(|s| s.template.as_mut())
            .and_then(|t| t.spec.as_mut())
    }
}

fn convert<T: Serialize, U: DeserializeOwned>(
    from: &T,
    kind: &str,
    name: &str,
) -> Result<U, PatchError> {
    serde_json::to_value(from)
        .and_then(serde_json::from_value)
        .map_err(|source| PatchError::Conversion {
            kind: kind.to_owned(),
            name: name.to_owned(),
            source,
        })
}

/// Round-trips `object` through the typed resource `K` so it can be
/// patched with the generated Kubernetes types.
fn patch_typed<K: Serialize + DeserializeOwned>(
    object: &mut DynamicObject,
    kind: &str,
    patch: impl FnOnce(&mut K),
) -> Result<(), PatchError> {
    let name = object.metadata.name.clone().unwrap_or_default();

    let mut typed: K = convert(object, kind, &name)?;
    patch(&mut typed);
    *object = convert(&typed, kind, &name)?;

    Ok(())
}

fn patch_workload<K: PodSpecMut + Serialize + DeserializeOwned>(
    options: &FinalPatchCsiOptions,
    object: &mut DynamicObject,
    kind: &str,
) -> Result<(), PatchError> {
    patch_typed::<K>(object, kind, |workload| {
        if let Some(spec) = workload.pod_spec_mut() {
            options.patch_pod_spec(spec);
        }
    })
}

/// Rewrites a single object of a CSI driver deployment so that it refers
/// to the driver under its test-specific name.
///
/// Workloads have their containers, host path volumes and node name
/// patched, storage classes get a new provisioner. Any other object is
/// left alone.
pub fn patch_csi_deployment(
    options: &FinalPatchCsiOptions,
    object: &mut DynamicObject,
) -> Result<(), PatchError> {
    let types = object.types.clone().ok_or_else(|| {
        PatchError::MissingTypeMeta(object.metadata.name.clone().unwrap_or_default())
    })?;

    match (types.api_version.as_str(), types.kind.as_str()) {
        ("apps/v1", "Deployment") => patch_workload::<Deployment>(options, object, &types.kind),
        ("apps/v1", "DaemonSet") => patch_workload::<DaemonSet>(options, object, &types.kind),
        ("apps/v1", "StatefulSet") => patch_workload::<StatefulSet>(options, object, &types.kind),
        ("apps/v1", "ReplicaSet") => patch_workload::<ReplicaSet>(options, object, &types.kind),
        ("storage.k8s.io/v1", "StorageClass") => {
            if options.new_driver_name().is_empty() {
                return Ok(());
            }

            // The provisioner name has to match the driver name.
            patch_typed::<StorageClass>(object, &types.kind, |sc| {
                sc.provisioner = options.new_driver_name().to_owned();
            })
        }
        _ => Ok(()),
    }
}
