//! Plugin descriptors and compute resource limits.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::parameters::PluginParameter;
use crate::types::DbId;

/// Whether a plugin starts a feed or consumes the output of a previous
/// instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginKind {
    /// Feed-synthesis plugin: a root job with no upstream.
    Fs,
    /// Data-synthesis plugin: requires exactly one previous instance.
    Ds,
}

impl PluginKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fs => "fs",
            Self::Ds => "ds",
        }
    }

    pub fn requires_previous(self) -> bool {
        self == Self::Ds
    }
}

impl fmt::Display for PluginKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PluginKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fs" => Ok(Self::Fs),
            "ds" => Ok(Self::Ds),
            other => Err(CoreError::Validation(format!("Unknown plugin type '{other}'"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Resource limits
// ---------------------------------------------------------------------------

/// Default number of workers requested for an instance.
pub const DEFAULT_NUMBER_OF_WORKERS: i32 = 1;

/// Default CPU limit in millicores.
pub const DEFAULT_CPU_LIMIT: i32 = 1000;

/// Default memory limit in MiB.
pub const DEFAULT_MEMORY_LIMIT: i32 = 200;

/// Default number of GPUs.
pub const DEFAULT_GPU_LIMIT: i32 = 0;

/// Inclusive range a plugin accepts for one resource limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitRange {
    pub min: i32,
    pub max: i32,
}

impl LimitRange {
    pub const fn new(min: i32, max: i32) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: i32) -> bool {
        value >= self.min && value <= self.max
    }

    pub fn is_empty(&self) -> bool {
        self.min > self.max
    }

    /// `None` for an empty range.
    pub fn clamp(&self, value: i32) -> Option<i32> {
        (!self.is_empty()).then(|| value.clamp(self.min, self.max))
    }
}

/// Per-plugin bounds on the resources an instance may request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceBounds {
    pub number_of_workers: LimitRange,
    pub cpu_limit: LimitRange,
    pub memory_limit: LimitRange,
    pub gpu_limit: LimitRange,
}

impl Default for ResourceBounds {
    fn default() -> Self {
        Self {
            number_of_workers: LimitRange::new(1, i32::MAX),
            cpu_limit: LimitRange::new(1, i32::MAX),
            memory_limit: LimitRange::new(4, i32::MAX),
            gpu_limit: LimitRange::new(0, i32::MAX),
        }
    }
}

/// Resources requested for one plugin instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLimits {
    pub number_of_workers: i32,
    pub cpu_limit: i32,
    pub memory_limit: i32,
    pub gpu_limit: i32,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            number_of_workers: DEFAULT_NUMBER_OF_WORKERS,
            cpu_limit: DEFAULT_CPU_LIMIT,
            memory_limit: DEFAULT_MEMORY_LIMIT,
            gpu_limit: DEFAULT_GPU_LIMIT,
        }
    }
}

/// Optional overrides supplied at creation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestedLimits {
    pub number_of_workers: Option<i32>,
    pub cpu_limit: Option<i32>,
    pub memory_limit: Option<i32>,
    pub gpu_limit: Option<i32>,
}

impl ResourceBounds {
    /// Reject bounds with an empty range; such a plugin could never run.
    pub fn validate(&self) -> Result<(), CoreError> {
        let ranges = [
            ("number_of_workers", &self.number_of_workers),
            ("cpu_limit", &self.cpu_limit),
            ("memory_limit", &self.memory_limit),
            ("gpu_limit", &self.gpu_limit),
        ];
        match ranges.iter().find(|(_, range)| range.is_empty()) {
            Some((field, range)) => Err(empty_range(field, range)),
            None => Ok(()),
        }
    }

    /// Resolve requested limits against these bounds.
    ///
    /// Missing values take the global default clamped into range; supplied
    /// values outside the range are rejected.
    pub fn resolve(&self, requested: &RequestedLimits) -> Result<ResourceLimits, CoreError> {
        Ok(ResourceLimits {
            number_of_workers: pick(
                "number_of_workers",
                requested.number_of_workers,
                DEFAULT_NUMBER_OF_WORKERS,
                &self.number_of_workers,
            )?,
            cpu_limit: pick(
                "cpu_limit",
                requested.cpu_limit,
                DEFAULT_CPU_LIMIT,
                &self.cpu_limit,
            )?,
            memory_limit: pick(
                "memory_limit",
                requested.memory_limit,
                DEFAULT_MEMORY_LIMIT,
                &self.memory_limit,
            )?,
            gpu_limit: pick(
                "gpu_limit",
                requested.gpu_limit,
                DEFAULT_GPU_LIMIT,
                &self.gpu_limit,
            )?,
        })
    }
}

fn pick(field: &str, requested: Option<i32>, default: i32, range: &LimitRange) -> Result<i32, CoreError> {
    if range.is_empty() {
        return Err(empty_range(field, range));
    }
    match requested {
        Some(v) if range.contains(v) => Ok(v),
        Some(_) => Err(CoreError::Validation(format!(
            "{field}: This field value is out of range."
        ))),
        None => range.clamp(default).ok_or_else(|| empty_range(field, range)),
    }
}

fn empty_range(field: &str, range: &LimitRange) -> CoreError {
    CoreError::Validation(format!(
        "{field}: plugin bounds are empty (min {} > max {}).",
        range.min, range.max
    ))
}

// ---------------------------------------------------------------------------
// Plugin
// ---------------------------------------------------------------------------

/// A registered plugin: what to run, how to call it, and where it may run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plugin {
    pub id: DbId,
    pub name: String,
    pub version: String,
    pub kind: PluginKind,
    pub dock_image: String,
    pub execshell: String,
    pub selfpath: String,
    pub selfexec: String,
    pub parameters: Vec<PluginParameter>,
    /// Names of the compute resources this plugin is registered with.
    pub compute_resources: Vec<String>,
    pub resource_bounds: ResourceBounds,
}

impl Plugin {
    /// Pick the compute resource for a new instance.
    ///
    /// Defaults to the first registered resource; an explicit name must be
    /// one the plugin is registered with.
    pub fn select_compute_resource(&self, requested: Option<&str>) -> Result<String, CoreError> {
        match requested {
            Some(name) if self.compute_resources.iter().any(|r| r == name) => Ok(name.to_string()),
            Some(name) => Err(CoreError::Validation(format!(
                "Plugin '{}' with version '{}' has not been registered with compute resource '{name}'.",
                self.name, self.version
            ))),
            None => self.compute_resources.first().cloned().ok_or_else(|| {
                CoreError::Validation(format!(
                    "Plugin '{}' with version '{}' is not registered with any compute resource.",
                    self.name, self.version
                ))
            }),
        }
    }

    /// Container entrypoint: the interpreter followed by the script path.
    pub fn entrypoint(&self) -> Vec<String> {
        let script = format!(
            "{}/{}",
            self.selfpath.trim_end_matches('/'),
            self.selfexec
        );
        vec![self.execshell.clone(), script]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plugin() -> Plugin {
        Plugin {
            id: 1,
            name: "pacspull".into(),
            version: "0.1".into(),
            kind: PluginKind::Fs,
            dock_image: "fnndsc/pl-pacspull".into(),
            execshell: "python3".into(),
            selfpath: "/usr/src/pacspull/".into(),
            selfexec: "pacspull.py".into(),
            parameters: vec![],
            compute_resources: vec!["host".into(), "moc".into()],
            resource_bounds: ResourceBounds::default(),
        }
    }

    #[test]
    fn kind_parses() {
        assert_eq!("ds".parse::<PluginKind>().unwrap(), PluginKind::Ds);
        assert!("xs".parse::<PluginKind>().is_err());
        assert!(PluginKind::Ds.requires_previous());
        assert!(!PluginKind::Fs.requires_previous());
    }

    #[test]
    fn defaults_resource_limits() {
        let limits = ResourceBounds::default()
            .resolve(&RequestedLimits::default())
            .unwrap();
        assert_eq!(limits.cpu_limit, DEFAULT_CPU_LIMIT);
        assert_eq!(limits.memory_limit, DEFAULT_MEMORY_LIMIT);
        assert_eq!(limits.number_of_workers, DEFAULT_NUMBER_OF_WORKERS);
        assert_eq!(limits.gpu_limit, DEFAULT_GPU_LIMIT);
    }

    #[test]
    fn default_is_clamped_into_plugin_range() {
        let bounds = ResourceBounds {
            gpu_limit: LimitRange::new(1, 2),
            ..Default::default()
        };
        let limits = bounds.resolve(&RequestedLimits::default()).unwrap();
        assert_eq!(limits.gpu_limit, 1);
    }

    #[test]
    fn rejects_out_of_range_limit() {
        let bounds = ResourceBounds {
            cpu_limit: LimitRange::new(100, 2000),
            ..Default::default()
        };
        let err = bounds
            .resolve(&RequestedLimits {
                cpu_limit: Some(4000),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(msg) if msg.contains("cpu_limit")));
    }

    #[test]
    fn inverted_range_is_a_validation_error() {
        let bounds = ResourceBounds {
            gpu_limit: LimitRange::new(4, 2),
            ..Default::default()
        };
        assert!(matches!(bounds.validate(), Err(CoreError::Validation(msg)) if msg.contains("gpu_limit")));

        let err = bounds.resolve(&RequestedLimits::default()).unwrap_err();
        assert!(matches!(err, CoreError::Validation(msg) if msg.contains("gpu_limit")));
        assert!(LimitRange::new(4, 2).clamp(3).is_none());
        assert!(ResourceBounds::default().validate().is_ok());
    }

    #[test]
    fn compute_resource_defaults_to_first() {
        assert_eq!(plugin().select_compute_resource(None).unwrap(), "host");
        assert_eq!(plugin().select_compute_resource(Some("moc")).unwrap(), "moc");
    }

    #[test]
    fn rejects_unregistered_compute_resource() {
        let err = plugin().select_compute_resource(Some("galena")).unwrap_err();
        assert!(matches!(err, CoreError::Validation(msg) if msg.contains("galena")));
    }

    #[test]
    fn entrypoint_joins_script_path() {
        assert_eq!(
            plugin().entrypoint(),
            vec!["python3".to_string(), "/usr/src/pacspull/pacspull.py".to_string()]
        );
    }
}
