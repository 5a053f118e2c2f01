//! Object-storage layout for plugin instance outputs.

use crate::parameters::{ParameterValue, Parameters};
use crate::types::DbId;

/// One step of a feed lineage: the plugin that ran and the instance id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineageStep {
    pub plugin_name: String,
    pub instance_id: DbId,
}

/// Build the output path of the last instance in `lineage`.
///
/// `lineage` runs from the feed root down to the instance itself, e.g.
/// `foo/feed_1/pacspull_1/mri_convert_2/data`. Returns `None` for an empty
/// lineage.
pub fn output_path(owner: &str, lineage: &[LineageStep]) -> Option<String> {
    let root = lineage.first()?;
    let mut path = format!("{owner}/feed_{}", root.instance_id);
    for step in lineage {
        path.push('/');
        path.push_str(&step.plugin_name);
        path.push('_');
        path.push_str(&step.instance_id.to_string());
    }
    path.push_str("/data");
    Some(path)
}

/// Storage input for a root instance: the first component of its first
/// `path` parameter, without surrounding slashes.
///
/// Returns `None` when no `path` parameter was supplied; the backend then
/// runs the plugin against an empty input directory.
pub fn fs_input_path(parameters: &Parameters) -> Option<String> {
    parameters.values().find_map(|value| match value {
        ParameterValue::Path(paths) => paths
            .split(',')
            .next()
            .map(|first| first.trim().trim_matches('/').to_string()),
        _ => None,
    })
}
