//! Command-line construction for plugin containers.

use feedrun_core::parameters::{ParameterAction, ParameterValue, Parameters};
use feedrun_core::plugin::{Plugin, PluginKind};

/// Where the backend mounts the staged input inside the container.
pub const CONTAINER_INPUT_DIR: &str = "/share/incoming";

/// Where the plugin writes its results inside the container.
pub const CONTAINER_OUTPUT_DIR: &str = "/share/outgoing";

/// Build the plugin's argument list.
///
/// Layout: `[inputdir] outputdir --saveinputmeta --saveoutputmeta <params>`,
/// where the input dir is only passed to `ds` plugins. Path-typed values are
/// staged by the backend, so the plugin sees the container input dir in
/// their place.
pub fn build_app_args(plugin: &Plugin, parameters: &Parameters) -> Vec<String> {
    let mut args = Vec::new();
    if plugin.kind == PluginKind::Ds {
        args.push(CONTAINER_INPUT_DIR.to_string());
    }
    args.push(CONTAINER_OUTPUT_DIR.to_string());
    args.push("--saveinputmeta".to_string());
    args.push("--saveoutputmeta".to_string());

    for param in &plugin.parameters {
        let Some(value) = parameters.get(&param.name) else {
            continue;
        };
        match param.action {
            ParameterAction::Store => {
                args.push(param.flag.clone());
                match value {
                    ParameterValue::Path(_) | ParameterValue::Unextpath(_) => {
                        args.push(CONTAINER_INPUT_DIR.to_string())
                    }
                    other => args.push(other.to_arg()),
                }
            }
            ParameterAction::StoreTrue if value.as_bool() == Some(true) => {
                args.push(param.flag.clone());
            }
            ParameterAction::StoreFalse if value.as_bool() == Some(false) => {
                args.push(param.flag.clone());
            }
            _ => {}
        }
    }
    args
}
