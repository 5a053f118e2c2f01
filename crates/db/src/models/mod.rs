pub mod plugin;
pub mod plugin_instance;
