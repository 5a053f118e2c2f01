pub mod health;
pub mod plugin_instances;
