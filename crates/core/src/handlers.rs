pub mod agents;
pub mod plugins;
pub mod telemetry;

pub use agents::{get_agent, get_agents, update_agent_config};
pub use plugins::{get_plugins, load_plugin, unload_plugin};
pub use telemetry::telemetry_stream;
