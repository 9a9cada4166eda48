pub mod catalog;
pub mod registry;
pub mod session;

pub use catalog::PluginCatalog;
pub use registry::AgentRegistry;
pub use session::SessionHandle;
