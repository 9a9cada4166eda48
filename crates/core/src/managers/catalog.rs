use async_trait::async_trait;
use bytes::Bytes;
use probehub_shared::{PluginControl, PluginDescriptor, TelemetryEnvelope};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Maps plugin identifiers to their descriptors (metadata, server-side
/// control capability, optional agent-side binary artifact).
///
/// Built once at startup from the packaged plugin set and read-only after:
/// plugin registration is a packaging-time concern.
pub struct PluginCatalog {
    plugins: HashMap<String, PluginDescriptor>,
}

impl PluginCatalog {
    #[must_use]
    pub fn new(descriptors: Vec<PluginDescriptor>) -> Self {
        let mut plugins = HashMap::with_capacity(descriptors.len());
        for descriptor in descriptors {
            if plugins
                .insert(descriptor.id.clone(), descriptor)
                .is_some()
            {
                warn!("duplicate plugin descriptor, keeping the later one");
            }
        }
        Self { plugins }
    }

    /// Build a catalog from a directory of packaged artifacts: every regular
    /// file becomes a distributable plugin whose id is the file stem. A
    /// missing directory yields an empty catalog (control-only deployments).
    pub fn from_dir(dir: &Path) -> anyhow::Result<Self> {
        if !dir.is_dir() {
            warn!(dir = %dir.display(), "plugin directory missing, starting with empty catalog");
            return Ok(Self::new(Vec::new()));
        }

        let mut descriptors = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            let Some(id) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let artifact = Bytes::from(std::fs::read(&path)?);
            info!(plugin_id = %id, artifact_bytes = artifact.len(), "📦 packaged plugin found");
            descriptors.push(PluginDescriptor {
                id: id.to_string(),
                name: id.to_string(),
                version: "packaged".to_string(),
                artifact: Some(artifact),
                control: Arc::new(PackagedControl { id: id.to_string() }),
            });
        }
        Ok(Self::new(descriptors))
    }

    #[must_use]
    pub fn get(&self, plugin_id: &str) -> Option<&PluginDescriptor> {
        self.plugins.get(plugin_id)
    }

    /// Registered plugin identifiers, for listing endpoints.
    pub fn ids(&self) -> impl Iterator<Item = &str> + '_ {
        self.plugins.keys().map(String::as_str)
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &PluginDescriptor> + '_ {
        self.plugins.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

/// Default server-side capability for plugins packaged as bare artifacts:
/// telemetry is routed and persisted by the core, the hook only traces it.
struct PackagedControl {
    id: String,
}

#[async_trait]
impl PluginControl for PackagedControl {
    fn plugin_id(&self) -> &str {
        &self.id
    }

    async fn on_telemetry(&self, envelope: &TelemetryEnvelope) -> anyhow::Result<()> {
        debug!(
            plugin_id = %self.id,
            correlation_id = %envelope.correlation_id,
            "telemetry observed"
        );
        Ok(())
    }
}
