//! Tools available to a CLI session: the built-ins plus any remote servers

use std::path::PathBuf;

use anyhow::Context;
use pocket_core::config::McpServerConfig;
use pocket_core::tools::builtin;
use pocket_core::tools::remote::{ProviderTarget, RemoteToolProvider};
use pocket_core::tools::ToolRegistry;

pub struct Toolbox {
    pub registry: ToolRegistry,
    providers: Vec<(String, RemoteToolProvider)>,
}

impl Toolbox {
    /// Registry holding only the built-in tools
    pub fn builtin() -> Self {
        let mut registry = ToolRegistry::new();
        for tool in builtin::standard_tools() {
            registry.register(tool);
        }
        Self {
            registry,
            providers: Vec::new(),
        }
    }

    /// Start every configured server and every `--mcp` script.
    ///
    /// On failure the sessions opened so far stay owned by the toolbox and
    /// are released by `close`.
    pub async fn attach<'a>(
        &mut self,
        servers: impl IntoIterator<Item = (&'a String, &'a McpServerConfig)>,
        scripts: &[PathBuf],
    ) -> anyhow::Result<()> {
        let targets = servers
            .into_iter()
            .map(|(name, config)| (name.clone(), ProviderTarget::from_config(config)))
            .chain(
                scripts
                    .iter()
                    .map(|path| (path.display().to_string(), ProviderTarget::script(path.clone()))),
            );

        for (name, target) in targets {
            let mut provider = RemoteToolProvider::new();
            let connected = provider.connect(&target).await.map(|tools| tools.len());
            // Owned before the check so close() reaps a half-started server
            self.providers.push((name.clone(), provider));
            connected.with_context(|| format!("Failed to start tool server '{}'", name))?;

            if let Some((_, provider)) = self.providers.last() {
                let count = provider.register_into(&mut self.registry)?;
                tracing::info!(server = %name, count, "Attached remote tools");
            }
        }
        Ok(())
    }

    /// Close every remote session, logging failures
    pub async fn close(&mut self) {
        for (name, provider) in &mut self.providers {
            if let Err(e) = provider.close().await {
                tracing::warn!(server = %name, error = %e, "Failed to close tool server");
            }
        }
    }
}
