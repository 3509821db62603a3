//! Validate configuration and flows

use anyhow::{Context, Result};
use weft_core::{Config, Registry};
use weft_runtime::processor_for;

/// Run the validate command.
///
/// Loads the project, compiles every flow and checks that each node's
/// processor can be built from its settings.
pub async fn run(config_path: &str) -> Result<()> {
    tracing::info!("Validating configuration: {}", config_path);

    let config = Config::load(config_path).context("Failed to load configuration")?;

    tracing::info!("✓ Project: {}", config.project.name);
    tracing::info!("✓ Version: {}", config.project.version);

    let flows = config.load_flows().context("Failed to compile flows")?;
    let registry = Registry::new();
    for flow in &flows {
        for definition in &flow.nodes {
            processor_for(&definition.node_config(&flow.name), &registry)
                .with_context(|| format!("Invalid node in flow '{}'", flow.name))?;
        }
        tracing::info!(
            "✓ Flow '{}': {} node(s), {} edge(s)",
            flow.name,
            flow.nodes.len(),
            flow.edges.len()
        );
    }

    tracing::info!("✓ {} flow(s) valid", flows.len());
    Ok(())
}
