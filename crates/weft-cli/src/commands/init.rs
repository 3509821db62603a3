//! Initialize a new Weft project

use anyhow::Result;
use std::fs;
use std::path::Path;
use weft_core::config::CONFIG_FILE;

/// Run the init command
pub async fn run(path: &str, name: Option<&str>) -> Result<()> {
    let project_dir = Path::new(path);

    // Create directory if it doesn't exist
    if !project_dir.exists() {
        fs::create_dir_all(project_dir)?;
    }

    // Get absolute path for deriving name
    let abs_path = project_dir.canonicalize()?;

    // Derive project name from directory name if not provided
    let project_name = match name {
        Some(n) => n.to_string(),
        None => abs_path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|s| s.to_string())
            .ok_or_else(|| anyhow::anyhow!("Could not determine project name from path"))?,
    };

    // Check if already initialized
    if project_dir.join(CONFIG_FILE).exists() {
        anyhow::bail!(
            "Directory '{}' already contains a {CONFIG_FILE}",
            project_dir.display()
        );
    }

    tracing::info!("Creating new Weft project: {}", project_name);

    fs::create_dir_all(project_dir.join("flows"))?;
    fs::create_dir_all(project_dir.join("data"))?;

    let config = format!(
        r#"# Weft Project Configuration
name: {project_name}
version: "0.1.0"
flows_dir: flows

# Defaults for every flow; a flow's config block overrides them
runtime:
  buffer_size: 64
  qos: at-least-once
  retry:
    max_attempts: 3
    initial_delay_ms: 100
    max_delay_ms: 10000
    multiplier: 2.0
"#
    );
    fs::write(project_dir.join(CONFIG_FILE), config)?;

    let example_flow = r#"// Example flow: validate incoming payloads, then label them
flow "example" {
    config {
        buffer_size: 16
    }

    node "ingest" {
        type: validate
        schema: any
        to: "label"
    }

    node "label" {
        type: tag
        key: "stage"
        value: "processed"
    }
}
"#;
    fs::write(project_dir.join("flows/example.weft"), example_flow)?;

    let sample_data = r#"{"id": 1, "message": "Hello, Weft!"}
{"id": 2, "message": "This is a test message"}
{"id": 3, "message": "Ready for processing"}
"#;
    fs::write(project_dir.join("data/input.jsonl"), sample_data)?;

    let gitignore = r#"# Output files
data/output*.jsonl

# IDE
.idea/
.vscode/
*.swp
"#;
    fs::write(project_dir.join(".gitignore"), gitignore)?;

    tracing::info!(
        "✓ Created project '{}' at {}",
        project_name,
        abs_path.display()
    );
    tracing::info!("");
    tracing::info!("Next steps:");
    if path != "." {
        tracing::info!("  cd {}", project_dir.display());
    }
    tracing::info!("  weft validate                                # Check flows");
    tracing::info!("  weft run example --input data/input.jsonl    # Run the example");

    Ok(())
}
