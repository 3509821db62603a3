//! List registered schemas

use anyhow::Result;
use weft_core::Registry;

/// Run the schemas command
pub async fn run() -> Result<()> {
    let registry = Registry::new();
    for type_name in registry.list_types() {
        let versions = registry.list_versions(&type_name)?;
        println!("{type_name}\t{}", versions.join(", "));
    }
    Ok(())
}
