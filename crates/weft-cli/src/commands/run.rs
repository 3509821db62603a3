//! Run a flow over JSONL input

use anyhow::{Context as _, Result, bail};
use std::io::Read;
use std::sync::Arc;
use weft_core::{Config, Context, FlowDefinition, Message, Port, PortError, Registry, Value};
use weft_runtime::{ChannelPort, FlowRuntime};

/// Run the run command.
///
/// Every non-empty input line is parsed as a JSON payload and injected into
/// the entry node. Messages leaving the flow's sink nodes are printed to
/// stdout, one JSON message per line.
pub async fn run(
    config_path: &str,
    flow_name: &str,
    input: &str,
    node: Option<&str>,
) -> Result<()> {
    let config = Config::load(config_path).context("Failed to load configuration")?;
    let flow = config.load_flow(flow_name)?;
    let entry = entry_node(&flow, node)?;
    let source = read_input(input)?;

    let runtime = FlowRuntime::new(flow, Arc::new(Registry::new()), &config.project.runtime)
        .await
        .with_context(|| format!("Failed to build flow '{flow_name}'"))?;
    runtime.start().await?;
    let printer = tokio::spawn(print_output(runtime.output()));

    let work = async {
        feed(&runtime, &entry, input, &source).await?;
        runtime.drain().await
    };
    let result = tokio::select! {
        result = work => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received shutdown signal");
            Ok(())
        }
    };
    // drained runtimes are already stopped; this covers errors and Ctrl+C
    runtime.stop().await?;
    result?;

    let printed = printer.await.context("Output printer failed")??;
    tracing::info!("✓ Flow '{}' produced {} message(s)", flow_name, printed);
    Ok(())
}

fn entry_node(flow: &FlowDefinition, node: Option<&str>) -> Result<String> {
    if let Some(node) = node {
        if flow.node(node).is_none() {
            bail!("Flow '{}' has no node '{node}'", flow.name);
        }
        return Ok(node.to_string());
    }
    match flow.entry_nodes().as_slice() {
        [only] => Ok(only.name.clone()),
        [] => bail!("Flow '{}' has no entry node", flow.name),
        several => {
            let names: Vec<_> = several.iter().map(|n| n.name.as_str()).collect();
            bail!(
                "Flow '{}' has several entry nodes ({}); choose one with --node",
                flow.name,
                names.join(", ")
            )
        }
    }
}

fn read_input(input: &str) -> Result<String> {
    if input == "-" {
        let mut source = String::new();
        std::io::stdin()
            .read_to_string(&mut source)
            .context("Failed to read stdin")?;
        Ok(source)
    } else {
        std::fs::read_to_string(input).with_context(|| format!("Failed to read {input}"))
    }
}

async fn feed(runtime: &FlowRuntime, entry: &str, input: &str, source: &str) -> Result<()> {
    let ctx = Context::background();
    for (index, line) in source.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let payload: serde_json::Value = serde_json::from_str(line)
            .with_context(|| format!("{input}:{}: invalid JSON", index + 1))?;
        runtime
            .inject(&ctx, entry, Message::new(Value::from(payload)))
            .await?;
    }
    Ok(())
}

async fn print_output(output: Arc<ChannelPort>) -> Result<usize> {
    let ctx = Context::background();
    let mut printed = 0;
    loop {
        match output.receive(&ctx).await {
            Ok(message) => {
                println!("{}", serde_json::to_string(&message)?);
                printed += 1;
            }
            Err(PortError::Closed { .. }) => return Ok(printed),
            Err(err) => return Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_core::flow::compile_source;

    fn flow(source: &str) -> FlowDefinition {
        compile_source("test.weft", source).unwrap().remove(0)
    }

    #[test]
    fn test_single_entry_is_default() {
        let flow = flow(r#"flow "f" { node "a" { to: b } node "b" {} }"#);
        assert_eq!(entry_node(&flow, None).unwrap(), "a");
        assert_eq!(entry_node(&flow, Some("b")).unwrap(), "b");
        assert!(entry_node(&flow, Some("c")).is_err());
    }

    #[test]
    fn test_several_entries_need_a_choice() {
        let flow = flow(r#"flow "f" { node "a" {} node "b" {} }"#);
        let err = entry_node(&flow, None).unwrap_err();
        assert!(err.to_string().contains("a, b"));
    }
}
