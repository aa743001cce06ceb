// SPDX-License-Identifier: MIT

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand, ValueEnum};
use dotenv::dotenv;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use packflow::flow::{
    infer_node_metadata, load_structure, EnvCredentialResolver, Flow, FlowRuntime, GraphLoader,
    MetadataOverrides, NodeMetadata, NodeRegistry,
};
use packflow::pack::{Namespace, Writer};
use packflow::RuntimeConfig;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a flow from a graph description
    Run {
        /// Path to the graph file (YAML, or JSON by extension)
        #[arg(short, long)]
        file: PathBuf,

        /// Seed a value before the run: `namespace:key=json`
        #[arg(short, long = "set")]
        set: Vec<String>,

        /// Runtime configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Print the buffered event history after the run
        #[arg(long)]
        history: bool,

        /// Give up waiting after this many seconds
        #[arg(long)]
        timeout_secs: Option<u64>,
    },
    /// Validate a graph description and print its normalized structure
    Export {
        /// Path to the graph file
        #[arg(short, long)]
        file: PathBuf,

        #[arg(long, value_enum, default_value_t = Format::Yaml)]
        format: Format,

        /// Print inferred node metadata instead of the structure
        #[arg(long)]
        metadata: bool,
    },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Format {
    Yaml,
    Json,
}

/// Split `namespace:key=json` into its parts. Values that are not valid
/// JSON are taken as plain strings.
fn parse_assignment(raw: &str) -> anyhow::Result<(Namespace, String, Value)> {
    let (target, value) = raw
        .split_once('=')
        .ok_or_else(|| anyhow!("expected namespace:key=value, got '{}'", raw))?;
    let (namespace, key) = match target.rsplit_once(':') {
        Some((namespace, key)) => (Namespace::new(namespace)?, key),
        None => (Namespace::root(), target),
    };
    let value =
        serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((namespace, key.to_string(), value))
}

fn collect_metadata(flow: &Flow, out: &mut BTreeMap<String, NodeMetadata>) {
    for id in flow.node_ids() {
        let (Some(node), Some(namespace)) = (flow.node(id), flow.node_namespace(id)) else {
            continue;
        };
        out.insert(
            namespace.to_string(),
            infer_node_metadata(node, &MetadataOverrides::default()),
        );
        if let Some(subflow) = node.subflow() {
            collect_metadata(subflow, out);
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::init();

    let args = Args::parse();
    let registry = NodeRegistry::with_builtins();
    let loader = GraphLoader::new();

    match args.command {
        Commands::Run {
            file,
            set,
            config,
            history,
            timeout_secs,
        } => {
            let config = RuntimeConfig::load(config.as_deref())?;
            let runtime = FlowRuntime::from_config(&config)
                .with_credentials(Arc::new(EnvCredentialResolver::new()));

            let desc = loader
                .load_file(&file)
                .with_context(|| format!("loading {}", file.display()))?;
            let flow = load_structure(&desc, &registry, runtime.clone())?;

            for assignment in &set {
                let (namespace, key, value) = parse_assignment(assignment)?;
                runtime
                    .pack
                    .write(&key, value, &namespace, &Writer::external())?;
            }
            let seeded = runtime.pack.snapshot(None)?;

            println!("Running flow: {}", file.display());
            let result = match timeout_secs {
                Some(secs) => tokio::time::timeout(Duration::from_secs(secs), flow.run())
                    .await
                    .map_err(|_| anyhow!("flow did not finish within {}s", secs))?,
                None => flow.run().await,
            };

            if history {
                let events = runtime.bus.history(None);
                println!("{}", serde_json::to_string_pretty(&events)?);
            }

            let outcome = result?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);

            let diff = runtime
                .pack
                .diff(&seeded, &runtime.pack.snapshot(None)?);
            println!("{}", serde_json::to_string_pretty(&diff)?);
        }
        Commands::Export {
            file,
            format,
            metadata,
        } => {
            let desc = loader
                .load_file(&file)
                .with_context(|| format!("loading {}", file.display()))?;
            let flow = load_structure(&desc, &registry, FlowRuntime::default())?;

            let output = if metadata {
                let mut nodes = BTreeMap::new();
                collect_metadata(&flow, &mut nodes);
                match format {
                    Format::Yaml => serde_yaml::to_string(&nodes)?,
                    Format::Json => serde_json::to_string_pretty(&nodes)?,
                }
            } else {
                let structure = flow.export_structure();
                match format {
                    Format::Yaml => GraphLoader::to_yaml(&structure)?,
                    Format::Json => GraphLoader::to_json(&structure)?,
                }
            };
            println!("{}", output);
        }
    }

    Ok(())
}
