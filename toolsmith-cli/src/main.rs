//! Toolsmith CLI - MCP server and registry maintenance

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{Value, json};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use toolsmith_core::catalog::Catalog;
use toolsmith_core::config::{CONFIG_FILE, TOOL_DEFS_DIR, ToolsmithConfig};
use toolsmith_core::engine::ToolRuntime;
use toolsmith_core::mcp::{McpServer, StdioTransport};
use tracing::info;

#[derive(Parser)]
#[command(name = "toolsmith")]
#[command(about = "Self-extending tool registry served over MCP", long_about = None)]
#[command(version)]
struct Cli {
    /// Definition directory (overrides configuration)
    #[arg(long, global = true, env = "TOOLSMITH_TOOL_DEFS")]
    tool_defs: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the entry-point tools over stdio
    Serve,
    /// List registered tools by namespace
    List,
    /// Validate every definition; exits non-zero on errors
    Validate,
    /// Create a definition directory and a starter configuration
    Init {
        /// Directory to initialize
        #[arg(default_value = ".")]
        dir: PathBuf,
    },
    /// Version information
    Version,
}

const STARTER_CONFIG: &str = r#"# toolsmith configuration
# Every key can be overridden with TOOLSMITH_<SECTION>__<KEY> environment variables.

tool_defs = "tool_defs"

[modules]
shell = "sh"
timeout = "30s"
stub_dir = "tools"

[proxy]
connect_timeout = "30s"
request_timeout = "2m"
shutdown_timeout = "5s"
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // stdout carries the protocol, so logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Version => {
            println!("toolsmith {}", env!("CARGO_PKG_VERSION"));
            println!("toolsmith-core {}", toolsmith_core::VERSION);
        }
        Commands::Init { dir } => init(&dir)?,
        Commands::Serve => {
            let runtime = build_runtime(cli.tool_defs).await?;
            let server = Arc::new(McpServer::new(runtime.clone()));
            let served = server.run(StdioTransport::stdio()).await;
            runtime.shutdown().await;
            served.context("MCP server stopped")?;
        }
        Commands::List => {
            let runtime = build_runtime(cli.tool_defs).await?;
            let listing = runtime
                .execute("registry.list", json!({}))
                .await
                .into_result()?;
            print_value(&listing);
        }
        Commands::Validate => {
            let runtime = build_runtime(cli.tool_defs).await?;
            runtime.refresh_source_warnings().await?;
            let report = runtime.validate().await;
            println!("{}", report);
            if !report.is_valid() {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

async fn build_runtime(tool_defs: Option<PathBuf>) -> Result<ToolRuntime> {
    let mut config = ToolsmithConfig::load()?;
    if let Some(path) = tool_defs {
        config = config.with_tool_defs(path);
    }
    let runtime = ToolRuntime::builder(config).build().await?;
    info!(
        tool_defs = %runtime.paths().tool_defs.display(),
        "Runtime ready"
    );
    Ok(runtime)
}

fn init(dir: &Path) -> Result<()> {
    let catalog = Catalog::new(dir.join(TOOL_DEFS_DIR));
    catalog
        .ensure_layout()
        .with_context(|| format!("Failed to create {}", catalog.root().display()))?;
    println!("Created {}", catalog.servers_dir().display());

    let config_path = dir.join(CONFIG_FILE);
    if config_path.exists() {
        println!("Kept existing {}", config_path.display());
    } else {
        std::fs::write(&config_path, STARTER_CONFIG)
            .with_context(|| format!("Failed to write {}", config_path.display()))?;
        println!("Created {}", config_path.display());
    }
    Ok(())
}

fn print_value(value: &Value) {
    match value {
        Value::String(text) => println!("{}", text),
        other => println!(
            "{}",
            serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string())
        ),
    }
}
