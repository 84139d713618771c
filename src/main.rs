mod cli;

use af_apk::ApkTool;
use af_core::ApkId;
use af_pipeline::TaskStatus;
use apkforge::config::{self, Config};
use apkforge::server::{self, AppContext};

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use std::path::Path;
use std::sync::Arc;

/// Build the application context around the real apktool.
///
/// A missing apktool is not fatal here: uploads and tasks then fail with
/// the tool error, which `check-tools` also reports.
fn app_context(config: Config) -> AppContext {
    let tool = match ApkTool::discover(&config.tools) {
        Ok(tool) => tool,
        Err(e) => {
            tracing::warn!("{}", e);
            ApkTool::new("apktool".into(), config.tools.timeout())
        }
    };
    let tool = Arc::new(tool);
    AppContext::new(config, tool.clone(), tool)
}

async fn start_server(
    host: Option<String>,
    port: Option<u16>,
    config_path: Option<&Path>,
) -> Result<()> {
    let mut config = config::load_config_or_default(config_path)?;

    // Override host/port from CLI if specified
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    tracing::info!("Starting apkforge server");
    tracing::info!(
        "Data directory: {}, max concurrent tasks: {}",
        config.storage.data_dir.display(),
        config.tasks.max_concurrent
    );

    server::start_server(app_context(config)).await
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "apkforge=trace,af_core=debug,af_rules=debug,af_apk=debug,af_pipeline=debug,tower_http=debug".to_string()
        } else {
            "apkforge=info,af_core=info,af_rules=info,af_apk=info,af_pipeline=info,tower_http=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Start { host, port } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(start_server(host, port, cli.config.as_deref()))
        }
        Commands::Import { apk } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(import_apk(&apk, cli.config.as_deref()))
        }
        Commands::Run { apk_id, rules } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(run_task(&apk_id, &rules, cli.config.as_deref()))
        }
        Commands::ValidateRules { file } => validate_rules(&file),
        Commands::CheckTools => check_tools(cli.config.as_deref()),
        Commands::Version => {
            println!("apkforge {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

async fn import_apk(apk: &Path, config_path: Option<&Path>) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;

    let bytes = tokio::fs::read(apk)
        .await
        .with_context(|| format!("Failed to read APK: {:?}", apk))?;
    let filename = apk
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    let ctx = app_context(config);
    let record = ctx.importer.import(&bytes, &filename).await?;

    println!("{}", record.apk_id);
    Ok(())
}

async fn run_task(apk_id: &str, rules_file: &Path, config_path: Option<&Path>) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;

    let apk_id: ApkId = apk_id
        .parse()
        .with_context(|| format!("Invalid APK id: {}", apk_id))?;
    let rules = read_rules(rules_file)?;

    let ctx = app_context(config);
    let task = ctx.dispatcher.run_to_completion(apk_id, rules).await?;

    println!("{}", serde_json::to_string_pretty(&task)?);

    if task.status != TaskStatus::Completed {
        anyhow::bail!(
            "Task {} failed: {}",
            task.task_id,
            task.error.as_deref().unwrap_or("unknown error")
        );
    }

    if let Ok(artifact) = ctx.dispatcher.artifact(task.task_id) {
        println!("Output: {}", artifact.display());
    }
    Ok(())
}

fn read_rules(path: &Path) -> Result<Vec<af_rules::ReplacementRule>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read rules file: {:?}", path))?;
    af_rules::parse_rules(&content)
        .with_context(|| format!("Failed to parse rules file: {:?}", path))
}

fn validate_rules(path: &Path) -> Result<()> {
    let rules = read_rules(path)?;
    let result = af_rules::validate(&rules);

    println!("{}", serde_json::to_string_pretty(&result)?);

    if !result.valid {
        anyhow::bail!("{} validation error(s)", result.errors.len());
    }
    Ok(())
}

fn check_tools(config_path: Option<&Path>) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;

    println!("Checking external tools...\n");

    let tools = af_apk::check_tools(&config.tools);
    let mut all_ok = true;

    for tool in &tools {
        let status = if tool.available {
            "✓"
        } else {
            all_ok = false;
            "✗"
        };

        print!("{} {}", status, tool.name);

        if let Some(ref version) = tool.version {
            print!(" ({})", version);
        }

        if let Some(ref path) = tool.path {
            print!(" - {}", path.display());
        }

        println!();
    }

    println!();
    if all_ok {
        println!("All required tools are available!");
    } else {
        println!("Some tools are missing. apktool and java are needed to import and rebuild packages.");
    }

    Ok(())
}
