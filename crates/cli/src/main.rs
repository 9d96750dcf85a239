//! listsync command-line management tool.
//!
//! Provides subcommands for triggering reconciliation runs (including the
//! non-destructive dry-run preview), and for generating / validating
//! configuration files.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};
use tracing_subscriber::EnvFilter;

use listsync_core::config::AppConfig;
use listsync_core::directory::HttpDirectory;
use listsync_core::orchestrator::{ListKind, Orchestrator, SyncOutcome};

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// listsync command-line management tool.
#[derive(Parser, Debug)]
#[command(
    name = "listsync",
    version,
    about = "Manage directory-driven mailing list synchronization"
)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(
        short,
        long,
        global = true,
        default_value = "/etc/listsync/config.toml"
    )]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a reconciliation pass for the selected list kind.
    Sync {
        /// Which managed lists to reconcile.
        #[arg(value_enum, default_value = "all")]
        kind: KindArg,

        /// Compute and report the plan without mutating remote state.
        #[arg(long)]
        dry_run: bool,

        /// Emit the reports as JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Generate a default configuration file.
    Init {
        /// Output path for the generated config file.
        #[arg(short, long, default_value = "./listsync.toml")]
        output: PathBuf,
    },

    /// Validate a configuration file.
    Validate,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum KindArg {
    Organizations,
    Students,
    Personal,
    All,
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> ExitCode {
    // Minimal logging for CLI
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("warn"))
        .with_target(false)
        .without_time()
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Init { output } => cmd_init(&output),
        Commands::Validate => cmd_validate(&cli.config),
        Commands::Sync { kind, dry_run, json } => {
            cmd_sync(&cli.config, kind, dry_run, json).await
        }
    }
}

// ---------------------------------------------------------------------------
// Config helpers
// ---------------------------------------------------------------------------

fn load_config(path: &PathBuf) -> Result<AppConfig> {
    let mut config =
        AppConfig::load_from_file(path).context("failed to load configuration file")?;
    config
        .resolve_env_vars()
        .context("failed to resolve environment variables")?;
    config
        .validate()
        .context("configuration validation failed")?;
    Ok(config)
}

// ---------------------------------------------------------------------------
// Subcommand implementations
// ---------------------------------------------------------------------------

async fn cmd_sync(config_path: &PathBuf, kind: KindArg, dry_run: bool, json: bool) -> Result<()> {
    let config = load_config(config_path)?;
    let directory = HttpDirectory::new(
        &config.directory.api_url,
        config.directory.token.clone(),
        config.daemon.http_timeout(),
    );
    let orchestrator = Orchestrator::new(config, directory);

    let outcomes = match kind {
        KindArg::Organizations => orchestrator.sync_kind(ListKind::Organization, dry_run).await,
        KindArg::Students => orchestrator.sync_kind(ListKind::Student, dry_run).await,
        KindArg::Personal => orchestrator.sync_kind(ListKind::Personal, dry_run).await,
        KindArg::All => orchestrator.sync_all(dry_run).await,
    }
    .context("reconciliation run failed")?;

    if json {
        print_json(&outcomes)?;
    } else {
        print_table(&outcomes, dry_run);
    }

    if outcomes.iter().any(|o| o.result.is_err()) {
        anyhow::bail!("one or more lists failed to reconcile");
    }
    Ok(())
}

fn print_json(outcomes: &[SyncOutcome]) -> Result<()> {
    let reports: Vec<serde_json::Value> = outcomes
        .iter()
        .map(|outcome| match &outcome.result {
            Ok(report) => serde_json::json!({
                "list": outcome.list,
                "kind": outcome.kind,
                "report": report,
            }),
            Err(e) => serde_json::json!({
                "list": outcome.list,
                "kind": outcome.kind,
                "error": e.to_string(),
            }),
        })
        .collect();
    println!("{}", serde_json::to_string_pretty(&reports)?);
    Ok(())
}

fn print_table(outcomes: &[SyncOutcome], dry_run: bool) {
    if dry_run {
        println!("Dry run: no remote state was modified.");
        println!();
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        "List",
        "Kind",
        "Subscribe",
        "Unsubscribe",
        "Mod +",
        "Mod -",
        "Failures",
        "Status",
    ]);

    for outcome in outcomes {
        match &outcome.result {
            Ok(report) => {
                let status = if !report.failures.is_empty() {
                    Cell::new("partial").fg(comfy_table::Color::Yellow)
                } else if dry_run {
                    Cell::new("planned")
                } else {
                    Cell::new("converged").fg(comfy_table::Color::Green)
                };
                table.add_row(vec![
                    Cell::new(&outcome.list),
                    Cell::new(outcome.kind.to_string()),
                    Cell::new(report.subscribed.len()),
                    Cell::new(report.unsubscribed.len()),
                    Cell::new(report.moderators_added.len()),
                    Cell::new(report.moderators_removed.len()),
                    Cell::new(report.failures.len()),
                    status,
                ]);
            }
            Err(e) => {
                table.add_row(vec![
                    Cell::new(&outcome.list),
                    Cell::new(outcome.kind.to_string()),
                    Cell::new("-"),
                    Cell::new("-"),
                    Cell::new("-"),
                    Cell::new("-"),
                    Cell::new("-"),
                    Cell::new(format!("failed: {}", e)).fg(comfy_table::Color::Red),
                ]);
            }
        }
    }

    println!("{table}");

    // Per-address detail is most useful when previewing.
    if dry_run {
        for outcome in outcomes {
            let Ok(report) = &outcome.result else { continue };
            if report.change_count() == 0 {
                continue;
            }
            println!();
            println!("{}:", outcome.list);
            for email in &report.subscribed {
                println!("  + subscribe        {}", email);
            }
            for email in &report.unsubscribed {
                println!("  - unsubscribe      {}", email);
            }
            for email in &report.moderators_added {
                println!("  + add moderator    {}", email);
            }
            for email in &report.moderators_removed {
                println!("  - remove moderator {}", email);
            }
        }
    }
}

fn cmd_init(output: &PathBuf) -> Result<()> {
    let default_config = r#"# listsync Configuration
# See documentation for all available options.

[daemon]
poll_interval_secs = 3600
log_level = "info"
http_timeout_secs = 30

[directory]
api_url = "https://directory.example.com/api"
token_env = "DIRECTORY_TOKEN"

[lists]
style = "legacy-default"
student_list = "students"
personal_list = "personal"

# Remote list options applied to every managed list.
[lists.settings]
advertised = false
max_message_size = 1024

[[servers]]
url = "https://mailman.example.com/3.1"
username = "restadmin"
password_env = "MAILMAN_PASSWORD"
enabled = true
# student_domain = "students.example.com"
# personal_domain = "staff.example.com"

[[organization_lists]]
server = "https://mailman.example.com/3.1"
domain = "lists.example.com"
name = "physics"
organization = 42
enabled = true
"#;

    if output.exists() {
        anyhow::bail!(
            "file already exists: {}. Use a different path or remove the existing file.",
            output.display()
        );
    }

    std::fs::write(output, default_config).context("failed to write config file")?;

    println!("Default configuration written to {}", output.display());
    println!();
    println!("Next steps:");
    println!("  1. Edit the config file with your directory and server details");
    println!("  2. Set the referenced environment variables (MAILMAN_PASSWORD, DIRECTORY_TOKEN)");
    println!(
        "  3. Validate with: listsync validate --config {}",
        output.display()
    );
    println!(
        "  4. Preview with: listsync sync all --dry-run --config {}",
        output.display()
    );
    println!(
        "  5. Start the daemon: listsync-daemon --config {}",
        output.display()
    );

    Ok(())
}

fn cmd_validate(config_path: &PathBuf) -> Result<()> {
    println!("Validating configuration: {}", config_path.display());
    println!();

    let config = AppConfig::load_from_file(config_path).context("failed to parse configuration")?;

    // Check structure
    println!("  [OK] TOML structure is valid");

    // Resolve env vars (non-fatal warnings)
    let mut config = config;
    let _ = config.resolve_env_vars();
    println!("  [OK] Environment variable references processed");

    // Validate values
    match config.validate() {
        Ok(()) => {
            println!("  [OK] All required fields are valid");
        }
        Err(e) => {
            println!("  [FAIL] Validation error: {}", e);
            anyhow::bail!("configuration validation failed");
        }
    }

    // Summary
    println!();
    println!("Configuration summary:");
    println!("  Directory URL : {}", config.directory.api_url);
    println!(
        "  Directory auth: {}",
        if config.directory.token.is_some() {
            "token set"
        } else {
            "no token"
        }
    );
    println!("  Poll interval : {}s", config.daemon.poll_interval_secs);
    println!("  List style    : {}", config.lists.style);
    for server in &config.servers {
        println!(
            "  Server {} : {} (password {})",
            if server.enabled { "[on] " } else { "[off]" },
            server.url,
            if server.password.is_some() {
                "set"
            } else {
                "NOT SET"
            }
        );
    }
    println!(
        "  Org lists     : {} ({} enabled)",
        config.organization_lists.len(),
        config
            .organization_lists
            .iter()
            .filter(|l| l.enabled)
            .count()
    );
    println!();
    println!("Configuration is valid.");

    Ok(())
}
