//! Command dispatch
use crate::cli::{Cli, Command};
use crate::reporter::TerminalProgress;
use anyhow::Context;
use container::bootstrap::config::environment_name;
use container::bootstrap::site::{SiteAction, SiteOutcome};
use container::bootstrap::utility_runner::composer;
use container::{DevstackConfig, DockerRuntime, InitOptions, Workflows};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Default location of an environment's exported root certificate
pub fn certificate_path(config_dir: &Path, environment: &str) -> PathBuf {
    config_dir.join("certs").join(format!("{}.crt", environment))
}

/// Run the parsed command; returns the process exit code
pub async fn run(cli: Cli, cancel: CancellationToken) -> anyhow::Result<i32> {
    let home = dirs::home_dir().context("unable to determine the home directory")?;
    let config_dir = cli.resolve_config_dir(&home);
    let environment = environment_name(Some(cli.environment.as_str()));

    let runtime = DockerRuntime::connect().context("unable to connect to Docker")?;
    runtime
        .ping()
        .await
        .context("the Docker engine is not responding")?;

    let workflows = Workflows::new(Arc::new(runtime), home)?.with_cancellation(cancel);
    let progress = TerminalProgress::spawn();

    let result = dispatch(
        cli.command,
        &workflows,
        &environment,
        &config_dir,
        &progress,
    )
    .await;

    progress.finish().await;
    result
}

async fn dispatch(
    command: Command,
    workflows: &Workflows,
    environment: &str,
    config_dir: &Path,
    progress: &TerminalProgress,
) -> anyhow::Result<i32> {
    let reporter = &progress.reporter;

    match command {
        Command::Init { skip_apply } => {
            eprintln!("Checking {}...", environment);
            let config = load_sites(config_dir, environment)?;
            let options = InitOptions {
                skip_apply,
                certificate: Some(certificate_path(config_dir, environment)),
            };
            let report = workflows
                .init(environment, &config.sites, &options, reporter)
                .await?;

            print_outcomes(&report.sites);
            if let Some(path) = &report.certificate {
                eprintln!("Root certificate written to {}", path.display());
            }
            eprintln!("{} is ready!", environment);
            Ok(0)
        }
        Command::Apply => {
            let config = load_sites(config_dir, environment)?;
            let outcomes = workflows
                .apply(environment, &config.sites, reporter)
                .await?;
            print_outcomes(&outcomes);
            Ok(0)
        }
        Command::Trust { output } => {
            let dest = output.unwrap_or_else(|| certificate_path(config_dir, environment));
            workflows.trust(environment, &dest, reporter).await?;
            eprintln!("Root certificate written to {}", dest.display());
            Ok(0)
        }
        Command::Composer { args } => {
            let cwd = std::env::current_dir().context("unable to get the current directory")?;
            let (version, args) = composer::split_version(&args);
            let task = composer::task(&cwd, version.as_deref(), args)?;

            let mut stdout = tokio::io::stdout();
            let mut stderr = tokio::io::stderr();
            let outcome = workflows
                .run_task(&task, &mut stdout, &mut stderr, reporter)
                .await?;

            if outcome.success() {
                eprintln!("composer {} completed", task.args.join(" "));
            }
            Ok(exit_status(outcome.exit_code))
        }
    }
}

fn load_sites(config_dir: &Path, environment: &str) -> anyhow::Result<DevstackConfig> {
    let path = DevstackConfig::path_for(config_dir, environment);
    Ok(DevstackConfig::load(&path)?)
}

fn print_outcomes(outcomes: &[SiteOutcome]) {
    for outcome in outcomes {
        let action = match outcome.action {
            SiteAction::Created => "created",
            SiteAction::Unchanged => "ready",
            SiteAction::Rebuilt => "rebuilt",
        };
        println!("{}\t{}\t{}", outcome.hostname, action, outcome.container_id);
    }
}

/// Clamp a container exit code into a process exit status
pub fn exit_status(code: i64) -> i32 {
    i32::try_from(code).unwrap_or(1)
}
