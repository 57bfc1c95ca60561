//! `tint-snapshot` command line: build, watch, and resolve

use anyhow::Context;
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use std::path::PathBuf;
use std::sync::Arc;
use tint_core::{CategoryKey, TintConfig};
use tint_snapshot::{
    rebuild_channel, snapshot_job, JsonMembershipSource, SnapshotBuilder, SnapshotJobConfig,
};
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

fn cli() -> Command {
    let config_arg = Arg::new("config")
        .long("config")
        .short('c')
        .value_parser(value_parser!(PathBuf))
        .help("TOML configuration file");
    let members_arg = Arg::new("members")
        .long("members")
        .short('m')
        .required(true)
        .value_parser(value_parser!(PathBuf))
        .help("JSON members export");
    let out_arg = Arg::new("out")
        .long("out")
        .short('o')
        .value_parser(value_parser!(PathBuf))
        .help("Artifact path (defaults to [snapshot].file)");

    Command::new("tint-snapshot")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Build and serve the usertint attribute snapshot")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("build")
                .about("Build the snapshot once")
                .arg(config_arg.clone())
                .arg(members_arg.clone())
                .arg(out_arg.clone()),
        )
        .subcommand(
            Command::new("watch")
                .about("Rebuild the snapshot periodically until interrupted")
                .arg(config_arg.clone())
                .arg(members_arg)
                .arg(out_arg)
                .arg(
                    Arg::new("interval")
                        .long("interval")
                        .value_parser(value_parser!(u64))
                        .help("Rebuild period in seconds (defaults to [snapshot].rebuild_interval_secs)"),
                ),
        )
        .subcommand(
            Command::new("resolve")
                .about("Print the winning category and color of a category set")
                .arg(config_arg)
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Output as JSON"),
                )
                .arg(
                    Arg::new("categories")
                        .num_args(0..)
                        .help("Category names, highest-priority match wins"),
                ),
        )
}

fn load_config(args: &ArgMatches) -> anyhow::Result<TintConfig> {
    let config = match args.get_one::<PathBuf>("config") {
        Some(path) => TintConfig::load(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => TintConfig::default(),
    };
    Ok(config.with_env_overrides())
}

fn job_config(args: &ArgMatches, config: &TintConfig) -> SnapshotJobConfig {
    let mut job = SnapshotJobConfig::from_config(&config.snapshot);
    if let Some(out) = args.get_one::<PathBuf>("out") {
        job.path.clone_from(out);
    }
    job
}

async fn build(args: &ArgMatches) -> anyhow::Result<()> {
    let config = load_config(args)?;
    let job = job_config(args, &config);
    let members = args
        .get_one::<PathBuf>("members")
        .context("--members is required")?;

    let builder = SnapshotBuilder::new(config.groups.scheme());
    let report = builder
        .rebuild(&JsonMembershipSource::new(members), job.path)
        .await
        .context("building snapshot")?;

    println!(
        "wrote {} entities to {} ({} skipped)",
        report.entities,
        report.path.display(),
        report.skipped
    );
    Ok(())
}

async fn watch(args: &ArgMatches) -> anyhow::Result<()> {
    let config = load_config(args)?;
    let mut job = job_config(args, &config);
    if let Some(secs) = args.get_one::<u64>("interval") {
        job.interval = std::time::Duration::from_secs(*secs);
    }
    let members = args
        .get_one::<PathBuf>("members")
        .context("--members is required")?;

    let builder = Arc::new(SnapshotBuilder::new(config.groups.scheme()));
    let source = Arc::new(JsonMembershipSource::new(members));
    let (_trigger, rebuild_rx) = rebuild_channel();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let task = tokio::spawn(snapshot_job(builder, source, job, rebuild_rx, shutdown_rx));

    tokio::signal::ctrl_c()
        .await
        .context("waiting for interrupt")?;
    let _ = shutdown_tx.send(true);

    let stats = task.await.context("snapshot job panicked")?.snapshot();
    println!(
        "{} builds completed, {} failed",
        stats.builds_completed, stats.builds_failed
    );
    Ok(())
}

fn resolve(args: &ArgMatches) -> anyhow::Result<()> {
    let config = load_config(args)?;
    let scheme = config.groups.scheme();
    let categories: Vec<CategoryKey> = args
        .get_many::<String>("categories")
        .map(|values| values.map(CategoryKey::new).collect())
        .unwrap_or_default();

    let record = tint_core::AttributeRecord::new(tint_core::EntityId::new("cli"), &categories);
    let winner = scheme.winning_category(&record);
    let color = scheme.color_for(&record);
    let classes: Vec<String> = record.categories.iter().map(CategoryKey::class_marker).collect();

    if args.get_flag("json") {
        let output = serde_json::json!({
            "winning_category": winner.as_ref().map(CategoryKey::as_str),
            "color": color.as_str(),
            "classes": classes,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!(
            "winning category: {}",
            winner.as_ref().map_or("(none)", CategoryKey::as_str)
        );
        println!("color: {color}");
        println!("classes: {}", classes.join(" "));
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let matches = cli().get_matches();
    match matches.subcommand() {
        Some(("build", args)) => build(args).await,
        Some(("watch", args)) => watch(args).await,
        Some(("resolve", args)) => resolve(args),
        _ => unreachable!("subcommand_required is set"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        cli().debug_assert();
    }

    #[test]
    fn resolve_accepts_category_list() {
        let matches = cli()
            .try_get_matches_from(["tint-snapshot", "resolve", "trust_level_2", "admin"])
            .unwrap();
        let (name, args) = matches.subcommand().unwrap();
        assert_eq!(name, "resolve");
        assert_eq!(args.get_many::<String>("categories").unwrap().count(), 2);
    }

    #[test]
    fn build_requires_members() {
        assert!(cli().try_get_matches_from(["tint-snapshot", "build"]).is_err());
    }
}
