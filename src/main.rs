use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use tradeguard::{
    agents::FounderGate,
    config::{self, Config},
    drp::{self, ExportOptions, RestoreOptions},
    logger::{self, LogTag, LoggerConfig},
    metrics,
    orchestrator::{
        last_export_succeeded, CycleOutcome, Orchestrator, OrchestratorSettings, Runtime,
        StrategyRegistry,
    },
    paths,
    tx_engine::{KillSource, KillSwitch},
};

/// Risk-gated transaction execution with disaster recovery
#[derive(Debug, Parser)]
#[command(name = "tradeguard", version)]
struct Cli {
    /// Config file (defaults to data/config.toml under the base directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(flatten)]
    logging: LoggingArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Args)]
struct LoggingArgs {
    /// Show verbose output
    #[arg(long, global = true)]
    verbose: bool,

    /// Only warnings and errors
    #[arg(long, global = true)]
    quiet: bool,

    /// Console output only
    #[arg(long, global = true)]
    no_log_file: bool,

    /// Enable debug output for a tag (repeatable; `all` for every tag)
    #[arg(long = "debug", value_name = "TAG", global = true)]
    debug: Vec<String>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print kill switch, gate and DRP state
    Status,
    /// Engage the kill switch flag file
    Kill,
    /// Clear the kill switch
    Clear,
    /// Snapshot state into a DRP archive
    Export {
        #[arg(long)]
        dry_run: bool,
    },
    /// Restore state from a DRP archive
    Restore {
        /// Archive to restore; newest in the export directory when omitted
        #[arg(long)]
        archive: Option<PathBuf>,
        #[arg(long)]
        dry_run: bool,
    },
    /// Run the orchestrator loop
    Run {
        #[arg(long, conflicts_with = "live")]
        dry_run: bool,
        #[arg(long)]
        live: bool,
    },
    /// Mint a founder approval token
    Token {
        #[arg(long)]
        action: String,
        #[arg(long, default_value_t = 3600)]
        ttl_secs: u64,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Logs directory must exist before the file logger opens
    if let Err(e) = paths::ensure_all_directories() {
        eprintln!("Failed to create required directories: {}", e);
        std::process::exit(1);
    }

    logger::init(LoggerConfig::from_flags(
        cli.logging.verbose,
        cli.logging.quiet,
        cli.logging.no_log_file,
        &cli.logging.debug,
    ));

    let config_path = cli.config.clone().unwrap_or_else(paths::get_config_path);
    if let Err(e) = config::load_config_from_path(&config_path) {
        logger::error(LogTag::Config, &format!("{}", e));
        logger::flush();
        std::process::exit(1);
    }

    let code = match execute(cli.command).await {
        Ok(true) => 0,
        Ok(false) => 2,
        Err(e) => {
            logger::error(LogTag::System, &format!("{:#}", e));
            1
        }
    };
    logger::flush();
    std::process::exit(code);
}

/// Returns `Ok(false)` when the command ran but ended in a halted state
async fn execute(command: Command) -> anyhow::Result<bool> {
    let config = config::get_config_clone();

    match command {
        Command::Status => status(&config).await,
        Command::Kill => {
            let switch = KillSwitch::from_config(&config.kill_switch);
            switch
                .engage("cli")
                .with_context(|| format!("writing {}", switch.flag_file().display()))?;
            println!("kill switch engaged: {}", switch.flag_file().display());
            Ok(true)
        }
        Command::Clear => {
            let switch = KillSwitch::from_config(&config.kill_switch);
            let inherited_env = switch.source() == Some(KillSource::Env);
            switch
                .clear()
                .with_context(|| format!("removing {}", switch.flag_file().display()))?;
            switch.record_recovery_event("cli");
            if inherited_env {
                // Only this process's copy was unset
                println!(
                    "flag cleared; {}=1 is still set in the calling environment",
                    config.kill_switch.env_var
                );
                return Ok(false);
            }
            println!("kill switch cleared");
            Ok(true)
        }
        Command::Export { dry_run } => {
            let outcome = drp::export_state(&ExportOptions::from_config(&config.drp), dry_run).await?;
            match outcome.archive {
                Some(archive) => println!("{}", archive.display()),
                None => println!("dry run: would archive {}", outcome.members.join(", ")),
            }
            Ok(true)
        }
        Command::Restore { archive, dry_run } => {
            let outcome = drp::restore_state(
                &RestoreOptions::from_config(&config.drp),
                archive.as_deref(),
                dry_run,
            )
            .await?;
            println!(
                "{} {} ({})",
                if outcome.dry_run { "validated" } else { "restored" },
                outcome.archive.display(),
                outcome.members.join(", ")
            );
            Ok(true)
        }
        Command::Run { dry_run, live } => run(&config, dry_run, live).await,
        Command::Token { action, ttl_secs } => {
            println!("{}", FounderGate::mint_token(&action, ttl_secs));
            Ok(true)
        }
    }
}

async fn status(config: &Config) -> anyhow::Result<bool> {
    let runtime = Runtime::from_config(config)?;
    let decision = runtime.gatekeeper().evaluate(
        runtime.capital.as_ref(),
        runtime.ops.as_ref(),
        runtime.drp.as_ref(),
    );

    println!(
        "kill_switch: {}",
        runtime
            .kill_switch
            .source()
            .map(|s| s.as_str())
            .unwrap_or("off")
    );
    println!(
        "gates:       {}",
        match &decision.failed_gate {
            Some(gate) => format!("blocked by {}", gate.as_str()),
            None => "green".to_string(),
        }
    );

    let capital = runtime.capital.snapshot();
    println!(
        "capital:     balance={:.2} peak={:.2} losses={:.2} drawdown={:.2}% blocked={}",
        capital.balance, capital.peak_balance, capital.losses, capital.drawdown_pct, capital.blocked
    );

    let export_dir = paths::resolve(&config.drp.export_dir);
    match drp::newest_archive(&export_dir)? {
        Some((archive, _)) => println!("archive:     {}", archive.display()),
        None => println!("archive:     none in {}", export_dir.display()),
    }
    println!(
        "last_export: {}",
        if last_export_succeeded(&paths::resolve(&config.drp.export_log_file)) {
            "ok"
        } else {
            "failed"
        }
    );

    Ok(decision.passed)
}

async fn run(config: &Config, dry_run: bool, live: bool) -> anyhow::Result<bool> {
    logger::info(LogTag::System, "tradeguard starting up");

    let settings = OrchestratorSettings::from_config(config, dry_run, live);
    let runtime = Runtime::from_config(config)?;
    let strategies = StrategyRegistry::builtin().build_enabled(
        &config.orchestrator.enabled_strategies,
        &config.orchestrator.strategy_params,
    );
    if strategies.is_empty() {
        logger::warning(
            LogTag::Orchestrator,
            "No strategies enabled; cycles only exercise gates and snapshots",
        );
    }

    let orchestrator = Orchestrator::new(runtime, strategies, settings);
    let outcome = orchestrator.run_loop().await;
    if outcome != CycleOutcome::Completed {
        println!("halted: {:?}", outcome);
    }

    let counters = metrics::global().snapshot().render();
    logger::info(
        LogTag::System,
        &format!("Safety counters: {}", counters.trim_end().replace('\n', ", ")),
    );
    print!("{}", counters);
    Ok(outcome.is_completed())
}
