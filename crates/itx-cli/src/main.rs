use anyhow::Result;
use clap::{Parser, Subcommand};
use uuid::Uuid;

mod commands;

use commands::run as run_cmds;

#[derive(Parser)]
#[command(name = "itx")]
#[command(about = "IntradayExec V4 CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Database commands
    Db {
        #[command(subcommand)]
        cmd: DbCmd,
    },

    /// Compute layered config hash + print canonical JSON
    ConfigHash {
        /// Paths in merge order (base -> env -> engine -> risk -> stress...)
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Run lifecycle commands
    Run {
        #[command(subcommand)]
        cmd: RunCmd,
    },

    /// Lightweight go/no-go: database reachable and the run row exists.
    Status {
        #[arg(long)]
        run: String,
    },

    /// Status checks plus the deadman heartbeat.
    Readiness {
        #[arg(long)]
        run: String,
        #[arg(long, default_value_t = 120)]
        deadman_ttl_seconds: i64,
    },

    /// Full arm-gate: readiness checks plus reconcile-clean and risk-limit
    /// conditions. Same contract `itx run arm` enforces, reported
    /// structurally instead of failing on the first violation.
    Preflight {
        #[arg(long)]
        run: String,
        #[arg(long, default_value_t = 120)]
        deadman_ttl_seconds: i64,
    },
}

#[derive(Subcommand)]
enum DbCmd {
    Status,
    Migrate,
}

#[derive(Subcommand)]
enum RunCmd {
    /// Create a new run row in DB and print run_id + hashes.
    Start {
        /// Engine ID (e.g. MAIN, EXP)
        #[arg(long)]
        engine: String,

        /// Mode (PAPER | LIVE)
        #[arg(long)]
        mode: String,

        /// Layered config paths in merge order
        #[arg(long = "config", required = true)]
        config_paths: Vec<String>,
    },

    /// Transition CREATED -> ARMED. Requires manual confirmation for LIVE runs.
    Arm {
        #[arg(long)]
        run_id: String,
        #[arg(long)]
        confirm: Option<String>,
    },

    /// Transition ARMED -> RUNNING.
    Begin {
        #[arg(long)]
        run_id: String,
    },

    /// Transition RUNNING -> STOPPED.
    Stop {
        #[arg(long)]
        run_id: String,
    },

    /// Transition any state -> HALTED.
    Halt {
        #[arg(long)]
        run_id: String,
        #[arg(long)]
        reason: String,
    },

    /// Record a heartbeat for a RUNNING run.
    Heartbeat {
        #[arg(long)]
        run_id: String,
    },

    /// Print the full lifecycle status of a run.
    Status {
        #[arg(long)]
        run_id: String,
    },

    /// Check whether a RUNNING run's heartbeat has gone stale.
    DeadmanCheck {
        #[arg(long)]
        run_id: String,
        #[arg(long)]
        ttl_seconds: i64,
    },

    /// Halt a RUNNING run if its heartbeat has gone stale.
    DeadmanEnforce {
        #[arg(long)]
        run_id: String,
        #[arg(long)]
        ttl_seconds: i64,
    },

    /// Offline synthetic bar loop through the full decision pipeline.
    /// Gated behind the `testkit` feature; not part of production builds.
    #[cfg(feature = "testkit")]
    Loop {
        #[arg(long)]
        run_id: String,
        #[arg(long)]
        symbol: String,
        #[arg(long, default_value_t = 50)]
        bars: usize,
        #[arg(long, default_value_t = 60)]
        timeframe_secs: i64,
        #[arg(long, default_value = "../exports")]
        exports_root: std::path::PathBuf,
        #[arg(long, default_value = "cli-loop")]
        label: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.cmd {
        Commands::Db { cmd } => {
            let pool = itx_db::connect_from_env().await?;
            match cmd {
                DbCmd::Status => {
                    let s = itx_db::status(&pool).await?;
                    println!("db_ok={} has_runs_table={}", s.ok, s.has_runs_table);
                }
                DbCmd::Migrate => {
                    itx_db::migrate(&pool).await?;
                    println!("migrations_applied=true");
                }
            }
        }

        Commands::ConfigHash { paths } => {
            let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
            let loaded = itx_config::load_layered_yaml(&path_refs)?;
            println!("config_hash={}", loaded.config_hash);
            println!("{}", loaded.canonical_json);
        }

        Commands::Run { cmd } => match cmd {
            RunCmd::Start { engine, mode, config_paths } => {
                run_cmds::run_start(engine, mode, config_paths).await?;
            }
            RunCmd::Arm { run_id, confirm } => {
                run_cmds::run_arm(run_id, confirm).await?;
            }
            RunCmd::Begin { run_id } => {
                run_cmds::run_begin(run_id).await?;
            }
            RunCmd::Stop { run_id } => {
                run_cmds::run_stop(run_id).await?;
            }
            RunCmd::Halt { run_id, reason } => {
                run_cmds::run_halt(run_id, reason).await?;
            }
            RunCmd::Heartbeat { run_id } => {
                run_cmds::run_heartbeat(run_id).await?;
            }
            RunCmd::Status { run_id } => {
                run_cmds::run_status(run_id).await?;
            }
            RunCmd::DeadmanCheck { run_id, ttl_seconds } => {
                run_cmds::run_deadman_check(run_id, ttl_seconds).await?;
            }
            RunCmd::DeadmanEnforce { run_id, ttl_seconds } => {
                run_cmds::run_deadman_enforce(run_id, ttl_seconds).await?;
            }
            #[cfg(feature = "testkit")]
            RunCmd::Loop {
                run_id,
                symbol,
                bars,
                timeframe_secs,
                exports_root,
                label,
            } => {
                run_cmds::run_loop(run_id, symbol, bars, timeframe_secs, exports_root, label)?;
            }
        },

        Commands::Status { run } => {
            let pool = itx_db::connect_from_env().await?;
            let run_uuid = Uuid::parse_str(&run)?;
            let report = commands::readiness::build_status_report(&pool, run_uuid).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }

        Commands::Readiness { run, deadman_ttl_seconds } => {
            let pool = itx_db::connect_from_env().await?;
            let run_uuid = Uuid::parse_str(&run)?;
            let report = commands::readiness::build_readiness_report(&pool, run_uuid, deadman_ttl_seconds).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }

        Commands::Preflight { run, deadman_ttl_seconds } => {
            let pool = itx_db::connect_from_env().await?;
            let run_uuid = Uuid::parse_str(&run)?;
            let report = commands::readiness::build_preflight_report(&pool, run_uuid, deadman_ttl_seconds).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}
