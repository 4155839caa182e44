//! accrual-node: operator binary.
//!
//! Every subcommand opens the state database under `--data-dir`, runs one
//! event or query at block time `--time` (wall clock when omitted) and exits.

use std::path::{Path, PathBuf};

use accrual_core::coins::Coins;
use accrual_core::types::{DurationSecs, LockId, Timestamp};
use accrual_genesis::{apply_genesis, AccountRef, GenesisParams};
use accrual_node::App;
use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "accrual-node", version, about = "Lock ledger and lazy reward distribution")]
struct Args {
    /// Directory for the persistent state database.
    #[arg(long, default_value = "~/.accrual/data")]
    data_dir: PathBuf,

    /// Block time in unix seconds. Defaults to the wall clock.
    #[arg(long, global = true)]
    time: Option<Timestamp>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write the genesis state into an empty database.
    Init {
        #[arg(long)]
        genesis: PathBuf,
    },
    /// Process one block: withdraw matured locks and advance epochs.
    Tick,
    /// Lock coins, topping up a matching lock when there is one.
    Lock {
        #[arg(long)]
        owner: AccountRef,
        /// Coins such as `100stake` or `100stake,5foo`.
        #[arg(long)]
        coins: Coins,
        #[arg(long)]
        duration: DurationSecs,
    },
    /// Start unlocking a lock, or part of it with `--coins`.
    BeginUnlock {
        #[arg(long)]
        owner: AccountRef,
        #[arg(long)]
        lock_id: LockId,
        #[arg(long)]
        coins: Option<Coins>,
    },
    /// Withdraw a matured lock.
    Withdraw {
        #[arg(long)]
        owner: AccountRef,
        #[arg(long)]
        lock_id: LockId,
    },
    /// Claim a lock's reward, to the owner unless `--recipient` is given.
    Claim {
        #[arg(long)]
        owner: AccountRef,
        #[arg(long)]
        lock_id: LockId,
        #[arg(long)]
        recipient: Option<AccountRef>,
    },
    /// Reward a lock would hold if every pending period closed now.
    Estimate {
        #[arg(long)]
        lock_id: LockId,
    },
    /// Open accumulator of one reward bucket.
    CurrentReward {
        #[arg(long)]
        denom: String,
        #[arg(long)]
        duration: DurationSecs,
    },
    /// List every gauge with its status.
    Gauges,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,accrual=debug")),
        )
        .init();

    let args = Args::parse();
    let now = args.time.unwrap_or_else(|| chrono::Utc::now().timestamp());

    let data_dir = expand_tilde(&args.data_dir);
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("creating data dir {}", data_dir.display()))?;
    let app = App::open(&data_dir).context("opening state database")?;

    match args.command {
        Command::Init { genesis } => {
            let params = GenesisParams::from_file(&genesis)
                .with_context(|| format!("reading genesis from {}", genesis.display()))?;
            let summary = apply_genesis(app.db(), &params).context("applying genesis")?;
            info!(locks = summary.lock_ids.len(), gauges = summary.gauge_ids.len(), "genesis applied");
        }
        Command::Tick => {
            app.begin_block(now).context("processing block")?;
            for info in app.query(|app, txn| app.epochs.all_epoch_infos(txn))? {
                println!("{} epoch {} (started {})", info.identifier, info.current_epoch, info.current_epoch_start_time);
            }
        }
        Command::Lock { owner, coins, duration } => {
            let lock = app.lock_tokens(now, &owner.resolve()?, coins, duration)?;
            println!("lock {} holds {} for {}s", lock.id, lock.coins, lock.duration);
        }
        Command::BeginUnlock { owner, lock_id, coins } => {
            let lock = app.begin_unlock(now, &owner.resolve()?, lock_id, coins)?;
            println!("lock {} unlocking {} until {}", lock.id, lock.coins, lock.end_time.unwrap_or(now));
        }
        Command::Withdraw { owner, lock_id } => {
            let lock = app.withdraw(now, &owner.resolve()?, lock_id)?;
            println!("withdrew {} from lock {}", lock.coins, lock.id);
        }
        Command::Claim { owner, lock_id, recipient } => {
            let owner = owner.resolve()?;
            let recipient = match recipient {
                Some(r) => r.resolve()?,
                None => owner.clone(),
            };
            let paid = app.claim(&owner, lock_id, &recipient)?;
            println!("paid {} to {}", display_coins(&paid), recipient);
        }
        Command::Estimate { lock_id } => {
            let owed = app.estimate(lock_id)?;
            println!("lock {lock_id} would hold {owed}");
        }
        Command::CurrentReward { denom, duration } => {
            let current = app.query(|app, txn| app.incentives.get_current_reward(txn, &denom, duration))?;
            println!("{}", serde_json::to_string_pretty(&current)?);
        }
        Command::Gauges => {
            let gauges = app.query(|app, txn| {
                app.incentives
                    .get_gauges(txn)?
                    .into_iter()
                    .map(|g| Ok((app.incentives.gauge_status(txn, g.id)?, g)))
                    .collect::<Result<Vec<_>, _>>()
            })?;
            for (status, gauge) in gauges {
                println!("{:?} {}", status, serde_json::to_string(&gauge)?);
            }
        }
    }

    app.db().flush()?;
    Ok(())
}

fn display_coins(coins: &Coins) -> String {
    if coins.is_empty() {
        "nothing".to_string()
    } else {
        coins.to_string()
    }
}

/// Expand a leading `~` to the user's home directory (`HOME` or `USERPROFILE`).
fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(stripped) = path.strip_prefix("~") {
        if let Ok(home) = std::env::var("HOME").or_else(|_| std::env::var("USERPROFILE")) {
            return PathBuf::from(home).join(stripped);
        }
    }
    path.to_path_buf()
}
