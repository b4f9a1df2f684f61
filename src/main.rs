use std::{
    env, fs,
    io::BufReader,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use divvy_core::{
    AccountId, AccountSummary, BatchId, DividendPool, LedgerConfig, MemoryPayout, PoolSnapshot,
    StakeView,
};
use rand::{rngs::StdRng, Rng, SeedableRng};
use tracing::{debug, info};

mod script;

use script::{parse_script, Control, ScriptStep};

#[derive(Parser)]
#[command(name = "divvy", version, about = "Dividend ledger operator tool")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Replay a JSON-lines script against a pool.
    Run {
        script: PathBuf,
        /// TOML ledger configuration.
        #[arg(long)]
        config: Option<PathBuf>,
        /// Snapshot to start from instead of an empty pool.
        #[arg(long)]
        state: Option<PathBuf>,
        /// Where to write the resulting snapshot.
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Verify a snapshot and print its accounts.
    Inspect {
        state: PathBuf,
        #[arg(long)]
        account: Option<AccountId>,
    },
    /// Run random operations, auditing invariants after every step.
    Simulate {
        #[arg(long, default_value_t = 8)]
        accounts: usize,
        #[arg(long, default_value_t = 1_000)]
        steps: usize,
        #[arg(long, default_value_t = 42)]
        seed: u64,
    },
}

//==================== shared helpers ====================//

fn load_config(path: Option<&Path>) -> Result<LedgerConfig> {
    match path {
        Some(p) => LedgerConfig::load(p).with_context(|| format!("load config {}", p.display())),
        None => Ok(LedgerConfig::default()),
    }
}

fn read_snapshot(path: &Path) -> Result<PoolSnapshot> {
    let bytes = fs::read(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_slice(&bytes).with_context(|| format!("parse snapshot {}", path.display()))
}

fn write_snapshot(path: &Path, snapshot: &PoolSnapshot) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    let json = serde_json::to_vec_pretty(snapshot)?;
    fs::write(path, json).with_context(|| format!("write {}", path.display()))
}

fn print_summaries(rows: &[AccountSummary]) {
    println!(
        "{:<20} {:>14} {:>14} {:>14} {:>14}",
        "account", "balance", "entitled", "withdrawable", "withdrawn"
    );
    for s in rows {
        println!(
            "{:<20} {:>14} {:>14} {:>14} {:>14}",
            s.account, s.balance, s.entitlement, s.withdrawable, s.withdrawn
        );
    }
}

fn print_totals(pool: &DividendPool<MemoryPayout>) {
    println!(
        "total stake {} | distributed {} | height {} | root {}",
        pool.total_stake(),
        pool.total_distributed(),
        pool.meta().height,
        hex::encode(pool.state_root())
    );
}

//==================== run ====================//

fn run_cmd(
    script_path: &Path,
    config_path: Option<&Path>,
    state: Option<&Path>,
    out: Option<&Path>,
) -> Result<()> {
    let config = load_config(config_path)?;
    let payout = MemoryPayout::new(config.payout.clone());
    let mut pool = match state {
        Some(p) => DividendPool::from_snapshot(read_snapshot(p)?, &config, payout)
            .with_context(|| format!("restore {}", p.display()))?,
        None => DividendPool::new(&config, payout),
    };

    let file = fs::File::open(script_path)
        .with_context(|| format!("open script {}", script_path.display()))?;
    let steps = parse_script(BufReader::new(file))?;
    info!(steps = steps.len(), "replaying script");

    for (line, step) in steps {
        debug!(line, ?step, "applying step");
        match step {
            ScriptStep::Op(op) => pool.apply(&op).with_context(|| format!("line {line}"))?,
            ScriptStep::Control(Control::Withdraw { account }) => {
                let paid = pool.withdraw(&account).with_context(|| format!("line {line}"))?;
                if paid == 0 && pool.withdrawable(&account)? > 0 {
                    eprintln!("line {line}: payout to {account} failed, entitlement kept");
                }
            }
            ScriptStep::Control(Control::WithdrawAll) => {
                let accounts = pool.accounts();
                pool.withdraw_many(&accounts)
                    .with_context(|| format!("line {line}"))?;
            }
            ScriptStep::Control(Control::Batch { id, ops }) => {
                let id = id.unwrap_or_else(|| BatchId::of(&ops));
                pool.apply_batch(id, &ops)
                    .with_context(|| format!("line {line}: batch {id}"))?;
            }
        }
    }

    for event in pool.events() {
        println!("{}", serde_json::to_string(event)?);
    }
    print_summaries(&pool.summaries()?);
    print_totals(&pool);

    if let Some(out) = out {
        write_snapshot(out, &pool.snapshot())?;
        println!("snapshot written → {}", out.display());
    }
    Ok(())
}

//==================== inspect ====================//

fn inspect_cmd(state: &Path, account: Option<&AccountId>) -> Result<()> {
    let config = LedgerConfig::default();
    let pool = DividendPool::from_snapshot(read_snapshot(state)?, &config, MemoryPayout::default())
        .with_context(|| format!("verify {}", state.display()))?;
    let rows = match account {
        Some(a) => vec![pool.summary(a)?],
        None => pool.summaries()?,
    };
    print_summaries(&rows);
    print_totals(&pool);
    pool.check_invariants()?;
    println!("snapshot OK");
    Ok(())
}

//==================== simulate ====================//

fn simulate_cmd(accounts: usize, steps: usize, seed: u64) -> Result<()> {
    if accounts == 0 {
        bail!("--accounts must be > 0");
    }
    let mut rng = StdRng::seed_from_u64(seed);
    let names: Vec<AccountId> = (0..accounts).map(|i| format!("acct-{i:03}")).collect();
    let mut payout = MemoryPayout::default();
    // one account refuses payouts so the rollback path is exercised
    payout.reject(names[0].clone());
    let mut pool = DividendPool::new(&LedgerConfig::default(), payout);
    let treasury: AccountId = "treasury".into();
    let mut rejected = 0usize;

    for step in 0..steps {
        let who = &names[rng.gen_range(0..accounts)];
        let result = match rng.gen_range(0..5u8) {
            0 => pool.mint(who, rng.gen_range(1..1_000_000)),
            1 => {
                let bal = pool.balance_of(who);
                pool.burn(who, rng.gen_range(0..=bal))
            }
            2 => {
                let to = &names[rng.gen_range(0..accounts)];
                let bal = pool.balance_of(who);
                pool.transfer(who, to, rng.gen_range(0..=bal))
            }
            3 => pool.distribute(&treasury, rng.gen_range(0..100_000)),
            _ => pool.withdraw(who).map(|_| ()),
        };
        if let Err(err) = result {
            if err.is_fatal() {
                return Err(err).with_context(|| format!("step {step}"));
            }
            rejected += 1;
        }
        pool.check_invariants()
            .with_context(|| format!("invariant audit after step {step}"))?;
    }

    print_summaries(&pool.summaries()?);
    print_totals(&pool);
    println!(
        "{steps} steps, {rejected} rejected, {} paid out",
        pool.payout().total_paid()
    );
    Ok(())
}

//==================== main ====================//

fn main() -> Result<()> {
    let filter = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Run {
            script,
            config,
            state,
            out,
        } => run_cmd(&script, config.as_deref(), state.as_deref(), out.as_deref()),
        Command::Inspect { state, account } => inspect_cmd(&state, account.as_ref()),
        Command::Simulate {
            accounts,
            steps,
            seed,
        } => simulate_cmd(accounts, steps, seed),
    }
}
