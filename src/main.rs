use std::sync::Arc;
use std::thread;
use std::time::Instant;

use anyhow::{anyhow, Result};
use clap::Parser;

use granlock::{LockManager, LockManagerConfig, LockType, Resource, TransactionManager};

#[derive(Parser)]
#[command(author, version, about = "Granlock - run a multi-granularity locking workload")]
struct Cli {
    /// Number of tables under the database
    #[arg(short, long, default_value_t = 4)]
    tables: u32,

    /// Pages per table
    #[arg(short, long, default_value_t = 16)]
    pages: u32,

    /// Worker threads, one transaction at a time each
    #[arg(short, long, default_value_t = 8)]
    workers: u32,

    /// Transactions per worker
    #[arg(short, long, default_value_t = 1000)]
    rounds: u32,

    /// Lock every page with this mode instead of a S/X mix
    #[arg(long)]
    page_lock: Option<LockType>,

    /// Check lock table invariants after every operation
    #[arg(long)]
    verify: bool,
}

struct Hierarchy {
    database: Resource,
    tables: Vec<(Resource, Vec<Resource>)>,
}

impl Hierarchy {
    fn build(tables: u32, pages: u32) -> Self {
        let mut next_id = 1;
        let tables = (0..tables)
            .map(|_| {
                let table_id = next_id;
                let page_ids: Vec<_> = (table_id + 1..=table_id + pages).collect();
                next_id += pages + 1;
                Resource::table_with_pages(table_id, &page_ids)
            })
            .collect();

        Self {
            database: Resource::database(0),
            tables,
        }
    }
}

/// One worker: each round locks database, table and page top-down, then
/// releases bottom-up, either explicitly or by committing.
fn run_worker(cli: &Cli, tm: &TransactionManager, hierarchy: &Hierarchy, worker: u32) -> Result<u64> {
    let lm = tm.lock_manager();
    let mut acquired = 0;

    for round in 0..cli.rounds {
        let txn = tm.begin_transaction();
        let (table, pages) = &hierarchy.tables[((worker + round) as usize) % hierarchy.tables.len()];
        let page = &pages[((worker * 7 + round * 3) as usize) % pages.len()];

        let page_lock = cli.page_lock.unwrap_or(if (worker + round) % 3 == 0 {
            LockType::X
        } else {
            LockType::S
        });
        let intent = if page_lock == LockType::X { LockType::IX } else { LockType::IS };

        lm.acquire(&txn, &hierarchy.database, intent)?;
        lm.acquire(&txn, table, intent)?;
        lm.acquire(&txn, page, page_lock)?;
        acquired += 3;
        thread::yield_now();

        if round % 2 == 0 {
            lm.release(&txn, page)?;
            lm.release(&txn, table)?;
            lm.release(&txn, &hierarchy.database)?;
        }
        tm.commit_transaction(txn.id())?;
    }

    Ok(acquired)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    if cli.tables == 0 || cli.pages == 0 {
        return Err(anyhow!("need at least one table and one page"));
    }
    if matches!(cli.page_lock, Some(LockType::IS) | Some(LockType::IX)) {
        return Err(anyhow!("pages only take S or X locks"));
    }

    let lock_manager = Arc::new(LockManager::with_config(LockManagerConfig {
        verify_invariants: cli.verify,
        ..LockManagerConfig::default()
    }));
    let tm = TransactionManager::new(lock_manager.clone());
    let hierarchy = Hierarchy::build(cli.tables, cli.pages);

    let start = Instant::now();
    let results = crossbeam::scope(|s| {
        let handles: Vec<_> = (0..cli.workers)
            .map(|worker| {
                let (cli, tm, hierarchy) = (&cli, &tm, &hierarchy);
                s.spawn(move |_| run_worker(cli, tm, hierarchy, worker))
            })
            .collect();
        handles.into_iter().map(|h| h.join()).collect::<Vec<_>>()
    })
    .map_err(|_| anyhow!("worker scope panicked"))?;

    let mut total = 0;
    for result in results {
        total += result.map_err(|_| anyhow!("worker panicked"))??;
    }
    let elapsed = start.elapsed();

    println!(
        "{} workers acquired {} locks in {:.2?} ({:.0} locks/s)",
        cli.workers,
        total,
        elapsed,
        total as f64 / elapsed.as_secs_f64().max(f64::EPSILON)
    );

    lock_manager.check_invariants()?;
    let snapshot = lock_manager.snapshot();
    let busy = snapshot
        .resources
        .iter()
        .filter(|r| !r.owners.is_empty() || !r.waiting.is_empty())
        .count();
    println!(
        "Lock table: {} resources tracked, {} still locked, {} active transactions",
        snapshot.resources.len(),
        busy,
        tm.get_active_transaction_ids().len()
    );

    Ok(())
}
