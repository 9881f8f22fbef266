use chrono::{DateTime, NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::config::{validate_batch_size, Config};
use crate::services::DailySummaryService;
use crate::store::{CancellationToken, Context, JsonFileSummaryStore, JsonlTransactionSource};
use crate::types::{HistoricalSummary, ObjectId};

/// Daily summary materialization for a personal-finance ledger
#[derive(Parser)]
#[command(name = "ledgerday")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Default)]
struct GlobalArgs {
    /// Directory of *.jsonl transaction exports
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Summary store file
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    /// JSON file mapping category/pocket/platform ids to names
    #[arg(long, global = true)]
    names: Option<PathBuf>,

    /// Users per backfill batch
    #[arg(long, global = true)]
    batch_size: Option<usize>,

    /// Abort the invocation after this many seconds
    #[arg(long, global = true, value_name = "SECS")]
    timeout: Option<u64>,
}

#[derive(Subcommand, Debug, PartialEq)]
enum Commands {
    /// Rebuild one user's summary for one day
    Generate {
        #[arg(long, value_parser = parse_object_id)]
        user: ObjectId,
        #[arg(long, value_parser = parse_day)]
        date: DateTime<Utc>,
    },

    /// Materialize every user's days from a date through yesterday
    Backfill {
        #[arg(long, value_parser = parse_day)]
        from: DateTime<Utc>,
    },

    /// Delete summaries from a date on, then backfill them again
    Sync {
        #[arg(long, value_parser = parse_day)]
        from: DateTime<Utc>,
    },

    /// Show a user's income, expense and categories over [from, to)
    History {
        #[arg(long, value_parser = parse_object_id)]
        user: ObjectId,
        #[arg(long, value_parser = parse_day)]
        from: DateTime<Utc>,
        #[arg(long, value_parser = parse_day)]
        to: DateTime<Utc>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Create the unique (user_id, date) index on the summary store
    EnsureIndexes,
}

fn parse_object_id(s: &str) -> Result<ObjectId, String> {
    s.parse().map_err(|e: crate::types::LedgerdayError| e.to_string())
}

/// Accept `YYYY-MM-DD` or a full RFC 3339 timestamp
fn parse_day(s: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Ok(d.and_time(chrono::NaiveTime::MIN).and_utc());
    }
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| format!("expected YYYY-MM-DD or RFC 3339, got '{}': {}", s, e))
}

impl GlobalArgs {
    fn apply(&self, config: &mut Config) -> anyhow::Result<()> {
        if let Some(dir) = &self.data_dir {
            config.transactions_dir = dir.clone();
        }
        if let Some(store) = &self.store {
            config.store_path = store.clone();
        }
        if let Some(names) = &self.names {
            config.names_path = Some(names.clone());
        }
        if let Some(size) = self.batch_size {
            config.batch_size = validate_batch_size(size)?;
        }
        Ok(())
    }

    fn context(&self, token: CancellationToken) -> Context {
        let ctx = Context::background().with_cancel(token);
        match self.timeout {
            Some(secs) => ctx.with_timeout(Duration::from_secs(secs)),
            None => ctx,
        }
    }
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        let mut config = Config::load()?;
        self.global.apply(&mut config)?;

        let token = CancellationToken::new();
        let ctx = self.global.context(token.clone());
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, cancelling");
                token.cancel();
            }
        });

        let output = execute(&config, self.command, &ctx).await?;
        print!("{}", output);
        Ok(())
    }
}

fn build_service(config: &Config) -> anyhow::Result<DailySummaryService> {
    let source = JsonlTransactionSource::with_data_dir(config.transactions_dir.clone());
    let store = JsonFileSummaryStore::with_path(config.store_path.clone());
    Ok(DailySummaryService::new(Arc::new(source), Arc::new(store))
        .with_names(config.load_names()?)
        .with_batch_size(config.batch_size))
}

/// Run one command and render what it prints
async fn execute(config: &Config, command: Commands, ctx: &Context) -> anyhow::Result<String> {
    let service = build_service(config)?;
    let mut out = String::new();

    match command {
        Commands::Generate { user, date } => {
            match service.generate_daily_summary(ctx, user, date).await? {
                Some(summary) => writeln!(
                    out,
                    "{} {}: income {:.2}, expense {:.2}",
                    user,
                    summary.date.format("%Y-%m-%d"),
                    summary.total_income,
                    summary.total_expense
                )?,
                None => writeln!(
                    out,
                    "{} {}: no income or expense",
                    user,
                    date.format("%Y-%m-%d")
                )?,
            }
        }
        Commands::Backfill { from } => {
            let report = service.generate_daily_summaries_for_all_users(ctx, from).await?;
            writeln!(
                out,
                "backfilled {} summaries for {} users in {} batches",
                report.summaries, report.users, report.batches
            )?;
        }
        Commands::Sync { from } => {
            let report = service.sync_daily_summaries(ctx, from).await?;
            writeln!(
                out,
                "deleted {} summaries, backfilled {} for {} users",
                report.deleted, report.backfill.summaries, report.backfill.users
            )?;
        }
        Commands::History {
            user,
            from,
            to,
            json,
        } => {
            let history = service.get_historical_summary(ctx, user, from, to).await?;
            if json {
                writeln!(out, "{}", serde_json::to_string_pretty(&history)?)?;
            } else {
                render_history(&mut out, &history)?;
            }
        }
        Commands::EnsureIndexes => {
            service.ensure_indexes(ctx).await?;
            writeln!(out, "indexes ensured on {}", config.store_path.display())?;
        }
    }

    Ok(out)
}

fn render_history(out: &mut String, history: &HistoricalSummary) -> std::fmt::Result {
    writeln!(out, "income   {:>12.2}", history.total_income)?;
    writeln!(out, "expense  {:>12.2}", history.total_expense)?;
    for line in &history.category_breakdown {
        writeln!(
            out,
            "  {:<8} {:<24} {:>12.2}",
            line.entry_type.to_string(),
            line.dimension_name,
            line.amount
        )?;
    }
    Ok(())
}
