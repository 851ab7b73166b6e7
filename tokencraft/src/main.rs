//! tokencraft - score AI coding sessions and track progression
//!
//! Reads session metrics as JSON, evaluates them against the stored profile
//! and persists the result.

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use clap::{Parser, Subcommand};
use std::io::Read;
use std::path::{Path, PathBuf};
use tokencraft_core::progression::{achievements, delta, difficulty, migration, rank};
use tokencraft_core::{
    Config, Database, Evaluation, ProgressionEngine, Rank, SessionMetrics, Snapshot, UserProfile,
};

#[derive(Parser)]
#[command(name = "tokencraft")]
#[command(about = "Score AI coding sessions and track progression")]
#[command(version)]
struct Cli {
    /// Output format: text (default) or json
    #[arg(short, long, default_value = "text", global = true)]
    format: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Score the newest session and update the profile
    Evaluate {
        /// Profile identity
        #[arg(short, long, default_value = "default")]
        identity: String,

        /// JSON file with one session or an array of sessions (oldest first), or - for stdin
        #[arg(short, long)]
        sessions: PathBuf,

        /// Score without saving the profile or a snapshot
        #[arg(long)]
        dry_run: bool,
    },

    /// Show a stored profile
    Profile {
        #[arg(short, long, default_value = "default")]
        identity: String,
    },

    /// Migrate a stored profile to the current rubric
    Migrate {
        #[arg(short, long, default_value = "default")]
        identity: String,

        /// Show the migration report without saving
        #[arg(long)]
        dry_run: bool,
    },

    /// List recent evaluation snapshots
    Snapshots {
        #[arg(short, long, default_value = "default")]
        identity: String,

        /// Number of snapshots to show
        #[arg(short, long, default_value_t = 10)]
        limit: usize,

        /// Delete all but the newest N snapshots first
        #[arg(long)]
        prune: Option<usize>,
    },

    /// List achievements and unlock status
    Achievements {
        #[arg(short, long, default_value = "default")]
        identity: String,
    },

    /// Show the rank ladder and per-rank thresholds
    Ranks,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    Config::ensure_xdg_env();

    // Load configuration
    let config = Config::load().context("failed to load configuration")?;

    // Initialize logging
    let _log_guard =
        tokencraft_core::logging::init(&config.logging).context("failed to initialize logging")?;

    // Open database
    let db_path = Config::database_path();
    let db = Database::open(&db_path).context("failed to open database")?;
    db.migrate().context("failed to run database migrations")?;

    let json = cli.format == "json";
    match cli.command {
        Command::Evaluate {
            identity,
            sessions,
            dry_run,
        } => evaluate(&config, &db, &identity, &sessions, dry_run, json),
        Command::Profile { identity } => show_profile(&db, &identity, json),
        Command::Migrate { identity, dry_run } => migrate(&db, &identity, dry_run, json),
        Command::Snapshots {
            identity,
            limit,
            prune,
        } => show_snapshots(&db, &identity, limit, prune, json),
        Command::Achievements { identity } => show_achievements(&db, &identity, json),
        Command::Ranks => print_ranks(json),
    }
}

// ============================================
// Evaluate
// ============================================

fn evaluate(
    config: &Config,
    db: &Database,
    identity: &str,
    path: &Path,
    dry_run: bool,
    json: bool,
) -> Result<()> {
    let sessions = read_sessions(path)?;
    let current = sessions
        .last()
        .cloned()
        .context("session file contains no sessions")?;

    let engine =
        ProgressionEngine::new(config.engine.clone()).context("invalid engine configuration")?;
    let previous = db
        .load_profile(identity)
        .with_context(|| format!("failed to load profile '{}'", identity))?;

    let evaluation = engine
        .evaluate(identity, previous.clone(), &sessions)
        .context("evaluation failed")?;

    if !dry_run {
        db.record_evaluation(
            previous.as_ref(),
            &evaluation,
            &current,
            config.storage.snapshot_retention,
        )
        .with_context(|| format!("failed to save profile '{}'", identity))?;
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&evaluation)?);
    } else {
        print_evaluation(&evaluation, dry_run);
    }
    Ok(())
}

/// Parse a session file: a single object or an array, oldest first.
///
/// Sessions without a timestamp are stamped with the current time.
fn read_sessions(path: &Path) -> Result<Vec<SessionMetrics>> {
    let content = if path == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read sessions from stdin")?;
        buf
    } else {
        std::fs::read_to_string(path)
            .with_context(|| format!("failed to read session file {}", path.display()))?
    };

    let value: serde_json::Value =
        serde_json::from_str(&content).context("session file is not valid JSON")?;
    let mut items = match value {
        serde_json::Value::Array(items) => items,
        other => vec![other],
    };

    let now = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
    for item in &mut items {
        if let serde_json::Value::Object(fields) = item {
            fields
                .entry("timestamp")
                .or_insert_with(|| serde_json::Value::String(now.clone()));
        }
    }

    let mut sessions = items
        .into_iter()
        .map(serde_json::from_value::<SessionMetrics>)
        .collect::<std::result::Result<Vec<_>, _>>()
        .context("invalid session metrics")?;
    sessions.sort_by_key(|s| s.timestamp);
    Ok(sessions)
}

fn print_evaluation(evaluation: &Evaluation, dry_run: bool) {
    let report = &evaluation.report;

    if let Some(migration) = &evaluation.migration {
        println!(
            "Profile migrated from rubric v{} to v{} ({:.1} -> {:.1})",
            migration.from_version,
            migration.to_version,
            migration.score_before,
            migration.score_after
        );
    }
    if let Some(decay) = &evaluation.decay {
        println!(
            "Inactive for {} days: lifetime score decayed {:.1} -> {:.1}",
            decay.days_inactive, decay.before, decay.after
        );
    }

    println!("Session score");
    for category in &report.categories {
        println!(
            "  {:<24} {:>6.1} / {:<5.0}",
            category.category.to_string(),
            category.earned,
            category.maximum
        );
    }
    println!("  {:<24} {:>6.1}", "raw total", report.raw_total);
    println!();
    println!(
        "  Streak:      {} (x{:.2})",
        report.streak_length, report.streak_multiplier
    );
    println!(
        "  Bonuses:     streak {:.0}, combo {:.0}, achievements {:.0}, recency {:.1}",
        report.bonuses.streak,
        report.bonuses.combo,
        report.bonuses.achievement,
        report.bonuses.recency
    );
    println!("  Final:       {:.1}", report.final_total);
    println!("  Lifetime:    {:.1}", report.lifetime_score);
    println!(
        "  Rank:        {}{}",
        report.rank,
        next_rank_suffix(report.rank, report.next_rank_distance)
    );

    if let Some((from, to)) = evaluation.rank_change {
        let verb = if to > from { "Promoted" } else { "Demoted" };
        println!("\n{} from {} to {}", verb, from, to);
    }
    if !evaluation.new_achievements.is_empty() {
        println!("\nAchievements unlocked:");
        for id in &evaluation.new_achievements {
            let name = achievements::find(id).map_or(id.as_str(), |def| def.name);
            println!("  + {}", name);
        }
    }
    if evaluation.season_reset.is_some() {
        println!("\nA new season has started.");
    }

    let regression = &evaluation.regression;
    if !regression.recommendations.is_empty() {
        println!("\nRegression ({}): {}", regression.severity.as_str(), regression.guidance);
        for line in &regression.recommendations {
            println!("  - {}", line);
        }
    }

    if dry_run {
        println!("\n(dry run, nothing saved)");
    }
}

fn next_rank_suffix(current: Rank, distance: f64) -> String {
    match rank::next_rank(current) {
        Some(next) => format!(" ({:.1} to {})", distance, next),
        None => String::new(),
    }
}

// ============================================
// Profile
// ============================================

fn load_existing(db: &Database, identity: &str) -> Result<UserProfile> {
    db.load_profile(identity)
        .with_context(|| format!("failed to load profile '{}'", identity))?
        .with_context(|| format!("no profile found for '{}'", identity))
}

fn show_profile(db: &Database, identity: &str, json: bool) -> Result<()> {
    let profile = load_existing(db, identity)?;
    let progress = rank::progress(profile.cumulative_score);
    let stats = achievements::stats(&profile);

    if json {
        let output = serde_json::json!({
            "profile": profile,
            "progress": progress,
            "achievements": stats,
            "needs_migration": migration::needs_migration(&profile),
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("Profile: {}", profile.identity);
    if migration::needs_migration(&profile) {
        println!("  (rubric v{}, run 'tokencraft migrate' to upgrade)", profile.schema_version);
    }
    println!(
        "  Rank:          {} ({:.0}% of tier){}",
        progress.rank,
        progress.percent,
        next_rank_suffix(progress.rank, progress.distance)
    );
    println!("  Lifetime:      {:.1}", profile.cumulative_score);
    println!("  Season best:   {:.1}", profile.season_score);
    println!(
        "  Streak:        {} (best {})",
        profile.streak_length, profile.best_streak
    );
    println!("  Sessions:      {}", profile.total_sessions);
    println!(
        "  Achievements:  {}/{} ({:.0}%), {:.0} points",
        stats.unlocked, stats.total, stats.completion_pct, stats.points_earned
    );
    if let Some(last) = profile.last_session_at {
        println!("  Last session:  {}", last.format("%Y-%m-%d %H:%M UTC"));
    }
    if let Some(relief) = profile.active_relief(Utc::now()) {
        println!(
            "  Relief:        {:.0}% easier until {}",
            relief.easing * 100.0,
            relief.until.format("%Y-%m-%d")
        );
    }
    Ok(())
}

// ============================================
// Migrate
// ============================================

fn migrate(db: &Database, identity: &str, dry_run: bool, json: bool) -> Result<()> {
    let stored = load_existing(db, identity)?;
    let (migrated, report) =
        migration::migrate(stored.clone()).context("profile migration failed")?;

    if !report.is_noop() && !dry_run {
        db.save_profile(&migrated, Some(&stored))
            .with_context(|| format!("failed to save profile '{}'", identity))?;
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    if report.is_noop() {
        println!("Profile '{}' is already at rubric v{}", identity, report.to_version);
        return Ok(());
    }

    println!(
        "Migrated '{}' from rubric v{} to v{}{}",
        identity,
        report.from_version,
        report.to_version,
        if dry_run { " (dry run)" } else { "" }
    );
    println!(
        "  Score: {:.1} -> {:.1}",
        report.score_before, report.score_after
    );
    println!("  Rank:  {} -> {}", stored.current_rank, migrated.current_rank);
    for (old, new) in &report.remapped {
        println!("  remapped  {} -> {}", old, new);
    }
    for id in &report.collapsed {
        println!("  collapsed {}", id);
    }
    for id in &report.dropped {
        println!("  dropped   {}", id);
    }
    for warning in &report.warnings {
        println!("  warning: {}", warning);
    }
    Ok(())
}

// ============================================
// Snapshots
// ============================================

fn show_snapshots(
    db: &Database,
    identity: &str,
    limit: usize,
    prune: Option<usize>,
    json: bool,
) -> Result<()> {
    let removed = match prune {
        Some(keep) => Some(
            db.prune_snapshots(identity, keep)
                .context("failed to prune snapshots")?,
        ),
        None => None,
    };

    let snapshots = db
        .list_snapshots(identity, limit)
        .context("failed to list snapshots")?;
    let latest_change = match snapshots.as_slice() {
        [newest, previous, ..] => Some(delta::compare(&previous.report, &newest.report)),
        _ => None,
    };

    if json {
        let output = serde_json::json!({
            "identity": identity,
            "pruned": removed,
            "snapshots": snapshots,
            "latest_change": latest_change,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    if let Some(removed) = removed {
        println!("Pruned {} snapshot(s)", removed);
    }
    if snapshots.is_empty() {
        println!("No snapshots for '{}'.", identity);
        return Ok(());
    }

    println!(
        "{:<20} {:>8} {:>9}  {}",
        "taken", "final", "lifetime", "rank"
    );
    for snapshot in &snapshots {
        print_snapshot_row(snapshot);
    }

    if let Some(change) = latest_change {
        println!(
            "\nLatest change: {:+.1} final, {:+.1} lifetime",
            change.final_change, change.lifetime_change
        );
        for gain in change.top_gains(3) {
            println!("  {:<24} {:+.1}", gain.category.to_string(), gain.change);
        }
    }
    Ok(())
}

fn print_snapshot_row(snapshot: &Snapshot) {
    println!(
        "{:<20} {:>8.1} {:>9.1}  {}",
        snapshot.taken_at.format("%Y-%m-%d %H:%M"),
        snapshot.report.final_total,
        snapshot.report.lifetime_score,
        snapshot.report.rank
    );
}

// ============================================
// Achievements and ranks
// ============================================

fn show_achievements(db: &Database, identity: &str, json: bool) -> Result<()> {
    let profile = db
        .load_profile(identity)
        .with_context(|| format!("failed to load profile '{}'", identity))?
        .unwrap_or_default();
    let catalogue = achievements::catalogue(&profile);
    let stats = achievements::stats(&profile);

    if json {
        let output = serde_json::json!({
            "achievements": catalogue,
            "stats": stats,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    for status in &catalogue {
        let mark = if status.unlocked > 0 { "x" } else { " " };
        let times = if status.unlocked > 1 {
            format!(" x{}", status.unlocked)
        } else {
            String::new()
        };
        println!(
            "[{}] {:<18} {:>4.0}  {}{}",
            mark, status.name, status.points, status.description, times
        );
    }
    println!(
        "\n{}/{} unlocked ({:.0}%), {:.0} points",
        stats.unlocked, stats.total, stats.completion_pct, stats.points_earned
    );
    Ok(())
}

fn print_ranks(json: bool) -> Result<()> {
    let table = difficulty::comparison_table();

    if json {
        let output: Vec<_> = table
            .iter()
            .map(|t| {
                serde_json::json!({
                    "rank": t.rank,
                    "min_score": rank::threshold(t.rank),
                    "thresholds": t,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!(
        "{:<16} {:>7} {:>6} {:>9} {:>7} {:>7} {:>7}",
        "rank", "min", "factor", "tokens", "cache", "waste", "cost"
    );
    for t in &table {
        println!(
            "{:<16} {:>7.0} {:>6.2} {:>9.0} {:>6.0}% {:>6.0}% {:>7.3}",
            t.rank.display_name(),
            rank::threshold(t.rank),
            t.factor,
            t.token_budget,
            t.cache_target * 100.0,
            t.waste_allowance * 100.0,
            t.cost_budget_usd
        );
    }
    Ok(())
}
