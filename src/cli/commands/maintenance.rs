//! Cleanup, stats and migrations command implementations.

use chrono::{DateTime, Local};
use serde_json::json;

use crate::cli::commands::{Paths, print_json};
use crate::config::TrashPolicy;
use crate::error::Result;
use crate::prefs::{PrefKey, Preferences};
use crate::storage::migrations::{applied_migrations, current_version};
use crate::storage::{CleanupPolicy, MigrationRegistry};

/// Execute the cleanup command.
///
/// Flags override the retention policy from the preferences.
///
/// # Errors
///
/// Returns an error if the preferences or the database cannot be read, or
/// a cleanup pass fails.
pub async fn execute_cleanup(
    older_than_days: Option<u64>,
    max_count: Option<usize>,
    paths: &Paths,
    json: bool,
) -> Result<()> {
    let prefs = paths.preferences()?;
    let repo = paths.repository().await?.with_max_trash_count(max_count);

    let mut policy = TrashPolicy::from_prefs(&prefs, repo.max_trash_count());
    if let Some(days) = older_than_days {
        policy.keep_days = Some(days).filter(|d| *d > 0);
    }
    let cleanup: CleanupPolicy = policy.cleanup_policy();
    let stats = repo.clean_up(cleanup).await?;

    if json {
        return print_json(&json!({
            "success": true,
            "keep_days": policy.keep_days,
            "max_count": policy.max_count,
            "stats": stats,
            "total": stats.total(),
        }));
    }
    if stats.total() == 0 {
        println!("Nothing to clean up.");
        return Ok(());
    }
    println!("Cleanup removed {} row(s)", stats.total());
    if stats.by_age.total() > 0 {
        println!(
            "  By age:   {} list(s), {} item(s)",
            stats.by_age.lists, stats.by_age.items
        );
    }
    if stats.by_count.total() > 0 {
        println!(
            "  By count: {} list(s), {} item(s)",
            stats.by_count.lists, stats.by_count.items
        );
    }
    if stats.orphans > 0 {
        println!("  Orphans:  {} item(s)", stats.orphans);
    }
    if prefs.get_u64(PrefKey::TrashKeepinStock).is_none() && older_than_days.is_none() {
        println!("  (no age limit configured)");
    }
    Ok(())
}

/// Execute the stats command.
///
/// # Errors
///
/// Returns an error if the database cannot be read.
pub async fn execute_stats(paths: &Paths, json: bool) -> Result<()> {
    let repo = paths.repository().await?;
    let stats = repo.database_stats().await?;
    let size = repo.database_size().await?;

    if json {
        return print_json(&json!({
            "database": paths.db.display().to_string(),
            "size": size,
            "stats": stats,
        }));
    }
    println!("Listago Database");
    println!("================");
    println!();
    println!("Location: {}", paths.db.display());
    println!("Size:     {size} bytes");
    println!();
    println!("Lists:    {} ({} items)", stats.lists.lists, stats.lists.items);
    println!("Trash:    {} ({} items)", stats.trash.lists, stats.trash.items);
    Ok(())
}

/// Execute the migrations command.
///
/// # Errors
///
/// Returns an error if the database cannot be read.
pub async fn execute_migrations(paths: &Paths, json: bool) -> Result<()> {
    let repo = paths.repository().await?;
    let (version, applied) = repo
        .connection()
        .with_connection(|conn| Ok((current_version(conn)?, applied_migrations(conn)?)))
        .await?;
    let latest = MigrationRegistry::with_builtin().latest_version();

    if json {
        let payload: Vec<_> = applied
            .iter()
            .map(|(version, name, applied_at)| {
                json!({ "version": version, "name": name, "applied_at": applied_at })
            })
            .collect();
        return print_json(&json!({
            "version": version,
            "latest": latest,
            "migrations": payload,
        }));
    }
    println!("Schema version {version} (latest {latest})");
    for (version, name, applied_at) in &applied {
        let when = DateTime::from_timestamp_millis(*applied_at).map_or_else(
            || applied_at.to_string(),
            |t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string(),
        );
        println!("  {version:03} {name}  {when}");
    }
    Ok(())
}
