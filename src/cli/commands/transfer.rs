//! Export and import command implementations.

use colored::Colorize;
use serde::Serialize;
use serde_json::json;
use tracing::warn;

use crate::cli::commands::{Paths, print_json};
use crate::cli::{ExportArgs, ImportArgs};
use crate::error::{Error, Result};
use crate::transfer::{
    ContentClass, Exporter, Importer, ProgressListener, SettingsEffects, SettingsReport,
};

/// Counters of one export or import step.
#[derive(Debug, Clone, Serialize)]
struct StepReport {
    class: &'static str,
    total: usize,
    success: usize,
    failed: usize,
}

impl StepReport {
    fn new(class: ContentClass, listener: &ProgressListener) -> Self {
        Self {
            class: class.as_str(),
            total: listener.total(),
            success: listener.success(),
            failed: listener.failed(),
        }
    }
}

fn print_steps(steps: &[StepReport]) {
    for step in steps {
        let failed = if step.failed > 0 {
            format!(", {} failed", step.failed).red().to_string()
        } else {
            String::new()
        };
        println!(
            "  {:<9} {}/{}{failed}",
            step.class, step.success, step.total
        );
    }
}

/// Execute the export command.
///
/// # Errors
///
/// Returns an error if the database cannot be read or the archive cannot
/// be written. The working directory is removed either way.
pub async fn execute_export(args: &ExportArgs, paths: &Paths, json: bool) -> Result<()> {
    let (lists, trash, settings) = args.selection();
    let repo = paths.repository().await?;
    let mut exporter = Exporter::new(repo, &paths.cache, &paths.documents);

    let result = run_export(&mut exporter, paths, lists, trash, settings).await;
    if result.is_err() {
        if let Err(e) = exporter.stop() {
            warn!(error = %e, "Could not stop exporter");
        }
    }
    let (archive, steps) = result?;

    if json {
        return print_json(&json!({
            "success": true,
            "archive": archive.display().to_string(),
            "steps": steps,
        }));
    }
    println!("Exported to {}", archive.display().to_string().bold());
    print_steps(&steps);
    Ok(())
}

async fn run_export(
    exporter: &mut Exporter,
    paths: &Paths,
    lists: bool,
    trash: bool,
    settings: bool,
) -> Result<(std::path::PathBuf, Vec<StepReport>)> {
    exporter.initialize()?;
    let mut steps = Vec::new();
    let mut listener = ProgressListener::new();

    if lists {
        exporter.export_lists(&mut listener).await?;
        steps.push(StepReport::new(ContentClass::Lists, &listener));
    }
    if trash {
        exporter.export_trash(&mut listener).await?;
        steps.push(StepReport::new(ContentClass::Trash, &listener));
    }
    if settings {
        let prefs = paths.preferences()?;
        exporter.export_settings(&prefs, &mut listener)?;
        steps.push(StepReport::new(ContentClass::Settings, &listener));
    }
    let archive = exporter.finalize()?;
    Ok((archive, steps))
}

/// Execute the import command.
///
/// With `--analyse` only the content classes found in the archive are
/// reported. An archive without any of them is an error either way.
///
/// # Errors
///
/// Returns an error if the archive cannot be opened or contains nothing
/// to import, or the database cannot be written.
pub async fn execute_import(args: &ImportArgs, paths: &Paths, json: bool) -> Result<()> {
    let repo = paths.repository().await?;
    let mut importer = Importer::new(repo, &paths.cache);

    let result = run_import(&mut importer, args, paths).await;
    if let Err(e) = importer.clean_up() {
        warn!(error = %e, "Could not remove import scratch directory");
    }
    let outcome = result?;

    if json {
        return print_json(&json!({
            "success": true,
            "found": outcome.found.iter().map(ContentClass::as_str).collect::<Vec<_>>(),
            "steps": outcome.steps,
            "settings": outcome.settings,
        }));
    }
    let found: Vec<_> = outcome.found.iter().map(ContentClass::as_str).collect();
    println!("Archive contains: {}", found.join(", ").bold());
    if args.analyse {
        return Ok(());
    }
    print_steps(&outcome.steps);
    if let Some(report) = &outcome.settings {
        if !report.changed.is_empty() {
            println!("  Changed settings: {}", report.changed.join(", "));
        }
        if !report.unknown.is_empty() {
            println!(
                "  {}",
                format!("Unknown settings skipped: {}", report.unknown.join(", ")).yellow()
            );
        }
    }
    Ok(())
}

struct ImportOutcome {
    found: Vec<ContentClass>,
    steps: Vec<StepReport>,
    settings: Option<SettingsReport>,
}

async fn run_import(
    importer: &mut Importer,
    args: &ImportArgs,
    paths: &Paths,
) -> Result<ImportOutcome> {
    importer.initialize(&args.path)?;
    let found = importer.analyse()?;
    if found.is_empty() {
        return Err(Error::InvalidArchive {
            path: args.path.clone(),
            reason: "no lists, trash or settings found".to_string(),
        });
    }
    let mut outcome = ImportOutcome {
        found,
        steps: Vec::new(),
        settings: None,
    };
    if args.analyse {
        return Ok(outcome);
    }

    let (lists, trash, settings) = args.selection();
    let mut listener = ProgressListener::new();
    let mut ran = false;

    if lists && outcome.found.contains(&ContentClass::Lists) {
        importer.import_lists(&mut listener).await?;
        outcome.steps.push(StepReport::new(ContentClass::Lists, &listener));
        ran = true;
    }
    if trash && outcome.found.contains(&ContentClass::Trash) {
        importer.import_trash(&mut listener).await?;
        outcome.steps.push(StepReport::new(ContentClass::Trash, &listener));
        ran = true;
    }
    if settings && outcome.found.contains(&ContentClass::Settings) {
        let mut prefs = paths.preferences()?;
        let report =
            importer.import_settings(&mut prefs, SettingsEffects::default(), &mut listener)?;
        outcome.steps.push(StepReport::new(ContentClass::Settings, &listener));
        outcome.settings = Some(report);
        ran = true;
    }
    if ran {
        importer.finish()?;
    }
    Ok(outcome)
}
