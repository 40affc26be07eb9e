//! Version command implementation.

use serde_json::json;

use crate::cli::commands::print_json;
use crate::error::Result;
use crate::storage::MigrationRegistry;
use crate::transfer::ContentClass;
use crate::transfer::types::CURRENT_REVISION;

/// Print the crate version together with the schema version this build
/// migrates to and the archive model revision it writes.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn execute(json: bool) -> Result<()> {
    let schema = MigrationRegistry::with_builtin().latest_version();
    let content: Vec<_> = ContentClass::ALL.iter().map(ContentClass::as_str).collect();

    if json {
        return print_json(&json!({
            "version": env!("CARGO_PKG_VERSION"),
            "schema": schema,
            "model_revision": CURRENT_REVISION,
            "archive_content": content,
        }));
    }
    println!("listago {}", env!("CARGO_PKG_VERSION"));
    println!("  schema version:  {schema}");
    println!("  model revision:  {CURRENT_REVISION}");
    println!("  archive content: {}", content.join(", "));
    Ok(())
}
