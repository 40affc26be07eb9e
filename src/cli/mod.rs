//! CLI definitions using clap.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::storage::ListsOrder;

pub mod commands;

/// Listago - lists, trash and archive import/export
#[derive(Parser, Debug)]
#[command(name = "listago", author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Database path (default: platform data dir, listago/main.db)
    #[arg(long, global = true, env = "LISTAGO_DB")]
    pub db: Option<PathBuf>,

    /// Cache directory for export/import scratch files
    #[arg(long, global = true, env = "LISTAGO_CACHE")]
    pub cache_dir: Option<PathBuf>,

    /// Directory finished export archives are copied to
    #[arg(long, global = true, env = "LISTAGO_DOCUMENTS")]
    pub documents_dir: Option<PathBuf>,

    /// Preferences file
    #[arg(long, global = true, env = "LISTAGO_PREFS")]
    pub prefs: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Increase logging verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (no output except errors)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show lists
    Lists(ListsArgs),

    /// Create a list with items
    Add(AddArgs),

    /// Move lists to trash
    Trash {
        /// List IDs
        ids: Vec<i64>,

        /// Trash every active list
        #[arg(long, conflicts_with = "ids")]
        all: bool,
    },

    /// Restore lists from trash
    Restore {
        /// List IDs
        ids: Vec<i64>,

        /// Restore every trashed list
        #[arg(long, conflicts_with = "ids")]
        all: bool,
    },

    /// Permanently delete lists and their items
    Delete {
        /// List IDs
        ids: Vec<i64>,

        /// Delete every list of the partition
        #[arg(long, conflicts_with = "ids")]
        all: bool,

        /// Delete active lists instead of trashed ones
        #[arg(long)]
        active: bool,
    },

    /// Listitem operations
    Items {
        #[command(subcommand)]
        command: ItemCommands,
    },

    /// Apply the trash retention policy
    Cleanup {
        /// Purge trash older than this many days (default: TrashKeepinStock)
        #[arg(long)]
        older_than_days: Option<u64>,

        /// Keep at most this many trashed lists (and items per list)
        #[arg(long)]
        max_count: Option<usize>,
    },

    /// Show list and item counts
    Stats,

    /// Export lists, trash and settings into an archive
    Export(ExportArgs),

    /// Import an archive or unpacked archive directory
    Import(ImportArgs),

    /// Show applied schema migrations
    Migrations,

    /// Print version information
    Version,
}

#[derive(Args, Debug)]
pub struct ListsArgs {
    /// Show trashed lists
    #[arg(long)]
    pub trash: bool,

    /// Show items, not only their count
    #[arg(long)]
    pub items: bool,

    /// Order by: created, modified, deleted, order
    #[arg(long, default_value = "order")]
    pub order_by: ListsOrder,

    /// Descending order
    #[arg(long)]
    pub desc: bool,
}

#[derive(Args, Debug)]
pub struct AddArgs {
    /// List name
    pub name: String,

    /// Items to add, in order
    pub items: Vec<String>,

    /// Items to add locked
    #[arg(long = "locked")]
    pub locked: Vec<String>,

    /// Order of the new list (default: after the last list)
    #[arg(long)]
    pub order: Option<i64>,
}

#[derive(Subcommand, Debug)]
pub enum ItemCommands {
    /// Show the items of a list
    List {
        /// List ID
        list_id: i64,

        /// Show trashed items
        #[arg(long)]
        trash: bool,
    },

    /// Move items to trash
    Trash {
        /// List ID
        list_id: i64,

        /// Item IDs (default: all)
        ids: Vec<i64>,

        /// Include locked items
        #[arg(long)]
        force: bool,
    },

    /// Restore trashed items to the end of their list
    Restore {
        /// List ID
        list_id: i64,

        /// Item IDs (default: all)
        ids: Vec<i64>,
    },

    /// Permanently delete items
    Delete {
        /// List ID
        list_id: i64,

        /// Item IDs (default: all of the partition)
        ids: Vec<i64>,

        /// Delete active items instead of trashed ones
        #[arg(long)]
        active: bool,

        /// Include locked items
        #[arg(long)]
        force: bool,
    },
}

#[derive(Args, Debug)]
pub struct ExportArgs {
    /// Export active lists
    #[arg(long)]
    pub lists: bool,

    /// Export trash
    #[arg(long)]
    pub trash: bool,

    /// Export settings
    #[arg(long)]
    pub settings: bool,
}

impl ExportArgs {
    /// Selected classes; nothing selected means everything.
    #[must_use]
    pub fn selection(&self) -> (bool, bool, bool) {
        if self.lists || self.trash || self.settings {
            (self.lists, self.trash, self.settings)
        } else {
            (true, true, true)
        }
    }
}

#[derive(Args, Debug)]
pub struct ImportArgs {
    /// Zip archive or unpacked archive directory
    pub path: PathBuf,

    /// Import active lists
    #[arg(long)]
    pub lists: bool,

    /// Import trash
    #[arg(long)]
    pub trash: bool,

    /// Import settings
    #[arg(long)]
    pub settings: bool,

    /// Only report what the archive contains
    #[arg(long)]
    pub analyse: bool,
}

impl ImportArgs {
    /// Selected classes; nothing selected means everything present.
    #[must_use]
    pub fn selection(&self) -> (bool, bool, bool) {
        if self.lists || self.trash || self.settings {
            (self.lists, self.trash, self.settings)
        } else {
            (true, true, true)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_export_selection_defaults_to_all() {
        let cli = Cli::parse_from(["listago", "export"]);
        let Commands::Export(args) = cli.command else {
            panic!("expected export");
        };
        assert_eq!(args.selection(), (true, true, true));

        let cli = Cli::parse_from(["listago", "export", "--trash"]);
        let Commands::Export(args) = cli.command else {
            panic!("expected export");
        };
        assert_eq!(args.selection(), (false, true, false));
    }

    #[test]
    fn test_lists_order_parses() {
        let cli = Cli::parse_from(["listago", "lists", "--order-by", "modified", "--desc"]);
        let Commands::Lists(args) = cli.command else {
            panic!("expected lists");
        };
        assert_eq!(args.order_by, ListsOrder::Modified);
        assert!(args.desc);
        assert!(Cli::try_parse_from(["listago", "lists", "--order-by", "name"]).is_err());
    }
}
