//! List and listitem command implementations.

use chrono::{DateTime, Local};
use colored::Colorize;
use serde_json::json;

use crate::cli::commands::{Paths, print_json};
use crate::cli::{AddArgs, ItemCommands, ListsArgs};
use crate::error::{Error, Result};
use crate::model::{List, Listitem};
use crate::storage::{ItemsOrder, ListsQuery, ListsRepository, OrderDirection, TrashFilter};

fn format_time(ms: i64) -> String {
    DateTime::from_timestamp_millis(ms).map_or_else(
        || ms.to_string(),
        |t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string(),
    )
}

fn item_json(item: &Listitem) -> serde_json::Value {
    json!({
        "id": item.id().raw(),
        "item": item.item(),
        "note": item.note(),
        "order": item.order(),
        "hidden": item.hidden(),
        "locked": item.locked(),
        "created": item.created(),
        "modified": item.modified(),
        "deleted": item.deleted(),
    })
}

fn list_json(list: &List, with_items: bool) -> serde_json::Value {
    let mut value = json!({
        "id": list.id().raw(),
        "name": list.name(),
        "order": list.order(),
        "created": list.created(),
        "modified": list.modified(),
        "deleted": list.deleted(),
        "item_count": list.item_count(),
        "reset": list.reset(),
        "sync_devices": list.sync_devices(),
    });
    if with_items {
        value["items"] = list.items().iter().map(item_json).collect();
    }
    value
}

fn print_item(item: &Listitem) {
    let marker = if item.locked() { "*".yellow() } else { " ".normal() };
    let text = if item.hidden() {
        item.item().dimmed()
    } else {
        item.item().normal()
    };
    println!("    {marker} {} {text}", format!("[{}]", item.id()).dimmed());
    if let Some(note) = item.note() {
        println!("        {}", note.dimmed());
    }
}

/// Execute the lists command.
///
/// # Errors
///
/// Returns an error if the database cannot be read.
pub async fn execute_lists(args: &ListsArgs, paths: &Paths, json: bool) -> Result<()> {
    let repo = paths.repository().await?;
    let lists = repo
        .query_lists(ListsQuery {
            peek: !args.items,
            trash: args.trash,
            order_by: args.order_by,
            order_dir: if args.desc {
                OrderDirection::Desc
            } else {
                OrderDirection::Asc
            },
        })
        .await?;

    if json {
        let payload: Vec<_> = lists.iter().map(|l| list_json(l, args.items)).collect();
        return print_json(&json!({ "lists": payload, "count": lists.len() }));
    }

    if lists.is_empty() {
        println!("{}", if args.trash { "Trash is empty." } else { "No lists." });
        return Ok(());
    }
    for list in &lists {
        let when = list.deleted().map_or_else(
            || format!("modified {}", format_time(list.modified())),
            |d| format!("deleted {}", format_time(d)),
        );
        println!(
            "{} {} {} {}",
            format!("[{}]", list.id()).dimmed(),
            list.name().bold(),
            format!("({} items)", list.item_count()).dimmed(),
            when.dimmed()
        );
        for item in list.items() {
            print_item(item);
        }
    }
    Ok(())
}

/// Execute the add command.
///
/// # Errors
///
/// Returns an error if the name is empty or the list cannot be stored.
pub async fn execute_add(args: &AddArgs, paths: &Paths, json: bool) -> Result<()> {
    if args.name.trim().is_empty() {
        return Err(Error::InvalidArgument("List name must not be empty".to_string()));
    }
    let repo = paths.repository().await?;
    let order = match args.order {
        Some(order) => order,
        None => repo.next_list_order().await?,
    };

    let mut list = List::new(args.name.trim(), order);
    for text in &args.items {
        let item = Listitem::new(text.as_str(), list.next_item_order());
        list.add_item(item);
    }
    for text in &args.locked {
        let mut item = Listitem::new(text.as_str(), list.next_item_order());
        item.set_locked(true);
        list.add_item(item);
    }
    let id = repo
        .store_list(&mut list, true)
        .await?
        .ok_or_else(|| Error::Other("List was not stored".to_string()))?;

    if json {
        return print_json(&json!({ "success": true, "list": list_json(&list, true) }));
    }
    println!(
        "Created list {} {} with {} item(s)",
        format!("[{id}]").dimmed(),
        list.name().bold(),
        list.items().len()
    );
    Ok(())
}

fn require_ids(ids: &[i64], all: bool, what: &str) -> Result<()> {
    if ids.is_empty() && !all {
        return Err(Error::InvalidArgument(format!(
            "Pass the IDs of the lists to {what}, or --all"
        )));
    }
    Ok(())
}

/// Execute the trash command.
///
/// # Errors
///
/// Returns an error if no IDs were given or the database cannot be
/// updated.
pub async fn execute_trash(ids: &[i64], all: bool, paths: &Paths, json: bool) -> Result<()> {
    require_ids(ids, all, "trash")?;
    let repo = paths.repository().await?;
    let moved = repo.move_lists_to_trash(ids).await?;
    report(json, "trashed", moved, "list(s) moved to trash")
}

/// Execute the restore command.
///
/// # Errors
///
/// Returns an error if no IDs were given or the database cannot be
/// updated.
pub async fn execute_restore(ids: &[i64], all: bool, paths: &Paths, json: bool) -> Result<()> {
    require_ids(ids, all, "restore")?;
    let repo = paths.repository().await?;
    let restored = repo.restore_lists_from_trash(ids).await?;
    report(json, "restored", restored, "list(s) restored")
}

/// Execute the delete command.
///
/// # Errors
///
/// Returns an error if no IDs were given or the database cannot be
/// updated.
pub async fn execute_delete(
    ids: &[i64],
    all: bool,
    active: bool,
    paths: &Paths,
    json: bool,
) -> Result<()> {
    require_ids(ids, all, "delete")?;
    let repo = paths.repository().await?;
    let filter = if active {
        TrashFilter::Active
    } else {
        TrashFilter::Trashed
    };
    let deleted = repo.delete_lists(ids, filter).await?;

    if json {
        return print_json(&json!({ "success": true, "deleted": deleted }));
    }
    println!(
        "Deleted {} list(s) and {} item(s)",
        deleted.lists, deleted.items
    );
    Ok(())
}

/// Execute listitem commands.
///
/// # Errors
///
/// Returns an error if the list does not exist or the database cannot be
/// read or updated.
pub async fn execute_items(command: &ItemCommands, paths: &Paths, json: bool) -> Result<()> {
    let repo = paths.repository().await?;
    match command {
        ItemCommands::List { list_id, trash } => show_items(&repo, *list_id, *trash, json).await,
        ItemCommands::Trash { list_id, ids, force } => {
            let moved = repo.move_listitems_to_trash(*list_id, ids, *force).await?;
            report(json, "trashed", moved, "item(s) moved to trash")
        }
        ItemCommands::Restore { list_id, ids } => {
            let restored = repo.restore_listitems_from_trash(*list_id, ids).await?;
            report(json, "restored", restored, "item(s) restored")
        }
        ItemCommands::Delete {
            list_id,
            ids,
            active,
            force,
        } => {
            let deleted = repo.delete_listitems(*list_id, ids, !*active, *force).await?;
            report(json, "deleted", deleted, "item(s) deleted")
        }
    }
}

async fn show_items(repo: &ListsRepository, list_id: i64, trash: bool, json: bool) -> Result<()> {
    let items = repo
        .query_listitems(list_id, trash, ItemsOrder::default())
        .await?;
    if items.is_empty() && repo.query_list(list_id, ItemsOrder::default()).await?.is_none() {
        // the list may be in trash; its items are still readable
        let trashed = repo
            .query_lists(ListsQuery {
                trash: true,
                ..ListsQuery::default()
            })
            .await?;
        if !trashed.iter().any(|l| l.id().raw() == list_id) {
            return Err(Error::ListNotFound { id: list_id });
        }
    }

    if json {
        let payload: Vec<_> = items.iter().map(item_json).collect();
        return print_json(&json!({ "list_id": list_id, "items": payload, "count": items.len() }));
    }
    if items.is_empty() {
        println!("No items.");
    }
    for item in &items {
        print_item(item);
    }
    Ok(())
}

fn report(json: bool, key: &str, count: usize, message: &str) -> Result<()> {
    if json {
        let mut value = json!({ "success": true });
        value[key] = json!(count);
        return print_json(&value);
    }
    println!("{count} {message}");
    Ok(())
}
