use std::path::Path;

use anyhow::{Context, Result};

use doze_core::csv_import::{export_csv, import_csv};
use doze_core::db::Database;
use doze_core::models::User;

pub(crate) fn cmd_import(db: &Database, user: &User, path: &Path, json: bool) -> Result<()> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read file: {}", path.display()))?;

    let outcome = import_csv(db, user.id, &text)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }

    println!("Import complete.\n");
    println!("  Inserted:           {}", outcome.inserted);
    println!("  Skipped (duplicate): {}", outcome.skipped);
    println!("  Errors:             {}", outcome.errors);
    for message in &outcome.messages {
        eprintln!("  ! {message}");
    }
    Ok(())
}

pub(crate) fn cmd_export(
    db: &Database,
    user: &User,
    out: Option<&Path>,
    json: bool,
) -> Result<()> {
    let logs = db.list_logs_ordered(user.id)?;
    let csv = export_csv(&logs)?;

    match out {
        Some(path) => {
            std::fs::write(path, &csv)
                .with_context(|| format!("Failed to write file: {}", path.display()))?;
            if json {
                println!(
                    "{}",
                    serde_json::json!({ "records": logs.len(), "path": path.display().to_string() })
                );
            } else {
                println!("Exported {} records to {}", logs.len(), path.display());
            }
        }
        None => print!("{csv}"),
    }
    Ok(())
}
