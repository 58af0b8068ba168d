//! Scan history command.

use console::style;

use mailsort::config::Settings;
use mailsort::extract::ScanStatus;
use mailsort::repository::{ScanStore, SqliteScanStore};

use super::super::helpers::truncate;

/// List recent scans.
pub async fn cmd_history(settings: &Settings, limit: usize, json: bool) -> anyhow::Result<()> {
    let db_path = settings.database_path();
    if !db_path.exists() {
        println!(
            "{} No scan history yet at {}",
            style("!").yellow(),
            db_path.display()
        );
        return Ok(());
    }

    let store = SqliteScanStore::new(&db_path)?;
    let rows = tokio::task::spawn_blocking(move || store.recent(limit)).await??;

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    if rows.is_empty() {
        println!("{} No scans recorded", style("!").yellow());
        return Ok(());
    }

    println!("\n{}", style("Recent Scans").bold());
    println!("{}", "-".repeat(90));
    println!(
        "{:<6} {:<17} {:<12} {:<22} {:<10} {:<14} Conf",
        "ID", "When", "Provider", "Recipient", "Postal", "Center"
    );
    println!("{}", "-".repeat(90));

    for row in rows {
        let scan = &row.scan;
        let confidence = match scan.status {
            ScanStatus::Extracted => style(format!("{}%", scan.record.confidence)).green(),
            ScanStatus::NeedsReview => style(format!("{}%", scan.record.confidence)).yellow(),
        };
        println!(
            "{:<6} {:<17} {:<12} {:<22} {:<10} {:<14} {}",
            row.id,
            scan.created_at.format("%Y-%m-%d %H:%M"),
            scan.provider.as_str(),
            truncate(&scan.record.recipient, 21),
            truncate(&scan.record.postal_code, 9),
            truncate(&scan.record.sorting_center_id, 13),
            confidence
        );
    }

    Ok(())
}
