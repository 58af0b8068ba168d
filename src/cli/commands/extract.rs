//! Envelope extraction command.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use console::style;
use url::Url;

use mailsort::config::Settings;
use mailsort::extract::{ExtractOptions, ExtractionOrchestrator, ScanStatus};
use mailsort::providers::ProviderId;
use mailsort::repository::SqliteScanStore;

use super::super::helpers::or_dash;

pub struct ExtractArgs {
    pub image: PathBuf,
    pub provider: Option<ProviderId>,
    pub model: Option<String>,
    pub endpoint: Option<Url>,
    pub timeout: Option<Duration>,
    pub json: bool,
    pub store: bool,
}

/// Extract an address from one image and print it.
pub async fn cmd_extract(settings: &Settings, args: ExtractArgs) -> anyhow::Result<()> {
    let bytes = tokio::fs::read(&args.image)
        .await
        .with_context(|| format!("Failed to read image {}", args.image.display()))?;

    let mut orchestrator = ExtractionOrchestrator::from_settings(settings)?;
    if args.store && settings.store.enabled {
        let db_path = settings.database_path();
        match SqliteScanStore::new(&db_path) {
            Ok(store) => orchestrator = orchestrator.with_store(Arc::new(store)),
            Err(e) => tracing::warn!(
                "Scan history unavailable at {}: {}",
                db_path.display(),
                e
            ),
        }
    }

    let options = ExtractOptions {
        preferred_provider: args.provider,
        model_hint: args.model,
        override_endpoint: args.endpoint,
        timeout: args.timeout,
    };

    let outcome = match orchestrator.extract(bytes, options).await {
        Ok(outcome) => outcome,
        Err(err) => {
            if args.json {
                let output = serde_json::json!({
                    "error": err.kind,
                    "message": err.message(),
                    "attempts": err.attempts,
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            } else {
                println!("{} {}", style("✗").red(), err);
                for attempt in &err.attempts {
                    println!(
                        "  {} {} ({})",
                        style("-").dim(),
                        attempt.provider,
                        attempt
                            .error_kind
                            .map(|kind| kind.as_str())
                            .unwrap_or("ok")
                    );
                }
            }
            std::process::exit(1);
        }
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }

    let record = &outcome.record;
    let marker = match outcome.status {
        ScanStatus::Extracted => style("✓").green(),
        ScanStatus::NeedsReview => style("!").yellow(),
    };
    println!(
        "{} Extracted via {} ({}% confidence, {})",
        marker,
        style(outcome.provider).cyan(),
        record.confidence,
        outcome.status
    );
    println!("{}", "-".repeat(50));
    println!("{:<16} {}", "Recipient:", or_dash(&record.recipient));
    println!("{:<16} {}", "Address:", or_dash(&record.address_line));
    println!("{:<16} {}", "Postal code:", or_dash(&record.postal_code));
    println!("{:<16} {}", "City:", or_dash(&record.city));
    println!(
        "{:<16} {}",
        "Region:",
        or_dash(record.region.as_deref().unwrap_or_default())
    );
    println!("{:<16} {}", "Country:", or_dash(&record.country));
    println!(
        "{:<16} {} {}",
        "Sorting center:",
        or_dash(&record.sorting_center_id),
        style(&record.sorting_center_name).dim()
    );
    println!("{}", "-".repeat(50));
    if outcome.attempts.len() > 1 {
        let chain: Vec<&str> = outcome.attempts.iter().map(|a| a.provider.as_str()).collect();
        println!("{:<16} {}", "Providers:", chain.join(" -> "));
    }
    match outcome.row_id {
        Some(id) => println!("{:<16} #{} ({})", "Stored:", id, outcome.scan_id),
        None => println!("{:<16} {}", "Scan id:", outcome.scan_id),
    }

    Ok(())
}
