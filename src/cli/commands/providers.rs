//! Provider status command.

use console::style;

use mailsort::config::Settings;
use mailsort::extract::ExtractionOrchestrator;

/// Show which providers are usable and the fallback order.
pub async fn cmd_providers(settings: &Settings) -> anyhow::Result<()> {
    let orchestrator = ExtractionOrchestrator::from_settings(settings)?;
    let credentials = orchestrator.credentials();

    println!("\n{}", style("Vision Providers").bold());
    println!("{}", "-".repeat(60));

    for adapter in orchestrator.adapters() {
        let id = adapter.id();
        if credentials.has(id) {
            println!("{} {:<12} {}", style("✓").green(), id, style("available").dim());
        } else {
            println!(
                "{} {:<12} {}",
                style("✗").red(),
                id,
                style(adapter.availability_hint()).dim()
            );
        }
    }

    let order: Vec<&str> = orchestrator.policy().order().iter().map(|id| id.as_str()).collect();
    println!("{}", "-".repeat(60));
    println!("{:<14} {}", "Fallback order:", order.join(" -> "));
    println!("{:<14} {}", "Max hops:", orchestrator.policy().max_hops());
    println!("{:<14} {}s", "Timeout:", settings.providers.timeout_secs);

    if credentials.is_empty() {
        println!(
            "\n{} No provider is configured. Set GEMINI_API_KEY, HF_TOKEN or OCR_SERVICE_URL.",
            style("!").yellow()
        );
    }

    Ok(())
}
