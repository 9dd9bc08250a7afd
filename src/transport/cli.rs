//! Terminal commands: config init, device-flow login, logout, and provider listings

use super::http::AppState;
use crate::config::Config;
use crate::llm::auth::PollResult;
use anyhow::Result;
use colored::Colorize;
use std::path::Path;

/// Write the effective configuration to `path` so it can be edited
pub fn run_init(config: Config, path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }
    config.save_to(path)?;
    tracing::info!("Wrote config to {}", path.display());
    println!("{} Wrote {}", "✓".green(), path.display());
    Ok(())
}

/// Run the Copilot device flow interactively
pub async fn run_auth(config: Config) -> Result<()> {
    let state = AppState::from_config(config)?;

    println!("{}", "=== LLM Council Authentication ===".bold().cyan());
    println!();

    if state.auth.is_authenticated() {
        println!("{} A GitHub Copilot token is already stored.", "✓".green());
        println!("Run {} first to replace it.", "council logout".bold());
        return Ok(());
    }

    let device = state.auth.request_device_code().await?;

    println!("1. Open {}", device.verification_uri.underline());
    println!("2. Enter the code {}", device.user_code.bold().yellow());
    println!();
    println!(
        "Waiting for authorization (code expires in {} minutes)...",
        device.expires_in / 60
    );

    let copilot = &state.config.copilot;
    let interval = copilot.poll_interval().max(std::time::Duration::from_secs(device.interval));
    let result = state
        .auth
        .poll_for_access_token(&device.device_code, interval, copilot.poll_max_attempts)
        .await?;

    println!();
    match result {
        PollResult::Authorized => {
            println!("{} {}", "✓".green(), result.message());
            println!("Council models routed to Copilot are now available.");
        }
        _ => {
            println!("{} {}", "✗".red(), result.message());
            println!("Run {} to try again.", "council auth".bold());
        }
    }
    Ok(())
}

pub async fn run_logout(config: Config) -> Result<()> {
    let state = AppState::from_config(config)?;
    state.auth.logout().await?;
    println!("{} Logged out of GitHub Copilot", "✓".green());
    Ok(())
}

/// Registered providers with availability
pub fn run_status(config: Config) -> Result<()> {
    let state = AppState::from_config(config)?;

    println!("{}", "=== Providers ===".bold().cyan());
    for name in state.registry.list_providers() {
        let Some(provider) = state.registry.get(&name) else {
            continue;
        };
        let availability = if provider.is_available() {
            "available".green()
        } else {
            "not configured".red()
        };
        println!(
            "  {:<12} {:<16} {} models",
            name.bold(),
            availability,
            provider.supported_models().len()
        );
    }

    println!();
    println!("{}", "=== Council ===".bold().cyan());
    let council = &state.config.council;
    for model in &council.models {
        println!("  {}", model);
    }
    println!("  chairman: {}", council.chairman_model.bold());
    Ok(())
}

/// Model catalogue of the available providers
pub fn run_models(config: Config) -> Result<()> {
    let state = AppState::from_config(config)?;
    let models = state.registry.available_models();

    if models.is_empty() {
        println!("No providers are available.");
        println!(
            "Run {} or set {}.",
            "council auth".bold(),
            "OPENROUTER_API_KEY".bold()
        );
        return Ok(());
    }

    for model in models {
        println!("{:<40} {}", model.id, model.provider.dimmed());
    }
    Ok(())
}
