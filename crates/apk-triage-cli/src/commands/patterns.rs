//! Patterns command implementation

use anyhow::{Context, Result};
use apk_triage_core::patterns::PatternRegistry;
use apk_triage_core::Confidence;
use colored::Colorize;
use std::path::PathBuf;

/// Run the patterns command
pub fn run(file: Option<PathBuf>, details: bool) -> Result<()> {
    let (registry, origin) = match file {
        Some(path) => (
            PatternRegistry::load(&path)
                .with_context(|| format!("Failed to load patterns from {}", path.display()))?,
            path.display().to_string(),
        ),
        None => (PatternRegistry::builtin(), "built-in".to_string()),
    };

    println!();
    println!("{}", "Detection Patterns".bold().underline());
    println!();

    for group in registry.iter() {
        println!("{} [{}]", group.name.bold(), format_confidence(group.confidence));
        if details {
            for regex in &group.regexes {
                println!("    {}", regex.as_str().dimmed());
            }
            println!();
        }
    }

    println!();
    println!("Total patterns loaded: {} ({})", registry.len(), origin);
    Ok(())
}

fn format_confidence(confidence: Confidence) -> String {
    match confidence {
        Confidence::High => "high".green().bold().to_string(),
        Confidence::Medium => "medium".cyan().to_string(),
        Confidence::Low => "low".dimmed().to_string(),
    }
}
