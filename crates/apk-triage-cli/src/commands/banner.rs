//! CLI banner and shared UI helpers

use apk_triage_core::Severity;
use colored::Colorize;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Print the main banner
pub fn print_banner() {
    println!();
    println!("{}", "╔═║╔═║║ ║  ══╔╝╔═║║╔═║╔═╝╔═╝".green());
    println!("{}", "╔═║╔═╝╔╝ ═╝  ║ ╔╔╝║╔═║║ ║╔═╝".green());
    println!("{}", "╝ ╝╝  ╝ ╝    ╝ ╝ ╝╝╝ ╝══╝══╝".green());
    println!();
    println!("  {} v{}", "APK Triage".white().bold(), VERSION);
    println!();
}

/// Print a compact header for subcommands
pub fn print_header(title: &str) {
    println!();
    println!("{} {}", "APK Triage".green().bold(), format!("| {}", title).dimmed());
    println!("{}", "=".repeat(60).dimmed());
}

/// Print a section divider
pub fn print_divider() {
    println!("{}", "-".repeat(60).dimmed());
}

/// Colored severity badge
pub fn severity_badge(severity: &Severity) -> String {
    match severity {
        Severity::Critical => format!("{}", " CRITICAL ".on_red().white().bold()),
        Severity::High => format!("{}", " HIGH ".on_yellow().black().bold()),
        Severity::Medium => format!("{}", " MEDIUM ".on_cyan().black()),
        Severity::Low => format!("{}", " LOW ".on_white().black()),
        Severity::Info => format!("{}", " INFO ".dimmed()),
    }
}

pub fn status_ok() -> String {
    format!("{}", "[OK]".green().bold())
}

pub fn status_warn() -> String {
    format!("{}", "[WARN]".yellow().bold())
}

pub fn status_fail() -> String {
    format!("{}", "[FAIL]".red().bold())
}
