//! Version command implementation

use apk_triage_core::ScanConfig;
use colored::Colorize;
use std::path::Path;

use super::banner;

/// Run the version command
pub fn run(config: &ScanConfig) {
    banner::print_banner();

    println!("{}", "Components:".white().bold());
    println!("  CLI:     v{}", env!("CARGO_PKG_VERSION"));
    println!("  Core:    v{}", apk_triage_core::VERSION);
    println!();

    println!("{}", "Capabilities:".white().bold());
    println!("  {} Content-addressed decompilation cache", "-".dimmed());
    println!("  {} Sensitive string pattern scan", "-".dimmed());
    println!("  {} Task hijacking detection", "-".dimmed());
    println!("  {} Insecure storage detection", "-".dimmed());
    println!("  {} Certificate pinning check", "-".dimmed());
    println!("  {} Debug mode detection", "-".dimmed());
    println!("  {} Janus signature check (opt-in)", "-".dimmed());
    println!();

    println!("{}", "External tools:".white().bold());
    print_tool("jadx", &config.tools.jadx);
    print_tool("apkeep", &config.tools.apkeep);
    print_tool("apk-mitm", &config.tools.apk_mitm);
    println!();

    println!("{} {}", "Cache:".dimmed(), config.cache.directory.display());
    println!();
}

fn print_tool(name: &str, program: &Path) {
    let status = if resolves(program) {
        banner::status_ok()
    } else {
        banner::status_warn()
    };
    println!("  {} {:<9} {}", status, name, program.display().to_string().dimmed());
}

/// Whether `program` exists as given or on PATH
fn resolves(program: &Path) -> bool {
    if program.components().count() > 1 {
        return program.is_file();
    }
    std::env::var_os("PATH")
        .map(|paths| std::env::split_paths(&paths).any(|dir| dir.join(program).is_file()))
        .unwrap_or(false)
}
