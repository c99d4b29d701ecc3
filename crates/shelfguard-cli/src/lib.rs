//! Output helpers for the `shelfguard` operator CLI.

use clap::ValueEnum;
use serde::Serialize;
use shelfguard_core::{DiskStatus, ManifestEntry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
}

/// Print `value` as pretty JSON.
pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Human-readable byte count, e.g. `1.50 GiB`.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.2} {}", value, UNITS[unit])
    }
}

/// Truncate a string to max_len characters, appending "..." if truncated.
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

pub fn print_status_table(status: &DiskStatus) {
    println!("\n=== Quarantine Status ===\n");
    println!(
        "Disk:        {} free of {} ({:.2}%)",
        format_bytes(status.disk.free_bytes),
        format_bytes(status.disk.total_bytes),
        status.free_percent
    );
    let cap = if status.quarantine.max_bytes == 0 {
        "unlimited".to_string()
    } else {
        format_bytes(status.quarantine.max_bytes)
    };
    println!(
        "Quarantine:  {} of {} ({:.1}%)",
        format_bytes(status.quarantine.total_bytes),
        cap,
        status.quarantine.percent_used
    );
    println!(
        "Protection:  {}",
        if status.protection.enabled { "enabled" } else { "disabled" }
    );

    println!("\n--- By Status ---");
    for (state, count) in &status.counts_by_status {
        println!("  {:<22} {:>8}", state.as_str(), count);
    }

    if !status.warnings.is_empty() {
        println!("\n--- Warnings ---");
        for warning in &status.warnings {
            println!("  {}", warning);
        }
    }
    println!();
}

pub fn print_manifest_table(entries: &[ManifestEntry]) {
    println!(
        "{:<20} {:<36} {:<10} {:>10}  {:<30} {}",
        "TIMESTAMP", "UPLOAD ID", "ACTION", "SIZE", "FILENAME", "DESTINATION / REASON"
    );
    for entry in entries {
        let detail = entry
            .destination_path
            .as_ref()
            .map(|p| p.display().to_string())
            .or_else(|| entry.reason.clone())
            .unwrap_or_default();
        println!(
            "{:<20} {:<36} {:<10} {:>10}  {:<30} {}",
            entry.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
            entry.upload_id,
            entry.action.to_string(),
            format_bytes(entry.size_bytes),
            truncate_string(&entry.original_filename, 30),
            detail
        );
    }
}
