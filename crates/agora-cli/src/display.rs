//! Terminal output helpers

use agora_types::OrderResult;
use colored::Colorize;

pub fn section(title: &str) {
    println!();
    println!("{}", title.bold().cyan());
    println!("{}", "─".repeat(title.chars().count()).dimmed());
}

pub fn success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

pub fn failure(message: &str) {
    println!("{} {}", "✗".red().bold(), message);
}

pub fn info(message: &str) {
    println!("{} {}", "•".blue(), message);
}

pub fn kv(key: &str, value: &str) {
    println!("  {:<22} {}", format!("{}:", key).dimmed(), value);
}

/// One line per finished order
pub fn order_result(label: &str, result: &OrderResult) {
    let agreement = format!("0x{}", result.service_agreement_id);
    if result.access_granted {
        success(&format!("{} granted  {}", label, agreement.dimmed()));
    } else if result.refund {
        println!("{} {} refunded  {}", "↺".yellow().bold(), label, agreement.dimmed());
    } else {
        failure(&format!("{} denied  {}", label, agreement.dimmed()));
    }
}
