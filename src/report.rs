//! Report output: colored summary or JSON

use anyhow::{Context, Result};
use colored::Colorize;

use crate::utils::config::LIST_THRESHOLD;
use crate::{Outcome, PipelineReport};

/// One-line outcome, e.g. `Completed` or `Cancelled (deadline elapsed)`.
pub fn outcome_label(outcome: &Outcome) -> String {
    match outcome {
        Outcome::Completed => "Completed".to_string(),
        Outcome::Cancelled(reason) => format!("Cancelled ({})", reason),
    }
}

/// Print the report to stdout.
pub fn print_report(report: &PipelineReport, json: bool) -> Result<()> {
    if json {
        let s = serde_json::to_string_pretty(report).context("serialize report")?;
        println!("{}", s);
        return Ok(());
    }

    let label = outcome_label(&report.outcome);
    let label = if report.outcome.is_completed() {
        label.green()
    } else {
        label.yellow()
    };
    println!(
        "{} | {} | {} | {}",
        label,
        format!("Results: {}", report.results.len()).cyan(),
        format!("Ranges sent: {}", report.ranges_sent),
        format!("{} ms", report.elapsed_ms).dimmed()
    );

    let sorted = report.sorted_results();
    if sorted.is_empty() {
        println!("No results.");
    } else if sorted.len() > LIST_THRESHOLD {
        println!(
            "{} results (first {}): {}",
            sorted.len(),
            LIST_THRESHOLD,
            join_items(&sorted[..LIST_THRESHOLD])
        );
    } else {
        println!("{}", join_items(&sorted));
    }

    if !report.failed_items.is_empty() {
        println!(
            "{}",
            format!("Failed items: {}", report.failed_items.len()).red()
        );
    }
    Ok(())
}

fn join_items(items: &[i64]) -> String {
    items
        .iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
