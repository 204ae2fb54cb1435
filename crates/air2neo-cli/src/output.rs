//! Terminal output formatting.

use air2neo_core::{GraphCounts, TableDescriptor, Watermark, WatermarkKey};
use air2neo_graph::{PassReport, PassState, RunReport};
use chrono::{DateTime, SecondsFormat, Utc};
use colored::{ColoredString, Colorize};

fn colored_state(state: PassState) -> ColoredString {
    match state {
        PassState::Committed => state.as_str().green(),
        PassState::Skipped | PassState::Idle => state.as_str().dimmed(),
        PassState::Failed => state.as_str().red().bold(),
        PassState::Cancelled => state.as_str().yellow(),
        PassState::Extracting | PassState::Mapping | PassState::Writing => state.as_str().cyan(),
    }
}

fn timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn watermark_cell(watermark: Option<&Watermark>) -> String {
    match watermark {
        Some(w) => timestamp(&w.at),
        None => "-".to_string(),
    }
}

/// Print the outcome of a sync run.
pub fn print_run_report(report: &RunReport) {
    println!();
    let title = if report.dry_run { "Sync Report (dry run)" } else { "Sync Report" };
    println!("{} {}", title.bold(), format!("({})", report.run_id).dimmed());
    println!("{}", "─".repeat(86));
    println!(
        "{:<24} {:<11} {:<10} {:>6} {:>8} {:>7}  {}",
        "Table", "Kind", "State", "Read", "Written", "Batches", "Watermark"
    );

    for pass in report.passes() {
        print_pass_row(pass);
    }

    println!("{}", "─".repeat(86));
    let elapsed = report.finished_at - report.started_at;
    println!(
        "  {} {}  {} {:.1}s",
        "Records written:".bold(),
        report.records_written(),
        "Elapsed:".bold(),
        elapsed.num_milliseconds() as f64 / 1000.0
    );

    let failed: Vec<_> = report.failed().collect();
    if !failed.is_empty() {
        println!();
        println!("{}", "Failed passes".red().bold());
        for pass in failed {
            println!(
                "  {} {}/{}: {}",
                "✗".red(),
                pass.table,
                pass.kind,
                pass.error.as_deref().unwrap_or("unknown error")
            );
        }
    }

    let row_errors: Vec<_> = report.row_errors().collect();
    if !row_errors.is_empty() {
        println!();
        println!("{} ({})", "Skipped rows".yellow().bold(), row_errors.len());
        for error in row_errors {
            println!("  {} {}", "•".yellow(), error);
        }
    }

    println!();
    if report.was_cancelled() {
        println!("{}", "Run interrupted; committed batches are kept.".yellow().bold());
    } else if report.is_success() {
        println!("{}", "Sync complete.".green().bold());
    } else {
        println!("{}", "Sync finished with failures.".red().bold());
    }
}

fn print_pass_row(pass: &PassReport) {
    println!(
        "{:<24} {:<11} {:<10} {:>6} {:>8} {:>7}  {}",
        pass.table,
        pass.kind.as_str(),
        colored_state(pass.state),
        pass.rows_read,
        pass.records_written,
        pass.batches_committed,
        watermark_cell(pass.watermark.as_ref()).dimmed()
    );
}

/// Print node and relationship totals after a run.
pub fn print_graph_counts(counts: &GraphCounts) {
    println!(
        "  {} {} nodes, {} relationships",
        "Graph:".bold(),
        counts.nodes,
        counts.relationships
    );
}

/// Print graph totals and per-label node counts.
pub fn print_graph_status(uri: &str, counts: &GraphCounts, labels: &[(String, u64)]) {
    println!("{}", "Graph".bold());
    println!("{}", "─".repeat(40));
    println!("  {} {}", "Neo4j:".bold(), uri.cyan());
    println!("  {} {}", "Nodes:".bold(), counts.nodes);
    println!("  {} {}", "Relationships:".bold(), counts.relationships);

    if !labels.is_empty() {
        println!();
        for (label, count) in labels {
            println!("  {:<28} {:>8}", label, count);
        }
    }
    println!();
}

/// Print the stored watermarks of a namespace.
pub fn print_watermarks(namespace: &str, entries: &[(WatermarkKey, Watermark)]) {
    println!("{} {}", "Watermarks".bold(), format!("({})", namespace).dimmed());
    println!("{}", "─".repeat(70));

    if entries.is_empty() {
        println!("{}", "No watermarks stored; the next sync reads every row.".dimmed());
        return;
    }

    for (key, watermark) in entries {
        println!(
            "  {:<24} {:<11} {}  {}",
            key.table,
            key.kind.as_str(),
            timestamp(&watermark.at).cyan(),
            format!("{} boundary ids", watermark.boundary_ids.len()).dimmed()
        );
    }
}

/// Print resolved table descriptors.
pub fn print_descriptors(metatable: &str, descriptors: &[TableDescriptor]) {
    if descriptors.is_empty() {
        println!("{}", format!("No tables listed in '{}'.", metatable).dimmed());
        return;
    }

    for descriptor in descriptors {
        let source = if descriptor.source == descriptor.name {
            String::new()
        } else {
            format!(" <- {}", descriptor.source)
        };
        println!(
            "{} {}{}",
            descriptor.name.cyan().bold(),
            format!("(:{} {{{}}})", descriptor.node_label, descriptor.id_property).dimmed(),
            source.dimmed()
        );

        if !descriptor.node_property_fields.is_empty() {
            println!(
                "  {} {}",
                "Properties:".bold(),
                descriptor.node_property_fields.join(", ")
            );
        }
        for edge in &descriptor.edge_fields {
            println!(
                "  {} {} {} {}",
                "→".dimmed(),
                edge.column,
                format!("-[:{}]->", edge.relationship_type).yellow(),
                edge.target_label
            );
        }
        if descriptor.seed_properties.is_some() || descriptor.seed_edges.is_some() {
            println!(
                "  {} properties {}, edges {}",
                "Last ingested:".bold(),
                descriptor.seed_properties.as_ref().map_or("-".to_string(), timestamp).dimmed(),
                descriptor.seed_edges.as_ref().map_or("-".to_string(), timestamp).dimmed()
            );
        }
        println!();
    }
}
