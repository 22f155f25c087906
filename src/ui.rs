use colored::{ColoredString, Colorize};
use intelligence::{ReconcileSummary, ResourceHealth, ResourceStatus};

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print a warning message
pub fn warn(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Print a dim/muted message
pub fn dim(msg: &str) {
    println!("  {}", msg.dimmed());
}

/// Print a header/title
pub fn header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.chars().count()).dimmed());
}

/// Print a section header
pub fn section(title: &str) {
    println!();
    println!("{}", title.cyan().bold());
}

// ============================================================================
// Resource Formatting
// ============================================================================

/// Wire name of a health value, colored by severity
pub fn health(health: ResourceHealth) -> ColoredString {
    match health {
        ResourceHealth::Ok => "ok".green(),
        ResourceHealth::Warning => "warning".yellow(),
        ResourceHealth::Error => "error".red(),
        ResourceHealth::Unknown => "unknown".dimmed(),
    }
}

/// Wire name of a status value, colored by outcome
pub fn status(status: ResourceStatus) -> ColoredString {
    match status {
        ResourceStatus::Pending => "pending".dimmed(),
        ResourceStatus::InProgress => "inProgress".blue(),
        ResourceStatus::Created => "created".green(),
        ResourceStatus::Failed => "failed".red(),
        ResourceStatus::Deleted => "deleted".yellow(),
    }
}

/// One-line summary of a pass, e.g. "3 succeeded, 1 failed"
pub fn summary_line(summary: &ReconcileSummary, succeeded_label: &str) -> String {
    let mut parts = vec![format!("{} {}", summary.succeeded, succeeded_label)];
    if summary.unchanged > 0 {
        parts.push(format!("{} unchanged", summary.unchanged));
    }
    if summary.skipped > 0 {
        parts.push(format!("{} skipped", summary.skipped));
    }
    if summary.failed > 0 {
        parts.push(format!("{} failed", summary.failed));
    }
    parts.join(", ")
}

/// Print the summary as success or error depending on failures
pub fn summary(summary: &ReconcileSummary, succeeded_label: &str) {
    println!();
    let line = summary_line(summary, succeeded_label);
    if summary.is_success() {
        success(&line);
    } else {
        error(&line);
    }
}

/// Truncate a string for display, keeping the start
pub fn truncate(text: &str, max_len: usize) -> String {
    let count = text.chars().count();
    if count <= max_len {
        text.to_string()
    } else if max_len <= 3 {
        "...".to_string()
    } else {
        let kept: String = text.chars().take(max_len - 3).collect();
        format!("{kept}...")
    }
}

// ============================================================================
// Tests
// ============================================================================
