use anyhow::Result;
use colored::Colorize;
use intelligence::{CommandRunner, ExecOptions};
use std::collections::BTreeSet;
use std::time::Duration;

use crate::Context;
use crate::components;
use crate::config::{self, Config};
use crate::runner::{self, SystemRunner};
use crate::snapshot;
use crate::ui;

/// Upper bound for `docker info` when the daemon is unresponsive
const DAEMON_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

struct Issue {
    category: &'static str,
    summary: String,
    detail: Option<String>,
    fix: Option<String>,
}

pub fn run(ctx: &Context) -> Result<()> {
    ui::header("Veritech Health Check");

    let mut issues: Vec<Issue> = Vec::new();

    check_config(&mut issues);
    check_snapshot(ctx, &mut issues);
    check_tools(ctx, &mut issues);

    println!();
    if issues.is_empty() {
        ui::success("All checks passed!");
    } else {
        print_issue_summary(&issues);
    }

    Ok(())
}

fn print_issue_summary(issues: &[Issue]) {
    let count = issues.len();
    let label = if count == 1 { "Issue" } else { "Issues" };
    ui::header(&format!("{count} {label} Found"));

    for (i, issue) in issues.iter().enumerate() {
        let num = i + 1;
        println!(
            "  {}  {} {}",
            format!("{num}.").bold(),
            issue.summary,
            format!("[{}]", issue.category).dimmed()
        );
        if let Some(detail) = &issue.detail {
            for line in detail.lines() {
                println!("      {}", line.dimmed());
            }
        }
        if let Some(fix) = &issue.fix {
            println!("      {} {}", "Fix:".cyan(), fix);
        }
        println!();
    }
}

fn check_config(issues: &mut Vec<Issue>) {
    ui::section("Configuration");

    let path = match config::config_path() {
        Ok(p) => p,
        Err(e) => {
            ui::error("Could not determine config directory");
            issues.push(Issue {
                category: "Configuration",
                summary: "Could not determine config directory".into(),
                detail: Some(format!("{e:#}")),
                fix: Some("Ensure $HOME is set".into()),
            });
            return;
        }
    };

    if !path.exists() {
        println!(
            "  {} {} {}",
            "·".dimmed(),
            path.display(),
            "(not present, using defaults)".dimmed()
        );
        return;
    }

    match Config::load_from(&path) {
        Ok(_) => println!("  {} {}", "✓".green(), path.display()),
        Err(e) => {
            let root_cause = format!("{:#}", e.root_cause());
            println!(
                "  {} {} {}",
                "⚠".yellow(),
                path.display(),
                format!("(parse error: {root_cause})").yellow()
            );
            issues.push(Issue {
                category: "Configuration",
                summary: "config.toml has invalid format".into(),
                detail: Some(format!("{e:#}")),
                fix: Some(format!("Edit {} and fix the issue", path.display())),
            });
        }
    }
}

fn check_snapshot(ctx: &Context, issues: &mut Vec<Issue>) {
    ui::section("Graph Snapshot");

    let path = &ctx.snapshot;
    let graph = match snapshot::load_graph(path) {
        Ok(graph) => graph,
        Err(e) => {
            println!("  {} {} {}", "✗".red(), path.display(), "(unusable)".red());
            issues.push(Issue {
                category: "Graph Snapshot",
                summary: format!("Cannot load {}", path.display()),
                detail: Some(format!("{e:#}")),
                fix: Some("Pass --snapshot or set `snapshot` in config.toml".into()),
            });
            return;
        }
    };
    println!(
        "  {} {} {}",
        "✓".green(),
        path.display(),
        format!("({} entities)", graph.len()).dimmed()
    );

    let registry = match components::registry(&ctx.config.docker_binary) {
        Ok(registry) => registry,
        Err(e) => {
            issues.push(Issue {
                category: "Graph Snapshot",
                summary: "Built-in registry failed to initialise".into(),
                detail: Some(format!("{e:#}")),
                fix: None,
            });
            return;
        }
    };
    let unknown: BTreeSet<&str> = graph
        .entities()
        .map(|e| e.object_type.as_str())
        .filter(|t| !registry.contains(t))
        .collect();
    if !unknown.is_empty() {
        let list = unknown.into_iter().collect::<Vec<_>>().join(", ");
        println!("  {} unknown object types: {}", "✗".red(), list.red());
        issues.push(Issue {
            category: "Graph Snapshot",
            summary: format!("Snapshot uses unregistered object types: {list}"),
            detail: Some(format!(
                "Known types: {}",
                registry.object_types().join(", ")
            )),
            fix: None,
        });
    }
}

fn check_tools(ctx: &Context, issues: &mut Vec<Issue>) {
    ui::section("Required Commands");

    let docker = ctx.config.docker_binary.as_str();
    if runner::command_exists(docker) {
        println!(
            "  {} {} - {}",
            "✓".green(),
            docker,
            "Container CLI for dockerImage".dimmed()
        );
    } else {
        println!(
            "  {} {} - {} {}",
            "✗".red(),
            docker,
            "Container CLI for dockerImage",
            "(missing)".red()
        );
        issues.push(Issue {
            category: "Required Commands",
            summary: format!("{docker} is not installed"),
            detail: Some("dockerImage entities cannot be synced without it".into()),
            fix: Some("Install Docker or set `docker_binary` in config.toml".into()),
        });
        return;
    }

    let opts = ExecOptions::default().with_timeout(Some(DAEMON_CHECK_TIMEOUT));
    if SystemRunner.execute_status(docker, &["info".to_string()], &opts) {
        println!("  {} {}", "✓".green(), "Docker daemon reachable".dimmed());
    } else {
        println!("  {} {}", "✗".red(), "Docker daemon not reachable".red());
        issues.push(Issue {
            category: "Required Commands",
            summary: format!("`{docker} info` failed"),
            detail: Some("image pulls will fail until the daemon is running".into()),
            fix: Some("Start Docker, or check DOCKER_HOST and permissions".into()),
        });
    }
}
