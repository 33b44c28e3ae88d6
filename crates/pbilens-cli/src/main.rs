use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use serde::Serialize;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use pbilens_core::{Config, ScanReport, Severity};
use pbilens_graph::{
    extract_report, package_name, run_batch, DependencyGraph, ExtractionError, NodeKind, PackageInput, ReportOutcome,
};

/// PBI Lens - dependency graphs for extracted report packages
#[derive(Parser)]
#[command(name = "pbilens")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file (default: pbilens.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan every extracted package under a directory
    Scan {
        /// Directory to search for extracted packages
        root: PathBuf,

        /// Output file for the scan report
        #[arg(short, long, default_value = "pbilens-report.json")]
        output: PathBuf,

        /// Also write usage rows and summaries as JSON files into this directory
        #[arg(short, long)]
        export_dir: Option<PathBuf>,
    },

    /// List measures nothing references
    Unused {
        /// Extracted package directory
        package: PathBuf,
    },

    /// Show what depends on a measure or field
    Impact {
        /// Extracted package directory
        package: PathBuf,

        /// Qualified name, e.g. 'Sales[Total Revenue]'
        name: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = if let Some(config_path) = &cli.config {
        Config::from_file(config_path)?
    } else if Path::new("pbilens.toml").exists() {
        Config::from_file(Path::new("pbilens.toml"))?
    } else {
        if cli.verbose {
            eprintln!("{}", "No config file found, using defaults".yellow());
        }
        Config::default()
    };

    match cli.command {
        Commands::Scan {
            root,
            output,
            export_dir,
        } => scan_command(&config, &root, &output, export_dir.as_deref(), cli.verbose),
        Commands::Unused { package } => unused_command(&config, &package),
        Commands::Impact { package, name } => impact_command(&config, &package, &name),
    }
}

/// Log to stderr; `RUST_LOG` wins over the verbosity flag
fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Scan command - run the batch over every discovered package
fn scan_command(
    config: &Config,
    root: &Path,
    output: &Path,
    export_dir: Option<&Path>,
    verbose: bool,
) -> Result<()> {
    let packages: Vec<PathBuf> = discover_packages(root, &config.layout_file)?
        .into_iter()
        .filter(|dir| !config.batch.is_package_skipped(&package_name(dir)))
        .collect();

    if verbose {
        eprintln!("{} {} package(s) under {}", "Found".cyan(), packages.len(), root.display());
    }

    let reads: Vec<Result<PackageInput, (String, ExtractionError)>> = packages
        .iter()
        .map(|dir| PackageInput::read_dir(dir, config).map_err(|e| (package_name(dir), e)))
        .collect();

    let inputs: Vec<PackageInput> = reads.iter().filter_map(|r| r.as_ref().ok().cloned()).collect();
    let mut extracted = run_batch(&inputs, config).into_iter();

    let mut outcomes = Vec::with_capacity(reads.len());
    for read in &reads {
        match read {
            Ok(_) => outcomes.extend(extracted.next()),
            Err((name, error)) => {
                tracing::warn!(package = %name, error = %error, "skipping unreadable package");
                outcomes.push(ReportOutcome::skipped(name, &config.layout_file, error, config));
            }
        }
    }

    let report = ScanReport::from_entries(outcomes.iter().map(ReportOutcome::to_entry).collect());
    report.save_to_file(output)?;

    if verbose {
        eprintln!("{} {}", "Report saved to:".green(), output.display());
    }

    if let Some(dir) = export_dir {
        write_exports(dir, &outcomes)?;
        if verbose {
            eprintln!("{} {}", "Exports written to:".green(), dir.display());
        }
    }

    print_scan_summary(&report);

    if report.has_errors() {
        std::process::exit(1);
    }

    Ok(())
}

/// Directories under `root` that contain the layout file
///
/// A package directory is not searched further.
fn discover_packages(root: &Path, layout_file: &str) -> Result<Vec<PathBuf>> {
    let mut packages = Vec::new();
    let mut walker = WalkDir::new(root).sort_by_file_name().into_iter();

    while let Some(entry) = walker.next() {
        let entry = entry.with_context(|| format!("Failed to walk {}", root.display()))?;
        if !entry.file_type().is_dir() {
            continue;
        }
        if entry.path().join(layout_file).is_file() {
            packages.push(entry.path().to_path_buf());
            walker.skip_current_dir();
        }
    }

    Ok(packages)
}

fn write_exports(dir: &Path, outcomes: &[ReportOutcome]) -> Result<()> {
    std::fs::create_dir_all(dir)?;

    let graphs: Vec<&DependencyGraph> = outcomes
        .iter()
        .filter_map(ReportOutcome::extraction)
        .map(|extraction| &extraction.graph)
        .collect();

    write_json(&dir.join("visual_usage.json"), &collect_rows(&graphs, DependencyGraph::visual_usage_rows))?;
    write_json(&dir.join("measure_usage.json"), &collect_rows(&graphs, DependencyGraph::measure_usage_rows))?;
    write_json(&dir.join("measures.json"), &collect_rows(&graphs, DependencyGraph::measure_summaries))?;
    write_json(&dir.join("pages.json"), &collect_rows(&graphs, DependencyGraph::page_summaries))?;
    Ok(())
}

fn collect_rows<T>(graphs: &[&DependencyGraph], rows: impl Fn(&DependencyGraph) -> Vec<T>) -> Vec<T> {
    graphs.iter().flat_map(|&graph| rows(graph)).collect()
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))
}

/// Read and extract a single package, failing on a fatal error
fn load_package(config: &Config, package: &Path) -> Result<DependencyGraph> {
    let input = PackageInput::read_dir(package, config)?;
    let extraction = extract_report(&input, config)
        .with_context(|| format!("Failed to extract {}", package.display()))?;
    Ok(extraction.graph)
}

/// Unused command - list measures without referrers
fn unused_command(config: &Config, package: &Path) -> Result<()> {
    let graph = load_package(config, package)?;
    let unused = graph.unused();

    println!("\n{}", "=".repeat(60).bright_blue());
    println!("{}", "Unused Measures".bold().bright_blue());
    println!("{}", "=".repeat(60).bright_blue());
    println!();

    println!("{} {}", "Report:".bold(), graph.report().id.green());
    println!("{} {}", "Measures:".bold(), graph.measures().len());
    println!("{} {}", "Unused:".bold(), unused.len());
    println!();

    if unused.is_empty() {
        println!("{}", "✓ Every measure is referenced".green());
    } else {
        for (i, id) in unused.iter().enumerate() {
            let state = graph
                .usage_state(*id)
                .map(|state| state.label())
                .unwrap_or_default();
            println!("  {}. {} ({})", i + 1, graph.node(*id).to_string().yellow(), state);
        }
    }

    println!();
    println!("{}", "=".repeat(60).bright_blue());
    Ok(())
}

/// Impact command - show everything that depends on a measure or field
fn impact_command(config: &Config, package: &Path, name: &str) -> Result<()> {
    let graph = load_package(config, package)?;
    let id = graph.resolve_name(name)?;
    let node = graph.node(id);

    let direct = graph.used_by(id);
    let transitive = graph.transitive_users_of(id);

    println!("\n{}", "=".repeat(60).bright_blue());
    println!("{}", "Impact Analysis".bold().bright_blue());
    println!("{}", "=".repeat(60).bright_blue());
    println!();

    println!("{} {} ({})", "Entity:".bold(), node.to_string().green(), node.kind());
    if let Some(state) = graph.usage_state(id) {
        println!("{} {}", "Usage:".bold(), state.label());
    }
    println!("{} {}", "Direct users:".bold(), direct.len());
    println!("{} {}", "All dependents:".bold(), transitive.len());
    println!();

    if transitive.is_empty() {
        println!("{}", "✓ Nothing depends on this entity".green());
    } else {
        println!("{}", "Dependents (nearest first):".bold());
        for (i, user) in transitive.iter().enumerate() {
            let marker = if direct.contains(user) { "direct" } else { "indirect" };
            println!(
                "  {}. {} [{}, {}]",
                i + 1,
                graph.label(*user).yellow(),
                graph.node(*user).kind(),
                marker
            );
        }
    }

    if node.kind() == NodeKind::Measure {
        let fields = graph.transitive_fields_of(id)?;
        println!();
        println!("{} {}", "Underlying fields:".bold(), fields.len());
        for field in fields {
            println!("  - {}", graph.node(field));
        }
    }

    println!();
    println!("{}", "=".repeat(60).bright_blue());
    Ok(())
}

/// Print scan summary to stdout
fn print_scan_summary(report: &ScanReport) {
    println!("\n{}", "=".repeat(60).bright_blue());
    println!("{}", "PBI Lens Scan Report".bold().bright_blue());
    println!("{}", "=".repeat(60).bright_blue());
    println!();

    println!("Version: {}", report.version);
    println!("Timestamp: {}", report.timestamp);
    println!();

    let summary = &report.summary;
    println!("{}", "Summary:".bold());
    println!(
        "  Reports:  {} ({} extracted, {} skipped)",
        summary.reports_total, summary.reports_extracted, summary.reports_skipped
    );
    println!("  Pages:    {}", summary.pages);
    println!("  Visuals:  {}", summary.visuals);
    println!("  Measures: {} ({} unused)", summary.measures, summary.unused_measures);
    println!("  Unresolved references: {}", summary.unresolved_references);
    println!();

    if summary.errors > 0 {
        println!("  Errors:   {}", format!("{}", summary.errors).red().bold());
    } else {
        println!("  Errors:   {}", format!("{}", summary.errors).green());
    }

    if summary.warnings > 0 {
        println!("  Warnings: {}", format!("{}", summary.warnings).yellow());
    } else {
        println!("  Warnings: {}", format!("{}", summary.warnings).green());
    }

    println!("  Info:     {}", summary.info);
    println!();

    let notable: Vec<_> = report
        .reports
        .iter()
        .flat_map(|entry| entry.diagnostics.iter().map(move |d| (&entry.name, d)))
        .filter(|(_, d)| d.severity > Severity::Info)
        .collect();

    if notable.is_empty() {
        println!("{}", "✓ No issues found!".green().bold());
    } else {
        println!("{}", "Diagnostics:".bold());
        for (report_name, diag) in notable {
            let severity_str = match diag.severity {
                Severity::Error => "ERROR".red().bold(),
                Severity::Warn => "WARN".yellow().bold(),
                Severity::Info => "INFO".cyan(),
            };

            println!("  [{}] {} {}: {}", severity_str, report_name, diag.code, diag.message);

            if let Some(loc) = &diag.location {
                println!("    at {}", loc);
            }
        }
    }

    println!();
    println!("{}", "=".repeat(60).bright_blue());
}
