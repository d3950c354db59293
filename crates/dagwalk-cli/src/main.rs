use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use dagwalk_core::{ScanReport, ScanSettings, Severity};
use dagwalk_project::{Catalog, Entity};

/// Settings file looked up in the project directory when --config is absent
const SETTINGS_FILE: &str = "dagwalk.toml";

/// dagwalk - static dependency and config scanner for dbt-style projects
#[derive(Parser)]
#[command(name = "dagwalk")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to settings file (default: <project-dir>/dagwalk.toml)
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
    /// Scan a project and write its catalog as JSON
    Scan {
        /// Project root directory
        #[arg(short, long, default_value = ".")]
        project_dir: PathBuf,

        /// External variable binding (KEY=VALUE, VALUE parsed as JSON when possible)
        #[arg(long = "var", value_name = "KEY=VALUE")]
        vars: Vec<String>,

        /// Output file for the catalog
        #[arg(short, long, default_value = "catalog.json")]
        output: PathBuf,
    },

    /// Show one entity's kind, path, selectors and upstream names
    Show {
        /// Entity name
        name: String,

        /// Project root directory
        #[arg(short, long, default_value = ".")]
        project_dir: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .init();

    match cli.command {
        Commands::Scan { project_dir, vars, output } => {
            let settings = load_settings(cli.config.as_deref(), &project_dir, cli.verbose)?;
            scan_command(settings, &project_dir, &vars, &output, cli.verbose)
        }
        Commands::Show { name, project_dir } => {
            let settings = load_settings(cli.config.as_deref(), &project_dir, cli.verbose)?;
            show_command(settings, &project_dir, &name)
        }
    }
}

/// Load settings from --config, the project's dagwalk.toml, or defaults
fn load_settings(config: Option<&Path>, project_dir: &Path, verbose: bool) -> Result<ScanSettings> {
    let default_path = project_dir.join(SETTINGS_FILE);

    let mut settings = if let Some(path) = config {
        ScanSettings::from_file(path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?
    } else if default_path.exists() {
        ScanSettings::from_file(&default_path)
            .with_context(|| format!("Failed to load settings from {}", default_path.display()))?
    } else {
        if verbose {
            eprintln!("{}", "No settings file found, using defaults".yellow());
        }
        ScanSettings::default()
    };

    if settings.project_name.is_empty() {
        settings.project_name = project_name_from_dir(project_dir);
    }

    tracing::debug!(
        project = %settings.project_name,
        vars = settings.vars.len(),
        default_materialization = %settings.default_materialization,
        "loaded settings"
    );

    Ok(settings)
}

fn project_name_from_dir(project_dir: &Path) -> String {
    std::fs::canonicalize(project_dir)
        .ok()
        .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "project".to_string())
}

/// Parse `KEY=VALUE`; the value is JSON when it parses, a plain string otherwise
fn parse_var(raw: &str) -> Result<(String, serde_json::Value)> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| anyhow::anyhow!("Invalid --var '{}': expected KEY=VALUE", raw))?;

    let key = key.trim();
    if key.is_empty() {
        return Err(anyhow::anyhow!("Invalid --var '{}': empty key", raw));
    }

    let value = serde_json::from_str(value).unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

fn scan_catalog(settings: ScanSettings, project_dir: &Path) -> Result<Catalog> {
    let mut catalog = Catalog::from_settings(settings, project_dir);
    catalog
        .scan()
        .with_context(|| format!("Failed to scan {}", project_dir.display()))?;
    Ok(catalog)
}

/// Scan command - build the catalog and write it out
fn scan_command(
    mut settings: ScanSettings,
    project_dir: &Path,
    vars: &[String],
    output: &Path,
    verbose: bool,
) -> Result<()> {
    for raw in vars {
        let (key, value) = parse_var(raw)?;
        settings.vars.insert(key, value);
    }

    if verbose {
        eprintln!("{} {}", "Scanning project:".cyan(), project_dir.display());
    }

    let catalog = scan_catalog(settings, project_dir)?;

    let json = serde_json::to_string_pretty(&catalog)?;
    std::fs::write(output, json).with_context(|| format!("Failed to write {}", output.display()))?;

    if verbose {
        eprintln!("{} {}", "Catalog saved to:".green(), output.display());
    }

    print_report_summary(&catalog.report());

    Ok(())
}

/// Show command - print one entity
fn show_command(settings: ScanSettings, project_dir: &Path, name: &str) -> Result<()> {
    let catalog = scan_catalog(settings, project_dir)?;

    let found = catalog.find(name);
    if found.is_empty() {
        return Err(anyhow::anyhow!(
            "No seed, model or test named '{}' in {}",
            name,
            project_dir.display()
        ));
    }

    for entity in found {
        print_entity(entity);
    }

    Ok(())
}

fn print_entity(entity: &Entity) {
    println!("\n{}", "=".repeat(60).bright_blue());
    println!("{} {}", entity.kind().to_string().bold().bright_blue(), entity.name().green());
    println!("{}", "=".repeat(60).bright_blue());
    println!();

    println!("{} {}", "Path:".bold(), entity.source_path().display());
    if entity.is_snapshot() {
        println!("{} yes", "Snapshot:".bold());
    }
    println!();

    let config = entity.config();

    println!("{} {}", "Selectors:".bold(), config.selectors().len());
    for selector in config.selectors() {
        println!("  {}", selector.yellow());
    }
    println!();

    println!("{} {}", "Upstream:".bold(), config.upstream_names().len());
    for (i, upstream) in config.upstream_names().iter().enumerate() {
        println!("  {}. {}", i + 1, upstream);
    }

    if !entity.sources().is_empty() {
        println!();
        println!("{} {}", "Sources:".bold(), entity.sources().len());
        for source in entity.sources() {
            println!("  {}.{}", source.source_name, source.table_name);
        }
    }

    println!();
}

fn print_report_summary(report: &ScanReport) {
    println!("\n{}", "=".repeat(60).bright_blue());
    println!("{}", "Project Scan Report".bold().bright_blue());
    println!("{}", "=".repeat(60).bright_blue());
    println!();

    println!("Version: {}", report.version);
    println!("Project: {}", report.project_name);
    println!();

    println!("{}", "Summary:".bold());
    println!("  Seeds:    {}", report.summary.seeds);
    println!("  Models:   {}", report.summary.models);
    println!("  Tests:    {}", report.summary.tests);

    if report.summary.warnings > 0 {
        println!("  Warnings: {}", format!("{}", report.summary.warnings).yellow());
    } else {
        println!("  Warnings: {}", format!("{}", report.summary.warnings).green());
    }

    println!("  Info:     {}", report.summary.info);
    println!();

    if report.diagnostics.is_empty() {
        println!("{}", "✓ No issues found!".green().bold());
    } else {
        println!("{}", "Diagnostics:".bold());
        for diag in &report.diagnostics {
            let severity_str = match diag.severity {
                Severity::Warn => "WARN".yellow().bold(),
                Severity::Info => "INFO".cyan(),
            };

            println!("  [{}] {}: {}", severity_str, diag.code, diag.message);

            if let Some(loc) = &diag.location {
                println!("    at {}", loc);
            }
        }
    }

    println!();
    println!("{}", "=".repeat(60).bright_blue());
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_var() {
        assert_eq!(parse_var("country=us").unwrap(), ("country".to_string(), json!("us")));
        assert_eq!(parse_var("limit=10").unwrap(), ("limit".to_string(), json!(10)));
        assert_eq!(
            parse_var("tags=[\"a\",\"b\"]").unwrap(),
            ("tags".to_string(), json!(["a", "b"]))
        );
        assert_eq!(parse_var("expr=a=b").unwrap(), ("expr".to_string(), json!("a=b")));
        assert!(parse_var("missing").is_err());
        assert!(parse_var("=value").is_err());
    }

    #[test]
    fn test_settings_fall_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = load_settings(None, dir.path(), false).unwrap();

        assert_eq!(settings.default_materialization, "view");
        assert!(!settings.project_name.is_empty());
    }

    #[test]
    fn test_settings_from_project_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(SETTINGS_FILE), "project_name = \"shop\"\n").unwrap();

        let settings = load_settings(None, dir.path(), false).unwrap();
        assert_eq!(settings.project_name, "shop");
    }
}
