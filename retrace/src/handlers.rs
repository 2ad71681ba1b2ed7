use anyhow::{Context, Result, anyhow};
use clap::ArgMatches;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use retrace_core::catalog::RequestCatalog;
use retrace_core::config::{CONFIG_FILE_NAME, RetraceConfig, default_config_path, expand_path};
use retrace_core::cookies::CookieJar;
use retrace_core::graph::DependencyGraph;
use retrace_core::report::{ReportFormat, build_graph_report, build_report, render_report, save_report};
use retrace_core::resolver::{DependencyResolver, Resolution};
use retrace_core::session::AnalysisSession;
use retrace_core::{AnalysisSummary, CompletionState, run_analysis};
use retrace_oracle::{ClientError, oracle_from_settings};
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Environment variable consulted for the oracle key when neither the flag
/// nor the config file provides one.
pub const ORACLE_KEY_ENV: &str = "RETRACE_ORACLE_KEY";

// Helper functions for the analyze handler

/// Parse a `NAME=VALUE` input assignment. The value may itself contain `=`.
pub fn parse_input_assignment(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("Input '{}' is not of the form NAME=VALUE", raw))?;

    let name = name.trim();
    if name.is_empty() {
        return Err(format!("Input '{}' has an empty name", raw));
    }

    Ok((name.to_string(), value.to_string()))
}

/// Parse every `--input`; a later assignment to the same name wins.
pub fn parse_inputs(raw: &[String]) -> Result<BTreeMap<String, String>, String> {
    raw.iter().map(|item| parse_input_assignment(item)).collect()
}

pub fn load_capture(path: &Path) -> Result<RequestCatalog> {
    let catalog = RequestCatalog::load(path)
        .with_context(|| format!("Failed to load capture {}", path.display()))?;
    debug!("Loaded {} entries from {}", catalog.len(), path.display());

    if catalog.is_empty() {
        eprintln!(
            "{} Capture {} contains no requests",
            "⚠".yellow().bold(),
            path.display()
        );
    }

    Ok(catalog)
}

/// Load a cookie jar, or an empty one when no file was given.
pub fn load_cookies(path: Option<&PathBuf>) -> Result<CookieJar> {
    match path {
        Some(path) => CookieJar::load(path)
            .with_context(|| format!("Failed to load cookies {}", path.display())),
        None => Ok(CookieJar::new()),
    }
}

/// Pick the oracle key: command line, then config file, then environment.
pub fn select_api_key(
    flag: Option<&String>,
    configured: Option<String>,
    env: Option<String>,
) -> Option<String> {
    flag.cloned()
        .or(configured)
        .or(env)
        .filter(|key| !key.trim().is_empty())
}

/// Fold command-line overrides into the loaded configuration.
pub fn apply_overrides(config: &mut RetraceConfig, args: &ArgMatches) {
    if let Some(url) = args.get_one::<String>("oracle-url") {
        config.oracle.endpoint = Some(url.clone());
    }
    config.oracle.api_key = select_api_key(
        args.get_one::<String>("oracle-key"),
        config.oracle.api_key.take(),
        std::env::var(ORACLE_KEY_ENV).ok(),
    );
    if let Some(&timeout) = args.get_one::<u64>("timeout") {
        config.oracle.timeout_secs = timeout;
    }
    if let Some(&attempts) = args.get_one::<usize>("attempts") {
        config.oracle.max_attempts = attempts.max(1);
    }
    if let Some(&max_nodes) = args.get_one::<usize>("max-nodes") {
        config.analysis.max_nodes = max_nodes;
    }
    if args.get_flag("strict-oracle") {
        config.analysis.strict_oracle = true;
    }
}

/// Resolve values against the capture without asking an oracle.
///
/// With `before`, only entries captured ahead of that index are searched,
/// matching what the analysis pass does for the entry at that index.
pub fn resolve_values(
    catalog: &RequestCatalog,
    cookies: &CookieJar,
    values: &[String],
    before: Option<usize>,
) -> Resolution {
    let entries = match before {
        Some(index) => catalog.preceding(index),
        None => catalog.entries(),
    };
    DependencyResolver::new(entries, cookies).resolve(values)
}

pub fn format_resolution(resolution: &Resolution, catalog: &RequestCatalog) -> String {
    let mut out = String::new();

    out.push_str(&format!(
        "{} ({})\n",
        "Cookies".bright_white().bold(),
        resolution.cookie_deps.len()
    ));
    for dep in &resolution.cookie_deps {
        out.push_str(&format!(
            "  {} '{}' ← cookie {}\n",
            "✓".green().bold(),
            dep.dynamic_part,
            dep.cookie_key.bright_white()
        ));
    }

    out.push_str(&format!(
        "{} ({})\n",
        "Responses".bright_white().bold(),
        resolution.request_deps.len()
    ));
    for dep in &resolution.request_deps {
        let source = catalog
            .get(dep.source_request)
            .map(|entry| format!("{} {}", entry.method, entry.url))
            .unwrap_or_else(|| "<missing entry>".to_string());
        out.push_str(&format!(
            "  {} '{}' ← #{} {}\n",
            "✓".green().bold(),
            dep.dynamic_part,
            dep.source_request,
            source.bright_white()
        ));
    }

    out.push_str(&format!(
        "{} ({})\n",
        "Not found".bright_white().bold(),
        resolution.not_found.len()
    ));
    for dep in &resolution.not_found {
        out.push_str(&format!("  {} '{}'\n", "✗".red().bold(), dep.dynamic_part));
    }

    out
}

/// Render the report for a saved graph snapshot.
pub fn inspect_snapshot(path: &Path, format: ReportFormat) -> Result<String> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read graph snapshot {}", path.display()))?;
    let graph = DependencyGraph::from_json(&content)
        .with_context(|| format!("Invalid graph snapshot {}", path.display()))?;

    Ok(render_report(&build_graph_report(&graph), format)?)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitOutcome {
    Created(PathBuf),
    AlreadyExists(PathBuf),
}

/// Write the default configuration into `dir` unless a file is already
/// there and `force` is not set.
pub fn write_default_config(dir: &Path, force: bool) -> Result<InitOutcome> {
    let path = dir.join(CONFIG_FILE_NAME);
    if path.exists() && !force {
        return Ok(InitOutcome::AlreadyExists(path));
    }

    RetraceConfig::default()
        .save(&path)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(InitOutcome::Created(path))
}

fn report_format(args: &ArgMatches) -> ReportFormat {
    args.get_one::<String>("format")
        .and_then(|f| ReportFormat::from_str(f))
        .unwrap_or(ReportFormat::Text)
}

fn emit_report(content: &str, output: Option<&PathBuf>) -> Result<()> {
    match output {
        Some(path) => {
            save_report(content, path)
                .with_context(|| format!("Failed to save report to {}", path.display()))?;
            println!(
                "{} Report saved to {}",
                "✓".green().bold(),
                path.display().to_string().bright_white()
            );
        }
        None => print!("{}", content),
    }
    Ok(())
}

fn print_divider() {
    println!("{}", "═".repeat(60).bright_blue().bold());
}

fn print_prompt(msg: &str) -> io::Result<String> {
    print!("{} ", msg.bright_cyan().bold());
    io::stdout().flush()?;
    let mut response = String::new();
    io::stdin().read_line(&mut response)?;
    Ok(response.trim().to_lowercase())
}

fn print_summary(summary: &AnalysisSummary) {
    println!(
        "{} Processed {} node(s), {} deferred, {} still pending",
        "✓".green().bold(),
        summary.nodes_processed,
        summary.nodes_deferred,
        summary.nodes_pending
    );
    println!(
        "{} Dependencies: {} cookie, {} response, {} not found",
        "→".blue(),
        summary.cookie_deps,
        summary.request_deps,
        summary.not_found
    );

    let state = summary.completion.state;
    let label = match state {
        CompletionState::Complete => state.as_str().green().bold(),
        CompletionState::Blocked => state.as_str().red().bold(),
        _ => state.as_str().yellow().bold(),
    };
    println!("{} Completion: {}", "→".blue(), label);
}

pub fn handle_init(args: &ArgMatches) -> Result<()> {
    print_divider();
    println!("{}", "  RETRACE INITIALIZATION".bright_white().bold());
    print_divider();
    println!();

    let dir = args
        .get_one::<String>("PATH")
        .context("No configuration directory given")?;
    let force = args.get_flag("force");
    let config_dir = expand_path(dir);

    println!(
        "{} Target: {}",
        "→".blue(),
        config_dir.display().to_string().bright_white()
    );

    let outcome = match write_default_config(&config_dir, force)? {
        InitOutcome::AlreadyExists(path) => {
            println!("{}", "⚠ WARNING".yellow().bold());
            println!(
                "  {} {} already exists",
                "•".yellow(),
                path.display().to_string().bright_white()
            );
            let response = print_prompt("Overwrite it with defaults? [y/N]:")?;
            if response != "y" && response != "yes" {
                println!("{} Initialization cancelled", "✗".red().bold());
                return Ok(());
            }
            write_default_config(&config_dir, true)?
        }
        created => created,
    };

    if let InitOutcome::Created(path) = outcome {
        println!(
            "{} Configuration written to {}",
            "✓".green().bold(),
            path.display().to_string().bright_white()
        );
        println!(
            "{} Set {} before running {}",
            "→".blue(),
            "oracle.endpoint".bright_white(),
            "retrace analyze".bright_white()
        );
    }

    Ok(())
}

pub async fn handle_analyze(args: &ArgMatches) -> Result<()> {
    let capture_path = args
        .get_one::<PathBuf>("capture")
        .context("--capture is required")?;
    let action_url = args
        .get_one::<String>("action-url")
        .context("--action-url is required")?;
    let format = report_format(args);
    let output = args.get_one::<PathBuf>("output");
    // Keep stdout clean when a machine-readable report is printed there
    let chatty = output.is_some() || format == ReportFormat::Text;

    let config_path = args
        .get_one::<PathBuf>("config")
        .cloned()
        .unwrap_or_else(default_config_path);
    let mut config = RetraceConfig::load_or_default(&config_path)
        .with_context(|| format!("Failed to load config {}", config_path.display()))?;
    apply_overrides(&mut config, args);

    let catalog = load_capture(capture_path)?;
    let cookies = load_cookies(args.get_one::<PathBuf>("cookies"))?;
    let raw_inputs: Vec<String> = args
        .get_many::<String>("input")
        .map(|values| values.cloned().collect())
        .unwrap_or_default();
    let inputs = parse_inputs(&raw_inputs).map_err(|e| anyhow!(e))?;

    let oracle = oracle_from_settings(&config.oracle).map_err(|e| match e {
        ClientError::MissingEndpoint => anyhow!(
            "No oracle endpoint configured. Pass --oracle-url or set oracle.endpoint in {}",
            config_path.display()
        ),
        other => anyhow::Error::from(other),
    })?;

    if chatty {
        print_divider();
        println!("{}", "  RETRACE ANALYSIS".bright_white().bold());
        print_divider();
        println!(
            "{} Capture: {} ({} request(s), {} cookie(s))",
            "→".blue(),
            capture_path.display().to_string().bright_white(),
            catalog.len(),
            cookies.len()
        );
        println!("{} Target: {}", "→".blue(), action_url.bright_white());
        println!(
            "{} Oracle: {} (up to {} attempt(s) per call)",
            "→".blue(),
            config.oracle.endpoint.as_deref().unwrap_or_default().bright_white(),
            oracle.policy().max_attempts
        );
        println!();
    }

    let mut session = AnalysisSession::new().with_input_variables(inputs);
    session.set_action_url(action_url.as_str());

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}")?);
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner.set_message(format!("Tracing dynamic values for {}", action_url));

    let outcome = run_analysis(&mut session, &catalog, &cookies, &oracle, &config.analysis).await;
    spinner.finish_and_clear();

    match outcome {
        Ok(ref summary) if chatty => print_summary(summary),
        Ok(_) => {}
        Err(ref e) => eprintln!("{} {}", "⚠".yellow().bold(), e),
    }
    if chatty {
        println!("{} Oracle attempts: {}", "→".blue(), oracle.attempts());
        println!();
    }

    if let Some(graph_path) = args.get_one::<PathBuf>("graph-out") {
        fs::write(graph_path, session.graph.to_json()?)
            .with_context(|| format!("Failed to write graph to {}", graph_path.display()))?;
        if chatty {
            println!(
                "{} Graph saved to {}",
                "✓".green().bold(),
                graph_path.display().to_string().bright_white()
            );
        }
    }

    let report = render_report(&build_report(&session), format)?;
    emit_report(&report, output)?;

    outcome.map(|_| ()).context("Analysis did not finish")
}

pub fn handle_inspect(args: &ArgMatches) -> Result<()> {
    let graph_path = args
        .get_one::<PathBuf>("GRAPH")
        .context("No graph snapshot given")?;
    let report = inspect_snapshot(graph_path, report_format(args))?;
    emit_report(&report, args.get_one::<PathBuf>("output"))
}

pub fn handle_resolve(args: &ArgMatches) -> Result<()> {
    let capture_path = args
        .get_one::<PathBuf>("capture")
        .context("--capture is required")?;
    let catalog = load_capture(capture_path)?;
    let cookies = load_cookies(args.get_one::<PathBuf>("cookies"))?;
    let values: Vec<String> = args
        .get_many::<String>("value")
        .map(|values| values.cloned().collect())
        .unwrap_or_default();

    let resolution = resolve_values(
        &catalog,
        &cookies,
        &values,
        args.get_one::<usize>("before").copied(),
    );

    if args.get_flag("json") {
        println!("{}", serde_json::to_string_pretty(&resolution)?);
    } else {
        print!("{}", format_resolution(&resolution, &catalog));
    }

    Ok(())
}
