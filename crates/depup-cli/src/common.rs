use crate::options::{self, Command, ConfigOpts, Options, OutdatedOpts, UpdateOpts};
use color_eyre::eyre::{self, WrapErr};
use depup::config;
use depup::logging::TracingLogger;
use depup::output::{structured, table::TableSink, OutputFormat};
use depup::report::{self, ExitCode};
use depup::update::UpdateResult;
use depup::{Orchestrator, RunOptions, StdinPrompt};
use indexmap::IndexMap;
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

type Engine = Orchestrator<StdinPrompt, TracingLogger>;

/// Entry point shared by the binary.
///
/// Returns the process exit code per the exit-code contract.
pub async fn run(options: Options) -> eyre::Result<i32> {
    crate::logging::setup(options.log_level, options.verbosity.verbose)?;

    let cwd = std::env::current_dir().wrap_err("could not determine current working dir")?;
    let base_dir = options.directory.clone().unwrap_or(cwd);

    match options.command.clone() {
        Command::Config(cfg) => run_config(&options, &cfg, &base_dir),
        Command::Scan(scan) => run_scan(&options, &scan, &base_dir).await,
        Command::List(list) => run_list(&options, &list, &base_dir).await,
        Command::Outdated(outdated) => run_outdated(&options, &outdated, &base_dir).await,
        Command::Update(update) => run_update(&options, &update, &base_dir).await,
    }
}

/// Load configuration; a failure is already the final exit code.
fn load_config(options: &Options, base_dir: &Path) -> Result<config::Loaded, i32> {
    match config::load(options.config.as_deref(), base_dir) {
        Ok(loaded) => {
            for warning in &loaded.warnings {
                tracing::warn!("{warning}");
            }
            Ok(loaded)
        }
        Err(err) => {
            eprintln!("error: {err}");
            if let config::Error::Validation { warnings, .. } = &err {
                for warning in warnings {
                    eprintln!("warning: {warning}");
                }
            }
            Err(ExitCode::ConfigError.log("configuration failed to load").code())
        }
    }
}

fn working_dir(explicit: Option<&Path>, config: &config::Config, cwd: &Path) -> PathBuf {
    if let Some(dir) = explicit {
        return dir.to_path_buf();
    }
    match &config.working_dir {
        Some(dir) if dir.is_absolute() => dir.clone(),
        Some(dir) => cwd.join(dir),
        None => cwd.to_path_buf(),
    }
}

fn build(options: &Options, loaded: config::Loaded, base_dir: &Path, run_options: RunOptions) -> Engine {
    let verbosity = if options.verbosity.quiet > 0 {
        depup::logging::Verbosity::Off
    } else {
        depup::logging::Verbosity::from(options.verbosity.verbose + 1)
    };
    let working_dir = working_dir(options.directory.as_deref(), &loaded.config, base_dir);
    Orchestrator {
        config: loaded.config,
        working_dir,
        options: run_options,
        runner: Arc::new(depup::command::ProcessRunner::default()),
        prompter: StdinPrompt::default(),
        logger: TracingLogger::new(verbosity),
        warnings: {
            let warnings = depup::logging::WarningSink::new();
            for warning in loaded.warnings {
                warnings.warn(warning);
            }
            warnings
        },
        cancel: CancellationToken::new(),
    }
}

fn run_config(options: &Options, cfg: &ConfigOpts, base_dir: &Path) -> eyre::Result<i32> {
    if cfg.show_defaults {
        print!("{}", config::defaults::config().to_yaml()?);
        return Ok(ExitCode::Success.log("printed defaults").code());
    }

    if cfg.init {
        let path = base_dir.join(config::CONFIG_FILE_NAME);
        if path.exists() {
            eprintln!("error: refusing to overwrite {}", path.display());
            return Ok(ExitCode::ConfigError.log("config file already exists").code());
        }
        std::fs::write(&path, config::defaults::config().to_yaml()?)
            .wrap_err_with(|| format!("failed to write {}", path.display()))?;
        println!("wrote {}", path.display());
        return Ok(ExitCode::Success.log("initialized config").code());
    }

    if cfg.validate {
        return match config::load(options.config.as_deref(), base_dir) {
            Ok(loaded) if loaded.warnings.is_empty() => {
                println!("configuration valid");
                Ok(ExitCode::Success.log("configuration valid").code())
            }
            Ok(loaded) => {
                println!("configuration valid with warnings:");
                for warning in &loaded.warnings {
                    println!("  warning: {warning}");
                }
                Ok(ExitCode::Success.log("configuration valid with warnings").code())
            }
            Err(err) => {
                eprintln!("error: {err}");
                if let config::Error::Validation { warnings, .. } = &err {
                    for warning in warnings {
                        eprintln!("warning: {warning}");
                    }
                }
                Ok(ExitCode::ConfigError.log("configuration invalid").code())
            }
        };
    }

    // default: --show-effective
    let loaded = match load_config(options, base_dir) {
        Ok(loaded) => loaded,
        Err(code) => return Ok(code),
    };
    print!("{}", loaded.config.to_yaml()?);
    Ok(ExitCode::Success.log("printed effective config").code())
}

async fn run_scan(options: &Options, scan: &options::ScanOpts, base_dir: &Path) -> eyre::Result<i32> {
    let loaded = match load_config(options, base_dir) {
        Ok(loaded) => loaded,
        Err(code) => return Ok(code),
    };
    let run_options = RunOptions {
        filters: depup::filter::Filters {
            files: scan.paths.clone(),
            ..depup::filter::Filters::default()
        },
        ..RunOptions::default()
    };
    let engine = build(options, loaded, base_dir, run_options);
    match engine.scan() {
        Ok(manifests) => {
            for manifest in &manifests {
                println!("{}\t{}", manifest.rule, manifest.path.display());
            }
            Ok(ExitCode::Success.log("scan complete").code())
        }
        Err(err) => {
            eprintln!("error: {err}");
            Ok(err.exit_code().log("scan failed").code())
        }
    }
}

async fn run_list(options: &Options, list: &options::ListOpts, base_dir: &Path) -> eyre::Result<i32> {
    let loaded = match load_config(options, base_dir) {
        Ok(loaded) => loaded,
        Err(code) => return Ok(code),
    };
    let run_options = RunOptions {
        filters: list.filters.filters(),
        ..RunOptions::default()
    };
    let engine = build(options, loaded, base_dir, run_options);
    match engine.list().await {
        Ok(packages) => {
            let refs: Vec<&depup::package::Package> = packages.iter().collect();
            let mut sink = TableSink::begin(std::io::stdout(), &refs)?;
            for package in &packages {
                sink.row(package)?;
            }
            let mut summary: IndexMap<String, usize> = IndexMap::new();
            for package in &packages {
                *summary.entry(package.status.as_str().to_lowercase()).or_default() += 1;
            }
            summary.insert("total".to_string(), packages.len());
            sink.finish(&summary, &engine.warnings.drain())?;
            Ok(ExitCode::Success.log("list complete").code())
        }
        Err(err) => {
            eprintln!("error: {err}");
            Ok(err.exit_code().log("list failed").code())
        }
    }
}

fn outdated_run_options(opts: &OutdatedOpts) -> RunOptions {
    RunOptions {
        selection: opts.selection(),
        filters: opts.filters.filters(),
        no_timeout: opts.no_timeout,
        skip_preflight: opts.skip_preflight,
        continue_on_fail: opts.continue_on_fail,
        ..RunOptions::default()
    }
}

async fn run_outdated(
    options: &Options,
    opts: &OutdatedOpts,
    base_dir: &Path,
) -> eyre::Result<i32> {
    let loaded = match load_config(options, base_dir) {
        Ok(loaded) => loaded,
        Err(code) => return Ok(code),
    };
    let format = opts.output.unwrap_or_default();
    let engine = build(options, loaded, base_dir, outdated_run_options(opts));

    let results = match engine
        .outdated(|result| {
            tracing::debug!(package = %result.package.name, status = %result.status, "checked");
        })
        .await
    {
        Ok(results) => results,
        Err(err) => {
            eprintln!("error: {err}");
            return Ok(err.exit_code().log("outdated failed").code());
        }
    };

    let code = report::outdated_exit(&results, opts.continue_on_fail);
    let report = report::outdated_report(results, engine.warnings.drain());

    let mut stdout = std::io::stdout();
    match format {
        OutputFormat::Table => {
            let refs: Vec<&depup::classify::OutdatedResult> = report.packages.iter().collect();
            let mut sink = TableSink::begin(&mut stdout, &refs)?;
            for result in &report.packages {
                sink.row(result)?;
            }
            sink.finish(&report.summary, &report.warnings)?;
        }
        OutputFormat::Json => structured::write_json(&mut stdout, &report)?,
        OutputFormat::Csv => structured::write_csv(&mut stdout, &report)?,
        OutputFormat::Xml => structured::write_xml(&mut stdout, &report)?,
    }

    Ok(code.log("outdated complete").code())
}

async fn run_update(options: &Options, opts: &UpdateOpts, base_dir: &Path) -> eyre::Result<i32> {
    let mut loaded = match load_config(options, base_dir) {
        Ok(loaded) => loaded,
        Err(code) => return Ok(code),
    };

    if let Some(mode) = &opts.system_test_mode {
        match options::parse_run_mode(mode) {
            Ok(mode) => {
                if let Some(cfg) = &mut loaded.config.system_tests {
                    cfg.run_mode = mode;
                }
            }
            Err(err) => {
                eprintln!("error: {err}");
                return Ok(ExitCode::ConfigError.log("invalid system-test mode").code());
            }
        }
    }

    let format = opts.outdated.output.unwrap_or_default();
    let structured_output = format.is_structured();
    let run_options = RunOptions {
        dry_run: opts.dry_run,
        skip_lock: opts.skip_lock,
        // a structured primary stream cannot carry a prompt
        yes: opts.yes || structured_output,
        skip_system_tests: opts.skip_system_tests,
        incremental: opts.incremental,
        ..outdated_run_options(&opts.outdated)
    };
    let mut engine = build(options, loaded, base_dir, run_options);

    let plans = match engine.plan().await {
        Ok(plans) => plans,
        Err(err) => {
            eprintln!("error: {err}");
            return Ok(err.exit_code().log("update planning failed").code());
        }
    };

    // provisional rows reserve table widths before anything streams
    let provisional: Vec<UpdateResult> = plans.iter().map(|plan| plan.provisional_result()).collect();
    let provisional_refs: Vec<&UpdateResult> = provisional.iter().collect();
    let stream_sink: RefCell<Option<TableSink<std::io::Stdout>>> = RefCell::new(None);

    let preview = |_: &depup::update::GroupedPlans| -> Result<(), depup::Error> {
        let mut sink = TableSink::begin(std::io::stdout(), &provisional_refs)
            .map_err(depup::Error::Io)?;
        for row in &provisional {
            sink.row(row).map_err(depup::Error::Io)?;
        }
        println!();
        Ok(())
    };

    let on_result = |result: &UpdateResult| {
        if structured_output {
            tracing::debug!(package = %result.package.name, status = %result.status, "applied");
            return;
        }
        let mut guard = stream_sink.borrow_mut();
        if guard.is_none() {
            match TableSink::begin(std::io::stdout(), &provisional_refs) {
                Ok(sink) => *guard = Some(sink),
                Err(err) => {
                    tracing::error!("failed to write results: {err}");
                    return;
                }
            }
        }
        if let Some(sink) = guard.as_mut() {
            if let Err(err) = sink.row(result) {
                tracing::error!("failed to write result row: {err}");
            }
        }
    };

    let run = match engine.apply(&plans, preview, on_result).await {
        Ok(run) => run,
        Err(err) => {
            eprintln!("error: {err}");
            return Ok(err.exit_code().log("update failed").code());
        }
    };

    let code = if run.validation_failed {
        ExitCode::Failure
    } else {
        report::update_exit(&run.results, opts.outdated.continue_on_fail)
    };
    let report = report::update_report(run.results.clone(), engine.warnings.drain());

    let mut stdout = std::io::stdout();
    if structured_output {
        match format {
            OutputFormat::Json => structured::write_json(&mut stdout, &report)?,
            OutputFormat::Csv => structured::write_csv(&mut stdout, &report)?,
            OutputFormat::Xml => structured::write_xml(&mut stdout, &report)?,
            OutputFormat::Table => unreachable!("table output is not structured"),
        }
    } else if let Some(sink) = stream_sink.into_inner() {
        sink.finish(&report.summary, &report.warnings)?;
    } else if !run.declined && run.results.is_empty() && plans.is_empty() {
        println!("no packages matched");
    }

    let reason = if run.declined {
        "cancelled by user"
    } else if run.validation_failed {
        "post-update validation failed"
    } else {
        "update complete"
    };
    Ok(code.log(reason).code())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn parse(args: &[&str]) -> (Options, ConfigOpts) {
        let options = Options::parse_from(args);
        let Command::Config(cfg) = options.command.clone() else {
            panic!("expected config command");
        };
        (options, cfg)
    }

    #[test]
    fn config_init_writes_and_refuses_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let (options, cfg) = parse(&["depup", "config", "--init"]);

        let code = run_config(&options, &cfg, dir.path()).unwrap();
        assert_eq!(code, 0);
        assert!(dir.path().join(config::CONFIG_FILE_NAME).is_file());

        let code = run_config(&options, &cfg, dir.path()).unwrap();
        assert_eq!(code, ExitCode::ConfigError.code());
    }

    #[test]
    fn config_validate_reports_invalid_config() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(config::CONFIG_FILE_NAME), "bogus_key: 1\n").unwrap();
        let (options, cfg) = parse(&["depup", "config", "--validate"]);
        let code = run_config(&options, &cfg, dir.path()).unwrap();
        assert_eq!(code, ExitCode::ConfigError.code());
    }

    #[test]
    fn initialized_config_round_trips_through_validate() {
        let dir = tempfile::tempdir().unwrap();
        let (options, init) = parse(&["depup", "config", "--init"]);
        assert_eq!(run_config(&options, &init, dir.path()).unwrap(), 0);

        let (options, validate) = parse(&["depup", "config", "--validate"]);
        assert_eq!(run_config(&options, &validate, dir.path()).unwrap(), 0);
    }

    #[test]
    fn working_dir_precedence() {
        let cwd = Path::new("/work");
        let explicit = Path::new("/explicit");
        let mut config = config::Config::default();
        assert_eq!(working_dir(None, &config, cwd), cwd);

        config.working_dir = Some("sub".into());
        assert_eq!(working_dir(None, &config, cwd), Path::new("/work/sub"));

        config.working_dir = Some("/srv".into());
        assert_eq!(working_dir(None, &config, cwd), Path::new("/srv"));

        assert_eq!(working_dir(Some(explicit), &config, cwd), explicit);
    }

}
