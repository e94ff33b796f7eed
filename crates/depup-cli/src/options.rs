use clap::Parser;
use depup::classify::Selection;
use depup::config::system_tests::RunMode;
use depup::filter::Filters;
use depup::output::OutputFormat;
use depup::package::PackageType;
use std::path::PathBuf;

/// Logging flags to `#[command(flatten)]` into the CLI.
#[derive(clap::Args, Debug, Clone, Copy, Default)]
pub struct Verbosity {
    #[arg(
        long,
        short = 'v',
        action = clap::ArgAction::Count,
        global = true,
        help = "Increase logging verbosity",
    )]
    pub verbose: u8,

    #[arg(
        long,
        short = 'q',
        action = clap::ArgAction::Count,
        global = true,
        help = "Decrease logging verbosity",
        conflicts_with = "verbose",
    )]
    pub quiet: u8,
}

#[derive(Parser, Debug, Clone)]
#[clap(
    name = "depup",
    version = option_env!("CARGO_PKG_VERSION").unwrap_or("unknown"),
    about = "multi-ecosystem dependency update orchestrator",
)]
pub struct Options {
    #[clap(
        long = "directory",
        short = 'd',
        global = true,
        help = "working tree to operate on",
        env = "DEPUP_DIRECTORY"
    )]
    pub directory: Option<PathBuf>,

    #[clap(
        long = "config",
        global = true,
        help = "config file to read rules from",
        env = "DEPUP_CONFIG"
    )]
    pub config: Option<PathBuf>,

    #[arg(
        long = "log",
        global = true,
        env = "DEPUP_LOG_LEVEL",
        aliases = ["log-level"],
        help = "Log level; RUST_LOG overrides this option when set"
    )]
    pub log_level: Option<tracing::metadata::Level>,

    #[command(flatten)]
    pub verbosity: Verbosity,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(clap::Subcommand, Debug, Clone)]
pub enum Command {
    /// Inspect, scaffold, or validate configuration
    #[clap(name = "config")]
    Config(ConfigOpts),
    /// List detected manifest files
    #[clap(name = "scan")]
    Scan(ScanOpts),
    /// List discovered packages
    #[clap(name = "list")]
    List(ListOpts),
    /// Check for newer versions
    #[clap(name = "outdated")]
    Outdated(OutdatedOpts),
    /// Apply updates through each ecosystem's native tool
    #[clap(name = "update")]
    Update(UpdateOpts),
}

#[derive(clap::Args, Debug, Clone, Default)]
pub struct ConfigOpts {
    #[clap(long = "init", help = "write the default config to .depup.yml")]
    pub init: bool,

    #[clap(long = "show-defaults", help = "print the built-in default config")]
    pub show_defaults: bool,

    #[clap(long = "show-effective", help = "print the effective config after inheritance")]
    pub show_effective: bool,

    #[clap(long = "validate", help = "validate the config, reporting errors and warnings")]
    pub validate: bool,
}

/// Filter flags shared by `list`, `outdated`, and `update`.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct FilterOpts {
    #[clap(long = "name", help = "package name or glob")]
    pub name: Vec<String>,

    #[clap(long = "type", value_name = "TYPE", help = "prod, dev, peer, or optional")]
    pub r#type: Vec<PackageType>,

    #[clap(long = "package-manager", help = "ecosystem family label (js, php, mod, ...)")]
    pub package_manager: Vec<String>,

    #[clap(long = "rule", help = "rule id")]
    pub rule: Vec<String>,

    #[clap(long = "group", help = "group label")]
    pub group: Vec<String>,

    #[clap(long = "file", help = "manifest path or glob")]
    pub file: Vec<String>,

    #[clap(value_name = "PATH", help = "file-path patterns restricting the run")]
    pub paths: Vec<String>,
}

impl FilterOpts {
    pub fn filters(&self) -> Filters {
        let mut files = self.file.clone();
        files.extend(self.paths.iter().cloned());
        Filters {
            names: self.name.clone(),
            types: self.r#type.clone(),
            managers: self.package_manager.clone(),
            rules: self.rule.clone(),
            groups: self.group.clone(),
            files,
        }
    }
}

#[derive(clap::Args, Debug, Clone, Default)]
pub struct ScanOpts {
    #[clap(value_name = "PATH", help = "file-path patterns restricting the scan")]
    pub paths: Vec<String>,
}

#[derive(clap::Args, Debug, Clone, Default)]
pub struct ListOpts {
    #[command(flatten)]
    pub filters: FilterOpts,
}

#[derive(clap::Args, Debug, Clone, Default)]
pub struct OutdatedOpts {
    #[command(flatten)]
    pub filters: FilterOpts,

    #[clap(long = "major", help = "target the major slot")]
    pub major: bool,

    #[clap(long = "minor", help = "target the minor slot")]
    pub minor: bool,

    #[clap(long = "patch", help = "target the patch slot")]
    pub patch: bool,

    #[clap(long = "no-timeout", help = "disable command deadlines")]
    pub no_timeout: bool,

    #[clap(long = "skip-preflight", help = "skip required-binary checks")]
    pub skip_preflight: bool,

    #[clap(long = "continue-on-fail", help = "keep going after per-package failures")]
    pub continue_on_fail: bool,

    #[clap(long = "output", value_name = "FORMAT", help = "json, csv, or xml instead of the table")]
    pub output: Option<OutputFormat>,
}

#[derive(clap::Args, Debug, Clone, Default)]
pub struct UpdateOpts {
    #[command(flatten)]
    pub outdated: OutdatedOpts,

    #[clap(long = "dry-run", help = "plan updates without running commands")]
    pub dry_run: bool,

    #[clap(long = "skip-lock", help = "skip each rule's lock command")]
    pub skip_lock: bool,

    #[clap(long = "yes", short = 'y', help = "apply without confirmation")]
    pub yes: bool,

    #[clap(long = "skip-system-tests", help = "skip the configured system-test suite")]
    pub skip_system_tests: bool,

    #[clap(
        long = "system-test-mode",
        value_name = "MODE",
        help = "override the configured run mode (preflight, after_each, after_all, none)"
    )]
    pub system_test_mode: Option<String>,

    #[clap(long = "incremental", help = "step to the next version instead of the latest")]
    pub incremental: bool,
}

impl OutdatedOpts {
    pub fn selection(&self) -> Selection {
        Selection {
            major: self.major,
            minor: self.minor,
            patch: self.patch,
        }
    }
}

pub fn parse_run_mode(mode: &str) -> Result<RunMode, String> {
    match mode {
        m if m.eq_ignore_ascii_case("preflight") => Ok(RunMode::Preflight),
        m if m.eq_ignore_ascii_case("after_each") => Ok(RunMode::AfterEach),
        m if m.eq_ignore_ascii_case("after_all") => Ok(RunMode::AfterAll),
        m if m.eq_ignore_ascii_case("none") => Ok(RunMode::None),
        other => Err(format!("unknown system-test mode: {other:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn parses_outdated_flags() {
        let options = Options::parse_from([
            "depup",
            "outdated",
            "--minor",
            "--continue-on-fail",
            "--output",
            "json",
            "--name",
            "left-pad",
            "frontend/**",
        ]);
        let Command::Outdated(outdated) = options.command else {
            panic!("expected outdated");
        };
        assert!(outdated.minor);
        assert!(outdated.continue_on_fail);
        assert_eq!(outdated.output, Some(OutputFormat::Json));
        let filters = outdated.filters.filters();
        assert_eq!(filters.names, vec!["left-pad".to_string()]);
        assert_eq!(filters.files, vec!["frontend/**".to_string()]);
    }

    #[test]
    fn parses_update_flags() {
        let options = Options::parse_from([
            "depup", "update", "--dry-run", "--yes", "--incremental", "--skip-lock",
        ]);
        let Command::Update(update) = options.command else {
            panic!("expected update");
        };
        assert!(update.dry_run && update.yes && update.incremental && update.skip_lock);
    }

    #[test]
    fn run_mode_parsing() {
        assert_eq!(parse_run_mode("after_each").unwrap(), RunMode::AfterEach);
        assert!(parse_run_mode("sometimes").is_err());
    }
}
