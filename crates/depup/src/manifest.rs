//! Rule-driven manifest discovery and table-driven parsing.
//!
//! Discovery expands each enabled rule's include globs over the working tree
//! and subtracts its exclude globs. Parsing is driven entirely by the rule's
//! parser descriptor; no parser is rule-specific except `raw`, which invokes
//! a rule-declared extraction command.
use crate::command::{CommandLine, CommandRunner, ExecContext};
use crate::config::rule::{ParserCfg, ParserFormat, Rule};
use crate::config::Config;
use crate::package::{Constraint, InstallStatus, Package, PackageType};
use std::path::{Path, PathBuf};

/// Errors during discovery or parsing.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// I/O error reading a manifest.
    #[error("failed to read {path:?}")]
    Io {
        /// The manifest path.
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// An include glob could not be expanded.
    #[error("invalid glob {pattern:?}")]
    Glob {
        /// The offending pattern.
        pattern: String,
        #[source]
        source: glob::PatternError,
    },
    /// A manifest is syntactically malformed. Aborts only that file.
    #[error("failed to parse {path:?}: {message}")]
    Parse {
        /// The manifest path.
        path: PathBuf,
        /// Format-specific detail.
        message: String,
    },
    /// The `raw` extraction command failed.
    #[error(transparent)]
    Command(#[from] crate::command::Error),
}

/// A manifest file matched by a rule.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ManifestFile {
    /// Rule id that matched the file.
    pub rule: String,
    /// Path relative to the working directory.
    pub path: PathBuf,
}

/// Expand every enabled rule's globs over `working_dir`.
///
/// Returned paths are relative to `working_dir`, sorted per rule.
///
/// # Errors
/// When an include pattern is invalid. Unreadable directories are skipped.
pub fn discover(config: &Config, working_dir: &Path) -> Result<Vec<ManifestFile>, Error> {
    let mut manifests = Vec::new();
    for (id, rule) in &config.rules {
        if !rule.enabled {
            continue;
        }
        let excludes: Vec<glob::Pattern> = rule
            .exclude
            .iter()
            .map(|pattern| {
                glob::Pattern::new(pattern).map_err(|source| Error::Glob {
                    pattern: pattern.clone(),
                    source,
                })
            })
            .collect::<Result<_, _>>()?;

        let mut matched = Vec::new();
        for pattern in &rule.include {
            let full = working_dir.join(pattern);
            let full = full.to_string_lossy();
            let paths = glob::glob(&full).map_err(|source| Error::Glob {
                pattern: pattern.clone(),
                source,
            })?;
            for path in paths.flatten() {
                if !path.is_file() {
                    continue;
                }
                let relative = path
                    .strip_prefix(working_dir)
                    .map(Path::to_path_buf)
                    .unwrap_or(path);
                if excludes.iter().any(|ex| ex.matches_path(&relative)) {
                    continue;
                }
                if !matched.contains(&relative) {
                    matched.push(relative);
                }
            }
        }
        matched.sort();
        manifests.extend(matched.into_iter().map(|path| ManifestFile {
            rule: id.clone(),
            path,
        }));
    }
    Ok(manifests)
}

/// Parse one manifest into packages with install-status `Missing`.
///
/// # Errors
/// `Error::Parse` when the file is malformed; the caller continues with the
/// remaining files.
pub async fn parse_manifest(
    rule_id: &str,
    rule: &Rule,
    manifest: &Path,
    runner: &dyn CommandRunner,
    ctx: &ExecContext,
) -> Result<Vec<Package>, Error> {
    let absolute = ctx.working_dir.join(manifest);
    let entries = match rule.parser.format {
        ParserFormat::Raw => raw_entries(&rule.parser, &absolute, runner, ctx).await?,
        _ => {
            let text =
                tokio::fs::read_to_string(&absolute)
                    .await
                    .map_err(|source| Error::Io {
                        path: absolute.clone(),
                        source,
                    })?;
            typed_entries(&text, &rule.parser).map_err(|message| Error::Parse {
                path: absolute.clone(),
                message,
            })?
        }
    };

    Ok(entries
        .into_iter()
        .map(|entry| {
            let (constraint, _) = Constraint::split(&entry.declared);
            let group = rule.group_for(&entry.name).map(String::from);
            Package {
                rule: rule_id.to_string(),
                manager: rule.manager.clone(),
                file: manifest.to_path_buf(),
                name: entry.name,
                declared: entry.declared,
                installed: None,
                constraint,
                kind: entry.kind,
                group,
                status: InstallStatus::Missing,
            }
        })
        .collect())
}

struct Entry {
    name: String,
    declared: String,
    kind: PackageType,
}

/// Parse manifest text under any structured format into entries.
fn typed_entries(text: &str, parser: &ParserCfg) -> Result<Vec<Entry>, String> {
    let value = match parser.format {
        ParserFormat::Json => {
            serde_json::from_str::<serde_json::Value>(text).map_err(|err| err.to_string())?
        }
        ParserFormat::Toml => {
            let value: toml::Value = toml::from_str(text).map_err(|err: toml::de::Error| err.to_string())?;
            serde_json::to_value(value).map_err(|err| err.to_string())?
        }
        ParserFormat::Yaml => {
            let value: serde_norway::Value =
                serde_norway::from_str(text).map_err(|err| err.to_string())?;
            serde_json::to_value(value).map_err(|err| err.to_string())?
        }
        ParserFormat::Xml => return xml_entries(text, parser),
        ParserFormat::Raw => return Err("raw format has no document to parse".to_string()),
    };
    Ok(structured_entries(&value, parser))
}

/// Parse lockfile-style documents into `(name, version)` pairs.
///
/// Shared with the installed-version resolver.
pub(crate) fn structured_text_entries(
    text: &str,
    parser: &ParserCfg,
) -> Result<Vec<(String, String)>, String> {
    Ok(typed_entries(text, parser)?
        .into_iter()
        .map(|entry| (entry.name, entry.declared))
        .collect())
}

/// Walk a dot-separated section path into a JSON-model document.
fn section_at<'v>(root: &'v serde_json::Value, path: &str) -> Option<&'v serde_json::Value> {
    let mut current = root;
    for segment in path.split('.') {
        current = current.get(segment)?;
    }
    Some(current)
}

fn declared_of(value: &serde_json::Value, version_field: &str) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Object(map) => match map.get(version_field) {
            Some(serde_json::Value::String(s)) => Some(s.clone()),
            Some(serde_json::Value::Number(n)) => Some(n.to_string()),
            _ => None,
        },
        _ => None,
    }
}

/// Extract entries from a JSON-model document per the parser's field map.
///
/// Each mapped section is either a `name -> requirement` map or an array of
/// records carrying the configured name and version fields.
fn structured_entries(root: &serde_json::Value, parser: &ParserCfg) -> Vec<Entry> {
    let mut entries = Vec::new();
    for (path, kind) in &parser.fields {
        let Some(section) = section_at(root, path) else {
            continue;
        };
        match section {
            serde_json::Value::Object(map) => {
                for (name, value) in map {
                    if let Some(declared) = declared_of(value, parser.version_field()) {
                        entries.push(Entry {
                            name: name.clone(),
                            declared,
                            kind: *kind,
                        });
                    }
                }
            }
            serde_json::Value::Array(items) => {
                for item in items {
                    let name = item
                        .get(parser.name_field())
                        .and_then(serde_json::Value::as_str);
                    let declared = item
                        .get(parser.version_field())
                        .and_then(serde_json::Value::as_str);
                    if let (Some(name), Some(declared)) = (name, declared) {
                        entries.push(Entry {
                            name: name.to_string(),
                            declared: declared.to_string(),
                            kind: *kind,
                        });
                    }
                }
            }
            _ => {}
        }
    }
    entries
}

/// Extract entries from an XML document.
///
/// A mapped section path names the record element (e.g.
/// `project.dependencies.dependency`); the configured name and version
/// fields name its child elements.
fn xml_entries(text: &str, parser: &ParserCfg) -> Result<Vec<Entry>, String> {
    use quick_xml::events::Event;

    let mut reader = quick_xml::Reader::from_str(text);
    reader.config_mut().trim_text(true);

    let mut entries = Vec::new();
    let mut stack: Vec<String> = Vec::new();
    let mut record: Option<(PackageType, indexmap::IndexMap<String, String>)> = None;
    let mut buf = Vec::new();

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|err| err.to_string())?;
        match event {
            Event::Start(start) => {
                let name = String::from_utf8_lossy(start.name().as_ref()).to_string();
                stack.push(name);
                let current = stack.join(".");
                if record.is_none() {
                    if let Some(kind) = parser.fields.get(&current) {
                        record = Some((*kind, indexmap::IndexMap::new()));
                    }
                }
            }
            Event::Text(text) => {
                if let Some((_, fields)) = record.as_mut() {
                    if let Some(element) = stack.last() {
                        let value = text
                            .unescape()
                            .map(|s| s.to_string())
                            .unwrap_or_default();
                        fields.entry(element.clone()).or_insert(value);
                    }
                }
            }
            Event::End(_) => {
                let closed = stack.join(".");
                if parser.fields.contains_key(&closed) {
                    if let Some((kind, fields)) = record.take() {
                        let name = fields.get(parser.name_field());
                        let declared = fields.get(parser.version_field());
                        if let (Some(name), Some(declared)) = (name, declared) {
                            entries.push(Entry {
                                name: name.clone(),
                                declared: declared.clone(),
                                kind,
                            });
                        }
                    }
                }
                stack.pop();
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(entries)
}

/// Run the rule's extraction command in the manifest's directory and parse
/// its output lines.
async fn raw_entries(
    parser: &ParserCfg,
    manifest: &Path,
    runner: &dyn CommandRunner,
    ctx: &ExecContext,
) -> Result<Vec<Entry>, Error> {
    let Some(command) = &parser.command else {
        return Ok(Vec::new());
    };
    let command = CommandLine::parse(command)?;
    let dir = manifest.parent().unwrap_or(&ctx.working_dir);
    let output = runner.run(&command, &ctx.in_dir(dir)).await?;
    Ok(name_version_lines(&output.stdout)
        .into_iter()
        .map(|(name, declared, kind)| Entry {
            name,
            declared,
            kind: kind.unwrap_or_default(),
        })
        .collect())
}

/// Parse whitespace-separated `name version [type]` lines.
///
/// Single-token `name==version` lines (pip freeze style) are accepted too.
/// Lines with no version and comment lines are skipped.
pub(crate) fn name_version_lines(output: &str) -> Vec<(String, String, Option<PackageType>)> {
    let mut rows = Vec::new();
    for line in output.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut tokens = line.split_whitespace();
        let Some(first) = tokens.next() else {
            continue;
        };
        let (name, version) = match tokens.next() {
            Some(second) => (first.to_string(), second.to_string()),
            None => match first.split_once("==") {
                Some((name, version)) => (name.to_string(), version.to_string()),
                None => continue,
            },
        };
        let kind = tokens.next().and_then(|t| t.parse().ok());
        rows.push((name, version, kind));
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::testing::FakeRunner;
    use crate::config::defaults;
    use indoc::indoc;
    use std::fs;

    #[test]
    fn discover_honors_excludes() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("app")).unwrap();
        fs::create_dir_all(dir.path().join("node_modules/dep")).unwrap();
        fs::write(dir.path().join("app/package.json"), "{}").unwrap();
        fs::write(dir.path().join("node_modules/dep/package.json"), "{}").unwrap();

        let config = defaults::config();
        let manifests = discover(&config, dir.path()).unwrap();
        let npm: Vec<_> = manifests.iter().filter(|m| m.rule == "npm").collect();
        assert_eq!(npm.len(), 1);
        assert_eq!(npm[0].path, PathBuf::from("app/package.json"));
    }

    #[tokio::test]
    async fn parses_package_json() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("package.json"),
            indoc! {r#"
                {
                  "dependencies": { "left-pad": "^1.0.0" },
                  "devDependencies": { "eslint": "~8.0.0" }
                }
            "#},
        )
        .unwrap();

        let config = defaults::config();
        let rule = &config.rules["npm"];
        let runner = FakeRunner::new(vec![]);
        let ctx = ExecContext::new(dir.path());
        let packages = parse_manifest("npm", rule, Path::new("package.json"), &runner, &ctx)
            .await
            .unwrap();

        assert_eq!(packages.len(), 2);
        assert_eq!(packages[0].name, "left-pad");
        assert_eq!(packages[0].constraint, Constraint::Caret);
        assert_eq!(packages[0].kind, PackageType::Prod);
        assert_eq!(packages[1].name, "eslint");
        assert_eq!(packages[1].kind, PackageType::Dev);
        assert_eq!(packages[1].status, InstallStatus::Missing);
    }

    #[tokio::test]
    async fn parses_cargo_toml_with_record_entries() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("Cargo.toml"),
            indoc! {r#"
                [dependencies]
                serde = { version = "1.0", features = ["derive"] }
                regex = "1"
            "#},
        )
        .unwrap();

        let config = defaults::config();
        let rule = &config.rules["cargo"];
        let runner = FakeRunner::new(vec![]);
        let ctx = ExecContext::new(dir.path());
        let packages = parse_manifest("cargo", rule, Path::new("Cargo.toml"), &runner, &ctx)
            .await
            .unwrap();

        let mut names: Vec<_> = packages.iter().map(|p| p.name.as_str()).collect();
        names.sort_unstable();
        assert_eq!(names, vec!["regex", "serde"]);
        let serde_dep = packages.iter().find(|p| p.name == "serde").unwrap();
        assert_eq!(serde_dep.declared, "1.0");
    }

    #[tokio::test]
    async fn malformed_manifest_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("package.json"), "{ not json").unwrap();

        let config = defaults::config();
        let rule = &config.rules["npm"];
        let runner = FakeRunner::new(vec![]);
        let ctx = ExecContext::new(dir.path());
        let err = parse_manifest("npm", rule, Path::new("package.json"), &runner, &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));
    }

    #[tokio::test]
    async fn raw_parser_runs_extraction_command() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("go.mod"), "module example.com/app\n").unwrap();

        let config = defaults::config();
        let rule = &config.rules["gomod"];
        let runner = FakeRunner::new(vec![FakeRunner::stdout(indoc! {"
            example.com/app
            github.com/pkg/errors v0.9.1
            golang.org/x/sync v0.7.0
        "})]);
        let ctx = ExecContext::new(dir.path());
        let packages = parse_manifest("gomod", rule, Path::new("go.mod"), &runner, &ctx)
            .await
            .unwrap();

        // the module's own line has no version and is skipped
        assert_eq!(packages.len(), 2);
        assert_eq!(packages[0].name, "github.com/pkg/errors");
        assert_eq!(packages[0].declared, "v0.9.1");
        assert_eq!(runner.calls.lock().unwrap().as_slice(), ["go list -m all"]);
    }

    #[tokio::test]
    async fn parses_maven_pom_xml() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("pom.xml"),
            indoc! {r#"
                <project>
                  <dependencies>
                    <dependency>
                      <groupId>org.apache.commons</groupId>
                      <artifactId>commons-lang3</artifactId>
                      <version>3.12.0</version>
                    </dependency>
                  </dependencies>
                </project>
            "#},
        )
        .unwrap();

        let rule = Rule {
            manager: "java".into(),
            include: vec!["**/pom.xml".into()],
            parser: ParserCfg {
                format: ParserFormat::Xml,
                fields: [(
                    "project.dependencies.dependency".to_string(),
                    PackageType::Prod,
                )]
                .into_iter()
                .collect(),
                name_field: Some("artifactId".into()),
                version_field: Some("version".into()),
                ..ParserCfg::default()
            },
            ..Rule::default()
        };
        let runner = FakeRunner::new(vec![]);
        let ctx = ExecContext::new(dir.path());
        let packages = parse_manifest("maven", &rule, Path::new("pom.xml"), &runner, &ctx)
            .await
            .unwrap();

        assert_eq!(packages.len(), 1);
        assert_eq!(packages[0].name, "commons-lang3");
        assert_eq!(packages[0].declared, "3.12.0");
    }

    #[test]
    fn name_version_line_variants() {
        let rows = name_version_lines(indoc! {"
            # comment
            left-pad 1.3.0 prod
            requests==2.31.0
            orphan
        "});
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].0, "left-pad");
        assert_eq!(rows[0].2, Some(PackageType::Prod));
        assert_eq!(rows[1], ("requests".into(), "2.31.0".into(), None));
    }
}
