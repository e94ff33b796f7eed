use color_eyre::eyre;
use tracing_subscriber::layer::SubscriberExt;

/// Setup logging.
///
/// Diagnostics always go to stderr so the primary stream stays free for
/// tables and structured documents.
///
/// # Errors
/// - If the logging directive cannot be parsed.
/// - If the global tracing subscriber cannot be installed.
pub fn setup(log_level: Option<tracing::metadata::Level>, verbose: u8) -> eyre::Result<()> {
    let default_log_level = log_level.unwrap_or(match verbose {
        0 => tracing::metadata::Level::WARN,
        1 => tracing::metadata::Level::INFO,
        2 => tracing::metadata::Level::DEBUG,
        _ => tracing::metadata::Level::TRACE,
    });
    let default_log_directive = format!(
        "none,depup={level},depup_cli={level}",
        level = default_log_level.to_string().to_ascii_lowercase()
    );
    let default_env_filter = tracing_subscriber::filter::EnvFilter::builder()
        .with_regex(true)
        .with_default_directive(default_log_level.into())
        .parse(default_log_directive)?;

    let env_filter = match std::env::var("RUST_LOG").ok() {
        Some(directive) => {
            match tracing_subscriber::filter::EnvFilter::try_new(&directive) {
                Ok(env_filter) => env_filter,
                Err(err) => {
                    eprintln!("invalid log filter: {err}");
                    eprintln!("falling back to default logging");
                    default_env_filter
                }
            }
        }
        None => default_env_filter,
    };

    let use_color = {
        use std::io::IsTerminal;
        std::io::stderr().is_terminal()
    };

    let fmt_layer = tracing_subscriber::fmt::Layer::new()
        .compact()
        .without_time()
        .with_ansi(use_color)
        .with_writer(std::io::stderr);

    let subscriber = tracing_subscriber::registry().with(fmt_layer).with(env_filter);
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}
