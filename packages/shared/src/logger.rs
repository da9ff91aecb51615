//! Logging setup utilities for SurveyLink binaries.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber with the specified default log level.
///
/// The filter enables `default_log_level` for every crate in `crate_names`,
/// for the binary itself and for this crate. It can be overridden using the
/// `RUST_LOG` environment variable.
///
/// # Arguments
///
/// * `binary_name` - The name of the binary (e.g., "surveylink-chat")
/// * `crate_names` - Library crates whose logs should be shown
/// * `default_log_level` - The default log level (e.g., "debug", "info", "warn", "error")
///
/// # Examples
///
/// ```no_run
/// use surveylink_shared::logger::setup_logger;
///
/// setup_logger("surveylink-chat", &["surveylink_chat"], "info");
/// ```
pub fn setup_logger(binary_name: &str, crate_names: &[&str], default_log_level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter(binary_name, crate_names, default_log_level).into());
    let directives = filter.to_string();

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::debug!("Logger initialized for {} with filter {}", binary_name, directives);
}

/// Build the default `EnvFilter` directive string.
///
/// Names are normalized to crate form (`-` becomes `_`) and listed once.
fn default_filter(binary_name: &str, crate_names: &[&str], default_log_level: &str) -> String {
    let mut targets: Vec<String> = Vec::new();
    let names = std::iter::once(binary_name)
        .chain(crate_names.iter().copied())
        .chain(std::iter::once(env!("CARGO_PKG_NAME")));
    for name in names {
        let target = name.replace('-', "_");
        if !targets.contains(&target) {
            targets.push(target);
        }
    }

    targets
        .iter()
        .map(|target| format!("{}={}", target, default_log_level))
        .collect::<Vec<_>>()
        .join(",")
}
