//! Logging initialization.

use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use crate::config::LoggingConfig;

/// Directives appended to the configured level so dependency chatter stays
/// out of the dispatcher's logs.
const QUIET_DEPENDENCIES: &[&str] = &["sqlx=warn", "lettre=warn", "hyper=warn", "reqwest=warn"];

/// Filter from `RUST_LOG` if set, otherwise from the configured level.
fn build_filter(level: &str) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }

    QUIET_DEPENDENCIES.iter().fold(EnvFilter::new(level), |filter, directive| {
        match directive.parse() {
            Ok(directive) => filter.add_directive(directive),
            Err(_) => filter,
        }
    })
}

/// Install the global subscriber. `format` is `json`, `compact` or anything
/// else for human-readable multi-line output.
pub fn init_logging(config: &LoggingConfig) {
    let subscriber = tracing_subscriber::registry().with(build_filter(&config.level));

    match config.format.as_str() {
        "json" => {
            let json_layer = fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_list(false)
                .with_target(true);
            subscriber.with(json_layer).init();
        }
        "compact" => {
            let compact_layer = fmt::layer().compact().with_target(false);
            subscriber.with(compact_layer).init();
        }
        _ => {
            let pretty_layer = fmt::layer()
                .pretty()
                .with_span_events(FmtSpan::CLOSE)
                .with_target(true);
            subscriber.with(pretty_layer).init();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quiet_dependency_directives_parse() {
        for directive in QUIET_DEPENDENCIES {
            assert!(
                directive.parse::<tracing_subscriber::filter::Directive>().is_ok(),
                "{}",
                directive
            );
        }
    }

    #[test]
    fn test_build_filter_includes_level() {
        if std::env::var("RUST_LOG").is_ok() {
            return;
        }
        let filter = build_filter("debug").to_string();
        assert!(filter.contains("debug"));
        assert!(filter.contains("sqlx=warn"));
    }
}
