use clustersched::cli::LogLevel;
use clustersched::logging::filter_directive;

#[test]
fn cli_level_wins_over_environment() {
    assert_eq!(filter_directive(Some(LogLevel::Debug), Some("warn")), "debug");
    assert_eq!(filter_directive(Some(LogLevel::Trace), None), "trace");
}

#[test]
fn environment_directive_is_used_verbatim() {
    assert_eq!(
        filter_directive(None, Some(" info,clustersched::engine=trace ")),
        "info,clustersched::engine=trace"
    );
}

#[test]
fn blank_or_missing_environment_falls_back_to_info() {
    assert_eq!(filter_directive(None, None), "info");
    assert_eq!(filter_directive(None, Some("   ")), "info");
}

#[test]
fn log_level_maps_onto_tracing_levels() {
    assert_eq!(tracing::Level::from(LogLevel::Warn), tracing::Level::WARN);
    assert_eq!(tracing::Level::from(LogLevel::Error), tracing::Level::ERROR);
}
