//! Formatting utilities for durations and build reports.

use std::time::Duration;

use gaffer_bundler::{BuildReporter, BuildStats, ReportOptions};

/// Format duration in human-readable format.
///
/// ```
/// use std::time::Duration;
/// use gaffer_cli::ui::format_duration;
///
/// assert_eq!(format_duration(Duration::from_millis(50)), "50ms");
/// assert_eq!(format_duration(Duration::from_millis(1500)), "1.50s");
/// assert_eq!(format_duration(Duration::from_secs(90)), "1m 30s");
/// ```
pub fn format_duration(duration: Duration) -> String {
    let total_ms = duration.as_millis();

    if total_ms < 1000 {
        format!("{}ms", total_ms)
    } else if total_ms < 60_000 {
        format!("{:.2}s", duration.as_secs_f64())
    } else {
        let secs = duration.as_secs();
        format!("{}m {}s", secs / 60, secs % 60)
    }
}

/// Render a build pass and print it to stdout.
///
/// Every pass is printed, successful or not.
pub fn print_report(stats: &BuildStats, options: &ReportOptions) {
    println!("{}\n", BuildReporter::format(stats, options));
}
