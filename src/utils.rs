/// Utility functions for formatting and diagnostics
use time::macros::format_description;
use time::OffsetDateTime;

use crate::config::TagConfig;
use crate::models::Reading;

/// Format a timestamp for human-readable logging
///
/// Converts an OffsetDateTime to DD.MM.YYYY - HH:MM:SS format
/// Falls back to default string representation if formatting fails.
pub fn format_datetime(dt: &OffsetDateTime) -> String {
    let format = format_description!("[day].[month].[year] - [hour]:[minute]:[second]");
    dt.format(format).unwrap_or_else(|_| dt.to_string())
}

/// Convert a time::Duration to whole seconds, negative durations count as zero
pub fn duration_to_seconds(duration: time::Duration) -> u64 {
    duration.whole_seconds().max(0) as u64
}

/// Message shown once for a tag that is broadcasting but not configured
///
/// Includes the current reading and a configuration snippet the user can
/// paste into the JSON config file.
pub fn describe_unconfigured_tag(tag_id: &str, reading: &Reading) -> String {
    let data = serde_json::to_string(reading).unwrap_or_default();
    let example = serde_json::to_string(&TagConfig::with_defaults(tag_id, "some-name")).unwrap_or_default();

    [
        format!("Unconfigured tag {}: {}", tag_id, data),
        "This will only be shown once per tag. To publish it to Home Assistant add it to RUUVI_TAGS, or to the tags of the RUUVI_CONFIG file:".to_string(),
        format!("  {}", example),
    ]
    .join("\n")
}
