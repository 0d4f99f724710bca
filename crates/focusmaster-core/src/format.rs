//! Formatting utilities

use chrono::{DateTime, Local, Utc};

/// Format a whole number of minutes as "Xh Ym" or "Ym"
pub fn minutes(total: u32) -> String {
    if total < 60 {
        format!("{}m", total)
    } else {
        format!("{}h {}m", total / 60, total % 60)
    }
}

/// Format remaining seconds as a MM:SS countdown
pub fn countdown(seconds: u32) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

/// Format an instant as local HH:MM
pub fn clock_time(dt: DateTime<Utc>) -> String {
    dt.with_timezone(&Local).format("%H:%M").to_string()
}
