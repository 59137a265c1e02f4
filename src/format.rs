// Display helpers for fetched repository data.
// Pure functions over already-fetched values; no cache or network state.

use chrono::{DateTime, Utc};

/// Compact a count for display: 1234 becomes "1.2k".
pub fn compact_number(value: u64) -> String {
    if value >= 1000 {
        format!("{:.1}k", value as f64 / 1000.0)
    } else {
        value.to_string()
    }
}

/// Render a timestamp as a coarse relative age, e.g. "3 days ago".
pub fn relative_date(date: DateTime<Utc>) -> String {
    let days = (Utc::now() - date).num_days().max(0);
    if days == 0 {
        "today".to_string()
    } else if days == 1 {
        "yesterday".to_string()
    } else if days < 7 {
        format!("{days} days ago")
    } else if days < 30 {
        ago(days / 7, "week")
    } else if days < 365 {
        ago(days / 30, "month")
    } else {
        ago(days / 365, "year")
    }
}

fn ago(count: i64, unit: &str) -> String {
    if count == 1 {
        format!("1 {unit} ago")
    } else {
        format!("{count} {unit}s ago")
    }
}

/// GitHub-style hex color for a programming language; unknown languages
/// get the neutral gray.
pub fn language_color(language: Option<&str>) -> &'static str {
    match language {
        Some("JavaScript") => "#f1e05a",
        Some("TypeScript") => "#3178c6",
        Some("Python") => "#3572A5",
        Some("Java") => "#b07219",
        Some("C++") => "#f34b7d",
        Some("C") => "#555555",
        Some("Go") => "#00ADD8",
        Some("Rust") => "#dea584",
        Some("PHP") => "#4F5D95",
        Some("Ruby") => "#701516",
        Some("Swift") => "#ffac45",
        Some("Kotlin") => "#A97BFF",
        Some("Dart") => "#00B4AB",
        Some("Vue") => "#41b883",
        Some("HTML") => "#e34c26",
        Some("CSS") => "#563d7c",
        Some("Shell") => "#89e051",
        _ => "#8b949e",
    }
}
