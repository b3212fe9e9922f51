use chrono::{DateTime, Utc};

/// Short age of a post: "Just now", "5m", "3h", "2d", then the calendar date.
/// A pending timestamp counts as just now.
pub fn format_relative(timestamp: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    let Some(timestamp) = timestamp else {
        return "Just now".to_string();
    };

    let seconds = (now - timestamp).num_seconds();
    match seconds {
        s if s < 60 => "Just now".to_string(),
        s if s < 3_600 => format!("{}m", s / 60),
        s if s < 86_400 => format!("{}h", s / 3_600),
        s if s < 604_800 => format!("{}d", s / 86_400),
        _ => timestamp.format("%b %-d, %Y").to_string(),
    }
}

/// "Joined" date on the profile page.
pub fn format_account_date(timestamp: Option<DateTime<Utc>>) -> String {
    match timestamp {
        Some(ts) => ts.format("%B %Y").to_string(),
        None => "Recently".to_string(),
    }
}
