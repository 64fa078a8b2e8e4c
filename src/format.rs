use chrono::{DateTime, Utc};

/// Human-readable size using 1024-based units with at most two decimals,
/// e.g. "1.5 KB".
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["Bytes", "KB", "MB", "GB", "TB"];

    if bytes == 0 {
        return "0 Bytes".to_owned();
    }

    let mut exponent = 0;
    let mut value = bytes as f64;
    while value >= 1024.0 && exponent < UNITS.len() - 1 {
        value /= 1024.0;
        exponent += 1;
    }
    let rounded = (value * 100.0).round() / 100.0;

    // Trim trailing zeros: 1.50 -> 1.5, 2.00 -> 2
    let mut text = format!("{rounded:.2}");
    while text.ends_with('0') {
        text.pop();
    }
    if text.ends_with('.') {
        text.pop();
    }

    format!("{text} {}", UNITS[exponent])
}

/// Signed variant for savings that may be negative.
pub fn format_signed_bytes(bytes: i64) -> String {
    if bytes < 0 {
        format!("-{}", format_bytes(bytes.unsigned_abs()))
    } else {
        format_bytes(bytes as u64)
    }
}

pub fn format_date(at: &DateTime<Utc>) -> String {
    at.format("%b %-d, %Y %H:%M").to_string()
}

/// Percentage with at most one decimal, e.g. "69.9%".
pub fn format_percent(value: f64) -> String {
    let rounded = (value * 10.0).round() / 10.0;
    if rounded.fract() == 0.0 {
        format!("{rounded:.0}%")
    } else {
        format!("{rounded:.1}%")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn bytes_are_scaled_and_trimmed() {
        assert_eq!(format_bytes(0), "0 Bytes");
        assert_eq!(format_bytes(512), "512 Bytes");
        assert_eq!(format_bytes(1024), "1 KB");
        assert_eq!(format_bytes(1536), "1.5 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5 MB");
        assert_eq!(format_bytes(1_234_567), "1.18 MB");
    }

    #[test]
    fn negative_savings_keep_their_sign() {
        assert_eq!(format_signed_bytes(-2048), "-2 KB");
        assert_eq!(format_signed_bytes(2048), "2 KB");
    }

    #[test]
    fn dates_are_short_and_readable() {
        let at = Utc.with_ymd_and_hms(2024, 6, 1, 9, 5, 0).unwrap();
        assert_eq!(format_date(&at), "Jun 1, 2024 09:05");
    }

    #[test]
    fn percentages_drop_needless_decimals() {
        assert_eq!(format_percent(75.0), "75%");
        assert_eq!(format_percent(69.999), "70%");
        assert_eq!(format_percent(66.66), "66.7%");
        assert_eq!(format_percent(-12.5), "-12.5%");
    }
}
