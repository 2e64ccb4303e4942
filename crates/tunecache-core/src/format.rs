//! Display helpers for session listings.

/// Human-readable byte size using decimal (1000-based) units, e.g. `4.2MB`.
pub fn human_size(bytes: i64) -> String {
    const UNITS: [&str; 8] = ["", "K", "M", "G", "T", "P", "E", "Z"];
    let mut num = bytes as f64;
    for unit in UNITS {
        if num.abs() < 1000.0 {
            return format!("{:3.1}{}B", num, unit);
        }
        num /= 1000.0;
    }
    format!("{:.1}YiB", num)
}

/// `HH:MM:SS` rendering of a duration in seconds.
pub fn clock_duration(seconds: i64) -> String {
    let seconds = seconds.max(0);
    format!(
        "{:02}:{:02}:{:02}",
        seconds / 3600,
        (seconds % 3600) / 60,
        seconds % 60
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes() {
        assert_eq!(human_size(0), "0.0B");
        assert_eq!(human_size(999), "999.0B");
        assert_eq!(human_size(1_500), "1.5KB");
        assert_eq!(human_size(4_200_000), "4.2MB");
    }

    #[test]
    fn durations() {
        assert_eq!(clock_duration(0), "00:00:00");
        assert_eq!(clock_duration(213), "00:03:33");
        assert_eq!(clock_duration(3_723), "01:02:03");
        assert_eq!(clock_duration(-5), "00:00:00");
    }
}
