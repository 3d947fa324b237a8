//! Timer argument parsing and display formatting.

/// Parses a pacing target written as `M.SS` or `MM.SS` into total seconds.
///
/// Both parts must be integers, minutes non-negative and seconds within
/// `0..=59`. Anything else yields `None`.
pub fn parse_time_arg(time: &str) -> Option<u64> {
    let mut parts = time.split('.');
    let (minutes, seconds) = match (parts.next(), parts.next(), parts.next()) {
        (Some(minutes), Some(seconds), None) => (minutes, seconds),
        _ => return None,
    };

    let minutes: i64 = minutes.parse().ok()?;
    let seconds: i64 = seconds.parse().ok()?;
    if minutes < 0 || !(0..=59).contains(&seconds) {
        return None;
    }

    u64::try_from(minutes * 60 + seconds).ok()
}

/// Renders the timer region text.
///
/// Without a target this is the elapsed stopwatch time. With a target it is
/// the signed countdown `target - elapsed`, prefixed with `-` once overrun.
pub fn format_timer(elapsed_seconds: u64, target_seconds: Option<u64>) -> String {
    match target_seconds {
        None => clock_text(elapsed_seconds),
        Some(target) => {
            let remaining = target as i128 - elapsed_seconds as i128;
            let text = clock_text(remaining.unsigned_abs() as u64);
            if remaining < 0 {
                format!("-{text}")
            } else {
                text
            }
        }
    }
}

fn clock_text(seconds: u64) -> String {
    format!("{}:{:02}", seconds / 60, seconds % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_short_and_long_minutes() {
        assert_eq!(parse_time_arg("5.30"), Some(330));
        assert_eq!(parse_time_arg("59.59"), Some(3599));
        assert_eq!(parse_time_arg("0.00"), Some(0));
        assert_eq!(parse_time_arg("12.05"), Some(725));
    }

    #[test]
    fn rejects_out_of_range_seconds() {
        assert_eq!(parse_time_arg("5.60"), None);
        assert_eq!(parse_time_arg("5.-1"), None);
        assert_eq!(parse_time_arg("-1.30"), None);
    }

    #[test]
    fn rejects_malformed_shapes() {
        assert_eq!(parse_time_arg("530"), None);
        assert_eq!(parse_time_arg("5:30"), None);
        assert_eq!(parse_time_arg("1.2.3"), None);
        assert_eq!(parse_time_arg("a.30"), None);
        assert_eq!(parse_time_arg("5."), None);
        assert_eq!(parse_time_arg(""), None);
    }

    #[test]
    fn formats_elapsed_time() {
        assert_eq!(format_timer(90, None), "1:30");
        assert_eq!(format_timer(0, None), "0:00");
        assert_eq!(format_timer(3605, None), "60:05");
    }

    #[test]
    fn formats_countdown_and_overrun() {
        assert_eq!(format_timer(30, Some(90)), "1:00");
        assert_eq!(format_timer(100, Some(30)), "-1:10");
        assert_eq!(format_timer(30, Some(30)), "0:00");
        assert_eq!(format_timer(31, Some(30)), "-0:01");
    }
}
