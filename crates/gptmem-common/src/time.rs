use chrono::{SecondsFormat, Utc};

/// Current UTC time as an ISO-8601 string. Values produced here sort
/// lexicographically in chronological order.
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[cfg(test)]
mod tests {
    use super::now_timestamp;

    #[test]
    fn timestamps_sort_chronologically() {
        let first = now_timestamp();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let second = now_timestamp();

        assert!(first < second, "{first} should sort before {second}");
        assert!(first.ends_with('Z'));
    }
}
