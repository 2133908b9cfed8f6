//! MQTT topic filter helpers.

/// Whether `topic` matches the subscription `filter`.
///
/// `+` matches exactly one level, a trailing `#` matches the parent level
/// and everything below it. Topics starting with `$` are not matched by a
/// leading wildcard.
pub fn topic_matches(filter: &str, topic: &str) -> bool {
    if topic.starts_with('$') && (filter.starts_with('+') || filter.starts_with('#')) {
        return false;
    }

    let mut filter_levels = filter.split('/');
    let mut topic_levels = topic.split('/');
    loop {
        match (filter_levels.next(), topic_levels.next()) {
            (Some("#"), _) => return filter_levels.next().is_none(),
            (Some("+"), Some(_)) => {},
            (Some(f), Some(t)) if f == t => {},
            (None, None) => return true,
            _ => return false,
        }
    }
}

/// Topic used for the bridge's retained last-will message.
///
/// The concrete prefix of the subscription filter, followed by `status`:
/// `agentdvr/#` gives `agentdvr/status`. Falls back to `mqttgram/status`
/// when the filter starts with a wildcard.
pub fn status_topic(filter: &str) -> String {
    let prefix: Vec<&str> = filter
        .split('/')
        .take_while(|level| *level != "+" && *level != "#" && !level.is_empty())
        .collect();
    if prefix.is_empty() {
        "mqttgram/status".to_string()
    } else {
        format!("{}/status", prefix.join("/"))
    }
}
