use mqttgram_common::SubscriberId;

/// Check whether a chat may subscribe.
///
/// An empty allowlist means everyone is allowed (open policy). Entries are
/// matched against the numeric chat id and, when present, the username
/// (with or without a leading `@`), case-insensitively. `*` matches any
/// run of characters.
pub fn is_allowed(chat_id: SubscriberId, username: Option<&str>, allowlist: &[String]) -> bool {
    if allowlist.is_empty() {
        return true;
    }
    let id = chat_id.to_string();
    let username = username.map(|u| u.trim_start_matches('@').to_lowercase());

    allowlist.iter().any(|entry| {
        let pattern = entry.trim().trim_start_matches('@').to_lowercase();
        matches_entry(&pattern, &id)
            || username
                .as_deref()
                .is_some_and(|name| matches_entry(&pattern, name))
    })
}

fn matches_entry(pattern: &str, candidate: &str) -> bool {
    if pattern.contains('*') {
        glob_match(pattern, candidate)
    } else {
        pattern == candidate
    }
}

/// Glob matching where `*` stands for any (possibly empty) sequence.
fn glob_match(pattern: &str, text: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    let (Some(first), Some(last)) = (parts.first(), parts.last()) else {
        return pattern == text;
    };
    if parts.len() == 1 {
        return pattern == text;
    }
    if !text.starts_with(first) {
        return false;
    }

    let mut pos = first.len();
    for part in &parts[1..parts.len() - 1] {
        match text[pos..].find(part) {
            Some(idx) => pos += idx + part.len(),
            None => return false,
        }
    }
    text.len() - pos >= last.len() && text.ends_with(last)
}
