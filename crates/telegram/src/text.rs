//! Telegram length limits.

/// Longest text message Telegram accepts, in characters.
pub const MAX_MESSAGE_CHARS: usize = 4096;

/// Longest photo/document caption Telegram accepts, in characters.
pub const MAX_CAPTION_CHARS: usize = 1024;

/// Split `text` into chunks of at most `max_chars` characters.
///
/// Prefers breaking at the last newline, then the last space, inside each
/// window; the separator itself is dropped. Words longer than a window are
/// cut at the character limit.
pub fn chunk_message(text: &str, max_chars: usize) -> Vec<String> {
    if max_chars == 0 {
        return Vec::new();
    }

    let mut chunks = Vec::new();
    let mut remaining = text;
    loop {
        let Some((window_end, _)) = remaining.char_indices().nth(max_chars) else {
            chunks.push(remaining.to_string());
            break;
        };

        let window = &remaining[..window_end];
        let separator = window
            .rfind('\n')
            .or_else(|| window.rfind(' '))
            .filter(|&at| at > 0);
        let (chunk, rest) = match separator {
            Some(at) => (&remaining[..at], &remaining[at + 1..]),
            None => remaining.split_at(window_end),
        };

        chunks.push(chunk.to_string());
        if rest.is_empty() {
            break;
        }
        remaining = rest;
    }
    chunks
}

/// Cut `caption` to `max_chars` characters, ending with `…` when shortened.
pub fn truncate_caption(caption: &str, max_chars: usize) -> String {
    if caption.chars().count() <= max_chars {
        return caption.to_string();
    }
    let mut out: String = caption.chars().take(max_chars.saturating_sub(1)).collect();
    out.push('…');
    out
}
