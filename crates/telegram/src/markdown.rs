//! Telegram `MarkdownV2` formatting.
//!
//! Every outbound message is sent with `parse_mode = MarkdownV2`, so any raw
//! text has to be escaped exactly once before it leaves the process.

/// Telegram's limit on the length of a message's text.
pub const TELEGRAM_MAX_MESSAGE_LEN: usize = 4096;

/// Characters that must be backslash-escaped in `MarkdownV2` text.
pub const MARKDOWN_V2_SPECIAL: [char; 18] = [
    '_', '*', '[', ']', '(', ')', '~', '`', '>', '#', '+', '-', '=', '|', '{', '}', '.', '!',
];

/// Escape `text` for embedding in a `MarkdownV2` message.
///
/// Each character of [`MARKDOWN_V2_SPECIAL`] gets one preceding backslash;
/// everything else is copied unchanged. Escaping already escaped text
/// escapes it twice.
pub fn escape_markdown_v2(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + text.len() / 4);
    for c in text.chars() {
        if MARKDOWN_V2_SPECIAL.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// `*<owner>:*` header followed by the answer on its own line.
pub fn format_reply(owner: &str, answer: &str) -> String {
    format!(
        "*{}:*\n{}",
        escape_markdown_v2(owner),
        escape_markdown_v2(answer)
    )
}

/// Render a labelled reply as one or more messages.
///
/// The raw answer is split first and each part escaped afterwards, so an
/// escape sequence is never cut in half. Only the first part carries the
/// owner header.
pub fn reply_messages(owner: &str, answer: &str, max_len: usize) -> Vec<String> {
    // `owner` + ":\n"
    let body_len = max_len.saturating_sub(owner.len() + 2).max(1);
    chunk_message(answer, body_len)
        .into_iter()
        .enumerate()
        .map(|(i, part)| {
            if i == 0 {
                format_reply(owner, &part)
            } else {
                escape_markdown_v2(&part)
            }
        })
        .collect()
}

/// Render unlabelled text as one or more escaped messages.
pub fn text_messages(text: &str, max_len: usize) -> Vec<String> {
    chunk_message(text, max_len)
        .iter()
        .map(|part| escape_markdown_v2(part))
        .collect()
}

/// Split text into chunks that fit within Telegram's message limit.
/// Tries to split at newlines or spaces to avoid breaking words.
pub fn chunk_message(text: &str, max_len: usize) -> Vec<String> {
    if max_len == 0 {
        return Vec::new();
    }

    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        if remaining.len() <= max_len {
            chunks.push(remaining.to_string());
            break;
        }

        let mut split_window_end = remaining.floor_char_boundary(max_len);
        if split_window_end == 0 {
            split_window_end = remaining
                .chars()
                .next()
                .map(char::len_utf8)
                .unwrap_or(remaining.len());
        }

        let slice = &remaining[..split_window_end];
        let split_at = match slice.rfind('\n').or_else(|| slice.rfind(' ')) {
            Some(0) | None => split_window_end,
            Some(idx) => idx,
        };

        chunks.push(remaining[..split_at].to_string());
        remaining = remaining[split_at..].trim_start_matches('\n');
        if let Some(rest) = remaining.strip_prefix(' ') {
            remaining = rest;
        }
    }

    chunks
}
