/// Shared utility functions

/// Truncate a string to at most `max_chars` characters (not bytes)
pub fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((end, _)) => &s[..end],
        None => s,
    }
}

/// Owned variant of [`truncate_chars`] that avoids a copy when nothing is cut
pub fn truncate_owned(mut s: String, max_chars: usize) -> String {
    if let Some((end, _)) = s.char_indices().nth(max_chars) {
        s.truncate(end);
    }
    s
}

/// Decode bytes one-to-one into chars (ISO-8859-1), so every byte value survives
pub fn latin1_to_string(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

/// Human-readable byte size: `512 B`, `1.5 KB`, `2.0 MB`
pub fn size_label(size: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = 1024 * 1024;
    if size < KB {
        format!("{} B", size)
    } else if size < MB {
        format!("{:.1} KB", size as f64 / KB as f64)
    } else {
        format!("{:.1} MB", size as f64 / MB as f64)
    }
}
