// src/util.rs — Shared string helpers

/// Longest prefix of `s` that fits in `max_len` bytes without splitting a
/// char. Used for display and log lines.
pub fn truncate_str(s: &str, max_len: usize) -> &str {
    let end = (0..=max_len.min(s.len()))
        .rev()
        .find(|&i| s.is_char_boundary(i))
        .unwrap_or(0);
    &s[..end]
}

/// Longest suffix of `s` that fits in `max_len` bytes. Build and run logs put
/// the interesting failure at the end.
pub fn tail_str(s: &str, max_len: usize) -> &str {
    let start = (s.len().saturating_sub(max_len)..=s.len())
        .find(|&i| s.is_char_boundary(i))
        .unwrap_or(s.len());
    &s[start..]
}
