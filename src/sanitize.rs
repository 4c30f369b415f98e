/// Key Sanitizer
///
/// The table service rejects `/`, `\`, `#`, `?` and control characters
/// (U+0000..=U+001F, U+007F..=U+009F) in PartitionKey and RowKey.
/// See "Characters disallowed in key fields" in the Table service data model.

/// Returns true for characters the store does not accept in key fields
pub const fn is_forbidden_key_char(c: char) -> bool {
    matches!(c, '/' | '\\' | '#' | '?' | '\u{00}'..='\u{1F}' | '\u{7F}'..='\u{9F}')
}

/// Remove every forbidden character, keeping the rest in order
pub fn sanitize_key(raw: &str) -> String {
    raw.chars().filter(|&c| !is_forbidden_key_char(c)).collect()
}

/// True if `key` can be used as-is in a key field
pub fn is_valid_key(key: &str) -> bool {
    !key.chars().any(is_forbidden_key_char)
}
