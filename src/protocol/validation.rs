use crate::constants::MAX_STRING_LENGTH;

/// Whether a topic name contains the `#` or `+` wildcard characters.
///
/// Reference: <https://docs.oasis-open.org/mqtt/mqtt/v3.1.1/os/mqtt-v3.1.1-os.html#_Toc398718106>
///
/// Wildcards are only legal in topic filters, never in the topic of a PUBLISH.
pub fn contains_wildcard(topic: &[u8]) -> bool {
    topic.iter().any(|&b| b == b'#' || b == b'+')
}

/// Whether `value` fits a 2-byte length prefix.
pub(crate) fn fits_length_prefix(value: &[u8]) -> bool {
    value.len() <= MAX_STRING_LENGTH
}

/// Whether `needle` occurs anywhere in `haystack`.
pub(crate) fn contains_subslice(haystack: &[u8], needle: &[u8]) -> bool {
    find_subslice(haystack, needle).is_some()
}

/// Offset of the first occurrence of `needle` in `haystack`.
pub(crate) fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }

    haystack.windows(needle.len()).position(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_wildcards() {
        assert!(contains_wildcard(b"a/#"));
        assert!(contains_wildcard(b"a/+/b"));
        assert!(!contains_wildcard(b"a/b"));
    }

    #[test]
    fn finds_subslices() {
        assert!(contains_subslice(b"$creq/abc", b"$creq"));
        assert!(contains_subslice(b"x/$creq", b"$creq"));
        assert!(!contains_subslice(b"$cre", b"$creq"));
        assert_eq!(find_subslice(b"x/$creq/1", b"$creq"), Some(2));
    }
}
