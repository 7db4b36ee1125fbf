//! Timed stream metadata
//!
//! ICY (Icecast/Shoutcast) metadata blocks carry `Key='value';` pairs. They
//! are parsed into `MetadataItem`s, the engine-neutral form the player uses
//! to capture the stream title.

/// Well-known metadata keys
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MetadataKey {
    /// The "now playing" title (`StreamTitle`)
    CommonTitle,
    /// Station or track web page (`StreamUrl`)
    StreamUrl,
    Other(String),
}

impl MetadataKey {
    fn from_icy(key: &str) -> Self {
        match key {
            "StreamTitle" => Self::CommonTitle,
            "StreamUrl" => Self::StreamUrl,
            other => Self::Other(other.to_string()),
        }
    }
}

/// One key/value pair from a metadata update
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataItem {
    pub key: MetadataKey,
    pub value: String,
}

impl MetadataItem {
    pub fn new(key: MetadataKey, value: impl Into<String>) -> Self {
        Self {
            key,
            value: value.into(),
        }
    }

    /// Shorthand for a `CommonTitle` item
    pub fn title(value: impl Into<String>) -> Self {
        Self::new(MetadataKey::CommonTitle, value)
    }
}

/// Parse an ICY metadata string.
///
/// Format: `StreamTitle='Artist - Song';StreamUrl='...';`. Values may contain
/// single quotes; a value ends at the next `';` or at the end of input.
pub fn parse_icy_items(metadata: &str) -> Vec<MetadataItem> {
    let mut items = Vec::new();
    let mut rest = metadata;

    while let Some(eq) = rest.find("='") {
        let key = rest[..eq].trim().trim_start_matches(';').trim();
        let after = &rest[eq + 2..];
        let (value, next) = match after.find("';") {
            Some(end) => (&after[..end], &after[end + 2..]),
            None => (after.strip_suffix('\'').unwrap_or(after), ""),
        };
        if !key.is_empty() {
            items.push(MetadataItem::new(MetadataKey::from_icy(key), value.trim()));
        }
        rest = next;
    }

    items
}

/// Parse a raw metadata block as read from the stream (null padded to a
/// multiple of 16 bytes)
pub fn extract_icy_items(raw_block: &[u8]) -> Vec<MetadataItem> {
    let end = raw_block
        .iter()
        .rposition(|&b| b != 0)
        .map(|p| p + 1)
        .unwrap_or(0);
    if end == 0 {
        return Vec::new();
    }
    parse_icy_items(&String::from_utf8_lossy(&raw_block[..end]))
}

/// Title carried by an update: the first `CommonTitle` item's value, or
/// `None` when it is absent or empty
pub fn common_title(items: &[MetadataItem]) -> Option<&str> {
    items
        .iter()
        .find(|item| item.key == MetadataKey::CommonTitle)
        .map(|item| item.value.as_str())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    // --- parse_icy_items ---

    #[test]
    fn parse_standard_metadata() {
        let items = parse_icy_items("StreamTitle='Pink Floyd - Comfortably Numb';StreamUrl='';");
        assert_eq!(
            items,
            vec![
                MetadataItem::title("Pink Floyd - Comfortably Numb"),
                MetadataItem::new(MetadataKey::StreamUrl, ""),
            ]
        );
    }

    #[test]
    fn parse_title_with_apostrophe() {
        let items = parse_icy_items("StreamTitle='Guns N' Roses - Patience';");
        assert_eq!(common_title(&items), Some("Guns N' Roses - Patience"));
    }

    #[test]
    fn parse_missing_terminator() {
        let items = parse_icy_items("StreamTitle='Unterminated'");
        assert_eq!(common_title(&items), Some("Unterminated"));
    }

    #[test]
    fn parse_unknown_keys_are_kept() {
        let items = parse_icy_items("adw_ad='true';StreamTitle='Song';");
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].key, MetadataKey::Other("adw_ad".to_string()));
        assert_eq!(items[0].value, "true");
        assert_eq!(common_title(&items), Some("Song"));
    }

    #[test]
    fn parse_garbage_yields_nothing() {
        assert!(parse_icy_items("").is_empty());
        assert!(parse_icy_items("no metadata here").is_empty());
    }

    #[test]
    fn parse_trims_value_whitespace() {
        let items = parse_icy_items("StreamTitle='  Spaced Out  ';");
        assert_eq!(items[0].value, "Spaced Out");
    }

    // --- extract_icy_items ---

    #[test]
    fn extract_strips_null_padding() {
        let mut block = b"StreamTitle='Padded';".to_vec();
        block.resize(32, 0);
        let items = extract_icy_items(&block);
        assert_eq!(common_title(&items), Some("Padded"));
    }

    #[test]
    fn extract_all_nulls_is_empty() {
        assert!(extract_icy_items(&[0u8; 16]).is_empty());
        assert!(extract_icy_items(&[]).is_empty());
    }

    #[test]
    fn extract_invalid_utf8_is_lossy() {
        let mut block = b"StreamTitle='Caf".to_vec();
        block.push(0xE9);
        block.extend_from_slice(b"';");
        let items = extract_icy_items(&block);
        assert!(common_title(&items).is_some_and(|t| t.starts_with("Caf")));
    }

    // --- common_title ---

    #[test]
    fn common_title_takes_first() {
        let items = vec![
            MetadataItem::new(MetadataKey::StreamUrl, "http://x"),
            MetadataItem::title("First"),
            MetadataItem::title("Second"),
        ];
        assert_eq!(common_title(&items), Some("First"));
    }

    #[test]
    fn common_title_empty_is_none() {
        assert_eq!(common_title(&[MetadataItem::title("")]), None);
        assert_eq!(common_title(&[]), None);
        assert_eq!(
            common_title(&[MetadataItem::new(MetadataKey::StreamUrl, "x")]),
            None
        );
    }

    #[test]
    fn first_empty_title_wins_over_later_one() {
        let items = vec![MetadataItem::title(""), MetadataItem::title("Later")];
        assert_eq!(common_title(&items), None);
    }
}
