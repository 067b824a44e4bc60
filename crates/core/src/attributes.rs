use tracing::warn;

/// Parses `key:value` pairs separated by commas.
///
/// Parsing stops at the first pair that does not split into exactly two
/// segments. Pairs read before that point are kept.
pub fn parse_custom_attributes(raw: &str) -> Vec<(String, String)> {
    let mut out: Vec<(String, String)> = Vec::new();
    if raw.is_empty() {
        return out;
    }

    for pair in raw.split(',') {
        let mut parts = pair.split(':');
        let (Some(key), Some(value), None) = (parts.next(), parts.next(), parts.next()) else {
            warn!(
                attributes = %raw,
                pair = %pair,
                "stopped parsing custom attributes at malformed pair"
            );
            break;
        };
        match out.iter_mut().find(|(k, _)| k == key) {
            Some(existing) => existing.1 = value.to_string(),
            None => out.push((key.to_string(), value.to_string())),
        }
    }
    out
}
