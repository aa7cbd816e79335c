//! Message formatter
//!
//! Splices decoded payloads into the runtime's description of a message, each
//! one directly below the line that mentions its key.

use xpcspy_shared::types::payload::ParseResult;

/// Annotation inserted for one decoded payload
pub fn annotation(result: &ParseResult, key: &str) -> String {
    format!(
        "Parsed {} data for key '{}': \n{}\n",
        result.format, key, result.decoded_text
    )
}

/// Insert every keyed result after the first line of `description` containing
/// its key.
///
/// Keys are located in the unmodified description, so an annotation never
/// shifts or captures another result's anchor. Results without a key, or
/// whose key does not occur, are dropped.
pub fn merge(description: &str, results: &[ParseResult]) -> String {
    let mut insertions: Vec<(usize, String)> = results
        .iter()
        .filter_map(|result| {
            let key = result.key.as_deref()?;
            let at = description.find(key)?;
            Some((line_end(description, at), annotation(result, key)))
        })
        .collect();

    if insertions.is_empty() {
        return description.to_string();
    }

    // Stable, so results sharing a line keep their list order.
    insertions.sort_by_key(|(at, _)| *at);

    let extra: usize = insertions.iter().map(|(_, text)| text.len() + 1).sum();
    let mut merged = String::with_capacity(description.len() + extra);
    let mut cursor = 0;
    for (at, text) in insertions {
        merged.push_str(&description[cursor..at]);
        cursor = at;
        if !merged.ends_with('\n') {
            merged.push('\n');
        }
        merged.push_str(&text);
    }
    merged.push_str(&description[cursor..]);
    merged
}

/// Byte offset just past the newline ending the line that contains `at`, or
/// the end of the text when that line is the last one.
fn line_end(text: &str, at: usize) -> usize {
    text[at..]
        .find('\n')
        .map(|nl| at + nl + 1)
        .unwrap_or(text.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use xpcspy_shared::types::payload::PlistFormat;

    const DESCRIPTION: &str = "<dictionary: 0x1> { count = 2, contents =\n\t\"status\" => <string: 0x2> { length = 2, contents = \"ok\" }\n\t\"payload\" => <data: 0x3>: { length = 42 bytes, contents = 0x62706c6973743030... }\n}";

    fn keyed(key: &str, text: &str) -> ParseResult {
        ParseResult::new(PlistFormat::Binary00, text).with_key(key)
    }

    #[test]
    fn test_no_results_is_identity() {
        assert_eq!(merge(DESCRIPTION, &[]), DESCRIPTION);
    }

    #[test]
    fn test_insert_below_key_line() {
        let merged = merge(DESCRIPTION, &[keyed("payload", "{\n    a = 1;\n}")]);

        let expected = "<dictionary: 0x1> { count = 2, contents =\n\t\"status\" => <string: 0x2> { length = 2, contents = \"ok\" }\n\t\"payload\" => <data: 0x3>: { length = 42 bytes, contents = 0x62706c6973743030... }\nParsed bplist00 data for key 'payload': \n{\n    a = 1;\n}\n}";
        assert_eq!(merged, expected);
    }

    #[test]
    fn test_same_key_keeps_list_order() {
        let merged = merge(DESCRIPTION, &[keyed("status", "first"), keyed("status", "second")]);
        let first = merged.find("first").unwrap();
        let second = merged.find("second").unwrap();
        assert!(first < second);
        assert!(merged.ends_with("contents = 0x62706c6973743030... }\n}"));
    }

    #[test]
    fn test_unkeyed_and_missing_keys_ignored() {
        let unkeyed = ParseResult::new(PlistFormat::Binary15, "x");
        assert_eq!(merge(DESCRIPTION, &[unkeyed, keyed("absent", "y")]), DESCRIPTION);
    }

    #[test]
    fn test_key_on_last_line() {
        let merged = merge("a = 1\nb = 2", &[keyed("b", "decoded")]);
        assert_eq!(merged, "a = 1\nb = 2\nParsed bplist00 data for key 'b': \ndecoded\n");
    }

    #[test]
    fn test_annotations_do_not_become_anchors() {
        // The first annotation mentions "status", but the second result must
        // still attach to the original "status" line.
        let merged = merge(
            "payload\nstatus\nend",
            &[keyed("payload", "status = 1"), keyed("status", "ok")],
        );
        assert_eq!(
            merged,
            "payload\nParsed bplist00 data for key 'payload': \nstatus = 1\nstatus\nParsed bplist00 data for key 'status': \nok\nend"
        );
    }
}
