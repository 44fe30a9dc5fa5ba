//! Topic path composition and MQTT-style filter matching.
//!
//! Topics are `/`-separated paths. Composition keeps empty segments in
//! place so wildcards and leading/trailing separators mean the same thing
//! after joining:
//! ```text
//! build_topic("v3/app", "up")    -> "v3/app/up"
//! build_topic("", "up")          -> "up"
//! build_topic("v3/", "/up")      -> "v3///up"
//! ```

pub const SEPARATOR: char = '/';

/// Single-level wildcard.
pub const SINGLE_LEVEL: &str = "+";
/// Multi-level wildcard, only valid as the last segment.
pub const MULTI_LEVEL: &str = "#";

/// Split a topic into its segments. An empty topic has no segments.
pub fn split(topic: &str) -> Vec<&str> {
    if topic.is_empty() {
        return Vec::new();
    }
    topic.split(SEPARATOR).collect()
}

/// Join segments back into a topic.
pub fn join(segments: &[&str]) -> String {
    segments.join("/")
}

/// Compose `base` and `relative` into one backend-addressable topic.
pub fn build_topic(base: &str, relative: &str) -> String {
    let mut segments = split(base);
    segments.extend(split(relative));
    join(&segments)
}

/// Check whether `topic` is matched by the subscription `filter`.
///
/// `+` matches exactly one segment, a trailing `#` matches the parent level
/// and everything below it.
pub fn topic_matches(filter: &str, topic: &str) -> bool {
    let filter = split(filter);
    let topic = split(topic);

    for (i, level) in filter.iter().enumerate() {
        if *level == MULTI_LEVEL {
            return i == filter.len() - 1;
        }
        match topic.get(i) {
            Some(segment) if *level == SINGLE_LEVEL || level == segment => {}
            _ => return false,
        }
    }
    filter.len() == topic.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_base_and_relative() {
        assert_eq!(build_topic("a/b", "c/d"), "a/b/c/d");
    }

    #[test]
    fn empty_base_yields_relative() {
        assert_eq!(build_topic("", "c"), "c");
        assert_eq!(build_topic("a/b", ""), "a/b");
        assert_eq!(build_topic("", ""), "");
    }

    #[test]
    fn adjacent_separators_keep_empty_segment() {
        assert_eq!(build_topic("a/", "/c"), "a///c");
        assert_eq!(split("a/"), vec!["a", ""]);
        assert_eq!(split("/c"), vec!["", "c"]);
    }

    #[test]
    fn wildcards_survive_composition() {
        assert_eq!(build_topic("v3/+", "devices/#"), "v3/+/devices/#");
    }

    #[test]
    fn exact_filter_matches() {
        assert!(topic_matches("v3/app/down/push", "v3/app/down/push"));
        assert!(!topic_matches("v3/app/down/push", "v3/app/down/replace"));
        assert!(!topic_matches("v3/app", "v3/app/down"));
    }

    #[test]
    fn single_level_wildcard() {
        assert!(topic_matches("v3/+/down/push", "v3/app-1/down/push"));
        assert!(!topic_matches("v3/+/push", "v3/app-1/down/push"));
    }

    #[test]
    fn multi_level_wildcard() {
        assert!(topic_matches("v3/app/#", "v3/app/down/push"));
        assert!(topic_matches("v3/app/#", "v3/app"));
        assert!(topic_matches("#", "anything/at/all"));
        assert!(!topic_matches("v3/#/push", "v3/app/push"));
    }
}
