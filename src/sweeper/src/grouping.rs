//! Group extraction from the sorted inventory row stream.
//!
//! Inventory rows arrive lexicographically sorted by key within one part (a
//! contract of the export, not verified here), so all keys of one content
//! hash form a contiguous run. The extractor closes a group as soon as a
//! differing hash shows up, and the caller force-emits the open accumulator
//! at end of part.
//!
//! Grouping restarts at each inventory part: a hash whose keys straddle two
//! parts produces two partial groups, each reconciled independently. Callers
//! needing strict global grouping must pre-merge parts before this stage.

/// A contiguous run of inventory keys sharing one content hash.
///
/// Never empty; every key equals `hash` exactly or starts with `hash + "/"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    pub hash: String,
    pub keys: Vec<String>,
}

/// Return the key's leading path segment when it is a content-hash
/// fingerprint: exactly 32 characters from `[a-z0-9]`.
pub fn leading_hash(key: &str) -> Option<&str> {
    let segment = match key.split_once('/') {
        Some((segment, _)) => segment,
        None => key,
    };

    let is_hash = segment.len() == 32
        && segment
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit());
    is_hash.then_some(segment)
}

/// Accumulates sorted keys into per-hash groups.
#[derive(Debug, Default)]
pub struct GroupExtractor {
    current: Option<Group>,
}

impl GroupExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the next key in stream order. Returns the accumulated group when
    /// `key` opens a run of a new hash.
    ///
    /// Keys whose leading segment is not a content hash are skipped without
    /// closing the open accumulator; they are not content-addressed objects.
    pub fn push(&mut self, key: String) -> Option<Group> {
        let hash = leading_hash(&key)?.to_string();

        match &mut self.current {
            Some(group) if group.hash == hash => {
                group.keys.push(key);
                None
            }
            _ => {
                let closed = self.current.take();
                self.current = Some(Group {
                    hash,
                    keys: vec![key],
                });
                closed
            }
        }
    }

    /// End of an inventory part: hand back the open accumulator, if any.
    pub fn finish(&mut self) -> Option<Group> {
        self.current.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HASH_A: &str = "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
    const HASH_B: &str = "bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb2";

    fn drain(keys: &[&str]) -> Vec<Group> {
        let mut extractor = GroupExtractor::new();
        let mut groups = Vec::new();
        for key in keys {
            if let Some(group) = extractor.push(key.to_string()) {
                groups.push(group);
            }
        }
        groups.extend(extractor.finish());
        groups
    }

    #[test]
    fn test_leading_hash_accepts_fingerprints() {
        assert_eq!(leading_hash(HASH_A), Some(HASH_A));
        assert_eq!(leading_hash(&format!("{HASH_A}/report.pdf")), Some(HASH_A));
    }

    #[test]
    fn test_leading_hash_rejects_other_keys() {
        assert_eq!(leading_hash("notahash/foo"), None);
        assert_eq!(leading_hash("AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA"), None);
        assert_eq!(leading_hash(&HASH_A[..31]), None);
        assert_eq!(leading_hash(&format!("{HASH_A}0")), None);
        assert_eq!(leading_hash(""), None);
    }

    #[test]
    fn test_groups_are_maximal_contiguous_runs() {
        let a1 = format!("{HASH_A}");
        let a2 = format!("{HASH_A}/x.pdf");
        let b1 = format!("{HASH_B}/y.pdf");

        let groups = drain(&[&a1, &a2, &b1]);

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].hash, HASH_A);
        assert_eq!(groups[0].keys, vec![a1, a2]);
        assert_eq!(groups[1].hash, HASH_B);
        assert_eq!(groups[1].keys, vec![b1]);
    }

    #[test]
    fn test_out_of_pattern_key_is_dropped_not_grouped() {
        let a1 = format!("{HASH_A}/x.pdf");
        let a2 = format!("{HASH_A}/y.pdf");

        // The stray key must neither join nor close the open group.
        let groups = drain(&[&a1, "notahash/foo", &a2]);

        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].keys, vec![a1, a2]);
    }

    #[test]
    fn test_finish_emits_open_accumulator() {
        let mut extractor = GroupExtractor::new();
        assert!(extractor.push(format!("{HASH_A}/x.pdf")).is_none());

        let group = extractor.finish().unwrap();
        assert_eq!(group.hash, HASH_A);
        assert!(extractor.finish().is_none());
    }

    #[test]
    fn test_grouping_restarts_across_parts() {
        // The same hash in two parts yields two partial groups.
        let mut extractor = GroupExtractor::new();

        assert!(extractor.push(format!("{HASH_A}/x.pdf")).is_none());
        let first = extractor.finish().unwrap();

        assert!(extractor.push(format!("{HASH_A}/y.pdf")).is_none());
        let second = extractor.finish().unwrap();

        assert_eq!(first.hash, second.hash);
        assert_ne!(first.keys, second.keys);
    }

    #[test]
    fn test_empty_stream_yields_nothing() {
        assert!(drain(&[]).is_empty());
    }
}
