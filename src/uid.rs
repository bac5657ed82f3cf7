/// Longest UID the DICOM standard allows
pub const MAX_UID_LENGTH: usize = 64;

/// Rewrites identifiers of derived objects as `prefix.<last N components>`.
///
/// Identifiers whose trailing `suffix_length` components coincide map to the
/// same result; no collision detection is performed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UidRewriter {
    prefix: String,
    suffix_length: usize,
}

impl UidRewriter {
    pub fn new(prefix: impl Into<String>, suffix_length: usize) -> Self {
        Self {
            prefix: prefix.into().trim_end_matches('.').to_owned(),
            suffix_length: suffix_length.max(1),
        }
    }

    pub fn rewrite(&self, uid: &str) -> String {
        let uid = uid.trim_end_matches('\0').trim();
        let parts: Vec<&str> = uid.split('.').collect();
        let keep = self.suffix_length.min(parts.len());
        let rewritten = format!("{}.{}", self.prefix, parts[parts.len() - keep..].join("."));

        if rewritten.len() > MAX_UID_LENGTH {
            tracing::warn!(
                uid,
                rewritten = %rewritten,
                "rewritten UID exceeds {MAX_UID_LENGTH} characters"
            );
        }
        rewritten
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_UID_PREFIX;

    #[test]
    fn keeps_trailing_components() {
        let rewriter = UidRewriter::new(DEFAULT_UID_PREFIX, 1);
        assert_eq!(
            rewriter.rewrite("1.2.840.113619.2.55.3.42"),
            "1.2.826.0.1.3680043.8.498.42"
        );

        let rewriter = UidRewriter::new("9.8", 3);
        assert_eq!(rewriter.rewrite("1.2.3.4.5"), "9.8.3.4.5");
    }

    #[test]
    fn rewriting_twice_is_stable() {
        for suffix_length in 1..=4 {
            let rewriter = UidRewriter::new(DEFAULT_UID_PREFIX, suffix_length);
            let once = rewriter.rewrite("1.3.6.1.4.1.14519.5.2.1.7777");
            assert_eq!(rewriter.rewrite(&once), once, "suffix length {suffix_length}");
        }
    }

    #[test]
    fn short_identifiers_are_kept_whole() {
        let rewriter = UidRewriter::new("9.9", 5);
        assert_eq!(rewriter.rewrite("1.2"), "9.9.1.2");
    }

    #[test]
    fn identifiers_sharing_a_suffix_collide() {
        let rewriter = UidRewriter::new("9.9", 1);
        assert_eq!(rewriter.rewrite("1.2.7"), rewriter.rewrite("3.4.7"));
    }

    #[test]
    fn ignores_value_padding() {
        let rewriter = UidRewriter::new("9.9.", 2);
        assert_eq!(rewriter.rewrite("1.2.3.4\0"), "9.9.3.4");
    }
}
