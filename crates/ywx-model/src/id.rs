//! Typed-prefix string identifiers.
//!
//! Every entity kind owns a fixed two-letter prefix; the six tree root
//! buckets use `rt` + the prefix of the kind they hold. IDs are plain
//! strings so they can travel through space-separated XML attributes
//! unchanged.

use crate::ModelError;

pub const ROOT_PREFIX: &str = "rt";
pub const CHAPTER_PREFIX: &str = "ch";
pub const PLOT_LINE_PREFIX: &str = "ac";
pub const SECTION_PREFIX: &str = "sc";
pub const PLOT_POINT_PREFIX: &str = "ap";
pub const CHARACTER_PREFIX: &str = "cr";
pub const LOCATION_PREFIX: &str = "lc";
pub const ITEM_PREFIX: &str = "it";
pub const PRJ_NOTE_PREFIX: &str = "pn";

pub const CH_ROOT: &str = "rtch";
pub const PL_ROOT: &str = "rtac";
pub const CR_ROOT: &str = "rtcr";
pub const LC_ROOT: &str = "rtlc";
pub const IT_ROOT: &str = "rtit";
pub const PN_ROOT: &str = "rtpn";

/// Returns the lexically first `prefix{N}` (N starting at 1) not present in
/// `existing`. Deterministic for a given input set; never returns a member
/// of the input set.
pub fn create_id<S: AsRef<str>>(existing: &[S], prefix: &str) -> String {
    let mut n: u64 = 1;
    loop {
        let candidate = format!("{prefix}{n}");
        if !existing.iter().any(|e| e.as_ref() == candidate) {
            return candidate;
        }
        n += 1;
    }
}

/// Validates that `id` carries the expected kind prefix.
pub fn check_id(id: &str, prefix: &'static str) -> Result<(), ModelError> {
    if id.starts_with(prefix) {
        Ok(())
    } else {
        Err(ModelError::BadId {
            id: id.to_string(),
            prefix,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn create_id_starts_at_one() {
        let existing: Vec<String> = Vec::new();
        assert_eq!(create_id(&existing, SECTION_PREFIX), "sc1");
    }

    #[test]
    fn create_id_skips_taken_slots() {
        let existing = vec!["sc1".to_string(), "sc2".to_string(), "sc4".to_string()];
        assert_eq!(create_id(&existing, SECTION_PREFIX), "sc3");
    }

    #[test]
    fn check_id_rejects_wrong_prefix() {
        assert!(check_id("ch3", CHAPTER_PREFIX).is_ok());
        assert!(check_id("sc3", CHAPTER_PREFIX).is_err());
    }

    proptest! {
        #[test]
        fn create_id_never_collides(existing in prop::collection::vec("[a-z]{2}[0-9]{1,3}", 0..40)) {
            let id = create_id(&existing, "sc");
            prop_assert!(!existing.contains(&id));
        }
    }
}
