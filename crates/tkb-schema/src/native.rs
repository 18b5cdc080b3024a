//! Native-name computation for identifier-length-limited backing stores.
//!
//! Logical type and attribute names may exceed a target store's identifier
//! limit. Long names are shortened deterministically: truncate, then append
//! the CRC32 of the full UTF-8 name as eight uppercase hex digits. The
//! mapping is stable across runs and one-directional; the original name is
//! never reconstructed from the native one.

/// Width of the hex-rendered CRC32 suffix.
const HASH_SUFFIX_LEN: usize = 8;

/// Compute the native name for a logical name under the given length limit.
///
/// Names at or under `max_len` pass through unchanged. Longer names are cut
/// to `max_len - 8` bytes (respecting char boundaries) and suffixed with the
/// CRC32 of the complete original name.
///
/// `max_len` must leave room for the suffix; shorter limits are clamped to
/// the suffix width, producing a pure hash name.
pub fn native_name(logical: &str, max_len: usize) -> String {
    if logical.len() <= max_len {
        return logical.to_string();
    }

    let prefix_len = max_len.saturating_sub(HASH_SUFFIX_LEN);
    let mut cut = prefix_len;
    while cut > 0 && !logical.is_char_boundary(cut) {
        cut -= 1;
    }

    let hash = crc32fast::hash(logical.as_bytes());
    format!("{}{:08X}", &logical[..cut], hash)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_names_pass_through() {
        assert_eq!(native_name("PERSON", 30), "PERSON");
        assert_eq!(native_name("", 30), "");
    }

    #[test]
    fn name_at_limit_passes_through() {
        let name = "A".repeat(30);
        assert_eq!(native_name(&name, 30), name);
    }

    #[test]
    fn long_names_are_shortened_to_limit() {
        let name = "VERY_LONG_ATTRIBUTE_NAME_THAT_EXCEEDS_THE_LIMIT";
        let native = native_name(name, 30);
        assert_eq!(native.len(), 30);
        assert!(native.starts_with("VERY_LONG_ATTRIBUTE_NA"));
    }

    #[test]
    fn shortening_is_deterministic() {
        let name = "SOME_EXTREMELY_LONG_LOGICAL_TYPE_NAME";
        assert_eq!(native_name(name, 24), native_name(name, 24));
    }

    #[test]
    fn suffix_is_uppercase_hex_of_full_name() {
        let name = "SOME_EXTREMELY_LONG_LOGICAL_TYPE_NAME";
        let native = native_name(name, 24);
        let suffix = &native[native.len() - 8..];
        let expected = format!("{:08X}", crc32fast::hash(name.as_bytes()));
        assert_eq!(suffix, expected);
        assert!(suffix.chars().all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
    }

    #[test]
    fn names_differing_past_the_cut_stay_distinct() {
        let a = "SHARED_PREFIX_FOLLOWED_BY_ALPHA_SECTION";
        let b = "SHARED_PREFIX_FOLLOWED_BY_BETA_SECTIONS";
        assert_ne!(native_name(a, 24), native_name(b, 24));
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let name = "präfix_äöü_with_a_very_long_multibyte_tail_beyond_limit";
        let native = native_name(name, 16);
        // Must not panic and must end in the 8-char hash.
        assert!(native.len() <= 16);
        let expected = format!("{:08X}", crc32fast::hash(name.as_bytes()));
        assert_eq!(&native[native.len() - 8..], expected);
    }

    #[test]
    fn tiny_limit_degrades_to_pure_hash() {
        let name = "A_NAME_LONGER_THAN_THE_SUFFIX";
        let native = native_name(name, 4);
        assert_eq!(native.len(), 8);
    }
}
