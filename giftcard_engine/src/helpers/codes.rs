//! Redemption-code generation.
//!
//! Codes look like `GIFT-XXXX-YYYY-ZZZZ`: three quartets drawn from a 31-character alphabet that
//! excludes the visually ambiguous `O 0 I 1 L`. With 31^12 possible codes the collision
//! probability per attempt is negligible, but issuance still checks uniqueness against the store
//! and retries within a bounded budget.

use rand::Rng;

/// 23 letters + 8 digits. No `O`, `0`, `I`, `1`, `L`.
pub const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";
pub const CODE_PREFIX: &str = "GIFT";

const QUARTET_LEN: usize = 4;
const NUM_QUARTETS: usize = 3;

/// Generates a fresh, well-formed redemption code. Uniqueness is the caller's problem.
pub fn generate_code() -> String {
    let mut rng = rand::thread_rng();
    let mut parts = Vec::with_capacity(NUM_QUARTETS + 1);
    parts.push(CODE_PREFIX.to_string());
    for _ in 0..NUM_QUARTETS {
        let quartet: String =
            (0..QUARTET_LEN).map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char).collect();
        parts.push(quartet);
    }
    parts.join("-")
}

/// Checks the `GIFT-XXXX-YYYY-ZZZZ` shape without touching the store.
pub fn is_well_formed(code: &str) -> bool {
    let mut parts = code.split('-');
    if parts.next() != Some(CODE_PREFIX) {
        return false;
    }
    let quartets: Vec<&str> = parts.collect();
    quartets.len() == NUM_QUARTETS
        && quartets
            .iter()
            .all(|q| q.len() == QUARTET_LEN && q.bytes().all(|b| CODE_ALPHABET.contains(&b)))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn generated_codes_are_well_formed() {
        for _ in 0..250 {
            let code = generate_code();
            assert!(is_well_formed(&code), "malformed code: {code}");
            assert_eq!(code.len(), CODE_PREFIX.len() + 3 * 5);
        }
    }

    #[test]
    fn generated_quartets_never_contain_ambiguous_characters() {
        for _ in 0..250 {
            let code = generate_code();
            let random_part = code.strip_prefix("GIFT-").unwrap();
            for c in random_part.chars().filter(|c| *c != '-') {
                assert!(!"O0I1L".contains(c), "ambiguous character {c} in {code}");
            }
        }
    }

    #[test]
    fn alphabet_has_31_characters() {
        assert_eq!(CODE_ALPHABET.len(), 31);
    }

    #[test]
    fn well_formedness_rejects_wrong_shapes() {
        assert!(is_well_formed("GIFT-ABCD-EFGH-JKMN"));
        assert!(!is_well_formed("GIFT-ABCD-EFGH"));
        assert!(!is_well_formed("CARD-ABCD-EFGH-JKMN"));
        assert!(!is_well_formed("GIFT-AB1D-EFGH-JKMN"));
        assert!(!is_well_formed("GIFT-ABCDE-FGH-JKMN"));
        assert!(!is_well_formed("gift-abcd-efgh-jkmn"));
    }
}
