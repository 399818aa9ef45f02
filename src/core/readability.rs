//! Human-readability scoring for extracted strings.
//!
//! Every string the `strings` tool emits passes through here before it is
//! allowed anywhere near the database; the cutoff decides the string-table
//! volume for the whole corpus.

use std::collections::HashMap;

use crate::config::MAX_STRING_CHAR_LIMIT;

/// Characters of common English-plus-code text ordered by empirical
/// frequency, most frequent first. Computed from the top 10k strings of a
/// previously ingested corpus. Position encodes rank.
pub const EMERGENT: &str =
    r#"e t1|oarinsl23dc87064m9u5pESACgfThby"IvLDRw-_PO.NFx\MW%VUkGHB:@,q?=];[(<Q'jX>)YKz$/Z*J+`^!&#~}{"#;

/// Score `text` against the [`EMERGENT`] frequency profile.
///
/// The score combines cosine similarity between the text's character
/// frequency vector and the rank-weight vector `[95, 94, .., 1]` with a
/// diversity term (distinct chars over length). Similarity alone rewards
/// degenerate strings of a single common character; diversity suppresses
/// them.
///
/// Empty input, input longer than [`MAX_STRING_CHAR_LIMIT`] chars, and input
/// sharing no character with the profile all score 0.
pub fn readability_score(text: &str) -> i32 {
    let len = text.chars().count();
    if len == 0 || len > MAX_STRING_CHAR_LIMIT {
        return 0;
    }

    let mut counts: HashMap<char, u32> = HashMap::new();
    for ch in text.chars() {
        *counts.entry(ch).or_insert(0) += 1;
    }

    let profile_len = EMERGENT.chars().count();
    let mut dot = 0.0f64;
    let mut freq_norm_sq = 0.0f64;
    let mut weight_norm_sq = 0.0f64;
    for (rank, ch) in EMERGENT.chars().enumerate() {
        let weight = (profile_len - rank) as f64;
        let freq = f64::from(counts.get(&ch).copied().unwrap_or(0));
        dot += freq * weight;
        freq_norm_sq += freq * freq;
        weight_norm_sq += weight * weight;
    }

    if freq_norm_sq == 0.0 {
        // No profile character present; cosine is undefined, gate it out.
        return 0;
    }

    let similarity = dot / (freq_norm_sq.sqrt() * weight_norm_sq.sqrt());
    let diversity = counts.len() as f64 / len as f64;
    (similarity * 100.0 + diversity * 50.0).floor() as i32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SHR_CUTOFF;

    #[test]
    fn profile_has_95_characters() {
        assert_eq!(EMERGENT.chars().count(), 95);
    }

    #[test]
    fn readable_text_passes_cutoff() {
        assert_eq!(readability_score("Hello, world!"), 75);
        assert_eq!(readability_score("GetProcAddress"), 79);
        assert_eq!(readability_score("kernel32.dll"), 76);
        assert_eq!(
            readability_score("This program cannot be run in DOS mode"),
            82
        );
        assert!(readability_score("Hello, world!") > SHR_CUTOFF);
    }

    #[test]
    fn degenerate_repetition_fails_cutoff() {
        // 'e' is the top-ranked character; diversity must still sink it.
        assert_eq!(readability_score("eeeeeeeeeeee"), 21);
        assert_eq!(readability_score("aaaaaaaaaaaaaaaaaaaaaaaaaaaa"), 18);
        assert!(readability_score("eeeeeeeeeeee") <= SHR_CUTOFF);
    }

    #[test]
    fn empty_and_oversized_score_zero() {
        assert_eq!(readability_score(""), 0);
        let long = "x".repeat(MAX_STRING_CHAR_LIMIT + 1);
        assert_eq!(readability_score(&long), 0);
        // Exactly at the limit is still scored.
        let at_limit = "x".repeat(MAX_STRING_CHAR_LIMIT);
        assert_eq!(readability_score(&at_limit), 8);
    }

    #[test]
    fn text_outside_profile_scores_zero() {
        assert_eq!(readability_score("\u{e9}\u{e8}\u{ea}"), 0);
    }

    #[test]
    fn scoring_is_deterministic() {
        for sample in ["Hello, world!", "!!!####", "C:\\Windows\\System32"] {
            let first = readability_score(sample);
            for _ in 0..10 {
                assert_eq!(readability_score(sample), first);
            }
        }
    }
}
