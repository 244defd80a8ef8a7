//! Transcript cleanup
//!
//! Streaming transcription splits words and punctuation into separate
//! deltas. These heuristics undo the common artifacts before grading.

use std::sync::LazyLock;

use regex::{Captures, Regex};

const SUFFIXES: &[&str] = &[
    "ing", "ly", "lly", "ed", "ted", "ment", "tion", "sion", "ally", "able", "ive", "ize", "ise",
    "full", "ness", "less", "ship", "hood", "ity", "al", "ous", "en", "er", "est", "ty", "lls",
    "te", "my", "ate",
];

const PREFIXES: &[&str] = &[
    "pre", "inter", "intra", "sub", "un", "in", "im", "ir", "il", "dis", "mis", "re", "de", "con",
    "pro", "ex", "per", "wa", "op", "abi", "bili", "ana", "tomy", "comp", "lete", "cate", "lo",
    "spe", "cial",
];

/// Short words that are never fragments
const COMMON_WORDS: &[&str] = &[
    "a", "an", "am", "i", "in", "is", "it", "if", "of", "on", "my", "by", "as", "at", "to", "be",
    "do", "so", "we", "he", "me", "up", "no", "the", "and", "but", "for",
];

static SPACE_BEFORE_PUNCTUATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+([,.!?;:])").expect("valid regex"));

static REPEATED_SPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s\s+").expect("valid regex"));

static SPLIT_I_AM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(i)\s('m)\b").expect("valid regex"));

static SPLIT_CONTRACTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(\w+)\s('s|'t|'re|'ve|'ll|'d)\b").expect("valid regex")
});

static SUFFIX_JOINS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    SUFFIXES
        .iter()
        .map(|suffix| Regex::new(&format!(r"(?i)(\w+)\s({suffix})\b")).expect("valid regex"))
        .collect()
});

// Apostrophes are excluded from the leading context so contraction tails
// ("they're") are never treated as prefixes
static PREFIX_JOINS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    PREFIXES
        .iter()
        .map(|prefix| {
            Regex::new(&format!(r"(?i)(^|[^\w'])({prefix})\s(\w+)")).expect("valid regex")
        })
        .collect()
});

static SHORT_CHUNK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(^|[^\w'])(\w{1,2})\s(\w+)\b").expect("valid regex"));

static SPEECH_ARTIFACTS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(mo|ski|pla|ga|bo|dy)\s(st|lls|ying|me|dy)\b").expect("valid regex")
});

fn is_common(word: &str) -> bool {
    COMMON_WORDS.contains(&word.to_lowercase().as_str())
}

/// Remove transcription artifacts from one utterance
///
/// Drops spaces before punctuation, collapses whitespace, re-attaches
/// contractions and re-joins words the recognizer split apart
/// ("interes ted" becomes "interested"). Short common words are never
/// glued to their neighbours.
#[must_use]
pub fn clean_transcription_text(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }

    let mut cleaned = SPACE_BEFORE_PUNCTUATION.replace_all(text, "$1").into_owned();
    cleaned = REPEATED_SPACE.replace_all(&cleaned, " ").into_owned();

    cleaned = SPLIT_I_AM.replace_all(&cleaned, "${1}${2}").into_owned();
    cleaned = SPLIT_CONTRACTION
        .replace_all(&cleaned, "${1}${2}")
        .into_owned();

    for join in SUFFIX_JOINS.iter() {
        cleaned = join
            .replace_all(&cleaned, |caps: &Captures| {
                if is_common(&caps[1]) || is_common(&caps[2]) {
                    caps[0].to_string()
                } else {
                    format!("{}{}", &caps[1], &caps[2])
                }
            })
            .into_owned();
    }

    for join in PREFIX_JOINS.iter() {
        cleaned = join
            .replace_all(&cleaned, |caps: &Captures| {
                if is_common(&caps[2]) {
                    caps[0].to_string()
                } else {
                    format!("{}{}{}", &caps[1], &caps[2], &caps[3])
                }
            })
            .into_owned();
    }

    cleaned = SHORT_CHUNK
        .replace_all(&cleaned, |caps: &Captures| {
            let (lead, chunk, next) = (&caps[1], &caps[2], &caps[3]);
            if is_common(chunk) || (next.chars().count() <= 2 && is_common(next)) {
                caps[0].to_string()
            } else {
                format!("{lead}{chunk}{next}")
            }
        })
        .into_owned();

    cleaned = SPEECH_ARTIFACTS
        .replace_all(&cleaned, "${1}${2}")
        .into_owned();

    cleaned.trim().to_string()
}
