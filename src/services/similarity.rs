use serde::Deserialize;
use strum::{Display, EnumString};

/// Lower-case, drop everything that is neither alphanumeric nor whitespace,
/// and trim.
pub fn normalize(text: &str) -> String {
    text.chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect::<String>()
        .trim()
        .to_string()
}

/// Split on whitespace, sort the tokens and re-join them with single spaces.
fn sort_tokens(text: &str) -> String {
    let mut tokens: Vec<&str> = text.split_whitespace().collect();
    tokens.sort_unstable();
    tokens.join(" ")
}

fn lcs_len(a: &[char], b: &[char]) -> usize {
    // Single-row dynamic programme over the shorter string.
    let (long, short) = if a.len() >= b.len() { (a, b) } else { (b, a) };
    let mut row = vec![0usize; short.len() + 1];
    for &lc in long {
        let mut diagonal = 0;
        for (j, &sc) in short.iter().enumerate() {
            let above = row[j + 1];
            row[j + 1] = if lc == sc {
                diagonal + 1
            } else {
                above.max(row[j])
            };
            diagonal = above;
        }
    }
    row[short.len()]
}

/// Normalized indel similarity on a 0-100 scale:
/// `200 * LCS(a, b) / (|a| + |b|)`, over Unicode scalar values.
pub fn indel_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 100.0;
    }
    200.0 * lcs_len(&a, &b) as f64 / total as f64
}

/// Token-order-insensitive indel similarity (0-100).
pub fn token_sort_ratio(a: &str, b: &str) -> f64 {
    indel_ratio(&sort_tokens(a), &sort_tokens(b))
}

/// Scores two already-normalized strings on a 0-100 scale.
pub trait Similarity: Send + Sync {
    fn score(&self, a: &str, b: &str) -> f64;
}

/// Selectable similarity measure. Both variants sort tokens first, so word
/// order never matters, and both are symmetric.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SimilarityScorer {
    #[default]
    TokenSort,
    JaroWinkler,
}

impl Similarity for SimilarityScorer {
    fn score(&self, a: &str, b: &str) -> f64 {
        match self {
            Self::TokenSort => token_sort_ratio(a, b),
            Self::JaroWinkler => {
                let (a, b) = (sort_tokens(a), sort_tokens(b));
                if a.is_empty() && b.is_empty() {
                    return 100.0;
                }
                // Greedy Jaro matching can depend on argument order.
                let (first, second) = if a <= b { (&a, &b) } else { (&b, &a) };
                100.0 * strsim::jaro_winkler(first, second)
            }
        }
    }
}
