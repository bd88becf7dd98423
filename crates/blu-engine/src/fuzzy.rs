//! Jaro-Winkler similarity for artist search.
//!
//! Scores are rounded to five decimals at the Jaro stage and again after the
//! Winkler boost, and anything below [`THRESHOLD`] at the Jaro stage is a
//! hard 0.

/// Minimum Jaro score for a pair to count as similar at all.
pub const THRESHOLD: f64 = 0.75;

const PREFIX_SCALE: f64 = 0.1;

/// Similarity of `a` and `b` in `[0, 1]`, case-insensitive.
pub fn similarity(a: &str, b: &str) -> f64 {
    let a = a.to_lowercase();
    let b = b.to_lowercase();
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }

    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    let matches = matching_chars(&a, &b);
    if matches.is_empty() {
        return 0.0;
    }

    let m = matches.len() as f64;
    let t = (transpositions(&matches, &b) / 2) as f64;
    let jaro = round5((m / a.len() as f64 + m / b.len() as f64 + (m - t) / m) / 3.0);
    if jaro < THRESHOLD {
        return 0.0;
    }

    let l = a.iter().zip(&b).filter(|(x, y)| x == y).count() as f64;
    round5(jaro + l * PREFIX_SCALE * (1.0 - jaro)).min(1.0)
}

/// Characters of `a`, in order, that have an equal unmatched character in
/// `b` within the matching window. The nearest candidate wins.
fn matching_chars(a: &[char], b: &[char]) -> Vec<char> {
    let window = (a.len().max(b.len()) / 2).saturating_sub(1);
    let mut taken = vec![false; b.len()];
    let mut matches = Vec::new();

    for (i, &c) in a.iter().enumerate() {
        let lo = i.saturating_sub(window);
        let hi = (i + window + 1).min(b.len());
        let nearest = (lo..hi)
            .filter(|&j| !taken[j] && b[j] == c)
            .min_by_key(|&j| j.abs_diff(i));
        if let Some(j) = nearest {
            taken[j] = true;
            matches.push(c);
        }
    }
    matches
}

/// Out-of-place occurrences of matched characters in `b`. A character equal
/// to the last one counted is skipped so runs of duplicates count once.
fn transpositions(matches: &[char], b: &[char]) -> usize {
    let mut counted: Vec<char> = Vec::new();
    for (i, &mc) in matches.iter().enumerate() {
        for (j, &c) in b.iter().enumerate() {
            if c != mc || i == j {
                continue;
            }
            if counted.last() == Some(&mc) {
                continue;
            }
            counted.push(mc);
        }
    }
    counted.len()
}

fn round5(v: f64) -> f64 {
    (v * 100_000.0).round() / 100_000.0
}

/// Best score of `query` against any whitespace-separated word of `name`.
pub fn best_token_score(query: &str, name: &str) -> f64 {
    name.split_whitespace()
        .map(|token| similarity(query, token))
        .fold(0.0, f64::max)
}

/// Names matching `query`, best first. A name with a word equal to the
/// query is returned on its own.
pub fn search<'a, S: AsRef<str>>(query: &str, names: &'a [S]) -> Vec<&'a str> {
    let mut hits: Vec<(&'a str, f64)> = Vec::new();
    for name in names {
        let name = name.as_ref();
        let score = best_token_score(query, name);
        if score == 1.0 {
            return vec![name];
        }
        if score > THRESHOLD {
            hits.push((name, score));
        }
    }

    hits.sort_by(|a, b| b.1.total_cmp(&a.1));
    hits.into_iter().map(|(name, _)| name).collect()
}
