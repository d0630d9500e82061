//! "Did you mean" suggestions for unknown names.

const SIMILARITY_THRESHOLD: f64 = 0.6;

/// Return the known name most similar to `unknown`, if any is similar enough.
pub(crate) fn closest<'a, I>(unknown: &str, known: I) -> Option<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut best_similarity = 0.0f64;
    let mut best_match: Option<&str> = None;

    for candidate in known {
        let similarity = strsim::jaro_winkler(unknown, candidate);
        if similarity >= SIMILARITY_THRESHOLD && similarity > best_similarity {
            best_similarity = similarity;
            best_match = Some(candidate);
        }
    }

    best_match.map(str::to_string)
}
