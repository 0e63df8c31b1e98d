//! Filtering of engine-reported completion candidates.

/// Filter the interpreter's candidate list for the partial token `arg`.
///
/// The interpreter reports its common-match prefix as element 0; an empty
/// element 0 with a non-empty `arg` means element 0 claims an exact full
/// match. In that case the rest of the list must actually extend `arg` -
/// if the second or the last candidate does not start with it, the
/// interpreter completed against a different line than expected and the
/// whole result is discarded. Otherwise every candidate except the
/// synthetic first one is returned.
pub fn filter_candidates(arg: &str, candidates: Vec<String>) -> Vec<String> {
    if candidates.is_empty() {
        return Vec::new();
    }

    if candidates[0].is_empty() && !arg.is_empty() {
        let second_matches = candidates.get(1).is_some_and(|c| c.starts_with(arg));
        let last_matches = candidates.last().is_some_and(|c| c.starts_with(arg));
        if !second_matches || !last_matches {
            return Vec::new();
        }
    }

    candidates.into_iter().skip(1).collect()
}
