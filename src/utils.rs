use crate::span::Span;

/// This panics if the spans are not from the same file. This should
/// only be used on spans that are actually next to each other.
pub(crate) fn join_spans(s1: Span, s2: Span) -> Span {
    assert!(
        s1.path == s2.path,
        "Spans from different files cannot be joined.",
    );
    Span {
        start: s1.start.min(s2.start),
        end: s1.end.max(s2.end),
        path: s1.path,
    }
}

/// Collapses repeated entries of a diagnostic stream while keeping the first
/// occurrence where it was raised. Locally-recovering rules can raise the
/// same finding more than once, and the stream stays grouped by relevance
/// rather than sorted, so neither `Vec::dedup` nor a set on its own fits.
pub(crate) fn dedup_stream<T: Clone + Eq + std::hash::Hash>(stream: Vec<T>) -> Vec<T> {
    let mut seen = std::collections::HashSet::with_capacity(stream.len());
    stream
        .into_iter()
        .filter(|entry| seen.insert(entry.clone()))
        .collect()
}
