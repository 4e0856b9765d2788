use crate::store::{Fingerprint, MatchStore};

/// Scan extracted page text for lines where every search term occurs,
/// returning the lines not seen before, in order of appearance.
///
/// Matching is an AND over case-insensitive substring containment: all
/// terms must occur somewhere within the same line, and a term may match
/// inside a larger word. Each new line's fingerprint is added to `store`
/// in memory; the caller persists the store once per batch.
pub fn find_new_matches(page_text: &str, terms: &[String], store: &mut MatchStore) -> Vec<String> {
    let needles: Vec<String> = terms.iter().map(|term| term.to_lowercase()).collect();

    let mut new_lines = Vec::new();
    for line in page_text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let lowered = line.to_lowercase();
        if !needles.iter().all(|needle| lowered.contains(needle.as_str())) {
            continue;
        }

        let fingerprint = Fingerprint::of(line);
        if store.contains(&fingerprint) {
            continue;
        }

        store.add(fingerprint);
        new_lines.push(line.to_string());
    }

    new_lines
}
