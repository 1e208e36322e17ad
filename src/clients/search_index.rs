use dashmap::DashMap;
use std::collections::HashSet;

use crate::domain::SeriesId;

/// Title search collaborator. The catalog keeps it in sync through the
/// re-index hooks and only ever consumes ranked ids from it.
pub trait SearchIndex: Send + Sync {
    fn reindex(&self, id: SeriesId, title: &str);

    fn remove(&self, id: SeriesId);

    fn clear(&self);

    /// Ids scoring at least `threshold` (0-100), best first.
    fn query(&self, text: &str, threshold: u8) -> Vec<SeriesId>;
}

/// In-process word-overlap index. Good enough for a single node; a real
/// fuzzy matcher can replace it behind the trait.
#[derive(Debug, Default)]
pub struct TitleIndex {
    titles: DashMap<SeriesId, String>,
}

impl TitleIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.titles.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.titles.is_empty()
    }
}

fn normalize(text: &str) -> String {
    text.chars()
        .map(|c| if c.is_alphanumeric() { c.to_ascii_lowercase() } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// 100 for exact or contained matches, otherwise word-set overlap scaled to 0-100.
fn similarity(query: &str, title: &str) -> u8 {
    if query.is_empty() || title.is_empty() {
        return 0;
    }
    if query == title {
        return 100;
    }
    if title.contains(query) || query.contains(title) {
        return 90;
    }

    let q: HashSet<&str> = query.split(' ').collect();
    let t: HashSet<&str> = title.split(' ').collect();
    let shared = q.intersection(&t).count();
    let union = q.union(&t).count();
    if union == 0 {
        return 0;
    }
    u8::try_from(shared * 100 / union).unwrap_or(100)
}

impl SearchIndex for TitleIndex {
    fn reindex(&self, id: SeriesId, title: &str) {
        self.titles.insert(id, normalize(title));
    }

    fn remove(&self, id: SeriesId) {
        self.titles.remove(&id);
    }

    fn clear(&self) {
        self.titles.clear();
    }

    fn query(&self, text: &str, threshold: u8) -> Vec<SeriesId> {
        let needle = normalize(text);
        let mut hits: Vec<(u8, SeriesId)> = self
            .titles
            .iter()
            .filter_map(|entry| {
                let score = similarity(&needle, entry.value());
                (score >= threshold && score > 0).then_some((score, *entry.key()))
            })
            .collect();

        hits.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
        hits.into_iter().map(|(_, id)| id).collect()
    }
}
