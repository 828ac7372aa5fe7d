//! Client-only display order for fetched items (dashboard charts).
//!
//! Positions are opaque identifiers `chart-{index}` pointing back into the
//! fetched array. The order is rebuilt from scratch whenever the array is
//! refetched; custom arrangements are not persisted.

const POSITION_PREFIX: &str = "chart-";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DisplayOrder {
    ids: Vec<String>,
}

impl DisplayOrder {
    pub fn for_len(len: usize) -> Self {
        let mut order = Self::default();
        order.reset(len);
        order
    }

    pub fn position_id(index: usize) -> String {
        format!("{POSITION_PREFIX}{index}")
    }

    /// Discards any custom arrangement and restores fetch order.
    pub fn reset(&mut self, len: usize) {
        self.ids = (0..len).map(Self::position_id).collect();
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    /// Moves `source` to the index currently held by `target`, shifting the
    /// items in between by one. Returns `false` when nothing moved.
    pub fn move_item(&mut self, source: &str, target: &str) -> bool {
        if source == target {
            return false;
        }
        let (Some(from), Some(to)) = (self.index_of(source), self.index_of(target)) else {
            return false;
        };
        let id = self.ids.remove(from);
        self.ids.insert(to, id);
        true
    }

    /// Items in display order. Identifiers that do not point into `items`
    /// are skipped.
    pub fn arrange<'a, T>(&self, items: &'a [T]) -> Vec<&'a T> {
        self.ids
            .iter()
            .filter_map(|id| fetch_index(id))
            .filter_map(|index| items.get(index))
            .collect()
    }

    fn index_of(&self, id: &str) -> Option<usize> {
        self.ids.iter().position(|candidate| candidate == id)
    }
}

fn fetch_index(id: &str) -> Option<usize> {
    id.strip_prefix(POSITION_PREFIX)?.parse().ok()
}
