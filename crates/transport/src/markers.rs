use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::TransportError;

/// Markers an ensemble can hold at once.
pub const MAX_MARKERS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MarkerId(pub u64);

/// A named position on the shared timeline.
///
/// `label` and `color_index` are derived from the marker's place in the
/// store and are rewritten whenever the store changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Marker {
    pub id: MarkerId,
    pub label: String,
    /// Seconds from the start of the stems.
    pub time: f64,
    /// 1-based, dense.
    pub color_index: usize,
}

/// Ordered, capacity-bounded marker list.
///
/// The store is an immutable value: `with_marker` and `without_marker`
/// return a new store and leave `self` untouched. Clones share the same
/// backing slice, which is what lets history entries hold markers cheaply.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkerStore {
    markers: Arc<[Marker]>,
}

impl MarkerStore {
    pub fn new() -> Self {
        Self {
            markers: Arc::from(Vec::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.markers.len() >= MAX_MARKERS
    }

    pub fn as_slice(&self) -> &[Marker] {
        &self.markers
    }

    pub fn get(&self, index: usize) -> Option<&Marker> {
        self.markers.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Marker> {
        self.markers.iter()
    }

    /// Append a marker at `time`.
    pub fn with_marker(&self, id: MarkerId, time: f64) -> Result<Self, TransportError> {
        if self.is_full() {
            return Err(TransportError::MarkerCapacity);
        }
        let mut markers = self.markers.to_vec();
        markers.push(Marker {
            id,
            label: String::new(),
            time,
            color_index: 0,
        });
        Ok(Self::renumbered(markers))
    }

    /// Remove the marker at `index`; the rest close ranks.
    pub fn without_marker(&self, index: usize) -> Result<Self, TransportError> {
        if index >= self.markers.len() {
            return Err(TransportError::MarkerIndex(index));
        }
        let mut markers = self.markers.to_vec();
        markers.remove(index);
        Ok(Self::renumbered(markers))
    }

    fn renumbered(mut markers: Vec<Marker>) -> Self {
        for (i, marker) in markers.iter_mut().enumerate() {
            marker.color_index = i + 1;
            marker.label = format!("M{}", i + 1);
        }
        Self {
            markers: Arc::from(markers),
        }
    }

    #[cfg(test)]
    pub(crate) fn shares_storage_with(&self, other: &MarkerStore) -> bool {
        Arc::ptr_eq(&self.markers, &other.markers)
    }
}

impl Default for MarkerStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with(times: &[f64]) -> MarkerStore {
        let mut store = MarkerStore::new();
        for (i, &time) in times.iter().enumerate() {
            store = store.with_marker(MarkerId(i as u64), time).unwrap();
        }
        store
    }

    #[test]
    fn test_markers_are_numbered_in_creation_order() {
        let store = store_with(&[12.0, 3.5]);
        assert_eq!(store.len(), 2);
        assert_eq!(store.as_slice()[0].label, "M1");
        assert_eq!(store.as_slice()[0].time, 12.0);
        assert_eq!(store.as_slice()[1].label, "M2");
        assert_eq!(store.as_slice()[1].color_index, 2);
    }

    #[test]
    fn test_capacity_is_enforced() {
        let store = store_with(&[1.0, 2.0, 3.0]);
        assert!(store.is_full());
        assert_eq!(
            store.with_marker(MarkerId(9), 4.0),
            Err(TransportError::MarkerCapacity)
        );
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn test_remove_renumbers_densely() {
        let store = store_with(&[1.0, 2.0, 3.0]);
        let store = store.without_marker(0).unwrap();

        let labels: Vec<_> = store.iter().map(|m| m.label.as_str()).collect();
        let colors: Vec<_> = store.iter().map(|m| m.color_index).collect();
        let ids: Vec<_> = store.iter().map(|m| m.id).collect();
        assert_eq!(labels, vec!["M1", "M2"]);
        assert_eq!(colors, vec![1, 2]);
        assert_eq!(ids, vec![MarkerId(1), MarkerId(2)]);
    }

    #[test]
    fn test_remove_out_of_range() {
        let store = store_with(&[1.0]);
        assert_eq!(store.without_marker(1), Err(TransportError::MarkerIndex(1)));
    }

    #[test]
    fn test_mutation_leaves_original_untouched() {
        let original = store_with(&[1.0]);
        let copy = original.clone();
        assert!(copy.shares_storage_with(&original));

        let grown = original.with_marker(MarkerId(7), 8.0).unwrap();
        assert_eq!(original.len(), 1);
        assert_eq!(grown.len(), 2);
        assert!(!grown.shares_storage_with(&original));
    }
}
