//! Latest fragment per anchor.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::mesh::{AnchorId, MeshFragment};

/// Holds the latest [`MeshFragment`] per anchor.
///
/// Fragments are stored behind [`Arc`] so cloning the store, which is what a
/// snapshot does, copies references rather than vertex data. Iteration is in
/// anchor order, which keeps merges within one snapshot deterministic.
#[derive(Debug, Clone, Default)]
pub struct FragmentStore {
    fragments: BTreeMap<AnchorId, Arc<MeshFragment>>,
}

impl FragmentStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the fragment for its anchor.
    ///
    /// Returns the fragment previously stored for that anchor.
    pub fn upsert(&mut self, fragment: MeshFragment) -> Option<Arc<MeshFragment>> {
        self.fragments.insert(fragment.id, Arc::new(fragment))
    }

    /// Remove the fragment for an anchor.
    pub fn remove(&mut self, id: &AnchorId) -> Option<Arc<MeshFragment>> {
        self.fragments.remove(id)
    }

    /// Look up a fragment.
    pub fn get(&self, id: &AnchorId) -> Option<&Arc<MeshFragment>> {
        self.fragments.get(id)
    }

    /// Whether an anchor is present.
    pub fn contains(&self, id: &AnchorId) -> bool {
        self.fragments.contains_key(id)
    }

    /// Number of fragments.
    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    /// Iterate over fragments in anchor order.
    pub fn iter(&self) -> impl Iterator<Item = &MeshFragment> {
        self.fragments.values().map(|f| f.as_ref())
    }

    /// Anchors in iteration order.
    pub fn anchors(&self) -> impl Iterator<Item = &AnchorId> {
        self.fragments.keys()
    }

    /// Total number of vertices over all fragments.
    pub fn num_vertices(&self) -> usize {
        self.iter().map(|f| f.num_vertices()).sum()
    }

    /// Total number of triangles over all fragments.
    pub fn num_triangles(&self) -> usize {
        self.iter().map(|f| f.num_triangles()).sum()
    }

    /// Remove every fragment.
    pub fn clear(&mut self) {
        self.fragments.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{Matrix4, Point3, Vector3};
    use uuid::Uuid;

    fn fragment(id: u128, vertices: usize) -> MeshFragment {
        MeshFragment::new(
            Uuid::from_u128(id),
            Matrix4::identity(),
            vec![Point3::origin(); vertices],
            vec![Vector3::z(); vertices],
            vec![[0, 1, 2]],
        )
    }

    #[test]
    fn test_upsert_replaces_wholesale() {
        let mut store = FragmentStore::new();
        assert!(store.upsert(fragment(1, 3)).is_none());

        let previous = store.upsert(fragment(1, 5)).unwrap();
        assert_eq!(previous.num_vertices(), 3);
        assert_eq!(store.len(), 1);
        assert_eq!(store.num_vertices(), 5);
    }

    #[test]
    fn test_remove() {
        let mut store = FragmentStore::new();
        store.upsert(fragment(1, 3));
        store.upsert(fragment(2, 4));

        assert!(store.remove(&Uuid::from_u128(1)).is_some());
        assert!(store.remove(&Uuid::from_u128(1)).is_none());
        assert!(!store.contains(&Uuid::from_u128(1)));
        assert_eq!(store.num_vertices(), 4);
    }

    #[test]
    fn test_iteration_in_anchor_order() {
        let mut store = FragmentStore::new();
        store.upsert(fragment(9, 3));
        store.upsert(fragment(2, 3));
        store.upsert(fragment(5, 3));

        let ids: Vec<u128> = store.anchors().map(|id| id.as_u128()).collect();
        assert_eq!(ids, vec![2, 5, 9]);
    }

    #[test]
    fn test_clone_shares_fragments() {
        let mut store = FragmentStore::new();
        store.upsert(fragment(1, 3));
        let snapshot = store.clone();
        store.upsert(fragment(1, 6));

        // The clone still sees the old fragment
        assert_eq!(snapshot.num_vertices(), 3);
        assert_eq!(store.num_vertices(), 6);
    }
}
