//! Watched-identifier diffing

use std::collections::HashMap;

use crate::model::WatchedIdentifier;

/// Difference between two watched-identifier lists
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MappingDelta {
    /// Present only in the new list, in new-list order
    pub added: Vec<WatchedIdentifier>,
    /// Present only in the old list, in old-list order
    pub removed: Vec<WatchedIdentifier>,
    /// Present in both with different description, unit or interval, as `(old, new)`
    pub changed: Vec<(WatchedIdentifier, WatchedIdentifier)>,
}

impl MappingDelta {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }
}

/// First occurrence of every valid identifier, in list order
fn unique(list: &[WatchedIdentifier]) -> (Vec<&WatchedIdentifier>, HashMap<&str, &WatchedIdentifier>) {
    let mut order = Vec::with_capacity(list.len());
    let mut index = HashMap::with_capacity(list.len());
    for watched in list.iter().filter(|w| w.is_valid()) {
        if !index.contains_key(watched.identifier.as_str()) {
            index.insert(watched.identifier.as_str(), watched);
            order.push(watched);
        }
    }
    (order, index)
}

/// Compare two lists by identifier
pub fn diff(old: &[WatchedIdentifier], new: &[WatchedIdentifier]) -> MappingDelta {
    let (old_order, old_index) = unique(old);
    let (new_order, new_index) = unique(new);

    let mut delta = MappingDelta::default();
    for watched in &new_order {
        match old_index.get(watched.identifier.as_str()) {
            None => delta.added.push((*watched).clone()),
            Some(previous) if *previous != *watched => {
                delta.changed.push(((*previous).clone(), (*watched).clone()));
            },
            Some(_) => {},
        }
    }
    for watched in &old_order {
        if !new_index.contains_key(watched.identifier.as_str()) {
            delta.removed.push((*watched).clone());
        }
    }
    delta
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn ids(list: &[WatchedIdentifier]) -> Vec<&str> {
        list.iter().map(|w| w.identifier.as_str()).collect()
    }

    #[test]
    fn test_add_and_remove() {
        let old = vec![WatchedIdentifier::new("A"), WatchedIdentifier::new("B")];
        let new = vec![WatchedIdentifier::new("B"), WatchedIdentifier::new("C")];

        let delta = diff(&old, &new);
        assert_eq!(ids(&delta.added), vec!["C"]);
        assert_eq!(ids(&delta.removed), vec!["A"]);
        assert!(delta.changed.is_empty());
    }

    #[test]
    fn test_metadata_change_is_not_add_or_remove() {
        let old = vec![WatchedIdentifier::new("A").with_description("Import")];
        let new = vec![WatchedIdentifier::new("A").with_description("Bezug")];

        let delta = diff(&old, &new);
        assert!(delta.added.is_empty());
        assert!(delta.removed.is_empty());
        assert_eq!(delta.changed.len(), 1);
        assert_eq!(delta.changed[0].0.description, "Import");
        assert_eq!(delta.changed[0].1.description, "Bezug");
    }

    #[test]
    fn test_identical_lists() {
        let list = vec![
            WatchedIdentifier::new("1-0:1.8.0*255").with_unit("Wh"),
            WatchedIdentifier::new("1-0:16.7.0*255").with_interval(Duration::from_secs(5)),
        ];
        assert!(diff(&list, &list).is_empty());
    }

    #[test]
    fn test_order_duplicates_and_empty() {
        let old = vec![
            WatchedIdentifier::new("Z"),
            WatchedIdentifier::new(""),
            WatchedIdentifier::new("Y"),
            WatchedIdentifier::new("Z").with_unit("W"),
        ];
        let new = vec![
            WatchedIdentifier::new("C"),
            WatchedIdentifier::new(""),
            WatchedIdentifier::new("B"),
            WatchedIdentifier::new("C").with_unit("kW"),
        ];

        let delta = diff(&old, &new);
        assert_eq!(ids(&delta.added), vec!["C", "B"]);
        assert_eq!(delta.added[0].unit, "");
        assert_eq!(ids(&delta.removed), vec!["Z", "Y"]);
        assert_eq!(delta.removed[0].unit, "");
    }

    #[test]
    fn test_from_and_to_empty() {
        let list = vec![WatchedIdentifier::new("A"), WatchedIdentifier::new("B")];
        assert_eq!(ids(&diff(&[], &list).added), vec!["A", "B"]);
        assert_eq!(ids(&diff(&list, &[]).removed), vec!["A", "B"]);
    }
}
