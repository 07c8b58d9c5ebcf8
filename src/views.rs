//! The view registry: named, ordered, de-duplicated collections of entity
//! references, each with a small set of projected display fields.
//!
//! Views are pure derived state. They are created lazily on first query, kept
//! live until disposed, and patched incrementally by the session after each
//! mutation; within one view entity ids are unique and insertion order is
//! preserved. Projected fields are captured at insertion time and refreshed
//! only by an explicit [`ViewRegistry::refresh_entity`] sweep, never
//! spontaneously.

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::properties::{Item, ItemId, Permission};

/// Scope key of one derived collection.
///
/// The `Display` form is the canonical query key the UI subscribes under:
/// `allItems`, `item:<id>`, `childrenOf:<id>`, `groupsOf:<id>`,
/// `permissionsOf:<id>`, `search:<term>`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ViewKey {
    AllItems,
    ItemDetail(ItemId),
    ChildrenOf(ItemId),
    GroupsOf(ItemId),
    PermissionsOf(ItemId),
    Search(String),
}

impl Display for ViewKey {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            ViewKey::AllItems => write!(f, "allItems"),
            ViewKey::ItemDetail(id) => write!(f, "item:{id}"),
            ViewKey::ChildrenOf(id) => write!(f, "childrenOf:{id}"),
            ViewKey::GroupsOf(id) => write!(f, "groupsOf:{id}"),
            ViewKey::PermissionsOf(id) => write!(f, "permissionsOf:{id}"),
            ViewKey::Search(term) => write!(f, "search:{term}"),
        }
    }
}

/// Insertion position for [`ViewRegistry::patch_insert`]. List-append views
/// use [`Position::End`]; explicit indices only occur for ordered moves.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Position {
    #[default]
    End,
    At(usize),
}

/// A non-owning reference to an entity plus its projected display fields.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewEntry {
    pub id: String,
    pub fields: BTreeMap<String, Value>,
}

impl ViewEntry {
    /// Standard item projection: `label`, `value`, `parentId`.
    pub fn from_item(item: &Item) -> ViewEntry {
        ViewEntry {
            id: item.id.to_string(),
            fields: BTreeMap::from([
                ("label".to_string(), json!(item.label)),
                ("value".to_string(), json!(item.value)),
                ("parentId".to_string(), json!(item.parent_id)),
            ]),
        }
    }

    /// Detail projection: the item fields plus the denormalized primary
    /// parent embed (`itemByParentId: {id, label}`) when the parent's label
    /// is known.
    pub fn detail(item: &Item, parent_label: Option<&str>) -> ViewEntry {
        let mut entry = ViewEntry::from_item(item);
        if let Some(parent_id) = &item.parent_id {
            entry.fields.insert(
                "itemByParentId".to_string(),
                json!({ "id": parent_id, "label": parent_label }),
            );
        }
        entry
    }

    /// Group projection: a parent reference with its label embedded at
    /// edge-creation time.
    pub fn group_ref(parent_id: &ItemId, label: Option<&str>) -> ViewEntry {
        ViewEntry {
            id: parent_id.to_string(),
            fields: BTreeMap::from([("label".to_string(), json!(label))]),
        }
    }

    pub fn from_permission(permission: &Permission) -> ViewEntry {
        ViewEntry {
            id: permission.id.to_string(),
            fields: BTreeMap::from([
                ("itemId".to_string(), json!(permission.item_id)),
                ("role".to_string(), json!(permission.role)),
                ("userOrGroup".to_string(), json!(permission.user_or_group)),
                ("timeCreated".to_string(), json!(permission.time_created)),
            ]),
        }
    }
}

/// One live ordered collection. Entity ids are unique within a view.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct View {
    entries: Vec<ViewEntry>,
}

impl View {
    pub fn entries(&self) -> &[ViewEntry] {
        &self.entries
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.iter().any(|entry| entry.id == id)
    }

    pub fn ids(&self) -> Vec<&str> {
        self.entries.iter().map(|entry| entry.id.as_str()).collect()
    }

    fn insert(&mut self, entry: ViewEntry, position: Position) -> bool {
        if self.contains(&entry.id) {
            return false;
        }
        match position {
            Position::End => self.entries.push(entry),
            Position::At(index) => {
                let index = index.min(self.entries.len());
                self.entries.insert(index, entry);
            }
        }
        true
    }

    fn remove(&mut self, id: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.id != id);
        self.entries.len() < before
    }

    fn update(&mut self, id: &str, fields: &BTreeMap<String, Value>) -> bool {
        let Some(entry) = self.entries.iter_mut().find(|entry| entry.id == id) else {
            return false;
        };
        for (key, value) in fields {
            entry.fields.insert(key.clone(), value.clone());
        }
        true
    }
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ViewRegistry {
    views: BTreeMap<ViewKey, View>,
}

impl ViewRegistry {
    /// Open an empty view under `key` if none is live. Returns whether a new
    /// view was created.
    pub fn open(&mut self, key: ViewKey) -> bool {
        match self.views.entry(key) {
            std::collections::btree_map::Entry::Vacant(entry) => {
                entry.insert(View::default());
                true
            }
            std::collections::btree_map::Entry::Occupied(_) => false,
        }
    }

    /// Install server-provided results under `key`, replacing any previous
    /// content. Used for initial queries and search result sets.
    pub fn seed(&mut self, key: ViewKey, entries: Vec<ViewEntry>) {
        let mut view = View::default();
        for entry in entries {
            // De-dup on seed as well; the server result is trusted but the
            // uniqueness invariant is ours to uphold.
            view.insert(entry, Position::End);
        }
        self.views.insert(key, view);
    }

    /// Drop the view. External trigger (a UI region unmounting); returns
    /// whether a view was live under the key.
    pub fn dispose(&mut self, key: &ViewKey) -> bool {
        self.views.remove(key).is_some()
    }

    pub fn is_open(&self, key: &ViewKey) -> bool {
        self.views.contains_key(key)
    }

    /// Insert into a live view unless the id is already present. Returns
    /// whether the view changed; an absent view is a no-op, not an error.
    pub fn patch_insert(&mut self, key: &ViewKey, entry: ViewEntry, position: Position) -> bool {
        match self.views.get_mut(key) {
            Some(view) => view.insert(entry, position),
            None => false,
        }
    }

    /// Remove from a live view. Idempotent; absent view or id is a no-op.
    pub fn patch_remove(&mut self, key: &ViewKey, id: &str) -> bool {
        match self.views.get_mut(key) {
            Some(view) => view.remove(id),
            None => false,
        }
    }

    /// Merge projected fields into an existing reference. A view not
    /// currently holding the entity is not retroactively populated.
    pub fn patch_update(
        &mut self,
        key: &ViewKey,
        id: &str,
        fields: &BTreeMap<String, Value>,
    ) -> bool {
        match self.views.get_mut(key) {
            Some(view) => view.update(id, fields),
            None => false,
        }
    }

    /// Sweep every live view holding `id` and merge the given fields into its
    /// reference. Returns the keys that changed.
    pub fn refresh_entity(&mut self, id: &str, fields: &BTreeMap<String, Value>) -> Vec<ViewKey> {
        let mut patched = Vec::new();
        for (key, view) in self.views.iter_mut() {
            if view.update(id, fields) {
                patched.push(key.clone());
            }
        }
        patched
    }

    /// Remove `id` from every live view matching `filter`. Returns the keys
    /// that changed.
    pub fn sweep_remove<F: Fn(&ViewKey) -> bool>(&mut self, id: &str, filter: F) -> Vec<ViewKey> {
        let mut patched = Vec::new();
        for (key, view) in self.views.iter_mut() {
            if filter(key) && view.remove(id) {
                patched.push(key.clone());
            }
        }
        patched
    }

    pub fn snapshot(&self, key: &ViewKey) -> Option<&[ViewEntry]> {
        self.views.get(key).map(|view| view.entries())
    }

    pub fn keys(&self) -> impl Iterator<Item = &ViewKey> {
        self.views.keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str) -> ViewEntry {
        ViewEntry {
            id: id.to_string(),
            fields: BTreeMap::new(),
        }
    }

    #[test]
    fn insert_dedups_by_id() {
        let mut registry = ViewRegistry::default();
        registry.open(ViewKey::AllItems);
        assert!(registry.patch_insert(&ViewKey::AllItems, entry("i1"), Position::End));
        assert!(!registry.patch_insert(&ViewKey::AllItems, entry("i1"), Position::End));
        assert_eq!(registry.snapshot(&ViewKey::AllItems).unwrap().len(), 1);
    }

    #[test]
    fn insert_preserves_order_and_supports_positions() {
        let mut registry = ViewRegistry::default();
        registry.open(ViewKey::AllItems);
        registry.patch_insert(&ViewKey::AllItems, entry("a"), Position::End);
        registry.patch_insert(&ViewKey::AllItems, entry("c"), Position::End);
        registry.patch_insert(&ViewKey::AllItems, entry("b"), Position::At(1));
        // Out-of-range index clamps to append.
        registry.patch_insert(&ViewKey::AllItems, entry("z"), Position::At(99));
        let ids: Vec<&str> = registry
            .snapshot(&ViewKey::AllItems)
            .unwrap()
            .iter()
            .map(|e| e.id.as_str())
            .collect();
        assert_eq!(ids, vec!["a", "b", "c", "z"]);
    }

    #[test]
    fn remove_twice_equals_remove_once() {
        let mut registry = ViewRegistry::default();
        registry.open(ViewKey::AllItems);
        registry.patch_insert(&ViewKey::AllItems, entry("i1"), Position::End);
        assert!(registry.patch_remove(&ViewKey::AllItems, "i1"));
        let after_once: Vec<ViewEntry> =
            registry.snapshot(&ViewKey::AllItems).unwrap().to_vec();
        assert!(!registry.patch_remove(&ViewKey::AllItems, "i1"));
        assert_eq!(registry.snapshot(&ViewKey::AllItems).unwrap(), &after_once[..]);
    }

    #[test]
    fn update_does_not_populate_absent_entries() {
        let mut registry = ViewRegistry::default();
        registry.open(ViewKey::AllItems);
        let fields = BTreeMap::from([("label".to_string(), json!("new"))]);
        assert!(!registry.patch_update(&ViewKey::AllItems, "ghost", &fields));
        assert!(registry.snapshot(&ViewKey::AllItems).unwrap().is_empty());
    }

    #[test]
    fn refresh_entity_sweeps_all_views() {
        let mut registry = ViewRegistry::default();
        registry.open(ViewKey::AllItems);
        registry.open(ViewKey::Search("milk".to_string()));
        registry.open(ViewKey::ChildrenOf(ItemId::from("p")));
        registry.patch_insert(&ViewKey::AllItems, entry("i1"), Position::End);
        registry.patch_insert(
            &ViewKey::Search("milk".to_string()),
            entry("i1"),
            Position::End,
        );

        let fields = BTreeMap::from([("label".to_string(), json!("Milk 2%"))]);
        let patched = registry.refresh_entity("i1", &fields);
        assert_eq!(patched.len(), 2);
        let search = registry
            .snapshot(&ViewKey::Search("milk".to_string()))
            .unwrap();
        assert_eq!(search[0].fields["label"], json!("Milk 2%"));
    }

    #[test]
    fn patches_against_disposed_views_are_noops() {
        let mut registry = ViewRegistry::default();
        registry.open(ViewKey::AllItems);
        assert!(registry.dispose(&ViewKey::AllItems));
        assert!(!registry.dispose(&ViewKey::AllItems));
        assert!(!registry.patch_insert(&ViewKey::AllItems, entry("i1"), Position::End));
        assert!(registry.snapshot(&ViewKey::AllItems).is_none());
    }

    #[test]
    fn view_key_display_forms() {
        assert_eq!(ViewKey::AllItems.to_string(), "allItems");
        assert_eq!(
            ViewKey::ChildrenOf(ItemId::from("i1")).to_string(),
            "childrenOf:i1"
        );
        assert_eq!(ViewKey::Search("mil k".to_string()).to_string(), "search:mil k");
    }
}
