//! The canonical entity tables.
//!
//! [`EntityStore`] is the single source of truth for item and permission
//! field values. It performs no index or view maintenance of its own; the
//! session is responsible for keeping derived state consistent, which keeps
//! this component a plain, fully testable key-value table.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    properties::{Item, ItemPatch, Permission, PermissionId},
    CartaError, ItemId,
};

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct EntityStore {
    items: BTreeMap<ItemId, Item>,
    permissions: BTreeMap<PermissionId, Permission>,
}

impl EntityStore {
    /// Insert or fully replace an item record. Returns the replaced record,
    /// if any.
    pub fn put_item(&mut self, item: Item) -> Option<Item> {
        self.items.insert(item.id.clone(), item)
    }

    /// Merge the provided fields into an existing item.
    ///
    /// Fails with [`CartaError::NotFound`] when the id is absent; the caller
    /// decides whether that is recoverable (a concurrently deleted entity) or
    /// a programming error.
    pub fn patch_item(&mut self, id: &ItemId, patch: &ItemPatch) -> Result<&Item, CartaError> {
        let item = self
            .items
            .get_mut(id)
            .ok_or_else(|| CartaError::NotFound(format!("item {id}")))?;
        if let Some(label) = &patch.label {
            item.label = label.clone();
        }
        if let Some(value) = &patch.value {
            item.value = Some(value.clone());
        }
        if let Some(parent_id) = &patch.parent_id {
            item.parent_id = parent_id.clone();
        }
        Ok(item)
    }

    /// Delete an item record. Returns whether it existed.
    pub fn remove_item(&mut self, id: &ItemId) -> bool {
        self.items.remove(id).is_some()
    }

    pub fn item(&self, id: &ItemId) -> Option<&Item> {
        self.items.get(id)
    }

    pub fn items(&self) -> impl Iterator<Item = &Item> {
        self.items.values()
    }

    pub fn put_permission(&mut self, permission: Permission) -> Option<Permission> {
        self.permissions.insert(permission.id.clone(), permission)
    }

    /// Delete a permission record. Returns whether it existed.
    pub fn remove_permission(&mut self, id: &PermissionId) -> bool {
        self.permissions.remove(id).is_some()
    }

    pub fn permission(&self, id: &PermissionId) -> Option<&Permission> {
        self.permissions.get(id)
    }

    pub fn permissions(&self) -> impl Iterator<Item = &Permission> {
        self.permissions.values()
    }

    pub fn len(&self) -> usize {
        self.items.len() + self.permissions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty() && self.permissions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: &str, label: &str) -> Item {
        Item {
            id: ItemId::from(id),
            label: label.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn put_replaces_whole_record() {
        let mut store = EntityStore::default();
        let mut first = item("i1", "one");
        first.value = Some("v".to_string());
        store.put_item(first);

        let replaced = store.put_item(item("i1", "uno")).unwrap();
        assert_eq!(replaced.label, "one");
        // A put is a full replacement, not a merge.
        assert_eq!(store.item(&ItemId::from("i1")).unwrap().value, None);
    }

    #[test]
    fn patch_merges_only_present_fields() {
        let mut store = EntityStore::default();
        let mut existing = item("i1", "one");
        existing.value = Some("v".to_string());
        existing.parent_id = Some(ItemId::from("p"));
        store.put_item(existing);

        let patched = store
            .patch_item(
                &ItemId::from("i1"),
                &ItemPatch {
                    label: Some("uno".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(patched.label, "uno");
        assert_eq!(patched.value, Some("v".to_string()));
        assert_eq!(patched.parent_id, Some(ItemId::from("p")));

        let cleared = store
            .patch_item(
                &ItemId::from("i1"),
                &ItemPatch {
                    parent_id: Some(None),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(cleared.parent_id, None);
    }

    #[test]
    fn patch_missing_id_is_not_found() {
        let mut store = EntityStore::default();
        let err = store
            .patch_item(&ItemId::from("ghost"), &ItemPatch::default())
            .unwrap_err();
        assert!(matches!(err, CartaError::NotFound(_)));
    }

    #[test]
    fn remove_reports_existence() {
        let mut store = EntityStore::default();
        store.put_item(item("i1", "one"));
        assert!(store.remove_item(&ItemId::from("i1")));
        assert!(!store.remove_item(&ItemId::from("i1")));
    }
}
