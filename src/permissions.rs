//! The item→permission association.
//!
//! Grants append; granting the same user twice yields two entries, and both
//! remain until each is explicitly revoked. The display layer shows the most
//! recent grant per principal, but the cache does not de-duplicate.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{properties::PermissionId, ItemId};

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct PermissionIndex {
    by_item: BTreeMap<ItemId, Vec<PermissionId>>,
}

impl PermissionIndex {
    /// Append a grant to the item's permission list.
    pub fn grant(&mut self, item_id: &ItemId, permission_id: &PermissionId) {
        self.by_item
            .entry(item_id.clone())
            .or_default()
            .push(permission_id.clone());
    }

    /// Remove a grant. Idempotent: returns `false` when already absent.
    pub fn revoke(&mut self, item_id: &ItemId, permission_id: &PermissionId) -> bool {
        let Some(ids) = self.by_item.get_mut(item_id) else {
            return false;
        };
        let before = ids.len();
        ids.retain(|id| id != permission_id);
        let removed = ids.len() < before;
        if ids.is_empty() {
            self.by_item.remove(item_id);
        }
        removed
    }

    /// The item's permission ids in grant order. Empty for unknown items.
    pub fn permissions_of(&self, item_id: &ItemId) -> &[PermissionId] {
        self.by_item
            .get(item_id)
            .map(|ids| ids.as_slice())
            .unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grants_append_in_order() {
        let mut index = PermissionIndex::default();
        let item = ItemId::from("i1");
        index.grant(&item, &PermissionId::from("p1"));
        index.grant(&item, &PermissionId::from("p2"));
        assert_eq!(
            index.permissions_of(&item),
            &[PermissionId::from("p1"), PermissionId::from("p2")]
        );
    }

    #[test]
    fn duplicate_principal_grants_both_remain() {
        // Two grants for the same user are two entries until each is revoked.
        let mut index = PermissionIndex::default();
        let item = ItemId::from("i1");
        index.grant(&item, &PermissionId::from("p1"));
        index.grant(&item, &PermissionId::from("p2"));
        assert_eq!(index.permissions_of(&item).len(), 2);
        assert!(index.revoke(&item, &PermissionId::from("p1")));
        assert_eq!(index.permissions_of(&item), &[PermissionId::from("p2")]);
    }

    #[test]
    fn revoke_is_idempotent() {
        let mut index = PermissionIndex::default();
        let item = ItemId::from("i1");
        index.grant(&item, &PermissionId::from("p1"));
        assert!(index.revoke(&item, &PermissionId::from("p1")));
        assert!(!index.revoke(&item, &PermissionId::from("p1")));
        assert!(!index.revoke(&ItemId::from("other"), &PermissionId::from("p1")));
        assert!(index.permissions_of(&item).is_empty());
    }
}
