//! CacheSession: the mutation reconciler and the session-scoped cache root.
//!
//! One session owns the entity store, both indices, and the view registry for
//! the lifetime of a login. It is constructed per session and torn down on
//! logout, never a module-level singleton, so independent sessions and tests
//! run in isolation.
//!
//! [`CacheSession::apply`] is the single write path. For each mutation result
//! it updates the store, then the indices, then walks the registry patching
//! every live view that could contain the affected entities, always in that
//! order, so a view patch never observes an index that has not yet absorbed
//! the mutation. One mutation's sequence runs to completion before the next
//! result is processed; there are no suspension points inside.
//!
//! Store and index errors inside a reconciliation are swallowed and logged:
//! a patch against a concurrently deleted entity degrades to a no-op and the
//! remaining view patches still run. Only a malformed result envelope escapes
//! to the caller ([`CacheSession::apply_value`]), and it is rejected before
//! any state is touched.

use std::collections::{btree_map::Entry as BTreeEntry, BTreeMap, BTreeSet};
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::{json, Value};
use tokio::sync::watch;

use crate::{
    event::CacheEvent,
    mutation::MutationResult,
    permissions::PermissionIndex,
    properties::{Item, ItemId, ItemPatch, ItemRelationship, Permission, PermissionId},
    relations::RelationIndex,
    store::EntityStore,
    views::{Position, ViewEntry, ViewKey, ViewRegistry},
    CartaError,
};

/// Shared handle for threaded embeddings: single writer, many readers.
/// Writers must hold the lock across a whole [`CacheSession::apply`] so
/// readers never observe a view patched ahead of its index.
pub type SharedCache = Arc<RwLock<CacheSession>>;

#[derive(Default)]
pub struct CacheSession {
    store: EntityStore,
    relations: RelationIndex,
    permissions: PermissionIndex,
    views: ViewRegistry,
    subscribers: BTreeMap<ViewKey, watch::Sender<Vec<ViewEntry>>>,
}

impl CacheSession {
    pub fn new() -> CacheSession {
        CacheSession::default()
    }

    pub fn into_shared(self) -> SharedCache {
        Arc::new(RwLock::new(self))
    }

    pub fn store(&self) -> &EntityStore {
        &self.store
    }

    pub fn item(&self, id: &ItemId) -> Option<&Item> {
        self.store.item(id)
    }

    pub fn permission(&self, id: &PermissionId) -> Option<&Permission> {
        self.store.permission(id)
    }

    pub fn children_of(&self, parent: &ItemId) -> Vec<ItemId> {
        self.relations.children_of(parent)
    }

    pub fn parents_of(&self, child: &ItemId) -> BTreeSet<ItemId> {
        self.relations.parents_of(child)
    }

    pub fn permissions_of(&self, item_id: &ItemId) -> &[PermissionId] {
        self.permissions.permissions_of(item_id)
    }

    /// Read a live view without creating one.
    pub fn view(&self, key: &ViewKey) -> Option<&[ViewEntry]> {
        self.views.snapshot(key)
    }

    /// Query a view, materializing it from the store and indices on first
    /// access. Search views cannot be derived locally and start empty until
    /// seeded with server results.
    pub fn query(&mut self, key: &ViewKey) -> &[ViewEntry] {
        if !self.views.is_open(key) {
            let entries = self.materialize(key);
            self.views.seed(key.clone(), entries);
        }
        self.views.snapshot(key).unwrap_or(&[])
    }

    /// Install server query results under `key`, replacing prior content.
    pub fn seed_view(&mut self, key: ViewKey, entries: Vec<ViewEntry>) {
        self.views.seed(key.clone(), entries);
        self.publish(&key);
    }

    /// Install search results for `term`.
    pub fn seed_search(&mut self, term: &str, items: &[Item]) {
        self.seed_view(
            ViewKey::Search(term.to_string()),
            items.iter().map(ViewEntry::from_item).collect(),
        );
    }

    /// Subscribe to a view's snapshots. The receiver holds the current
    /// sequence immediately; later sends may repeat an unchanged sequence and
    /// subscribers must tolerate the no-op render.
    pub fn subscribe(&mut self, key: &ViewKey) -> watch::Receiver<Vec<ViewEntry>> {
        self.query(key);
        let snapshot = self
            .views
            .snapshot(key)
            .map(|entries| entries.to_vec())
            .unwrap_or_default();
        match self.subscribers.entry(key.clone()) {
            BTreeEntry::Occupied(entry) => entry.get().subscribe(),
            BTreeEntry::Vacant(entry) => {
                let (tx, rx) = watch::channel(snapshot);
                entry.insert(tx);
                rx
            }
        }
    }

    /// Drop a view and its subscriber channel (UI region unmounted).
    pub fn dispose(&mut self, key: &ViewKey) -> bool {
        self.subscribers.remove(key);
        self.views.dispose(key)
    }

    /// Validate a raw `{ mutationKind, input, output }` envelope, then apply
    /// it. Rejection happens before any state change, so a malformed result
    /// leaves the cache exactly as it was.
    pub fn apply_value(&mut self, raw: &Value) -> Result<Vec<CacheEvent>, CartaError> {
        let result = MutationResult::from_value(raw)?;
        Ok(self.apply(&result))
    }

    /// Apply one server-confirmed mutation result: store, then indices, then
    /// view patches. Returns the list of changes made.
    pub fn apply(&mut self, result: &MutationResult) -> Vec<CacheEvent> {
        tracing::debug!("[CacheSession::apply] {}", result.kind());
        let events = match result {
            MutationResult::CreateItem { item, parent_id } => {
                self.apply_create_item(item, parent_id.as_ref())
            }
            MutationResult::UpdateItem { id, fields } => self.apply_update_item(id, fields),
            MutationResult::DeleteItem { id, parent_id } => {
                self.apply_delete_item(id, parent_id.as_ref())
            }
            MutationResult::CreateRelationship {
                relationship,
                child,
            } => self.apply_create_relationship(relationship, child.as_ref()),
            MutationResult::DeleteRelationship { relationship } => {
                self.apply_delete_relationship(relationship)
            }
            MutationResult::CreatePermission {
                item_id,
                permission,
            } => self.apply_create_permission(item_id, permission),
            MutationResult::DeletePermission {
                permission_id,
                item_id,
            } => self.apply_delete_permission(permission_id, item_id),
        };

        let touched: BTreeSet<ViewKey> = events
            .iter()
            .filter_map(|event| match event {
                CacheEvent::ViewPatched(key) => Some(key.clone()),
                _ => None,
            })
            .collect();
        for key in &touched {
            self.publish(key);
        }
        events
    }

    fn apply_create_item(&mut self, item: &Item, parent_id: Option<&ItemId>) -> Vec<CacheEvent> {
        let mut events = vec![CacheEvent::ItemStored(item.id.clone())];
        self.store.put_item(item.clone());

        if let Some(parent) = parent_id {
            match self.relations.add_edge(parent, &item.id) {
                Ok(()) => events.push(CacheEvent::EdgeAdded(parent.clone(), item.id.clone())),
                Err(CartaError::DuplicateEdge { .. }) => {
                    // Already satisfied; the view inserts below de-dup too.
                    tracing::debug!("edge {} -> {} already present", parent, item.id);
                }
                Err(src) => tracing::warn!("add_edge failed: {src}"),
            }
        }

        self.patch_insert(
            &ViewKey::AllItems,
            ViewEntry::from_item(item),
            &mut events,
        );
        if let Some(parent) = parent_id {
            self.patch_insert(
                &ViewKey::ChildrenOf(parent.clone()),
                ViewEntry::from_item(item),
                &mut events,
            );
            let parent_label = self.store.item(parent).map(|p| p.label.clone());
            self.patch_insert(
                &ViewKey::GroupsOf(item.id.clone()),
                ViewEntry::group_ref(parent, parent_label.as_deref()),
                &mut events,
            );
        }
        events
    }

    fn apply_update_item(&mut self, id: &ItemId, fields: &ItemPatch) -> Vec<CacheEvent> {
        let mut events = Vec::new();
        if fields.is_empty() {
            tracing::debug!("updateItem {id}: empty patch");
            return events;
        }
        let old_parent = self.store.item(id).and_then(|item| item.parent_id.clone());

        let patched = match self.store.patch_item(id, fields) {
            Ok(_) => {
                events.push(CacheEvent::ItemPatched(id.clone()));
                true
            }
            Err(src) => {
                // Concurrently deleted by another client; the view sweeps
                // below degrade to no-ops against an entity no view holds.
                tracing::warn!("updateItem {id}: {src}");
                false
            }
        };

        let mut projection = patch_projection(fields);
        // A move only proceeds for a record the store still holds; otherwise
        // the index would gain an edge for an entity with no record.
        let parent_move = match &fields.parent_id {
            Some(new_parent) if patched && *new_parent != old_parent => Some(new_parent.clone()),
            _ => None,
        };

        if let Some(new_parent) = &parent_move {
            // removeEdge then addEdge, with no observer in between: an item
            // is never visible as parentless mid-move.
            if let Some(old) = &old_parent {
                if self.relations.remove_edge(old, id) {
                    events.push(CacheEvent::EdgeRemoved(old.clone(), id.clone()));
                }
            }
            if let Some(new) = new_parent {
                match self.relations.add_edge(new, id) {
                    Ok(()) => events.push(CacheEvent::EdgeAdded(new.clone(), id.clone())),
                    Err(CartaError::DuplicateEdge { .. }) => {
                        tracing::debug!("edge {} -> {} already present", new, id);
                    }
                    Err(src) => tracing::warn!("add_edge failed: {src}"),
                }
            }

            let new_parent_label = new_parent
                .as_ref()
                .and_then(|p| self.store.item(p))
                .map(|p| p.label.clone());
            projection.insert(
                "itemByParentId".to_string(),
                match new_parent {
                    Some(p) => json!({ "id": p, "label": new_parent_label }),
                    None => Value::Null,
                },
            );

            if let Some(old) = &old_parent {
                self.patch_remove(&ViewKey::ChildrenOf(old.clone()), id.as_str(), &mut events);
                self.patch_remove(&ViewKey::GroupsOf(id.clone()), old.as_str(), &mut events);
            }
            if let Some(new) = new_parent {
                let entry = self.store.item(id).map(ViewEntry::from_item);
                if let Some(entry) = entry {
                    self.patch_insert(&ViewKey::ChildrenOf(new.clone()), entry, &mut events);
                }
                self.patch_insert(
                    &ViewKey::GroupsOf(id.clone()),
                    ViewEntry::group_ref(new, new_parent_label.as_deref()),
                    &mut events,
                );
            }
        }

        // Merge the projected fields into every remaining view holding the
        // item: allItems, the detail view, open search results, and the
        // children views of unrelated parents.
        for key in self.views.refresh_entity(id.as_str(), &projection) {
            events.push(CacheEvent::ViewPatched(key));
        }
        events
    }

    fn apply_delete_item(&mut self, id: &ItemId, parent_id: Option<&ItemId>) -> Vec<CacheEvent> {
        let mut events = Vec::new();
        if self.store.remove_item(id) {
            events.push(CacheEvent::ItemRemoved(id.clone()));
        } else {
            tracing::warn!("deleteItem {id}: not in store");
        }

        // Only the known parent's edge is removed. Other parents keep their
        // edges and their children views; permissions are not revoked. See
        // DESIGN.md for the non-cascade contract.
        if let Some(parent) = parent_id {
            if self.relations.remove_edge(parent, id) {
                events.push(CacheEvent::EdgeRemoved(parent.clone(), id.clone()));
            }
        }

        self.patch_remove(&ViewKey::AllItems, id.as_str(), &mut events);
        if let Some(parent) = parent_id {
            self.patch_remove(&ViewKey::ChildrenOf(parent.clone()), id.as_str(), &mut events);
            self.patch_remove(&ViewKey::GroupsOf(id.clone()), parent.as_str(), &mut events);
        }
        // A deleted item can no longer satisfy any search predicate, and its
        // own detail view must empty out.
        let own_detail = ViewKey::ItemDetail(id.clone());
        let swept = self.views.sweep_remove(id.as_str(), |key| {
            matches!(key, ViewKey::Search(_)) || *key == own_detail
        });
        for key in swept {
            events.push(CacheEvent::ViewPatched(key));
        }
        events
    }

    fn apply_create_relationship(
        &mut self,
        relationship: &ItemRelationship,
        child: Option<&Item>,
    ) -> Vec<CacheEvent> {
        let mut events = Vec::new();
        let parent = &relationship.parent_id;
        let child_id = &relationship.child_id;

        // The flow embeds the child record when it already had it loaded;
        // keep the canonical record if one exists.
        if let Some(child_item) = child {
            if self.store.item(child_id).is_none() {
                self.store.put_item(child_item.clone());
                events.push(CacheEvent::ItemStored(child_id.clone()));
            }
        }

        match self.relations.add_edge(parent, child_id) {
            Ok(()) => events.push(CacheEvent::EdgeAdded(parent.clone(), child_id.clone())),
            Err(CartaError::DuplicateEdge { .. }) => {
                tracing::debug!("edge {} -> {} already present", parent, child_id);
            }
            Err(src) => tracing::warn!("add_edge failed: {src}"),
        }

        let child_entry = self
            .store
            .item(child_id)
            .map(ViewEntry::from_item)
            .or_else(|| child.map(ViewEntry::from_item))
            .unwrap_or(ViewEntry {
                id: child_id.to_string(),
                fields: BTreeMap::new(),
            });
        self.patch_insert(&ViewKey::ChildrenOf(parent.clone()), child_entry, &mut events);
        let parent_label = self.store.item(parent).map(|p| p.label.clone());
        self.patch_insert(
            &ViewKey::GroupsOf(child_id.clone()),
            ViewEntry::group_ref(parent, parent_label.as_deref()),
            &mut events,
        );
        events
    }

    fn apply_delete_relationship(&mut self, relationship: &ItemRelationship) -> Vec<CacheEvent> {
        let mut events = Vec::new();
        let parent = &relationship.parent_id;
        let child_id = &relationship.child_id;
        if self.relations.remove_edge(parent, child_id) {
            events.push(CacheEvent::EdgeRemoved(parent.clone(), child_id.clone()));
        }
        self.patch_remove(&ViewKey::ChildrenOf(parent.clone()), child_id.as_str(), &mut events);
        self.patch_remove(&ViewKey::GroupsOf(child_id.clone()), parent.as_str(), &mut events);
        events
    }

    fn apply_create_permission(
        &mut self,
        item_id: &ItemId,
        permission: &Permission,
    ) -> Vec<CacheEvent> {
        let mut events = vec![CacheEvent::PermissionGranted(
            permission.id.clone(),
            item_id.clone(),
        )];
        self.store.put_permission(permission.clone());
        self.permissions.grant(item_id, &permission.id);
        self.patch_insert(
            &ViewKey::PermissionsOf(item_id.clone()),
            ViewEntry::from_permission(permission),
            &mut events,
        );
        events
    }

    fn apply_delete_permission(
        &mut self,
        permission_id: &PermissionId,
        item_id: &ItemId,
    ) -> Vec<CacheEvent> {
        let mut events = Vec::new();
        let existed = self.store.remove_permission(permission_id);
        let revoked = self.permissions.revoke(item_id, permission_id);
        if existed || revoked {
            events.push(CacheEvent::PermissionRevoked(
                permission_id.clone(),
                item_id.clone(),
            ));
        } else {
            tracing::debug!("deletePermission {permission_id}: already absent");
        }
        self.patch_remove(
            &ViewKey::PermissionsOf(item_id.clone()),
            permission_id.as_str(),
            &mut events,
        );
        events
    }

    fn patch_insert(&mut self, key: &ViewKey, entry: ViewEntry, events: &mut Vec<CacheEvent>) {
        if self.views.patch_insert(key, entry, Position::End) {
            events.push(CacheEvent::ViewPatched(key.clone()));
        }
    }

    fn patch_remove(&mut self, key: &ViewKey, id: &str, events: &mut Vec<CacheEvent>) {
        if self.views.patch_remove(key, id) {
            events.push(CacheEvent::ViewPatched(key.clone()));
        }
    }

    fn publish(&mut self, key: &ViewKey) {
        if let Some(sender) = self.subscribers.get(key) {
            let snapshot = self
                .views
                .snapshot(key)
                .map(|entries| entries.to_vec())
                .unwrap_or_default();
            // Receivers may observe an unchanged sequence; that is an
            // acceptable no-op render, not a correctness issue.
            sender.send_replace(snapshot);
        }
    }

    /// Compute a view's membership from the store and indices. The local
    /// derivation of the declared predicate for each view kind.
    fn materialize(&self, key: &ViewKey) -> Vec<ViewEntry> {
        match key {
            ViewKey::AllItems => self.store.items().map(ViewEntry::from_item).collect(),
            ViewKey::ItemDetail(id) => match self.store.item(id) {
                Some(item) => {
                    let parent_label = item
                        .parent_id
                        .as_ref()
                        .and_then(|parent| self.store.item(parent))
                        .map(|parent| parent.label.as_str());
                    vec![ViewEntry::detail(item, parent_label)]
                }
                None => Vec::new(),
            },
            ViewKey::ChildrenOf(parent) => self
                .relations
                .children_of(parent)
                .iter()
                .filter_map(|child| self.store.item(child))
                .map(ViewEntry::from_item)
                .collect(),
            ViewKey::GroupsOf(child) => self
                .relations
                .parents_of(child)
                .iter()
                .map(|parent| {
                    let label = self.store.item(parent).map(|item| item.label.as_str());
                    ViewEntry::group_ref(parent, label)
                })
                .collect(),
            ViewKey::PermissionsOf(item_id) => self
                .permissions
                .permissions_of(item_id)
                .iter()
                .filter_map(|id| self.store.permission(id))
                .map(ViewEntry::from_permission)
                .collect(),
            // Search membership is a server-side predicate; results arrive
            // through seeding only.
            ViewKey::Search(_) => Vec::new(),
        }
    }
}

/// Translate an item patch into projected view fields.
fn patch_projection(fields: &ItemPatch) -> BTreeMap<String, Value> {
    let mut projection = BTreeMap::new();
    if let Some(label) = &fields.label {
        projection.insert("label".to_string(), json!(label));
    }
    if let Some(value) = &fields.value {
        projection.insert("value".to_string(), json!(value));
    }
    if let Some(parent_id) = &fields.parent_id {
        projection.insert("parentId".to_string(), json!(parent_id));
    }
    projection
}
