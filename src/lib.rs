//! Client-side cache consistency core for a hierarchical note and wiki
//! application.
//!
//! The server owns the canonical data. This crate keeps a session-local
//! replica coherent after each confirmed mutation without refetching: a
//! normalized [`store::EntityStore`] holds one record per entity id, a
//! [`relations::RelationIndex`] tracks the multi-parent containment graph, a
//! [`permissions::PermissionIndex`] maps items to their grants, and a
//! [`views::ViewRegistry`] holds the materialized entry sequences that UI
//! regions render. [`session::CacheSession::apply`] reconciles a mutation
//! result into all four in a fixed store, index, view order.
//!
//! ```
//! use carta_cache::{CacheSession, Item, ItemId, MutationResult, ViewKey};
//!
//! let mut cache = CacheSession::new();
//! cache.query(&ViewKey::AllItems);
//!
//! let note = Item {
//!     id: ItemId::from("n1"),
//!     label: "Reading list".to_string(),
//!     ..Default::default()
//! };
//! cache.apply(&MutationResult::CreateItem {
//!     item: note,
//!     parent_id: None,
//! });
//!
//! let all = cache.query(&ViewKey::AllItems);
//! assert_eq!(all.len(), 1);
//! assert_eq!(all[0].id, "n1");
//! ```

pub mod error;
pub mod event;
pub mod mutation;
pub mod permissions;
pub mod properties;
pub mod relations;
pub mod session;
pub mod store;
pub mod views;

pub use error::CartaError;
pub use event::CacheEvent;
pub use mutation::MutationResult;
pub use properties::{
    Item, ItemId, ItemPatch, ItemRelationship, Permission, PermissionId, Principal, PrincipalId,
    RelationshipId, Role,
};
pub use session::{CacheSession, SharedCache};
pub use views::{Position, ViewEntry, ViewKey};
