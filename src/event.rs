use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

use crate::{
    properties::{ItemId, PermissionId},
    views::ViewKey,
};

/// Describes one cache change applied by the session.
///
/// Returned from [`crate::session::CacheSession::apply`] so that mirroring
/// collaborators (a debugging overlay, a second cache) can follow along
/// without re-deriving what the mutation touched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CacheEvent {
    ItemStored(ItemId),
    ItemPatched(ItemId),
    ItemRemoved(ItemId),
    /// Parent, child
    EdgeAdded(ItemId, ItemId),
    /// Parent, child
    EdgeRemoved(ItemId, ItemId),
    PermissionGranted(PermissionId, ItemId),
    PermissionRevoked(PermissionId, ItemId),
    /// A live view's entry list changed.
    ViewPatched(ViewKey),
}

impl Display for CacheEvent {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            CacheEvent::ItemStored(_) => write!(f, "ItemStored"),
            CacheEvent::ItemPatched(_) => write!(f, "ItemPatched"),
            CacheEvent::ItemRemoved(_) => write!(f, "ItemRemoved"),
            CacheEvent::EdgeAdded(_, _) => write!(f, "EdgeAdded"),
            CacheEvent::EdgeRemoved(_, _) => write!(f, "EdgeRemoved"),
            CacheEvent::PermissionGranted(_, _) => write!(f, "PermissionGranted"),
            CacheEvent::PermissionRevoked(_, _) => write!(f, "PermissionRevoked"),
            CacheEvent::ViewPatched(_) => write!(f, "ViewPatched"),
        }
    }
}
