//! [crate::properties] contains the basic records manipulated by the cache:
//! items, relationships, permissions, and their server-assigned identifiers.
//!
//! Identifiers are opaque strings minted by the server. The
//! cache never generates ids of its own; a record only enters the
//! [`crate::store::EntityStore`] once a mutation result has confirmed it.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Server-assigned identifier of an [`Item`].
#[derive(Clone, Debug, Serialize, Deserialize, Hash, PartialEq, Eq, PartialOrd, Ord, Default)]
#[serde(transparent)]
pub struct ItemId(String);

/// Server-assigned identifier of a [`Permission`].
#[derive(Clone, Debug, Serialize, Deserialize, Hash, PartialEq, Eq, PartialOrd, Ord, Default)]
#[serde(transparent)]
pub struct PermissionId(String);

/// Server-assigned identifier of an [`ItemRelationship`] edge.
#[derive(Clone, Debug, Serialize, Deserialize, Hash, PartialEq, Eq, PartialOrd, Ord, Default)]
#[serde(transparent)]
pub struct RelationshipId(String);

/// Server-assigned identifier of a user or group.
#[derive(Clone, Debug, Serialize, Deserialize, Hash, PartialEq, Eq, PartialOrd, Ord, Default)]
#[serde(transparent)]
pub struct PrincipalId(String);

macro_rules! opaque_id {
    ($name:ident) => {
        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                $name(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                $name(id.to_string())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                $name(id)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

opaque_id!(ItemId);
opaque_id!(PermissionId);
opaque_id!(RelationshipId);
opaque_id!(PrincipalId);

/// A labeled content node. `value` is arbitrary user content (may encode
/// markdown, a number, a link); rendering it is the UI's concern.
///
/// `parent_id` denormalizes the item's primary parent. It is distinct from
/// the full relationship graph kept by [`crate::relations::RelationIndex`]:
/// an item may belong to several groups but has at most one primary parent.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: ItemId,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub parent_id: Option<ItemId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_created: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_updated: Option<String>,
}

/// Field-level patch for an [`Item`]. Absent fields are left untouched.
///
/// `parent_id` distinguishes "not patched" (outer `None`) from "cleared"
/// (`Some(None)`), since moving an item to the root is expressed as a patch
/// to a null parent.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "some_or_null",
        serialize_with = "flatten_null"
    )]
    pub parent_id: Option<Option<ItemId>>,
}

impl ItemPatch {
    pub fn is_empty(&self) -> bool {
        self.label.is_none() && self.value.is_none() && self.parent_id.is_none()
    }
}

/// Deserialize a present-but-possibly-null field into `Some(Option<ItemId>)`.
fn some_or_null<'de, D>(de: D) -> Result<Option<Option<ItemId>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Deserialize::deserialize(de).map(Some)
}

fn flatten_null<S>(field: &Option<Option<ItemId>>, ser: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    match field {
        Some(inner) => inner.serialize(ser),
        None => ser.serialize_none(),
    }
}

/// A parent→child edge. Distinct from [`Item::parent_id`]: edges carry the
/// full multi-parent graph, so an item can appear in several groups at once.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemRelationship {
    #[serde(default)]
    pub id: RelationshipId,
    pub parent_id: ItemId,
    pub child_id: ItemId,
}

/// A user or group a permission is granted to.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: PrincipalId,
    pub name: String,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    #[default]
    Reader,
    Writer,
}

impl Display for Role {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            Role::Reader => write!(f, "READER"),
            Role::Writer => write!(f, "WRITER"),
        }
    }
}

/// A role grant binding a user or group to an item.
///
/// Owned by the item it targets but with an independent lifecycle: deleting
/// the item does not revoke its permissions (see the session's delete
/// handling). `user_or_group` is `None` for grants whose principal has been
/// removed server-side; the record is still displayable by id.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Permission {
    pub id: PermissionId,
    pub item_id: ItemId,
    #[serde(default)]
    pub user_or_group: Option<Principal>,
    #[serde(default)]
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_created: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_round_trips_camel_case() {
        let raw = serde_json::json!({
            "id": "i1",
            "label": "Groceries",
            "value": "# list",
            "parentId": "i0",
            "timeCreated": "2020-01-01T00:00:00Z"
        });
        let item: Item = serde_json::from_value(raw).unwrap();
        assert_eq!(item.id, ItemId::from("i1"));
        assert_eq!(item.parent_id, Some(ItemId::from("i0")));
        let back = serde_json::to_value(&item).unwrap();
        assert_eq!(back["parentId"], "i0");
    }

    #[test]
    fn patch_distinguishes_absent_from_null_parent() {
        let untouched: ItemPatch = serde_json::from_value(serde_json::json!({
            "label": "Milk"
        }))
        .unwrap();
        assert_eq!(untouched.parent_id, None);

        let cleared: ItemPatch = serde_json::from_value(serde_json::json!({
            "parentId": null
        }))
        .unwrap();
        assert_eq!(cleared.parent_id, Some(None));

        let moved: ItemPatch = serde_json::from_value(serde_json::json!({
            "parentId": "i9"
        }))
        .unwrap();
        assert_eq!(moved.parent_id, Some(Some(ItemId::from("i9"))));
    }

    #[test]
    fn role_uses_wire_casing() {
        assert_eq!(serde_json::to_value(Role::Writer).unwrap(), "WRITER");
        let role: Role = serde_json::from_value(serde_json::json!("READER")).unwrap();
        assert_eq!(role, Role::Reader);
    }
}
