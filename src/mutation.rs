//! Mutation results, the cache's only write input.
//!
//! The network layer hands the session a `{ mutationKind, input, output }`
//! envelope for every mutation that succeeded against the server.
//! [`MutationResult::from_value`] validates that envelope field by field and
//! rejects it with [`CartaError::MalformedResult`] before any cache state is
//! touched, so a malformed result never leaves a half-applied mutation
//! behind. Embedders that already hold structured results construct the
//! variants directly.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::{
    properties::{Item, ItemId, ItemPatch, ItemRelationship, Permission, PermissionId},
    CartaError,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationResult {
    /// A new item, possibly under a parent. The server-confirmed record
    /// carries the canonical id.
    CreateItem {
        item: Item,
        parent_id: Option<ItemId>,
    },
    /// Field-level patch of an existing item.
    UpdateItem { id: ItemId, fields: ItemPatch },
    /// Deletion from the context of one known parent. Edges to other parents
    /// are deliberately left alone.
    DeleteItem {
        id: ItemId,
        parent_id: Option<ItemId>,
    },
    /// "Add existing item to this group": a new edge, with the child record
    /// embedded when the flow already had it loaded.
    CreateRelationship {
        relationship: ItemRelationship,
        child: Option<Item>,
    },
    DeleteRelationship { relationship: ItemRelationship },
    CreatePermission {
        item_id: ItemId,
        permission: Permission,
    },
    DeletePermission {
        permission_id: PermissionId,
        item_id: ItemId,
    },
}

impl MutationResult {
    /// The wire name of this mutation kind, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            MutationResult::CreateItem { .. } => "createItem",
            MutationResult::UpdateItem { .. } => "updateItem",
            MutationResult::DeleteItem { .. } => "deleteItem",
            MutationResult::CreateRelationship { .. } => "createRelationship",
            MutationResult::DeleteRelationship { .. } => "deleteRelationship",
            MutationResult::CreatePermission { .. } => "createPermission",
            MutationResult::DeletePermission { .. } => "deletePermission",
        }
    }

    /// Validate a `{ mutationKind, input, output }` envelope.
    ///
    /// Every field the reconciler will read is checked here; nothing is read
    /// lazily later, so acceptance means the whole mutation can be applied.
    pub fn from_value(raw: &Value) -> Result<MutationResult, CartaError> {
        let kind = raw
            .get("mutationKind")
            .and_then(Value::as_str)
            .ok_or_else(|| malformed("missing or non-string 'mutationKind'"))?;
        let input = raw.get("input").unwrap_or(&Value::Null);
        let output = raw.get("output").unwrap_or(&Value::Null);

        match kind {
            "createItem" => {
                let item: Item = required(output, "item")?;
                let parent_id = match item.parent_id.clone() {
                    Some(parent_id) => Some(parent_id),
                    None => optional(input, "parentId")?,
                };
                Ok(MutationResult::CreateItem { item, parent_id })
            }
            "updateItem" => {
                let id: ItemId = required(input, "id")?;
                let fields: ItemPatch = required(input, "itemPatch")?;
                Ok(MutationResult::UpdateItem { id, fields })
            }
            "deleteItem" => {
                let id: ItemId = required(input, "id")?;
                let parent_id: Option<ItemId> = optional(input, "parentId")?;
                Ok(MutationResult::DeleteItem { id, parent_id })
            }
            "createRelationship" => {
                let relationship: ItemRelationship = required(output, "itemRelationship")?;
                let child: Option<Item> = optional(output, "itemByChildId")?;
                Ok(MutationResult::CreateRelationship {
                    relationship,
                    child,
                })
            }
            "deleteRelationship" => {
                let relationship: ItemRelationship = match output.get("itemRelationship") {
                    Some(value) if !value.is_null() => required(output, "itemRelationship")?,
                    // The server echoes only what the client sent for deletes.
                    _ => required_from(input)?,
                };
                Ok(MutationResult::DeleteRelationship { relationship })
            }
            "createPermission" => {
                let permission: Permission = required(output, "permission")?;
                let item_id = permission.item_id.clone();
                Ok(MutationResult::CreatePermission {
                    item_id,
                    permission,
                })
            }
            "deletePermission" => {
                let permission_id: PermissionId = required(input, "id")?;
                let item_id: ItemId = required(input, "itemId")?;
                Ok(MutationResult::DeletePermission {
                    permission_id,
                    item_id,
                })
            }
            other => Err(malformed(&format!("unknown mutationKind '{other}'"))),
        }
    }
}

fn malformed(msg: &str) -> CartaError {
    CartaError::MalformedResult(msg.to_string())
}

/// Extract and deserialize a required field, rejecting absence and nulls.
fn required<T: DeserializeOwned>(parent: &Value, name: &str) -> Result<T, CartaError> {
    let value = parent
        .get(name)
        .filter(|value| !value.is_null())
        .ok_or_else(|| malformed(&format!("missing field '{name}'")))?;
    serde_json::from_value(value.clone())
        .map_err(|src| malformed(&format!("field '{name}': {src}")))
}

/// Extract an optional field; absent and null both map to `None`.
fn optional<T: DeserializeOwned>(parent: &Value, name: &str) -> Result<Option<T>, CartaError> {
    match parent.get(name) {
        None => Ok(None),
        Some(Value::Null) => Ok(None),
        Some(value) => serde_json::from_value(value.clone())
            .map(Some)
            .map_err(|src| malformed(&format!("field '{name}': {src}"))),
    }
}

fn required_from<T: DeserializeOwned>(value: &Value) -> Result<T, CartaError> {
    if value.is_null() {
        return Err(malformed("missing 'input' object"));
    }
    serde_json::from_value(value.clone()).map_err(|src| malformed(&format!("{src}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn create_item_envelope_parses() {
        let raw = json!({
            "mutationKind": "createItem",
            "input": {},
            "output": {
                "item": {
                    "id": "i2",
                    "label": "Milk",
                    "value": null,
                    "parentId": "i1"
                }
            }
        });
        let result = MutationResult::from_value(&raw).unwrap();
        let MutationResult::CreateItem { item, parent_id } = result else {
            panic!("wrong variant");
        };
        assert_eq!(item.id, ItemId::from("i2"));
        assert_eq!(parent_id, Some(ItemId::from("i1")));
    }

    #[test]
    fn create_item_parent_falls_back_to_input() {
        let raw = json!({
            "mutationKind": "createItem",
            "input": { "parentId": "i1" },
            "output": {
                "item": { "id": "i2", "label": "Milk" }
            }
        });
        let MutationResult::CreateItem { parent_id, .. } =
            MutationResult::from_value(&raw).unwrap()
        else {
            panic!("wrong variant");
        };
        assert_eq!(parent_id, Some(ItemId::from("i1")));
    }

    #[test]
    fn missing_output_item_is_malformed() {
        let raw = json!({
            "mutationKind": "createItem",
            "input": {},
            "output": {}
        });
        let err = MutationResult::from_value(&raw).unwrap_err();
        assert!(matches!(err, CartaError::MalformedResult(_)), "{err}");
    }

    #[test]
    fn missing_kind_is_malformed() {
        let err = MutationResult::from_value(&json!({ "input": {}, "output": {} })).unwrap_err();
        assert!(matches!(err, CartaError::MalformedResult(_)));
        let err = MutationResult::from_value(&json!({
            "mutationKind": "renameEverything"
        }))
        .unwrap_err();
        assert!(matches!(err, CartaError::MalformedResult(_)));
    }

    #[test]
    fn update_item_reads_the_patch_from_input() {
        let raw = json!({
            "mutationKind": "updateItem",
            "input": {
                "id": "i2",
                "itemPatch": { "label": "Milk 2%", "parentId": null }
            },
            "output": {
                "item": { "id": "i2", "label": "Milk 2%" }
            }
        });
        let MutationResult::UpdateItem { id, fields } = MutationResult::from_value(&raw).unwrap()
        else {
            panic!("wrong variant");
        };
        assert_eq!(id, ItemId::from("i2"));
        assert_eq!(fields.label.as_deref(), Some("Milk 2%"));
        assert_eq!(fields.parent_id, Some(None));
    }

    #[test]
    fn delete_relationship_falls_back_to_input_echo() {
        let raw = json!({
            "mutationKind": "deleteRelationship",
            "input": { "parentId": "g1", "childId": "i2" },
            "output": {}
        });
        let MutationResult::DeleteRelationship { relationship } =
            MutationResult::from_value(&raw).unwrap()
        else {
            panic!("wrong variant");
        };
        assert_eq!(relationship.parent_id, ItemId::from("g1"));
        assert_eq!(relationship.child_id, ItemId::from("i2"));
    }

    #[test]
    fn create_permission_keys_off_the_output_record() {
        let raw = json!({
            "mutationKind": "createPermission",
            "input": {
                "permission": { "itemId": "i2", "userOrGroupId": "u1", "role": "READER" }
            },
            "output": {
                "permission": {
                    "id": "p1",
                    "itemId": "i2",
                    "userOrGroup": { "id": "u1", "name": "Ann" },
                    "role": "READER",
                    "timeCreated": "2020-05-01T10:00:00Z"
                }
            }
        });
        let MutationResult::CreatePermission {
            item_id,
            permission,
        } = MutationResult::from_value(&raw).unwrap()
        else {
            panic!("wrong variant");
        };
        assert_eq!(item_id, ItemId::from("i2"));
        assert_eq!(permission.id, PermissionId::from("p1"));
        assert_eq!(permission.user_or_group.unwrap().name, "Ann");
    }
}
