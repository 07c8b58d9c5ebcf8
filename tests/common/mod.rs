//! Shared test utilities for integration tests.
//!
//! Import from integration test files as:
//! ```ignore
//! mod common;
//! ```

use carta_cache::{Item, ItemId, Permission, PermissionId, Principal, PrincipalId, Role};

/// Initialize tracing for tests, respecting RUST_LOG env var.
///
/// Safe to call multiple times, subsequent calls are no-ops.
#[allow(dead_code)]
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();
}

#[allow(dead_code)]
pub fn item(id: &str, label: &str, parent: Option<&str>) -> Item {
    Item {
        id: ItemId::from(id),
        label: label.to_string(),
        value: None,
        parent_id: parent.map(ItemId::from),
        time_created: Some("2024-01-01T00:00:00Z".to_string()),
        time_updated: None,
    }
}

#[allow(dead_code)]
pub fn permission(id: &str, item: &str, principal: &str, role: Role) -> Permission {
    Permission {
        id: PermissionId::from(id),
        item_id: ItemId::from(item),
        user_or_group: Some(Principal {
            id: PrincipalId::from(principal),
            name: format!("user-{principal}"),
        }),
        role,
        time_created: Some("2024-01-01T00:00:00Z".to_string()),
    }
}
