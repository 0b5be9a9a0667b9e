//! Prefixed ID generation.
//!
//! Generated entity IDs use a `prefix_` followed by a UUIDv7 (time-ordered),
//! so they sort by creation time and are identifiable by type in logs.
//! Operator-supplied IDs (vOps, POPs, links) are plain strings validated at
//! the boundary instead.

use uuid::Uuid;

/// Generate a prefixed ID using UUIDv7.
fn prefixed_id(prefix: &str) -> String {
    let id = Uuid::now_v7();
    format!("{}_{}", prefix, id.as_simple())
}

/// Generate a connection ID: `con_<uuid7>`
pub fn connection_id() -> String {
    prefixed_id("con")
}

/// Generate a command ID: `cmd_<uuid7>`
pub fn command_id() -> String {
    prefixed_id("cmd")
}

/// Validate an operator-supplied vOp identifier.
///
/// Accepted shape is `^[A-Za-z0-9_-]+$` — the id is embedded into Kafka
/// topic names, so anything else is rejected before provisioning starts.
pub fn valid_vop_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_have_correct_prefix() {
        assert!(connection_id().starts_with("con_"));
        assert!(command_id().starts_with("cmd_"));
    }

    #[test]
    fn ids_are_unique() {
        assert_ne!(command_id(), command_id());
    }

    #[test]
    fn ids_are_sortable_by_time() {
        let a = connection_id();
        let b = connection_id();
        // UUIDv7 are time-ordered, so b > a lexicographically
        assert!(b > a, "Expected {b} > {a}");
    }

    #[test]
    fn vop_id_validation() {
        assert!(valid_vop_id("vOp2"));
        assert!(valid_vop_id("tenant_A-1"));
        assert!(!valid_vop_id(""));
        assert!(!valid_vop_id("vop 2"));
        assert!(!valid_vop_id("vop/2"));
        assert!(!valid_vop_id("vop.2"));
    }
}
