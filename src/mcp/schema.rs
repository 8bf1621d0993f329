//! JSON Schema helpers for MCP-compliant schemas.
//!
//! Generates standard JSON Schema without Rust-specific formats like "uint"
//! that LLMs may not understand correctly.

use schemars::Schema;
use schemars::json_schema;

/// Unsigned integer schema: `{"type": "integer", "minimum": 0}`
///
/// Use with `#[schemars(schema_with = "crate::mcp::schema::uint")]` on unsigned fields.
pub fn uint(_generator: &mut schemars::SchemaGenerator) -> Schema {
    json_schema!({
        "type": "integer",
        "minimum": 0
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use schemars::SchemaGenerator;

    #[test]
    fn test_uint_is_plain_non_negative_integer() {
        let schema = uint(&mut SchemaGenerator::default());
        let json = serde_json::to_value(&schema).unwrap();

        assert_eq!(json, serde_json::json!({"type": "integer", "minimum": 0}));
    }

    fn assert_no_uint<T: schemars::JsonSchema>(type_name: &str) {
        let schema = SchemaGenerator::default().into_root_schema_for::<T>();
        let json_str = serde_json::to_string(&schema).expect("Failed to serialize schema");

        assert!(
            !json_str.contains("\"uint"),
            "{} schema should not contain 'uint' format: {}",
            type_name,
            json_str
        );
    }

    #[test]
    fn test_session_info_schema_no_uint() {
        assert_no_uint::<crate::mcp::types::SessionInfo>("SessionInfo");
    }

    #[test]
    fn test_session_list_response_schema_no_uint() {
        assert_no_uint::<crate::mcp::types::SessionListResponse>("SessionListResponse");
    }

    #[test]
    fn test_ssh_connect_response_schema_no_uint() {
        assert_no_uint::<crate::mcp::types::SshConnectResponse>("SshConnectResponse");
    }

    #[test]
    fn test_kube_context_handle_schema_no_uint() {
        assert_no_uint::<crate::mcp::types::KubeContextHandle>("KubeContextHandle");
    }

    #[test]
    fn test_pod_list_response_schema_no_uint() {
        assert_no_uint::<crate::mcp::types::PodListResponse>("PodListResponse");
    }

    #[test]
    fn test_health_response_schema_no_uint() {
        assert_no_uint::<crate::mcp::types::HealthResponse>("HealthResponse");
    }
}
