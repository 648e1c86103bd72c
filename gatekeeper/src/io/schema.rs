//! Embedded JSON Schemas and validation against them.

use anyhow::{Context, Result, anyhow};
use jsonschema::validator_for;
use serde_json::Value;

pub const TASK_LIST_SCHEMA: &str = include_str!("../../schemas/task_list.schema.json");
pub const WORKER_RESULT_SCHEMA: &str = include_str!("../../schemas/worker_result.schema.json");

/// Validate `instance` against an embedded schema, joining every violation
/// into one error.
pub fn validate_schema(schema_src: &str, instance: &Value, label: &str) -> Result<()> {
    let schema: Value = serde_json::from_str(schema_src).context("parse embedded schema")?;
    let compiled = validator_for(&schema).map_err(|err| anyhow!("invalid schema: {}", err))?;
    if !compiled.is_valid(instance) {
        let messages = compiled
            .iter_errors(instance)
            .map(|err| err.to_string())
            .collect::<Vec<_>>();
        return Err(anyhow!(
            "{} schema validation failed: {}",
            label,
            messages.join("; ")
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn embedded_schemas_compile() {
        for schema in [TASK_LIST_SCHEMA, WORKER_RESULT_SCHEMA] {
            let value: Value = serde_json::from_str(schema).expect("parse");
            validator_for(&value).expect("compile");
        }
    }

    #[test]
    fn worker_result_requires_signal() {
        let result = json!({ "produced_artifacts": [], "diagnostics": "" });
        let err = validate_schema(WORKER_RESULT_SCHEMA, &result, "worker result").unwrap_err();
        assert!(err.to_string().starts_with("worker result schema validation failed"));
    }

    #[test]
    fn task_list_rejects_bad_ids() {
        let list = json!({ "tasks": [{ "id": "T0", "description": "x", "status": "pending" }] });
        assert!(validate_schema(TASK_LIST_SCHEMA, &list, "task list").is_err());
        let list = json!({ "tasks": [{ "id": "R2", "description": "x", "status": "done" }] });
        validate_schema(TASK_LIST_SCHEMA, &list, "task list").expect("valid");
    }
}
