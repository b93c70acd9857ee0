// src/mcp/schema.rs
// JSON-Schema canonicalization and cached validation for tool input
// schemas (C3 "schema canonicalization"). Many downstream LLM tool-calling
// APIs reject `$ref`/`$defs`, so schemas are inlined once at registration
// and a compiled validator is cached alongside — both recomputed only on
// `tools/list_changed`, never per call.

use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("failed to compile schema: {0}")]
    Compile(String),
}

/// A tool's input schema with `$ref`s resolved and a precompiled validator.
#[derive(Clone)]
pub struct CompiledSchema {
    pub inlined: Value,
    validator: Arc<jsonschema::Validator>,
}

impl CompiledSchema {
    pub fn compile(raw: &Value) -> Result<Self, SchemaError> {
        let inlined = inline_refs(raw);
        let validator = jsonschema::validator_for(&inlined).map_err(|e| SchemaError::Compile(e.to_string()))?;
        Ok(Self { inlined, validator: Arc::new(validator) })
    }

    pub fn validate(&self, instance: &Value) -> Result<(), Vec<String>> {
        let errors: Vec<String> = self.validator.iter_errors(instance).map(|e| e.to_string()).collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Resolve local `$ref`/`$defs` (and legacy `definitions`) references into
/// an inlined schema document. Only local (`#/...`) pointers are supported,
/// which covers the schemas MCP servers actually emit; any other `$ref`
/// (remote, recursive beyond one hop) is left as-is, since a tool-calling
/// API that cannot follow it will simply reject the one affected field, not
/// the whole tool catalog.
pub fn inline_refs(schema: &Value) -> Value {
    let root = schema.clone();
    let mut out = schema.clone();
    inline_refs_into(&mut out, &root, 0);
    out
}

fn inline_refs_into(node: &mut Value, root: &Value, depth: usize) {
    const MAX_DEPTH: usize = 32;
    if depth >= MAX_DEPTH {
        return;
    }

    match node {
        Value::Object(map) => {
            if let Some(Value::String(pointer)) = map.get("$ref").cloned() {
                if let Some(resolved) = resolve_pointer(root, &pointer) {
                    let mut replacement = resolved.clone();
                    inline_refs_into(&mut replacement, root, depth + 1);
                    *node = replacement;
                    return;
                }
            }
            for value in map.values_mut() {
                inline_refs_into(value, root, depth + 1);
            }
        }
        Value::Array(items) => {
            for item in items {
                inline_refs_into(item, root, depth + 1);
            }
        }
        _ => {}
    }
}

fn resolve_pointer<'a>(root: &'a Value, pointer: &str) -> Option<&'a Value> {
    let pointer = pointer.strip_prefix('#')?;
    if pointer.is_empty() {
        return Some(root);
    }
    root.pointer(pointer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_inline_simple_ref() {
        let schema = json!({
            "type": "object",
            "properties": { "name": { "$ref": "#/$defs/name" } },
            "$defs": { "name": { "type": "string", "minLength": 1 } }
        });
        let inlined = inline_refs(&schema);
        assert_eq!(inlined["properties"]["name"]["type"], "string");
        assert_eq!(inlined["properties"]["name"]["minLength"], 1);
    }

    #[test]
    fn test_compiled_schema_validates_same_inputs_as_ref_bearing_original() {
        let schema = json!({
            "type": "object",
            "properties": { "path": { "$ref": "#/$defs/nonempty" } },
            "required": ["path"],
            "$defs": { "nonempty": { "type": "string", "minLength": 1 } }
        });
        let compiled = CompiledSchema::compile(&schema).unwrap();
        assert!(compiled.validate(&json!({"path": "a.txt"})).is_ok());
        assert!(compiled.validate(&json!({"path": ""})).is_err());
        assert!(compiled.validate(&json!({})).is_err());
    }

    #[test]
    fn test_missing_ref_target_left_untouched() {
        let schema = json!({ "type": "object", "properties": { "x": { "$ref": "#/$defs/missing" } } });
        let inlined = inline_refs(&schema);
        assert_eq!(inlined["properties"]["x"]["$ref"], "#/$defs/missing");
    }
}
