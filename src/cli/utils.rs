use std::path::Path;

use serde_json::{json, Value};

use crate::cli::OutputFormat;
use crate::query::{FieldPredicate, Operand, PolicyRegistry, QueryPolicy, SortField};

/// Built-in policy table, with the override file layered on when given.
pub fn load_policies(file: Option<&Path>) -> anyhow::Result<PolicyRegistry> {
    let registry = match file {
        Some(path) => PolicyRegistry::load(path)?,
        None => PolicyRegistry::builtin()?,
    };
    Ok(registry)
}

pub fn require_policy(registry: &PolicyRegistry, entity: &str) -> anyhow::Result<std::sync::Arc<QueryPolicy>> {
    registry.get(entity).ok_or_else(|| {
        let known: Vec<&str> = registry.entities().collect();
        anyhow::anyhow!("Unknown entity '{}' (known: {})", entity, known.join(", "))
    })
}

/// Output a success message in the appropriate format
pub fn output_success(output_format: &OutputFormat, message: &str, data: Option<Value>) -> anyhow::Result<()> {
    match output_format {
        OutputFormat::Json => {
            let mut response = json!({
                "success": true,
                "message": message
            });

            if let (Some(Value::Object(extra)), Some(object)) = (data, response.as_object_mut()) {
                object.extend(extra);
            }

            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        OutputFormat::Text => {
            println!("✓ {}", message);
        }
    }
    Ok(())
}

pub fn describe_predicate(predicate: &FieldPredicate) -> String {
    let operand = match &predicate.operand {
        Operand::Value(v) => v.to_json().to_string(),
        Operand::List(values) => {
            let items: Vec<String> = values.iter().map(|v| v.to_json().to_string()).collect();
            format!("[{}]", items.join(", "))
        }
        Operand::Pattern(p) => format!("/{}/i", p.source),
    };
    format!("{} {} {}", predicate.field, predicate.op, operand)
}

pub fn describe_sort(sort: &[SortField]) -> String {
    if sort.is_empty() {
        return "(none)".to_string();
    }
    sort.iter()
        .map(|s| format!("{} {}", s.field, s.direction.to_sql().to_lowercase()))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::value::text_pattern;
    use crate::query::{QueryOp, QueryValue};

    #[test]
    fn describes_predicates() {
        let p = FieldPredicate {
            field: "quantity".into(),
            op: QueryOp::Gte,
            operand: Operand::Value(QueryValue::Number(50.0)),
        };
        assert_eq!(describe_predicate(&p), "quantity gte 50");

        let p = FieldPredicate {
            field: "name".into(),
            op: QueryOp::StartsWith,
            operand: Operand::Pattern(text_pattern(QueryOp::StartsWith, "Re").unwrap()),
        };
        assert_eq!(describe_predicate(&p), "name startsWith /^Re/i");
    }

    #[test]
    fn describes_sort() {
        assert_eq!(describe_sort(&[]), "(none)");
        assert_eq!(
            describe_sort(&[SortField::desc("createdAt"), SortField::asc("name")]),
            "createdAt desc, name asc"
        );
    }

    #[test]
    fn unknown_entity_lists_known_ones() {
        let registry = load_policies(None).unwrap();
        let err = require_policy(&registry, "widgets").unwrap_err().to_string();
        assert!(err.contains("materials"));
    }
}
