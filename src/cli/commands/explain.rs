use std::path::PathBuf;

use serde_json::json;

use crate::cli::utils::*;
use crate::cli::OutputFormat;
use crate::database::MemoryCollection;
use crate::middleware::sanitize_query;
use crate::query::{DroppedParam, Projection, QueryBuilder, QuerySpec, RawQuery};

/// Sanitizes and builds a query string exactly as `GET /api/:entity` would.
pub fn explain(entity: &str, query: &str, policy_file: Option<PathBuf>) -> anyhow::Result<(QuerySpec, Vec<DroppedParam>)> {
    let registry = load_policies(policy_file.as_deref())?;
    let policy = require_policy(&registry, entity)?;

    let (sanitized, mut dropped) = sanitize_query(&RawQuery::parse(query), &policy);
    let collection = MemoryCollection::new(entity);
    let (spec, builder_dropped) = QueryBuilder::new(&collection, &sanitized, &policy)
        .filter()
        .sort()
        .limit_fields()
        .paginate()
        .into_parts();

    dropped.extend(builder_dropped);
    Ok((spec, dropped))
}

pub async fn handle(entity: &str, query: &str, policy_file: Option<PathBuf>, output_format: OutputFormat) -> anyhow::Result<()> {
    let (spec, dropped) = explain(entity, query, policy_file)?;

    match output_format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({ "entity": entity, "spec": spec, "dropped": dropped }))?
            );
        }
        OutputFormat::Text => {
            println!("Entity: {}", entity);
            if spec.predicates.is_empty() {
                println!("Filter: (none)");
            } else {
                println!("Filter:");
                for predicate in &spec.predicates {
                    println!("  {}", describe_predicate(predicate));
                }
            }
            println!("Sort: {}", describe_sort(&spec.sort));
            match &spec.projection {
                Projection::All => println!("Fields: (all)"),
                Projection::Fields(fields) => println!("Fields: id, {}", fields.join(", ")),
            }
            println!("Page: {} (size {}, skip {})", spec.page, spec.page_size, spec.skip);
            for d in &dropped {
                println!("Dropped: {} ({})", d.key, d.reason);
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{DropReason, QueryOp, SortField};

    #[test]
    fn explains_against_builtin_policies() {
        let (spec, dropped) = explain("expenses", "amount[gte]=100&category=%24labor&password=x&limit=500", None).unwrap();
        assert_eq!(spec.predicates.len(), 2);
        assert_eq!(spec.predicates[0].op, QueryOp::Gte);
        assert_eq!(spec.sort, vec![SortField::desc("date")]);
        assert_eq!(spec.page_size, 200);
        assert_eq!(dropped, vec![DroppedParam::new("password", DropReason::FieldNotAllowed)]);
    }

    #[test]
    fn unknown_entity_fails() {
        assert!(explain("widgets", "", None).is_err());
    }
}
