use std::path::{Path, PathBuf};

use crate::cli::utils::*;
use crate::cli::OutputFormat;
use crate::database::MemoryStore;
use crate::middleware::sanitize_query;
use crate::query::{Page, QueryBuilder, RawQuery};

/// Runs one list query against an in-memory store seeded from `fixtures`.
pub async fn execute(entity: &str, query: &str, fixtures: &Path, policy_file: Option<PathBuf>) -> anyhow::Result<Page> {
    let registry = load_policies(policy_file.as_deref())?;
    let policy = require_policy(&registry, entity)?;

    let store = MemoryStore::new(registry.entities());
    store.seed_file(fixtures).await?;
    let collection = store
        .memory_collection(entity)
        .ok_or_else(|| anyhow::anyhow!("No collection for entity '{}'", entity))?;

    let (sanitized, dropped) = sanitize_query(&RawQuery::parse(query), &policy);
    for d in &dropped {
        tracing::debug!("Dropped {} ({})", d.key, d.reason);
    }

    let page = QueryBuilder::new(collection.as_ref(), &sanitized, &policy)
        .filter()
        .sort()
        .limit_fields()
        .paginate()
        .fetch_page()
        .await?;
    Ok(page)
}

pub async fn handle(
    entity: &str,
    query: &str,
    fixtures: &Path,
    policy_file: Option<PathBuf>,
    output_format: OutputFormat,
) -> anyhow::Result<()> {
    let page = execute(entity, query, fixtures, policy_file).await?;

    match output_format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&page)?);
        }
        OutputFormat::Text => {
            if page.data.is_empty() {
                println!("No {} found", entity);
            }
            for record in &page.data {
                println!("{}", serde_json::to_string(record)?);
            }
            let meta = page.pagination;
            println!(
                "Page {} of {} ({} total, {} per page)",
                meta.page, meta.total_pages, meta.total, meta.limit
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::SEED_JSON;
    use std::io::Write;

    fn fixture_file() -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SEED_JSON.as_bytes()).unwrap();
        file
    }

    #[tokio::test]
    async fn runs_a_query_against_fixtures() {
        let file = fixture_file();
        let page = execute("tasks", "status=pending&sort=deadline:asc&select=title", file.path(), None)
            .await
            .unwrap();

        let titles: Vec<&str> = page.data.iter().map(|d| d["title"].as_str().unwrap()).collect();
        assert_eq!(titles, vec!["Order rebar (16mm)", "Frame walls"]);
        assert_eq!(page.pagination.total, 2);
    }

    #[tokio::test]
    async fn array_fields_match_any_element() {
        let file = fixture_file();
        let page = execute("documents", "tags=approved&sort=fileSize:desc", file.path(), None)
            .await
            .unwrap();
        let ids: Vec<&str> = page.data.iter().map(|d| d["id"].as_str().unwrap()).collect();
        assert_eq!(ids, vec!["d1", "d3"]);
    }

    #[tokio::test]
    async fn missing_fixture_file_is_an_error() {
        let result = execute("tasks", "", Path::new("/nonexistent/seed.json"), None).await;
        assert!(result.is_err());
    }
}
