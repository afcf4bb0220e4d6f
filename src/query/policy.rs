use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::error::PolicyError;
use super::types::{QueryOp, SortField};

const DEFAULT_PAGE_SIZE: u64 = 50;
const MAX_PAGE_SIZE: u64 = 100;

/// Whitelist for one entity type: which fields and operators a client may use,
/// and how results are sorted and paged by default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryPolicy {
    pub entity: String,
    pub allowed_fields: Vec<String>,
    pub allowed_operators: Vec<QueryOp>,
    #[serde(default)]
    pub default_sort: Vec<SortField>,
    #[serde(default = "default_page_size")]
    pub default_page_size: u64,
    #[serde(default = "max_page_size")]
    pub max_page_size: u64,
}

fn default_page_size() -> u64 {
    DEFAULT_PAGE_SIZE
}

fn max_page_size() -> u64 {
    MAX_PAGE_SIZE
}

impl QueryPolicy {
    pub fn new(entity: impl Into<String>, fields: &[&str], operators: &[QueryOp]) -> Self {
        Self {
            entity: entity.into(),
            allowed_fields: fields.iter().map(|f| f.to_string()).collect(),
            allowed_operators: operators.to_vec(),
            default_sort: vec![SortField::desc("createdAt")],
            default_page_size: DEFAULT_PAGE_SIZE,
            max_page_size: MAX_PAGE_SIZE,
        }
    }

    pub fn with_default_sort(mut self, sort: Vec<SortField>) -> Self {
        self.default_sort = sort;
        self
    }

    pub fn with_page_sizes(mut self, default_page_size: u64, max_page_size: u64) -> Self {
        self.default_page_size = default_page_size;
        self.max_page_size = max_page_size;
        self
    }

    pub fn allows_field(&self, field: &str) -> bool {
        self.allowed_fields.iter().any(|f| f == field)
    }

    pub fn allows_operator(&self, op: QueryOp) -> bool {
        self.allowed_operators.contains(&op)
    }

    pub fn validate(&self) -> Result<(), PolicyError> {
        if !is_valid_entity_name(&self.entity) {
            return Err(PolicyError::InvalidEntityName(self.entity.clone()));
        }
        if self.allowed_fields.is_empty() {
            return Err(PolicyError::NoAllowedFields(self.entity.clone()));
        }
        if let Some(sort) = self.default_sort.iter().find(|s| !self.allows_field(&s.field)) {
            return Err(PolicyError::DefaultSortFieldNotAllowed {
                entity: self.entity.clone(),
                field: sort.field.clone(),
            });
        }
        if self.default_page_size == 0 || self.max_page_size == 0 {
            return Err(PolicyError::ZeroPageSize(self.entity.clone()));
        }
        if self.default_page_size > self.max_page_size {
            return Err(PolicyError::DefaultExceedsMax {
                entity: self.entity.clone(),
                default: self.default_page_size,
                max: self.max_page_size,
            });
        }
        Ok(())
    }
}

/// Entity names double as collection and table names.
fn is_valid_entity_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

#[derive(Debug, Deserialize)]
struct PolicyFile {
    policies: Vec<QueryPolicy>,
}

/// Validated, immutable table of policies keyed by entity name.
#[derive(Debug, Clone, Default)]
pub struct PolicyRegistry {
    policies: BTreeMap<String, Arc<QueryPolicy>>,
}

impl PolicyRegistry {
    /// Builds a registry, failing on the first invalid policy.
    pub fn from_policies(policies: impl IntoIterator<Item = QueryPolicy>) -> Result<Self, PolicyError> {
        let mut registry = Self::default();
        for policy in policies {
            policy.validate()?;
            registry.policies.insert(policy.entity.clone(), Arc::new(policy));
        }
        Ok(registry)
    }

    pub fn builtin() -> Result<Self, PolicyError> {
        Self::from_policies(builtin_policies())
    }

    /// Built-in table with entries from a YAML file layered on top (same entity name replaces).
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PolicyError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| PolicyError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::builtin_with_overrides(&contents)
    }

    pub fn builtin_with_overrides(yaml: &str) -> Result<Self, PolicyError> {
        let file: PolicyFile = serde_yaml::from_str(yaml)?;
        let mut merged: BTreeMap<String, QueryPolicy> = builtin_policies()
            .into_iter()
            .map(|p| (p.entity.clone(), p))
            .collect();
        for policy in file.policies {
            tracing::info!("Loaded query policy override for '{}'", policy.entity);
            merged.insert(policy.entity.clone(), policy);
        }
        Self::from_policies(merged.into_values())
    }

    pub fn get(&self, entity: &str) -> Option<Arc<QueryPolicy>> {
        self.policies.get(entity).cloned()
    }

    pub fn entities(&self) -> impl Iterator<Item = &str> {
        self.policies.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &QueryPolicy> {
        self.policies.values().map(|p| p.as_ref())
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}

pub fn builtin_policies() -> Vec<QueryPolicy> {
    vec![
        QueryPolicy::new(
            "materials",
            &[
                "projectId",
                "name",
                "category",
                "quantity",
                "unit",
                "unitCost",
                "supplier",
                "ecoFriendly",
                "reorderLevel",
                "createdAt",
                "updatedAt",
            ],
            &QueryOp::ALL,
        ),
        QueryPolicy::new(
            "tasks",
            &[
                "projectId",
                "title",
                "description",
                "status",
                "priority",
                "deadline",
                "assignedTo",
                "assignedBy",
                "completedAt",
                "createdAt",
                "updatedAt",
            ],
            &QueryOp::ALL,
        ),
        QueryPolicy::new(
            "projects",
            &[
                "name",
                "description",
                "location",
                "startDate",
                "expectedEndDate",
                "actualEndDate",
                "status",
                "progressPercentage",
                "sustainabilityScore",
                "teamSize",
                "projectType",
                "owner",
                "createdBy",
                "createdAt",
                "updatedAt",
            ],
            &QueryOp::ALL,
        ),
        QueryPolicy::new(
            "documents",
            &[
                "projectId",
                "filename",
                "originalName",
                "fileType",
                "fileSize",
                "category",
                "description",
                "tags",
                "uploadedBy",
                "isProcessed",
                "processingStatus",
                "createdAt",
                "updatedAt",
            ],
            &QueryOp::ALL,
        ),
        QueryPolicy::new(
            "budgets",
            &[
                "projectId",
                "totalBudget",
                "contingencyPercentage",
                "currency",
                "createdAt",
                "updatedAt",
            ],
            &QueryOp::COMPARISON,
        ),
        QueryPolicy::new(
            "expenses",
            &[
                "category",
                "amount",
                "description",
                "date",
                "invoiceNumber",
                "vendor",
                "paymentStatus",
                "paymentDate",
                "addedBy",
            ],
            &QueryOp::ALL,
        )
        .with_default_sort(vec![SortField::desc("date")])
        .with_page_sizes(50, 200),
        QueryPolicy::new(
            "users",
            &[
                "name",
                "email",
                "phone",
                "department",
                "position",
                "role",
                "status",
                "isDeleted",
                "lastLogin",
                "createdAt",
                "updatedAt",
            ],
            &QueryOp::ALL,
        ),
    ]
}
