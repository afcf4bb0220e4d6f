use thiserror::Error;

/// Misconfigured query policies. Any of these stops the process at startup.
#[derive(Error, Debug)]
pub enum PolicyError {
    #[error("Policy '{0}' has no allowed fields")]
    NoAllowedFields(String),

    #[error("Policy '{entity}' sorts by '{field}', which is not an allowed field")]
    DefaultSortFieldNotAllowed { entity: String, field: String },

    #[error("Policy '{0}' has a zero page size")]
    ZeroPageSize(String),

    #[error("Policy '{entity}' default page size {default} exceeds max page size {max}")]
    DefaultExceedsMax { entity: String, default: u64, max: u64 },

    #[error("Invalid entity name: {0}")]
    InvalidEntityName(String),

    #[error("Failed to read policy file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid policy file: {0}")]
    Yaml(#[from] serde_yaml::Error),
}
