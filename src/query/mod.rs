pub mod builder;
pub mod error;
pub mod policy;
pub mod query_order;
pub mod query_where;
pub mod raw;
pub mod types;
pub mod value;

pub use builder::{Page, PreparedQuery, QueryBuilder};
pub use error::PolicyError;
pub use policy::{PolicyRegistry, QueryPolicy};
pub use query_where::parse_predicate;
pub use raw::{RawQuery, RawValue};
pub use types::*;
