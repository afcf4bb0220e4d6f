pub mod explain;
pub mod policies;
pub mod query;
