pub mod query_parser;
pub mod response;

pub use query_parser::{sanitize_query, sanitize_value, ParsedQuery};
pub use response::{ApiResponse, ApiResult, PaginatedResponse};
