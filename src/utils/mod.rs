pub mod collection_ext;
pub mod error;
pub mod lru_cache;
pub mod pagination;

pub use collection_ext::{group_by, unique_ordered};
pub use error::{ApiError, ApiResult};
pub use lru_cache::LruCache;
pub use pagination::{Page, paginate};
