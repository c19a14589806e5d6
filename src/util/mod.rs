mod atomic;
mod query;

pub use atomic::atomic_write;
pub use query::QueryParams;
