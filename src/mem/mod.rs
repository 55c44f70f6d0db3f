//! Memory management for thread pages.

pub mod page_pool;

pub use page_pool::{Page, PagePool, PoolStats, STACK_CANARY};
