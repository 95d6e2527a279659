#![cfg_attr(docsrs, feature(doc_cfg))]
//! Sequential token allocation from replenishable stores.
//!
//! A [`Region`] names a store of opaque tokens (serial numbers, UUIDs, ...)
//! and a batch size. An [`Allocator`] hands out the next `n` tokens of a
//! region in order, asking a [`Supplier`] for more whenever the store runs
//! short. Every token is issued at most once, even across concurrent callers,
//! crashes and processes sharing the store directory.
//!
//! Two store variants exist behind [`BackingStore`]:
//!
//! - [`LineFileStore`]: an append-only text file read through a persisted
//!   [`RegionCursor`].
//! - [`RowStore`] (`row-store` feature): a transactional table whose rows are
//!   deleted as they are issued.

mod allocator;
mod cursor;
mod error;
mod mutex;
mod rand;
mod region;
mod rules;
mod store;
mod supply;
mod time;

pub use crate::allocator::*;
pub use crate::cursor::*;
pub use crate::error::*;
pub use crate::rand::*;
pub use crate::region::*;
pub use crate::rules::*;
pub use crate::store::*;
pub use crate::supply::*;
pub use crate::time::*;
