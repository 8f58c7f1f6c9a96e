//! The key-value table contract.
//!
//! Backends offer single-item put/get/delete and partition-scoped queries.
//! There are no multi-item transactions: composite operations built on top
//! of this trait must tolerate partial completion.

use super::item::{Filter, Item, ItemKey};
use crate::core::context::RequestContext;
use crate::core::error::StoreResult;

/// A sparse table addressed by (partition key, sort key).
pub trait KeyValueTable: Send + Sync {
    /// Table name, for logs.
    fn name(&self) -> &str;

    /// Upsert a row, fully replacing any existing row with the same key.
    fn put_item(&self, ctx: &RequestContext, item: Item) -> StoreResult<()>;

    /// Fetch a row by exact key. Absence is `Ok(None)`.
    fn get_item(&self, ctx: &RequestContext, key: &ItemKey) -> StoreResult<Option<Item>>;

    /// Remove a row by key. Removing an absent row is not an error.
    fn delete_item(&self, ctx: &RequestContext, key: &ItemKey) -> StoreResult<()>;

    /// Every row in `pk`, in sort-key order, optionally filtered.
    fn query(
        &self,
        ctx: &RequestContext,
        pk: &str,
        filter: Option<&Filter>,
    ) -> StoreResult<Vec<Item>>;

    /// Atomically add `delta` to an integer attribute, creating the row (at
    /// zero) if needed, and return the new value.
    ///
    /// `Ok(None)` means the backend has no atomic increment; callers then
    /// fall back to read-modify-write.
    fn increment(
        &self,
        ctx: &RequestContext,
        key: &ItemKey,
        attribute: &str,
        delta: i64,
    ) -> StoreResult<Option<i64>> {
        let _ = (ctx, key, attribute, delta);
        Ok(None)
    }
}

impl<T: KeyValueTable + ?Sized> KeyValueTable for std::sync::Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn put_item(&self, ctx: &RequestContext, item: Item) -> StoreResult<()> {
        (**self).put_item(ctx, item)
    }

    fn get_item(&self, ctx: &RequestContext, key: &ItemKey) -> StoreResult<Option<Item>> {
        (**self).get_item(ctx, key)
    }

    fn delete_item(&self, ctx: &RequestContext, key: &ItemKey) -> StoreResult<()> {
        (**self).delete_item(ctx, key)
    }

    fn query(
        &self,
        ctx: &RequestContext,
        pk: &str,
        filter: Option<&Filter>,
    ) -> StoreResult<Vec<Item>> {
        (**self).query(ctx, pk, filter)
    }

    fn increment(
        &self,
        ctx: &RequestContext,
        key: &ItemKey,
        attribute: &str,
        delta: i64,
    ) -> StoreResult<Option<i64>> {
        (**self).increment(ctx, key, attribute, delta)
    }
}

/// A typed row with a fixed layout.
pub trait Record: Sized {
    /// Name used in decode errors.
    const KIND: &'static str;

    /// The row's address.
    fn key(&self) -> ItemKey;

    /// Encode into a row.
    fn to_item(&self) -> Item;

    /// Decode from a row. A row of the wrong shape is a Decode error.
    fn from_item(item: Item) -> StoreResult<Self>;
}

/// Typed access on top of any table.
pub trait TableExt: KeyValueTable {
    /// Write a typed record.
    fn put_record<R: Record>(&self, ctx: &RequestContext, record: &R) -> StoreResult<()> {
        self.put_item(ctx, record.to_item())
    }

    /// Read a typed record: `Ok(None)` when absent, `Err(Decode)` when the
    /// stored row does not decode.
    fn get_record<R: Record>(&self, ctx: &RequestContext, key: &ItemKey) -> StoreResult<Option<R>> {
        match self.get_item(ctx, key)? {
            Some(item) => R::from_item(item).map(Some),
            None => Ok(None),
        }
    }

    /// Read and decode every row of a partition.
    fn query_records<R: Record>(
        &self,
        ctx: &RequestContext,
        pk: &str,
        filter: Option<&Filter>,
    ) -> StoreResult<Vec<R>> {
        self.query(ctx, pk, filter)?
            .into_iter()
            .map(R::from_item)
            .collect()
    }
}

impl<T: KeyValueTable + ?Sized> TableExt for T {}
