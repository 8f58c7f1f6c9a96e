//! In-memory table.
//!
//! An ordered map behind a read-write lock. Each call takes the lock once,
//! so single-item operations are atomic and linearizable, matching what
//! the core expects from any backend.

use super::item::{AttributeValue, Filter, Item, ItemKey};
use super::table::KeyValueTable;
use crate::core::context::RequestContext;
use crate::core::error::{StoreError, StoreResult};
use parking_lot::RwLock;
use std::collections::BTreeMap;

/// Ordered in-memory table.
#[derive(Debug)]
pub struct MemoryTable {
    name: String,
    rows: RwLock<BTreeMap<ItemKey, Item>>,
}

impl MemoryTable {
    /// Create an empty table.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rows: RwLock::new(BTreeMap::new()),
        }
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    /// Check if the table is empty.
    pub fn is_empty(&self) -> bool {
        self.rows.read().is_empty()
    }

    /// Copy of every row, in key order.
    pub fn dump(&self) -> Vec<Item> {
        self.rows.read().values().cloned().collect()
    }
}

/// Rows of partition `pk` from an ordered map, in sort-key order.
pub(crate) fn scan_partition<'a>(
    rows: &'a BTreeMap<ItemKey, Item>,
    pk: &'a str,
    filter: Option<&'a Filter>,
) -> impl Iterator<Item = &'a Item> + 'a {
    rows.range(ItemKey::new(pk, "")..)
        .take_while(move |(key, _)| key.pk == pk)
        .map(|(_, item)| item)
        .filter(move |item| filter.map_or(true, |f| f.matches(item)))
}

/// Apply an increment to the row map and return the new value.
pub(crate) fn apply_increment(
    rows: &mut BTreeMap<ItemKey, Item>,
    key: &ItemKey,
    attribute: &str,
    delta: i64,
) -> StoreResult<i64> {
    let item = rows
        .entry(key.clone())
        .or_insert_with(|| Item::at(key.clone()));
    let current = match item.get(attribute) {
        None => 0,
        Some(AttributeValue::N(n)) => *n,
        Some(other) => {
            return Err(StoreError::decode(
                key.to_string(),
                format!("attribute {} is {}, not N", attribute, other.type_name()),
            ))
        }
    };
    let next = current.saturating_add(delta);
    item.set(attribute, next);
    Ok(next)
}

impl KeyValueTable for MemoryTable {
    fn name(&self) -> &str {
        &self.name
    }

    fn put_item(&self, ctx: &RequestContext, item: Item) -> StoreResult<()> {
        ctx.check()?;
        self.rows.write().insert(item.key(), item);
        Ok(())
    }

    fn get_item(&self, ctx: &RequestContext, key: &ItemKey) -> StoreResult<Option<Item>> {
        ctx.check()?;
        Ok(self.rows.read().get(key).cloned())
    }

    fn delete_item(&self, ctx: &RequestContext, key: &ItemKey) -> StoreResult<()> {
        ctx.check()?;
        self.rows.write().remove(key);
        Ok(())
    }

    fn query(
        &self,
        ctx: &RequestContext,
        pk: &str,
        filter: Option<&Filter>,
    ) -> StoreResult<Vec<Item>> {
        ctx.check()?;
        let rows = self.rows.read();
        Ok(scan_partition(&rows, pk, filter).cloned().collect())
    }

    fn increment(
        &self,
        ctx: &RequestContext,
        key: &ItemKey,
        attribute: &str,
        delta: i64,
    ) -> StoreResult<Option<i64>> {
        ctx.check()?;
        let mut rows = self.rows.write();
        apply_increment(&mut rows, key, attribute, delta).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_stays_inside_partition() {
        let table = MemoryTable::new("t");
        let ctx = RequestContext::background();
        table.put_item(&ctx, Item::new("queue#a", "1")).unwrap();
        table.put_item(&ctx, Item::new("queue#ab", "1")).unwrap();
        table.put_item(&ctx, Item::new("queue#a", "2")).unwrap();

        let rows = table.query(&ctx, "queue#a", None).unwrap();
        let sks: Vec<_> = rows.iter().map(|r| r.sk.as_str()).collect();
        assert_eq!(sks, vec!["1", "2"]);
    }

    #[test]
    fn increment_rejects_non_numeric_attribute() {
        let table = MemoryTable::new("t");
        let ctx = RequestContext::background();
        table
            .put_item(&ctx, Item::new("p", "s").with("tally", "three"))
            .unwrap();
        let err = table
            .increment(&ctx, &ItemKey::new("p", "s"), "tally", 1)
            .unwrap_err();
        assert!(matches!(err, StoreError::Decode { .. }));
    }
}
