use std::fmt;

use gitgraph_store::{Document, RawCursor};

use crate::error::{ModelError, ModelResult};

type Decoder<T> = Box<dyn FnMut(Document) -> ModelResult<T> + Send>;

/// A query result decoded one record at a time as it is consumed.
///
/// Nothing is read from the underlying cursor until `next` is called, so
/// the full result set is never held in memory at once.
pub struct LazyCursor<T> {
    raw: RawCursor,
    decode: Decoder<T>,
}

impl<T> LazyCursor<T> {
    pub fn new(raw: RawCursor, decode: impl FnMut(Document) -> ModelResult<T> + Send + 'static) -> Self {
        Self {
            raw,
            decode: Box::new(decode),
        }
    }
}

impl<T> Iterator for LazyCursor<T> {
    type Item = ModelResult<T>;

    fn next(&mut self) -> Option<Self::Item> {
        let doc = match self.raw.next()? {
            Ok(doc) => doc,
            Err(e) => return Some(Err(ModelError::from(e))),
        };
        Some((self.decode)(doc))
    }
}

impl<T> fmt::Debug for LazyCursor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyCursor").finish_non_exhaustive()
    }
}

/// One page of a paginated lookup plus the total number of matches.
#[derive(Clone, Debug, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Matches across all pages, independent of offset and limit.
    pub total: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use gitgraph_store::StoreError;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn doc(n: i64) -> Document {
        let mut d = Document::new();
        d.insert("n".into(), json!(n));
        d
    }

    #[test]
    fn decodes_on_demand() {
        let decoded = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&decoded);
        let raw: RawCursor = Box::new((0..5).map(|n| Ok::<_, StoreError>(doc(n))));
        let mut cursor = LazyCursor::new(raw, move |d| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(d["n"].as_i64().unwrap_or_default())
        });

        assert_eq!(decoded.load(Ordering::SeqCst), 0);
        assert_eq!(cursor.next().unwrap().unwrap(), 0);
        assert_eq!(decoded.load(Ordering::SeqCst), 1);
        assert_eq!(cursor.count(), 4);
    }

    #[test]
    fn store_errors_surface_per_item() {
        let raw: RawCursor = Box::new(
            vec![Ok(doc(1)), Err(StoreError::Backend("gone".into()))].into_iter(),
        );
        let items: Vec<_> = LazyCursor::new(raw, |d| Ok(d["n"].clone())).collect();
        assert_eq!(items.len(), 2);
        assert_eq!(*items[0].as_ref().unwrap(), Value::from(1));
        assert!(matches!(items[1], Err(ModelError::Store(_))));
    }
}
