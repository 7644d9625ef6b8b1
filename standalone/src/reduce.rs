use std::panic::{self, AssertUnwindSafe};

use serde_json::Value;
use tracing::warn;

use common::{Failure, ReduceFn};

use crate::map::panic_message;
use crate::store::TransientStore;

/// Reduce the values staged for `key` in `store`.
///
/// Like [`map_single_trace`](crate::map::map_single_trace), every problem is
/// returned as a [`Failure`], here with the key as its source.
pub fn reduce_map_results(
    key: &str,
    store: &dyn TransientStore,
    reduce_fn: ReduceFn,
) -> Result<Value, Failure> {
    let values = match store.get(key) {
        Ok(Some(values)) => values,
        Ok(None) => return Err(Failure::new(key, "key is missing from the staged results")),
        Err(e) => return Err(Failure::from_error(key, &e)),
    };

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| reduce_fn(key, values)));
    let failure = match outcome {
        Ok(Ok(value)) => return Ok(value),
        Ok(Err(e)) => Failure::from_error(key, &e),
        Err(payload) => Failure::new(
            key,
            format!("reduce function panicked: {}", panic_message(payload.as_ref())),
        ),
    };

    warn!("Failure while reducing `{key}`: {}", failure.description);
    Err(failure)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use anyhow::anyhow;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn count(_: &str, values: Vec<Value>) -> anyhow::Result<Value> {
        Ok(json!(values.len()))
    }

    fn refuse(key: &str, _: Vec<Value>) -> anyhow::Result<Value> {
        Err(anyhow!("cannot reduce {key}"))
    }

    fn store() -> MemoryStore {
        MemoryStore::from_entries(&BTreeMap::from([(
            "k".to_string(),
            vec![json!(1), json!(2)],
        )]))
    }

    #[test]
    fn reduces_staged_values() {
        assert_eq!(reduce_map_results("k", &store(), count), Ok(json!(2)));
    }

    #[test]
    fn reduce_errors_are_failures_keyed_by_key() {
        let failure = reduce_map_results("k", &store(), refuse).unwrap_err();
        assert_eq!(failure, Failure::new("k", "cannot reduce k"));
    }

    #[test]
    fn missing_key_is_a_failure() {
        let failure = reduce_map_results("nope", &store(), count).unwrap_err();
        assert_eq!(failure.source_url, "nope");
    }
}
