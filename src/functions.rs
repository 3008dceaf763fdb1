//! Native row functions addressed by id.
//!
//! `Map`, `Filter` and `LocalReduceBy` instructions carry only a function id so
//! their descriptors stay serializable. Every process that executes those
//! instructions must register the same functions under the same ids before it
//! runs them; registering in the same order yields the same generated ids
//! (`m1`, `m2`, … for mappers, `p1`, … for predicates, `r1`, … for reducers).

use crate::error::{FlowError, Result};
use crate::row::Row;
use crate::value::Value;
use std::collections::HashMap;
use std::sync::{Arc, LazyLock, PoisonError, RwLock};

/// One row in, any number of rows out.
pub type Mapper = Arc<dyn Fn(Row) -> Result<Vec<Row>> + Send + Sync>;
/// Keep the row when it returns `true`.
pub type Predicate = Arc<dyn Fn(&Row) -> Result<bool> + Send + Sync>;
/// Fold two value lists of the same key into one.
pub type Reducer = Arc<dyn Fn(&[Value], &[Value]) -> Result<Vec<Value>> + Send + Sync>;

#[derive(Default)]
struct FunctionTable {
    mappers: HashMap<String, Mapper>,
    predicates: HashMap<String, Predicate>,
    reducers: HashMap<String, Reducer>,
}

static FUNCTIONS: LazyLock<RwLock<FunctionTable>> = LazyLock::new(RwLock::default);

fn next_id<T>(prefix: char, table: &HashMap<String, T>) -> String {
    (table.len() + 1..)
        .map(|n| format!("{prefix}{n}"))
        .find(|id| !table.contains_key(id))
        .unwrap_or_default()
}

fn not_found(kind: &str, id: &str) -> FlowError {
    FlowError::instruction(kind, format!("no function registered under id {id:?}"))
}

/// Register a mapper under a fresh id.
pub fn register_mapper<F>(f: F) -> String
where
    F: Fn(Row) -> Result<Vec<Row>> + Send + Sync + 'static,
{
    let mut t = FUNCTIONS.write().unwrap_or_else(PoisonError::into_inner);
    let id = next_id('m', &t.mappers);
    t.mappers.insert(id.clone(), Arc::new(f));
    id
}

/// Register a predicate under a fresh id.
pub fn register_predicate<F>(f: F) -> String
where
    F: Fn(&Row) -> Result<bool> + Send + Sync + 'static,
{
    let mut t = FUNCTIONS.write().unwrap_or_else(PoisonError::into_inner);
    let id = next_id('p', &t.predicates);
    t.predicates.insert(id.clone(), Arc::new(f));
    id
}

/// Register a reducer under a fresh id.
pub fn register_reducer<F>(f: F) -> String
where
    F: Fn(&[Value], &[Value]) -> Result<Vec<Value>> + Send + Sync + 'static,
{
    let mut t = FUNCTIONS.write().unwrap_or_else(PoisonError::into_inner);
    let id = next_id('r', &t.reducers);
    t.reducers.insert(id.clone(), Arc::new(f));
    id
}

/// # Errors
/// [`FlowError::Instruction`] when nothing is registered under `id`.
pub fn mapper(id: &str) -> Result<Mapper> {
    let t = FUNCTIONS.read().unwrap_or_else(PoisonError::into_inner);
    t.mappers.get(id).cloned().ok_or_else(|| not_found("Map", id))
}

/// # Errors
/// [`FlowError::Instruction`] when nothing is registered under `id`.
pub fn predicate(id: &str) -> Result<Predicate> {
    let t = FUNCTIONS.read().unwrap_or_else(PoisonError::into_inner);
    t.predicates.get(id).cloned().ok_or_else(|| not_found("Filter", id))
}

/// # Errors
/// [`FlowError::Instruction`] when nothing is registered under `id`.
pub fn reducer(id: &str) -> Result<Reducer> {
    let t = FUNCTIONS.read().unwrap_or_else(PoisonError::into_inner);
    t.reducers.get(id).cloned().ok_or_else(|| not_found("LocalReduceBy", id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_skip_taken_slots() {
        let mut table: HashMap<String, ()> = HashMap::new();
        table.insert("m2".into(), ());
        assert_eq!(next_id('m', &table), "m3");
        table.insert("m1".into(), ());
        assert_eq!(next_id('m', &table), "m3");
    }
}
