//! Sort directions and key comparison.

use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Order {
    Ascending,
    Descending,
}

/// One lexical component of a sort: a 1-based field index and a direction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderBy {
    pub index: usize,
    pub order: Order,
}

impl OrderBy {
    #[must_use]
    pub fn asc(index: usize) -> Self {
        Self {
            index,
            order: Order::Ascending,
        }
    }

    #[must_use]
    pub fn desc(index: usize) -> Self {
        Self {
            index,
            order: Order::Descending,
        }
    }
}

/// Field indexes of `order_bys`, in order.
#[must_use]
pub fn indexes_of(order_bys: &[OrderBy]) -> Vec<usize> {
    order_bys.iter().map(|o| o.index).collect()
}

/// Ascending order on each of `indexes`.
#[must_use]
pub fn order_bys_from_indexes(indexes: &[usize]) -> Vec<OrderBy> {
    indexes.iter().map(|&i| OrderBy::asc(i)).collect()
}

/// Compare two projected keys (laid out in `order_bys` order) left to right,
/// each component in its own direction.
#[must_use]
pub fn compare_keys(order_bys: &[OrderBy], a: &[Value], b: &[Value]) -> Ordering {
    for (i, order_by) in order_bys.iter().enumerate() {
        let ord = match (a.get(i), b.get(i)) {
            (Some(x), Some(y)) => x.cmp(y),
            (x, y) => x.is_some().cmp(&y.is_some()),
        };
        let ord = match order_by.order {
            Order::Ascending => ord,
            Order::Descending => ord.reverse(),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

/// Same indexes and same directions, component by component.
#[must_use]
pub fn is_order_by_equal(a: &[OrderBy], b: &[OrderBy]) -> bool {
    a == b
}
