//! Identifiers for datasets and steps within a [`Flow`](crate::flow::Flow).
//!
//! Both are sequential indexes into the flow's append-only graph. They are small,
//! `Copy` and hashable, so the runner uses them freely as map keys.

use std::fmt;

/// Identifier of a dataset node.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct DatasetId(usize);

/// Identifier of a step.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct StepId(usize);

impl DatasetId {
    pub(crate) fn new(v: usize) -> Self {
        Self(v)
    }

    /// Position of the dataset in its flow.
    #[must_use]
    pub fn raw(&self) -> usize {
        self.0
    }
}

impl StepId {
    pub(crate) fn new(v: usize) -> Self {
        Self(v)
    }

    /// Position of the step in its flow, which is also its creation order.
    #[must_use]
    pub fn raw(&self) -> usize {
        self.0
    }
}

impl fmt::Display for DatasetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "d{}", self.0)
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}
