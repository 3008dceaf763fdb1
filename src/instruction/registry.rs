//! Descriptor name -> constructor table.

use crate::error::{FlowError, Result};
use crate::instruction::{
    Broadcast, CoGroupPartitionedSorted, CollectPartitions, Filter, InlineSource, Instruction,
    InstructionDescriptor, LocalDistinct, LocalHashAndJoinWith, LocalLimit, LocalReduceBy, LocalSort,
    LocalTop, Map, MergeSortedTo, MergeTo, RoundRobin, ScatterPartitions, Select,
};
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// Rebuilds an instruction from its descriptor.
pub type Constructor = fn(&InstructionDescriptor) -> Result<Box<dyn Instruction>>;

#[derive(Clone, Default)]
pub struct InstructionRegistry {
    constructors: BTreeMap<String, Constructor>,
}

static GLOBAL: OnceLock<InstructionRegistry> = OnceLock::new();

impl InstructionRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every instruction this crate ships.
    #[must_use]
    pub fn with_builtins() -> Self {
        let table: [(&str, Constructor); 17] = [
            ("LocalSort", LocalSort::from_descriptor),
            ("LocalTop", LocalTop::from_descriptor),
            ("LocalDistinct", LocalDistinct::from_descriptor),
            ("ScatterPartitions", ScatterPartitions::from_descriptor),
            ("CollectPartitions", CollectPartitions::from_descriptor),
            ("LocalHashAndJoinWith", LocalHashAndJoinWith::from_descriptor),
            ("CoGroupPartitionedSorted", CoGroupPartitionedSorted::from_descriptor),
            ("MergeSortedTo", MergeSortedTo::from_descriptor),
            ("MergeTo", MergeTo::from_descriptor),
            ("LocalLimit", LocalLimit::from_descriptor),
            ("RoundRobin", RoundRobin::from_descriptor),
            ("Broadcast", Broadcast::from_descriptor),
            ("Select", Select::from_descriptor),
            ("Map", Map::from_descriptor),
            ("Filter", Filter::from_descriptor),
            ("LocalReduceBy", LocalReduceBy::from_descriptor),
            ("InlineSource", InlineSource::from_descriptor),
        ];
        let mut reg = Self::new();
        for (name, ctor) in table {
            reg.register(name, ctor);
        }
        reg
    }

    /// Register (or replace) the constructor for `name`.
    pub fn register(&mut self, name: &str, ctor: Constructor) -> &mut Self {
        self.constructors.insert(name.to_string(), ctor);
        self
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.constructors.contains_key(name)
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.constructors.keys().map(String::as_str)
    }

    /// Rehydrate a runnable instruction.
    ///
    /// # Errors
    /// [`FlowError::Instruction`] for an unknown name or parameters that do not
    /// fit the named instruction.
    pub fn build(&self, descriptor: &InstructionDescriptor) -> Result<Box<dyn Instruction>> {
        let ctor = self
            .constructors
            .get(&descriptor.name)
            .ok_or_else(|| FlowError::instruction(&descriptor.name, "no constructor registered"))?;
        ctor(descriptor)
    }
}

/// Install `registry` as the process-wide instance.
///
/// # Errors
/// [`FlowError::Config`] if a registry was already installed (or the default was
/// already read through [`registry`]).
pub fn install_registry(registry: InstructionRegistry) -> Result<()> {
    GLOBAL
        .set(registry)
        .map_err(|_| FlowError::Config("instruction registry already installed".into()))
}

/// The process-wide registry; the built-in table unless one was installed first.
pub fn registry() -> &'static InstructionRegistry {
    GLOBAL.get_or_init(InstructionRegistry::with_builtins)
}
