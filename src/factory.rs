//! Construct algorithms by class name.

use std::collections::BTreeMap;

use crate::algorithm::Algorithm;
use crate::error::{Error, Result};

pub type Constructor = fn() -> Box<dyn Algorithm>;

struct Entry {
    constructor: Constructor,
    creates: Vec<String>,
}

/// Class name -> constructor, plus the banks each class creates.
#[derive(Default)]
pub struct AlgorithmFactory {
    entries: BTreeMap<&'static str, Entry>,
}

impl AlgorithmFactory {
    pub fn new() -> AlgorithmFactory {
        AlgorithmFactory::default()
    }

    /// Register a class. `creates` names the banks it appends at start.
    pub fn register(
        &mut self,
        class_name: &'static str,
        constructor: Constructor,
        creates: &[&str],
    ) -> Result<()> {
        if self.entries.contains_key(class_name) {
            return Err(Error::DuplicateClass(class_name.to_string()));
        }
        self.entries.insert(
            class_name,
            Entry {
                constructor,
                creates: creates.iter().map(|b| b.to_string()).collect(),
            },
        );
        Ok(())
    }

    pub fn create(&self, class_name: &str) -> Result<Box<dyn Algorithm>> {
        self.entries
            .get(class_name)
            .map(|entry| (entry.constructor)())
            .ok_or_else(|| Error::UnknownAlgorithm(class_name.to_string()))
    }

    pub fn contains(&self, class_name: &str) -> bool {
        self.entries.contains_key(class_name)
    }

    /// Registered classes, sorted by name.
    pub fn classes(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.keys().copied()
    }

    /// Classes that create a bank named `bank`.
    pub fn creators_of(&self, bank: &str) -> Vec<&'static str> {
        self.entries
            .iter()
            .filter(|(_, entry)| entry.creates.iter().any(|b| b == bank))
            .map(|(&class, _)| class)
            .collect()
    }
}
