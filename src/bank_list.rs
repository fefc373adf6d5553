//! The ordered, index-stable set of banks for one event.

use std::collections::HashMap;

use crate::bank::Bank;
use crate::error::{Error, Result};

/// Banks for one event, addressed by position or by name.
///
/// Banks are only ever appended, so an index handed out once stays valid
/// for the lifetime of the list. Cloning a started list gives an
/// independent event with the same layout.
#[derive(Debug, Clone, Default)]
pub struct BankList {
    banks: Vec<Bank>,
    index: HashMap<String, usize>,
}

impl BankList {
    pub fn new(banks: Vec<Bank>) -> Result<BankList> {
        let mut list = BankList::default();
        for bank in banks {
            list.push(bank)?;
        }
        Ok(list)
    }

    /// Empty banks for every name, with schemas from the compiled registry.
    pub fn from_registry(names: &[&str]) -> Result<BankList> {
        let banks = names
            .iter()
            .map(|name| Bank::from_registry(name))
            .collect::<Result<Vec<_>>>()?;
        BankList::new(banks)
    }

    /// Append a bank and return its index.
    pub fn push(&mut self, bank: Bank) -> Result<usize> {
        if self.index.contains_key(bank.name()) {
            return Err(Error::DuplicateBank(bank.name().to_string()));
        }
        let position = self.banks.len();
        self.index.insert(bank.name().to_string(), position);
        self.banks.push(bank);
        Ok(position)
    }

    /// Drop every bank from position `len` on. Indices below `len` stay valid.
    pub fn truncate(&mut self, len: usize) {
        let len = len.min(self.banks.len());
        for bank in self.banks.drain(len..) {
            self.index.remove(bank.name());
        }
    }

    pub fn len(&self) -> usize {
        self.banks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.banks.is_empty()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Index of `name`, or `NoSuchBank`.
    pub fn require(&self, name: &str) -> Result<usize> {
        self.index_of(name)
            .ok_or_else(|| Error::NoSuchBank(name.to_string()))
    }

    pub fn get(&self, index: usize) -> Result<&Bank> {
        let len = self.banks.len();
        self.banks
            .get(index)
            .ok_or(Error::BankIndexOutOfRange { index, len })
    }

    pub fn get_mut(&mut self, index: usize) -> Result<&mut Bank> {
        let len = self.banks.len();
        self.banks
            .get_mut(index)
            .ok_or(Error::BankIndexOutOfRange { index, len })
    }

    pub fn bank(&self, name: &str) -> Result<&Bank> {
        let index = self.require(name)?;
        self.get(index)
    }

    pub fn bank_mut(&mut self, name: &str) -> Result<&mut Bank> {
        let index = self.require(name)?;
        self.get_mut(index)
    }

    /// One bank to read and a different one to write, borrowed together.
    pub fn split_pair(&mut self, read: usize, write: usize) -> Result<(&Bank, &mut Bank)> {
        let len = self.banks.len();
        for index in [read, write] {
            if index >= len {
                return Err(Error::BankIndexOutOfRange { index, len });
            }
        }
        if read == write {
            let name = self.banks[read].name().to_string();
            return Err(Error::InvalidData {
                bank: name,
                reason: "cannot read and write the same bank at once".to_string(),
            });
        }
        if read < write {
            let (head, tail) = self.banks.split_at_mut(write);
            Ok((&head[read], &mut tail[0]))
        } else {
            let (head, tail) = self.banks.split_at_mut(read);
            Ok((&tail[0], &mut head[write]))
        }
    }

    /// Reset every bank to zero rows.
    pub fn clear_rows(&mut self) {
        for bank in &mut self.banks {
            bank.reset();
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Bank> {
        self.banks.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.banks.iter().map(Bank::name)
    }
}
