//! # bankseq
//!
//! Ordered algorithm sequences over columnar detector-event banks.
//!
//! ## Overview
//!
//! Each event is a [`BankList`]: named, typed, columnar [`Bank`]s such as
//! `REC::Particle` or `RUN::config`. An [`AlgorithmSequence`] runs its
//! algorithms over that list in insertion order:
//! - **Filters** narrow a bank's row selection; rows are never deleted
//! - **Transformers** rewrite column values in place
//! - **Creators** append new banks at start and fill them every event
//!
//! Options are resolved once per algorithm at start, from in-memory
//! overrides, a per-algorithm JSON file, a sequence-wide JSON file and the
//! algorithm's compiled defaults, in that order.
//!
//! ## Example
//!
//! ```
//! use bankseq::{
//!     Algorithm, AlgorithmSequence, BankList, BankRequirement, ConfigResolver, Result, Role,
//! };
//!
//! /// Keeps negative particles.
//! struct NegativeOnly {
//!     particles: usize,
//! }
//!
//! impl Algorithm for NegativeOnly {
//!     fn class_name(&self) -> &'static str {
//!         "demo::NegativeOnly"
//!     }
//!     fn role(&self) -> Role {
//!         Role::Filter
//!     }
//!     fn configure(&mut self, _config: &mut ConfigResolver) -> Result<()> {
//!         Ok(())
//!     }
//!     fn inputs(&self) -> Vec<BankRequirement> {
//!         vec![BankRequirement::new("REC::Particle").columns(&["charge"])]
//!     }
//!     fn bind(&mut self, banks: &BankList) -> Result<()> {
//!         self.particles = banks.require("REC::Particle")?;
//!         Ok(())
//!     }
//!     fn run(&self, banks: &mut BankList) -> Result<()> {
//!         let bank = banks.get_mut(self.particles)?;
//!         bank.try_filter_rows(|b, row| Ok(b.get::<i8>("charge", row)? < 0))
//!     }
//! }
//!
//! let mut banks = BankList::from_registry(&["REC::Particle"])?;
//! let mut seq = AlgorithmSequence::new("demo");
//! seq.add(NegativeOnly { particles: 0 })?;
//! seq.start(&mut banks)?;
//!
//! let particles = banks.bank_mut("REC::Particle")?;
//! particles.set_rows(3);
//! for (row, charge) in [-1i8, 1, -1].into_iter().enumerate() {
//!     particles.put("charge", row, charge)?;
//! }
//! seq.run(&mut banks)?;
//! assert_eq!(banks.bank("REC::Particle")?.row_list(), vec![0, 2]);
//! seq.stop()?;
//! # Ok::<(), bankseq::Error>(())
//! ```

pub mod algorithm;
pub mod bank;
pub mod bank_list;
pub mod config;
pub mod error;
pub mod factory;
pub mod registry;
pub mod schema;
pub mod sequence;

pub use algorithm::{
    Algorithm, BankRequirement, Role, RowPolicy, Stage, State, show_bank, stage_log_enabled,
    stage_log_level,
};
pub use bank::{Bank, ColumnData, Scalar, Value};
pub use bank_list::BankList;
pub use config::{
    ConfigFile, ConfigResolver, OptionKind, OptionMap, OptionSource, OptionType, OptionValue,
};
pub use error::{Error, ErrorKind, Result, StopFailure};
pub use factory::{AlgorithmFactory, Constructor};
pub use schema::{ColumnType, Entry, Schema};
pub use sequence::{AlgorithmSequence, StepTrace};
