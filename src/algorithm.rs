//! The algorithm contract and its lifecycle wrapper.
//!
//! An [`Algorithm`] supplies the physics: which banks it reads, which it
//! creates, how it reads its options and what it does per event. A
//! [`Stage`] wraps one algorithm instance with everything the engine owns:
//! the instance name, the `Uninitialized -> Started -> Stopped` state
//! machine, the option resolver and the indices of the banks it created.

use std::cell::Cell;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use log::{Level, LevelFilter};

use crate::bank::Bank;
use crate::bank_list::BankList;
use crate::config::{ConfigResolver, OptionMap, OptionValue};
use crate::error::{Error, Result};
use crate::schema::Schema;

/// What an algorithm does to the bank list. Fixed per algorithm type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Narrows the row selection of its primary bank.
    Filter,
    /// Rewrites column values of existing banks in place.
    Transformer,
    /// Appends new banks at start and fills them on every run.
    Creator,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::Filter => "filter",
            Role::Transformer => "transformer",
            Role::Creator => "creator",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Uninitialized,
    Started,
    Stopped,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            State::Uninitialized => "uninitialized",
            State::Started => "started",
            State::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// How a creator's output banks relate to its primary input bank.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowPolicy {
    /// One output row per primary input row, checked after every run.
    MatchPrimary,
    /// The creator documents its own correspondence.
    Independent,
}

/// A bank an algorithm reads, with the columns it needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BankRequirement {
    pub bank: String,
    pub columns: Vec<String>,
}

impl BankRequirement {
    pub fn new(bank: impl Into<String>) -> BankRequirement {
        BankRequirement {
            bank: bank.into(),
            columns: Vec::new(),
        }
    }

    pub fn columns(mut self, columns: &[&str]) -> BankRequirement {
        self.columns.extend(columns.iter().map(|c| c.to_string()));
        self
    }
}

/// A unit of event processing.
///
/// Implementations read every option they need in [`Algorithm::configure`]
/// and cache bank indices in [`Algorithm::bind`], so [`Algorithm::run`] only
/// touches bank contents. `run` takes `&self`: anything an algorithm keeps
/// between events must be read-only after `bind`, which lets one started
/// sequence serve several independent bank lists.
pub trait Algorithm: Send + Sync {
    /// Namespaced type name, e.g. `clas12::EventBuilderFilter`.
    fn class_name(&self) -> &'static str;

    fn role(&self) -> Role;

    /// Compiled-in option defaults.
    fn default_options(&self) -> OptionMap {
        OptionMap::new()
    }

    /// Read and cache options. Called once, first thing in `start`.
    fn configure(&mut self, config: &mut ConfigResolver) -> Result<()>;

    /// Banks this algorithm reads. The first one is its primary bank.
    fn inputs(&self) -> Vec<BankRequirement>;

    /// Schemas of the banks a creator appends to the bank list.
    fn outputs(&self) -> Result<Vec<Arc<Schema>>> {
        Ok(Vec::new())
    }

    /// Cache bank indices. Created banks are already in `banks`.
    fn bind(&mut self, banks: &BankList) -> Result<()>;

    /// Process one event.
    fn run(&self, banks: &mut BankList) -> Result<()>;

    fn stop(&mut self) -> Result<()> {
        Ok(())
    }

    fn row_policy(&self) -> RowPolicy {
        RowPolicy::MatchPrimary
    }
}

// ---------------------------------------------------------------------------
// Per-stage log levels
// ---------------------------------------------------------------------------

thread_local! {
    static STAGE_LEVEL: Cell<Option<LevelFilter>> = const { Cell::new(None) };
}

/// Sets the running stage's log level for this thread until dropped.
struct LevelScope(Option<LevelFilter>);

impl LevelScope {
    fn enter(level: Option<LevelFilter>) -> LevelScope {
        LevelScope(STAGE_LEVEL.with(|current| current.replace(level)))
    }
}

impl Drop for LevelScope {
    fn drop(&mut self) {
        STAGE_LEVEL.with(|current| current.set(self.0));
    }
}

/// Log level of the stage currently starting, running or stopping on this
/// thread, if it has one.
pub fn stage_log_level() -> Option<LevelFilter> {
    STAGE_LEVEL.with(Cell::get)
}

/// Whether a message at `level` passes both the current stage's level and
/// the installed logger.
pub fn stage_log_enabled(level: Level) -> bool {
    stage_log_level().is_none_or(|filter| level <= filter) && log::log_enabled!(level)
}

/// Dump a bank at trace level.
pub fn show_bank(banks: &BankList, index: usize, message: &str) {
    if stage_log_enabled(Level::Trace)
        && let Ok(bank) = banks.get(index)
    {
        log::trace!("{message}\n{bank}");
    }
}

// ---------------------------------------------------------------------------
// Stage
// ---------------------------------------------------------------------------

/// One algorithm instance under engine control.
pub struct Stage<A: Algorithm + ?Sized = dyn Algorithm> {
    name: String,
    state: State,
    config: ConfigResolver,
    created: Vec<String>,
    primary: Option<usize>,
    rows_only: bool,
    log_level: Option<LevelFilter>,
    algorithm: Box<A>,
}

impl<A: Algorithm + 'static> Stage<A> {
    /// A stage named after the algorithm's class.
    pub fn new(algorithm: A) -> Stage<A> {
        let name = algorithm.class_name();
        Stage::named(name, algorithm)
    }

    pub fn named(name: impl Into<String>, algorithm: A) -> Stage<A> {
        Stage::from_boxed(name, Box::new(algorithm))
    }

    pub fn into_dyn(self) -> Stage {
        Stage {
            name: self.name,
            state: self.state,
            config: self.config,
            created: self.created,
            primary: self.primary,
            rows_only: self.rows_only,
            log_level: self.log_level,
            algorithm: self.algorithm as Box<dyn Algorithm>,
        }
    }
}

impl<A: Algorithm + ?Sized> Stage<A> {
    pub fn from_boxed(name: impl Into<String>, algorithm: Box<A>) -> Stage<A> {
        let name = name.into();
        let config = ConfigResolver::new(
            name.clone(),
            algorithm.class_name(),
            algorithm.default_options(),
        );
        Stage {
            name,
            state: State::Uninitialized,
            config,
            created: Vec::new(),
            primary: None,
            rows_only: false,
            log_level: None,
            algorithm,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn class_name(&self) -> &'static str {
        self.algorithm.class_name()
    }

    pub fn role(&self) -> Role {
        self.algorithm.role()
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// The wrapped algorithm, for calling its action functions directly.
    pub fn algorithm(&self) -> &A {
        &self.algorithm
    }

    pub fn config(&self) -> &ConfigResolver {
        &self.config
    }

    /// Options the algorithm read during start, with their values.
    pub fn resolved_options(&self) -> &OptionMap {
        self.config.resolved()
    }

    /// Index of the primary input bank, once started with banks.
    pub fn primary_bank(&self) -> Option<usize> {
        self.primary
    }

    // -----------------------------------------------------------------------
    // Configuration
    // -----------------------------------------------------------------------

    fn warn_if_started(&self, what: &str) {
        if self.state != State::Uninitialized {
            log::warn!(
                "{}: {what} set while {}; options were already read at start",
                self.name,
                self.state
            );
        }
    }

    pub fn set_option(&mut self, option: &str, value: impl Into<OptionValue>) {
        self.warn_if_started(&format!("option '{option}'"));
        self.config.set_override(option, value);
    }

    pub fn set_option_json(&mut self, option: &str, json: &serde_json::Value) -> Result<()> {
        self.warn_if_started(&format!("option '{option}'"));
        self.config.set_override_json(option, json)
    }

    pub fn set_config_file(&mut self, path: impl Into<PathBuf>) {
        self.warn_if_started("configuration file");
        self.config.set_algorithm_file(path);
    }

    pub fn set_sequence_config_file(&mut self, path: impl Into<PathBuf>) {
        self.warn_if_started("sequence configuration file");
        self.config.set_sequence_file(path);
    }

    pub fn add_config_directory(&mut self, dir: impl Into<PathBuf>) {
        self.config.add_search_dir(dir);
    }

    /// Limit this stage's messages, and those of its algorithm, to `level`.
    /// The installed logger still has to accept them.
    pub fn set_log_level(&mut self, level: LevelFilter) {
        self.log_level = Some(level);
    }

    pub fn log_level(&self) -> Option<LevelFilter> {
        self.log_level
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    fn require_state(&self, expected: State, operation: &'static str) -> Result<()> {
        if self.state != expected {
            return Err(Error::InvalidState {
                algorithm: self.name.clone(),
                operation,
                state: self.state,
            });
        }
        Ok(())
    }

    fn wrap_start(&self, source: Error) -> Error {
        Error::Start {
            algorithm: self.name.clone(),
            source: Box::new(source),
        }
    }

    /// Configure, validate inputs, append created banks and bind.
    /// On failure `banks` is left as it was.
    pub fn start(&mut self, banks: &mut BankList) -> Result<()> {
        self.require_state(State::Uninitialized, "start")?;
        let _scope = LevelScope::enter(self.log_level);
        let before = banks.len();
        if let Err(e) = self.start_with_banks(banks) {
            banks.truncate(before);
            return Err(self.wrap_start(e));
        }
        self.state = State::Started;
        if stage_log_enabled(Level::Debug) {
            log::debug!("{}: started ({})", self.name, self.role());
        }
        Ok(())
    }

    fn start_with_banks(&mut self, banks: &mut BankList) -> Result<()> {
        self.algorithm.configure(&mut self.config)?;

        let mut primary = None;
        for requirement in self.algorithm.inputs() {
            let index = banks.index_of(&requirement.bank).ok_or_else(|| Error::BankNotFound {
                algorithm: self.name.clone(),
                bank: requirement.bank.clone(),
            })?;
            let schema = banks.get(index)?.schema();
            if let Some(column) = requirement.columns.iter().find(|c| !schema.has_column(c)) {
                return Err(Error::RequiredColumnMissing {
                    algorithm: self.name.clone(),
                    bank: requirement.bank,
                    column: column.clone(),
                });
            }
            if stage_log_enabled(Level::Debug) {
                log::debug!("{}: bank '{}' is at index {index}", self.name, requirement.bank);
            }
            primary = primary.or(Some(index));
        }

        let outputs = self.algorithm.outputs()?;
        match self.role() {
            Role::Creator if outputs.is_empty() => {
                return Err(self.role_violation("declares no output banks"));
            }
            Role::Filter | Role::Transformer if !outputs.is_empty() => {
                return Err(self.role_violation("declares output banks"));
            }
            _ => {}
        }
        let mut created = Vec::with_capacity(outputs.len());
        for schema in outputs {
            let name = schema.name().to_string();
            let index = banks.push(Bank::new(schema))?;
            if stage_log_enabled(Level::Debug) {
                log::debug!("{}: created bank '{name}' at index {index}", self.name);
            }
            created.push(name);
        }

        self.algorithm.bind(banks)?;
        self.created = created;
        self.primary = primary;
        Ok(())
    }

    /// Resolve options without any banks, so the algorithm's action
    /// functions can be called directly. `run` is then an error.
    pub fn start_rows_only(&mut self) -> Result<()> {
        self.require_state(State::Uninitialized, "start")?;
        let _scope = LevelScope::enter(self.log_level);
        if let Err(e) = self.algorithm.configure(&mut self.config) {
            return Err(self.wrap_start(e));
        }
        self.rows_only = true;
        self.state = State::Started;
        if stage_log_enabled(Level::Debug) {
            log::debug!("{}: started without banks", self.name);
        }
        Ok(())
    }

    fn role_violation(&self, reason: &str) -> Error {
        Error::RoleViolation {
            algorithm: self.name.clone(),
            role: self.role(),
            reason: reason.to_string(),
        }
    }

    /// Process one event.
    pub fn run(&self, banks: &mut BankList) -> Result<()> {
        self.require_state(State::Started, "run")?;
        if self.rows_only {
            return Err(Error::RowsOnly(self.name.clone()));
        }
        let _scope = LevelScope::enter(self.log_level);
        self.run_checked(banks).map_err(|source| Error::Run {
            algorithm: self.name.clone(),
            source: Box::new(source),
        })
    }

    fn run_checked(&self, banks: &mut BankList) -> Result<()> {
        let bank_count = banks.len();
        let primary_rows = match self.primary {
            Some(index) => Some(banks.get(index)?.rows()),
            None => None,
        };

        self.algorithm.run(banks)?;

        if banks.len() != bank_count {
            return Err(self.role_violation("changed the bank list while running"));
        }
        let Some(primary) = self.primary else {
            return Ok(());
        };
        let rows = banks.get(primary)?.rows();
        match self.role() {
            Role::Filter | Role::Transformer if Some(rows) != primary_rows => {
                Err(self.role_violation("changed the row count of its primary bank"))
            }
            Role::Creator if self.algorithm.row_policy() == RowPolicy::MatchPrimary => {
                for name in &self.created {
                    let created = banks.bank(name)?;
                    if created.rows() != rows {
                        return Err(Error::RowCountMismatch {
                            algorithm: self.name.clone(),
                            bank: name.clone(),
                            rows: created.rows(),
                            expected: rows,
                        });
                    }
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Release resources. Valid only once, after a successful start; the
    /// stage is stopped afterwards even if the algorithm reports an error.
    pub fn stop(&mut self) -> Result<()> {
        self.require_state(State::Started, "stop")?;
        self.state = State::Stopped;
        let _scope = LevelScope::enter(self.log_level);
        self.algorithm.stop()
    }

    // -----------------------------------------------------------------------
    // Created banks
    // -----------------------------------------------------------------------

    /// Names of the banks this stage appended at start, in order.
    pub fn created_bank_names(&self) -> Result<&[String]> {
        if self.role() != Role::Creator {
            return Err(Error::NotACreator(self.name.clone()));
        }
        if self.state == State::Uninitialized || self.rows_only {
            return Err(Error::InvalidState {
                algorithm: self.name.clone(),
                operation: "look up created banks",
                state: self.state,
            });
        }
        Ok(&self.created)
    }

    /// Indices in `banks` of every bank this stage created.
    pub fn created_bank_indices(&self, banks: &BankList) -> Result<Vec<usize>> {
        self.created_bank_names()?
            .iter()
            .map(|name| banks.require(name))
            .collect()
    }

    /// Index in `banks` of the single bank this stage created.
    pub fn created_bank_index(&self, banks: &BankList) -> Result<usize> {
        let names = self.created_bank_names()?;
        match names {
            [name] => banks.require(name),
            _ => Err(Error::AmbiguousCreatedBank {
                algorithm: self.name.clone(),
                count: names.len(),
            }),
        }
    }
}
