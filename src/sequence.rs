//! Ordered algorithm sequences.
//!
//! Insertion order is execution order for `start`, every `run` and `stop`.
//! All stages share one bank list, so banks created by an earlier creator
//! are visible to the validation of every later algorithm, and a filter's
//! selection is seen by everything after it in the same `run`.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use log::LevelFilter;

use crate::algorithm::{Algorithm, Role, Stage, State};
use crate::bank_list::BankList;
use crate::config::OptionValue;
use crate::error::{Error, Result, StopFailure};
use crate::factory::AlgorithmFactory;

/// Active row counts after one algorithm ran.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepTrace {
    /// Instance name of the algorithm.
    pub algorithm: String,
    pub role: Role,
    /// `(bank name, active rows)` for every bank in the list, in list order.
    pub active_rows: Vec<(String, usize)>,
}

/// A named, ordered list of algorithm stages.
pub struct AlgorithmSequence {
    name: String,
    stages: Vec<Stage>,
    names: HashMap<String, usize>,
    started: bool,
    sequence_file: Option<PathBuf>,
    config_dirs: Vec<PathBuf>,
}

impl AlgorithmSequence {
    pub fn new(name: impl Into<String>) -> AlgorithmSequence {
        AlgorithmSequence {
            name: name.into(),
            stages: Vec::new(),
            names: HashMap::new(),
            started: false,
            sequence_file: None,
            config_dirs: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    // -----------------------------------------------------------------------
    // Building
    // -----------------------------------------------------------------------

    /// Append an algorithm under its class name.
    pub fn add<A: Algorithm + 'static>(&mut self, algorithm: A) -> Result<()> {
        self.add_stage(Stage::new(algorithm).into_dyn())
    }

    /// Append an algorithm under an instance name of its own.
    pub fn add_named<A: Algorithm + 'static>(
        &mut self,
        name: impl Into<String>,
        algorithm: A,
    ) -> Result<()> {
        self.add_stage(Stage::named(name, algorithm).into_dyn())
    }

    pub fn add_boxed(&mut self, name: impl Into<String>, algorithm: Box<dyn Algorithm>) -> Result<()> {
        self.add_stage(Stage::from_boxed(name, algorithm))
    }

    /// Build `class_name` with `factory` and append it, named `instance`
    /// or after its class.
    pub fn add_from_factory(
        &mut self,
        factory: &AlgorithmFactory,
        class_name: &str,
        instance: Option<&str>,
    ) -> Result<()> {
        self.check_can_add(instance.unwrap_or(class_name))?;
        let algorithm = factory.create(class_name)?;
        self.add_boxed(instance.unwrap_or(class_name), algorithm)
    }

    fn check_can_add(&self, name: &str) -> Result<()> {
        if self.started {
            return Err(Error::SequenceStarted(self.name.clone()));
        }
        if self.names.contains_key(name) {
            return Err(Error::DuplicateAlgorithm {
                sequence: self.name.clone(),
                algorithm: name.to_string(),
            });
        }
        Ok(())
    }

    /// Append a stage. On error the sequence is left as it was.
    pub fn add_stage(&mut self, mut stage: Stage) -> Result<()> {
        self.check_can_add(stage.name())?;
        for dir in &self.config_dirs {
            stage.add_config_directory(dir.clone());
        }
        if let Some(path) = &self.sequence_file {
            stage.set_sequence_config_file(path.clone());
        }
        log::debug!(
            "sequence '{}': added '{}' ({})",
            self.name,
            stage.name(),
            stage.class_name()
        );
        self.names.insert(stage.name().to_string(), self.stages.len());
        self.stages.push(stage);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Lookup and configuration
    // -----------------------------------------------------------------------

    fn position(&self, algorithm: &str) -> Result<usize> {
        self.names
            .get(algorithm)
            .copied()
            .ok_or_else(|| Error::AlgorithmNotFound {
                sequence: self.name.clone(),
                algorithm: algorithm.to_string(),
            })
    }

    pub fn get(&self, algorithm: &str) -> Result<&Stage> {
        let position = self.position(algorithm)?;
        Ok(&self.stages[position])
    }

    pub fn get_mut(&mut self, algorithm: &str) -> Result<&mut Stage> {
        let position = self.position(algorithm)?;
        Ok(&mut self.stages[position])
    }

    pub fn stages(&self) -> impl Iterator<Item = &Stage> {
        self.stages.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.stages.iter().map(Stage::name)
    }

    pub fn set_option(
        &mut self,
        algorithm: &str,
        option: &str,
        value: impl Into<OptionValue>,
    ) -> Result<()> {
        self.get_mut(algorithm)?.set_option(option, value);
        Ok(())
    }

    /// Set an option from untagged JSON, typed by the option's default.
    pub fn set_option_json(
        &mut self,
        algorithm: &str,
        option: &str,
        json: &serde_json::Value,
    ) -> Result<()> {
        self.get_mut(algorithm)?.set_option_json(option, json)
    }

    /// Limit the messages `algorithm` logs to `level`.
    pub fn set_log_level(&mut self, algorithm: &str, level: LevelFilter) -> Result<()> {
        self.get_mut(algorithm)?.set_log_level(level);
        Ok(())
    }

    pub fn set_config_file(&mut self, algorithm: &str, path: impl Into<PathBuf>) -> Result<()> {
        self.get_mut(algorithm)?.set_config_file(path);
        Ok(())
    }

    /// Use `path` as the sequence-wide configuration file for every
    /// algorithm, including ones added later.
    pub fn set_config_file_for_each_algorithm(&mut self, path: impl Into<PathBuf>) {
        let path = path.into();
        for stage in &mut self.stages {
            stage.set_sequence_config_file(path.clone());
        }
        self.sequence_file = Some(path);
    }

    /// Search `dir` for relative configuration file paths.
    pub fn set_config_directory_for_each_algorithm(&mut self, dir: impl Into<PathBuf>) {
        let dir = dir.into();
        for stage in &mut self.stages {
            stage.add_config_directory(dir.clone());
        }
        self.config_dirs.push(dir);
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Start every algorithm in order on `banks`, stopping at the first
    /// failure. The sequence counts as started either way. Banks created by
    /// algorithms that started before the failure stay in `banks`; the
    /// failing algorithm adds none.
    pub fn start(&mut self, banks: &mut BankList) -> Result<()> {
        self.started = true;
        log::info!(
            "sequence '{}': starting {} algorithm(s)",
            self.name,
            self.stages.len()
        );
        for position in 0..self.stages.len() {
            if let Err(e) = self.stages[position].start(banks) {
                if let Error::BankNotFound { bank, .. } = e.root() {
                    self.hint_late_creator(position, bank);
                }
                return Err(e);
            }
        }
        log::info!("sequence '{}': started", self.name);
        Ok(())
    }

    fn hint_late_creator(&self, failed: usize, bank: &str) {
        for later in &self.stages[failed + 1..] {
            if later.role() != Role::Creator {
                continue;
            }
            let creates = later
                .algorithm()
                .outputs()
                .map(|schemas| schemas.iter().any(|s| s.name() == bank))
                .unwrap_or(false);
            if creates {
                log::error!(
                    "bank '{bank}' is created by '{}', which comes after '{}'; \
                     add '{}' earlier in the sequence",
                    later.name(),
                    self.stages[failed].name(),
                    later.name()
                );
            }
        }
    }

    /// Run every algorithm in order on one event.
    pub fn run(&self, banks: &mut BankList) -> Result<()> {
        for stage in &self.stages {
            stage.run(banks)?;
        }
        Ok(())
    }

    /// Like [`AlgorithmSequence::run`], recording every bank's active row
    /// count after each algorithm.
    pub fn run_traced(&self, banks: &mut BankList) -> Result<Vec<StepTrace>> {
        let mut steps = Vec::with_capacity(self.stages.len());
        for stage in &self.stages {
            stage.run(banks)?;
            steps.push(StepTrace {
                algorithm: stage.name().to_string(),
                role: stage.role(),
                active_rows: banks
                    .iter()
                    .map(|bank| (bank.name().to_string(), bank.active_rows()))
                    .collect(),
            });
        }
        Ok(steps)
    }

    /// Stop every started algorithm in order. Failures do not stop the
    /// loop; they are returned together.
    pub fn stop(&mut self) -> Result<()> {
        let mut failures = Vec::new();
        for stage in &mut self.stages {
            if self.started && stage.state() == State::Uninitialized {
                log::debug!("{}: never started, nothing to stop", stage.name());
                continue;
            }
            if let Err(error) = stage.stop() {
                log::warn!("{}: stop failed: {error}", stage.name());
                failures.push(StopFailure {
                    algorithm: stage.name().to_string(),
                    error,
                });
            }
        }
        if !failures.is_empty() {
            return Err(Error::Stop(failures));
        }
        log::info!("sequence '{}': stopped", self.name);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Banks
    // -----------------------------------------------------------------------

    /// Index of `bank` in `banks`.
    pub fn bank_index(&self, banks: &BankList, bank: &str) -> Result<usize> {
        banks.require(bank)
    }

    /// Index in `banks` of the bank that creator `algorithm` added at start.
    pub fn created_bank_index(&self, banks: &BankList, algorithm: &str) -> Result<usize> {
        self.get(algorithm)?.created_bank_index(banks)
    }

    pub fn created_bank_indices(&self, banks: &BankList, algorithm: &str) -> Result<Vec<usize>> {
        self.get(algorithm)?.created_bank_indices(banks)
    }

    pub fn created_bank_names(&self, algorithm: &str) -> Result<&[String]> {
        self.get(algorithm)?.created_bank_names()
    }

    /// Log the sequence at info level.
    pub fn print_sequence(&self) {
        for line in self.to_string().lines() {
            log::info!("{line}");
        }
    }
}

impl fmt::Display for AlgorithmSequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sequence '{}' ({} algorithms)", self.name, self.stages.len())?;
        for (position, stage) in self.stages.iter().enumerate() {
            write!(
                f,
                "\n  {position}: {} [{}] {} ({})",
                stage.name(),
                stage.class_name(),
                stage.role(),
                stage.state()
            )?;
        }
        Ok(())
    }
}
