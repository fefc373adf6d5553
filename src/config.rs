//! Layered option resolution.
//!
//! Each algorithm owns a [`ConfigResolver`]. Options are looked up, highest
//! precedence first, in:
//!
//! 1. in-memory overrides (tagged [`OptionValue`]s, matched exactly),
//! 2. the algorithm's own JSON configuration file,
//! 3. the sequence-wide JSON configuration file,
//! 4. the defaults the algorithm type declares.
//!
//! A configuration file is a JSON object keyed by algorithm name. The
//! instance name section is searched before the class name section:
//!
//! ```json
//! { "clas12::EventBuilderFilter": { "pids": [11, 211] } }
//! ```
//!
//! File values carry no tag of their own; they are accepted when their JSON
//! shape fits the kind the algorithm asks for. Each file is read once, on
//! the first lookup after it is set, and then served from a cache.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use log::Level;
use serde_json::{Map, Value as Json};

use crate::algorithm::stage_log_enabled;
use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// Tagged option values
// ---------------------------------------------------------------------------

/// The type an algorithm expects for an option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OptionKind {
    Str,
    Int,
    Float,
    Bool,
    IntSet,
    IntList,
    FloatList,
    StrList,
}

impl fmt::Display for OptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OptionKind::Str => "string",
            OptionKind::Int => "int",
            OptionKind::Float => "float",
            OptionKind::Bool => "bool",
            OptionKind::IntSet => "set<int>",
            OptionKind::IntList => "list<int>",
            OptionKind::FloatList => "list<float>",
            OptionKind::StrList => "list<string>",
        };
        f.write_str(name)
    }
}

/// A configuration value with its type tag.
#[derive(Debug, Clone, PartialEq)]
pub enum OptionValue {
    Str(String),
    Int(i32),
    Float(f64),
    Bool(bool),
    IntSet(BTreeSet<i32>),
    IntList(Vec<i32>),
    FloatList(Vec<f64>),
    StrList(Vec<String>),
}

pub type OptionMap = BTreeMap<String, OptionValue>;

impl OptionValue {
    pub fn kind(&self) -> OptionKind {
        match self {
            OptionValue::Str(_) => OptionKind::Str,
            OptionValue::Int(_) => OptionKind::Int,
            OptionValue::Float(_) => OptionKind::Float,
            OptionValue::Bool(_) => OptionKind::Bool,
            OptionValue::IntSet(_) => OptionKind::IntSet,
            OptionValue::IntList(_) => OptionKind::IntList,
            OptionValue::FloatList(_) => OptionKind::FloatList,
            OptionValue::StrList(_) => OptionKind::StrList,
        }
    }

    /// Convert a file value to `expected`, if its JSON shape allows it.
    ///
    /// Integers may populate floats; arrays populate lists and sets.
    /// Nothing else is coerced.
    pub fn from_json(json: &Json, expected: OptionKind) -> Option<OptionValue> {
        match expected {
            OptionKind::Str => json.as_str().map(|s| OptionValue::Str(s.to_string())),
            OptionKind::Int => json_i32(json).map(OptionValue::Int),
            OptionKind::Float => json.as_f64().map(OptionValue::Float),
            OptionKind::Bool => json.as_bool().map(OptionValue::Bool),
            OptionKind::IntSet => json_array(json, json_i32)
                .map(|v| OptionValue::IntSet(v.into_iter().collect())),
            OptionKind::IntList => json_array(json, json_i32).map(OptionValue::IntList),
            OptionKind::FloatList => json_array(json, Json::as_f64).map(OptionValue::FloatList),
            OptionKind::StrList => {
                json_array(json, |j| j.as_str().map(str::to_string)).map(OptionValue::StrList)
            }
        }
    }

    /// Guess a tag from the JSON shape alone, for options with no declared
    /// default. Arrays of integers become `IntList`.
    pub fn infer_json(json: &Json) -> Option<OptionValue> {
        match json {
            Json::String(s) => Some(OptionValue::Str(s.clone())),
            Json::Bool(b) => Some(OptionValue::Bool(*b)),
            Json::Number(_) => json_i32(json)
                .map(OptionValue::Int)
                .or_else(|| json.as_f64().map(OptionValue::Float)),
            Json::Array(_) => [OptionKind::IntList, OptionKind::FloatList, OptionKind::StrList]
                .into_iter()
                .find_map(|kind| OptionValue::from_json(json, kind)),
            Json::Null | Json::Object(_) => None,
        }
    }

    pub fn to_json(&self) -> Json {
        match self {
            OptionValue::Str(s) => Json::from(s.as_str()),
            OptionValue::Int(v) => Json::from(*v),
            OptionValue::Float(v) => Json::from(*v),
            OptionValue::Bool(v) => Json::from(*v),
            OptionValue::IntSet(v) => Json::from(v.iter().copied().collect::<Vec<_>>()),
            OptionValue::IntList(v) => Json::from(v.clone()),
            OptionValue::FloatList(v) => Json::from(v.clone()),
            OptionValue::StrList(v) => Json::from(v.clone()),
        }
    }
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

fn json_i32(json: &Json) -> Option<i32> {
    json.as_i64().and_then(|v| i32::try_from(v).ok())
}

fn json_array<T>(json: &Json, item: impl Fn(&Json) -> Option<T>) -> Option<Vec<T>> {
    json.as_array()?.iter().map(item).collect()
}

fn json_shape(json: &Json) -> &'static str {
    match json {
        Json::Null => "null",
        Json::Bool(_) => "a JSON bool",
        Json::Number(n) if n.is_i64() || n.is_u64() => "a JSON integer",
        Json::Number(_) => "a JSON number",
        Json::String(_) => "a JSON string",
        Json::Array(_) => "a JSON array",
        Json::Object(_) => "a JSON object",
    }
}

/// Rust types an option can be read as.
pub trait OptionType: Sized {
    const KIND: OptionKind;

    fn from_option(value: &OptionValue) -> Option<Self>;
    fn into_option(self) -> OptionValue;
}

macro_rules! impl_option_type {
    ($ty:ty, $variant:ident) => {
        impl OptionType for $ty {
            const KIND: OptionKind = OptionKind::$variant;

            fn from_option(value: &OptionValue) -> Option<Self> {
                match value {
                    OptionValue::$variant(v) => Some(v.clone()),
                    _ => None,
                }
            }

            fn into_option(self) -> OptionValue {
                OptionValue::$variant(self)
            }
        }

        impl From<$ty> for OptionValue {
            fn from(v: $ty) -> OptionValue {
                OptionValue::$variant(v)
            }
        }
    };
}

impl_option_type!(String, Str);
impl_option_type!(i32, Int);
impl_option_type!(f64, Float);
impl_option_type!(bool, Bool);
impl_option_type!(BTreeSet<i32>, IntSet);
impl_option_type!(Vec<i32>, IntList);
impl_option_type!(Vec<f64>, FloatList);
impl_option_type!(Vec<String>, StrList);

impl From<&str> for OptionValue {
    fn from(v: &str) -> OptionValue {
        OptionValue::Str(v.to_string())
    }
}

// ---------------------------------------------------------------------------
// Configuration files
// ---------------------------------------------------------------------------

/// A parsed configuration file: algorithm name -> option name -> value.
///
/// Only the top level has to be an object. Other top-level entries, such
/// as `"_comment"` strings, are ignored unless an algorithm looks them up.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    path: PathBuf,
    sections: Map<String, Json>,
}

impl ConfigFile {
    pub fn load(path: &Path) -> Result<ConfigFile> {
        let text = fs::read_to_string(path).map_err(|source| Error::ConfigFileRead {
            path: path.to_path_buf(),
            source,
        })?;
        ConfigFile::parse(path, &text)
    }

    pub fn parse(path: impl Into<PathBuf>, text: &str) -> Result<ConfigFile> {
        let path = path.into();
        match serde_json::from_str(text) {
            Ok(sections) => Ok(ConfigFile { path, sections }),
            Err(source) => Err(Error::ConfigFileParse { path, source }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The value of `option` in the first of `sections` that sets it.
    pub fn lookup(&self, sections: &[&str], option: &str) -> Result<Option<&Json>> {
        for &name in sections {
            let Some(section) = self.sections.get(name) else {
                continue;
            };
            let section = section.as_object().ok_or_else(|| Error::InvalidConfigSection {
                path: self.path.clone(),
                section: name.to_string(),
            })?;
            if let Some(value) = section.get(option) {
                return Ok(Some(value));
            }
        }
        Ok(None)
    }
}

/// Where a resolved option came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionSource {
    Override,
    AlgorithmFile,
    SequenceFile,
    Default,
}

impl fmt::Display for OptionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OptionSource::Override => "override",
            OptionSource::AlgorithmFile => "algorithm config file",
            OptionSource::SequenceFile => "sequence config file",
            OptionSource::Default => "default",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Default)]
struct FileSource {
    path: Option<PathBuf>,
    cache: Option<ConfigFile>,
}

impl FileSource {
    fn set(&mut self, path: Option<PathBuf>) {
        self.path = path;
        self.cache = None;
    }

    fn file(&mut self, search_dirs: &[PathBuf]) -> Result<Option<&ConfigFile>> {
        let Some(path) = &self.path else {
            return Ok(None);
        };
        if self.cache.is_none() {
            let found = locate(path, search_dirs)?;
            log::debug!("reading configuration file '{}'", found.display());
            self.cache = Some(ConfigFile::load(&found)?);
        }
        Ok(self.cache.as_ref())
    }
}

fn locate(path: &Path, search_dirs: &[PathBuf]) -> Result<PathBuf> {
    if path.is_file() {
        return Ok(path.to_path_buf());
    }
    if path.is_relative() {
        for dir in search_dirs.iter().rev() {
            let candidate = dir.join(path);
            if candidate.is_file() {
                return Ok(candidate);
            }
        }
    }
    Err(Error::ConfigFileNotFound {
        path: path.to_path_buf(),
    })
}

// ---------------------------------------------------------------------------
// Resolver
// ---------------------------------------------------------------------------

/// Per-algorithm option resolution over the four configuration sources.
#[derive(Debug, Clone)]
pub struct ConfigResolver {
    algorithm: String,
    class_name: String,
    overrides: OptionMap,
    defaults: OptionMap,
    algorithm_file: FileSource,
    sequence_file: FileSource,
    search_dirs: Vec<PathBuf>,
    resolved: OptionMap,
}

impl ConfigResolver {
    pub fn new(
        algorithm: impl Into<String>,
        class_name: impl Into<String>,
        defaults: OptionMap,
    ) -> ConfigResolver {
        ConfigResolver {
            algorithm: algorithm.into(),
            class_name: class_name.into(),
            overrides: OptionMap::new(),
            defaults,
            algorithm_file: FileSource::default(),
            sequence_file: FileSource::default(),
            search_dirs: Vec::new(),
            resolved: OptionMap::new(),
        }
    }

    pub fn algorithm(&self) -> &str {
        &self.algorithm
    }

    pub fn set_override(&mut self, option: impl Into<String>, value: impl Into<OptionValue>) {
        self.overrides.insert(option.into(), value.into());
    }

    pub fn clear_override(&mut self, option: &str) -> Option<OptionValue> {
        self.overrides.remove(option)
    }

    /// Set an override from untagged JSON. The tag comes from the option's
    /// declared default, or from the JSON shape when there is none.
    pub fn set_override_json(&mut self, option: &str, json: &Json) -> Result<()> {
        let value = match self.defaults.get(option).map(OptionValue::kind) {
            Some(kind) => {
                OptionValue::from_json(json, kind).ok_or_else(|| Error::OptionTypeMismatch {
                    algorithm: self.algorithm.clone(),
                    option: option.to_string(),
                    expected: kind,
                    found: json_shape(json).to_string(),
                })?
            }
            None => OptionValue::infer_json(json).ok_or_else(|| Error::InvalidOption {
                algorithm: self.algorithm.clone(),
                option: option.to_string(),
                reason: format!("cannot infer an option type from {}", json_shape(json)),
            })?,
        };
        self.set_override(option, value);
        Ok(())
    }

    pub fn set_algorithm_file(&mut self, path: impl Into<PathBuf>) {
        self.algorithm_file.set(Some(path.into()));
    }

    pub fn clear_algorithm_file(&mut self) {
        self.algorithm_file.set(None);
    }

    pub fn set_sequence_file(&mut self, path: impl Into<PathBuf>) {
        self.sequence_file.set(Some(path.into()));
    }

    pub fn clear_sequence_file(&mut self) {
        self.sequence_file.set(None);
    }

    /// Add a directory to search for relative configuration file paths.
    /// Later directories are searched first.
    pub fn add_search_dir(&mut self, dir: impl Into<PathBuf>) {
        self.search_dirs.push(dir.into());
    }

    pub fn resolve(&mut self, option: &str, expected: OptionKind) -> Result<OptionValue> {
        self.resolve_with_source(option, expected).map(|(value, _)| value)
    }

    pub fn resolve_with_source(
        &mut self,
        option: &str,
        expected: OptionKind,
    ) -> Result<(OptionValue, OptionSource)> {
        if let Some(value) = self.overrides.get(option) {
            let value = self.check_tag(option, value, expected)?;
            return Ok((value, OptionSource::Override));
        }

        let sections = [self.algorithm.as_str(), self.class_name.as_str()];
        for (source, kind) in [
            (&mut self.algorithm_file, OptionSource::AlgorithmFile),
            (&mut self.sequence_file, OptionSource::SequenceFile),
        ] {
            let Some(file) = source.file(&self.search_dirs)? else {
                continue;
            };
            if let Some(json) = file.lookup(&sections, option)? {
                let value = OptionValue::from_json(json, expected).ok_or_else(|| {
                    Error::OptionTypeMismatch {
                        algorithm: self.algorithm.clone(),
                        option: option.to_string(),
                        expected,
                        found: format!("{} in '{}'", json_shape(json), file.path().display()),
                    }
                })?;
                return Ok((value, kind));
            }
        }

        if let Some(value) = self.defaults.get(option) {
            let value = self.check_tag(option, value, expected)?;
            return Ok((value, OptionSource::Default));
        }

        Err(Error::OptionNotFound {
            algorithm: self.algorithm.clone(),
            option: option.to_string(),
        })
    }

    fn check_tag(&self, option: &str, value: &OptionValue, expected: OptionKind) -> Result<OptionValue> {
        if value.kind() != expected {
            return Err(Error::OptionTypeMismatch {
                algorithm: self.algorithm.clone(),
                option: option.to_string(),
                expected,
                found: value.kind().to_string(),
            });
        }
        Ok(value.clone())
    }

    /// Resolve `option` as `T` and remember the value for introspection.
    pub fn get<T: OptionType>(&mut self, option: &str) -> Result<T> {
        let (value, source) = self.resolve_with_source(option, T::KIND)?;
        if stage_log_enabled(Level::Debug) {
            log::debug!(
                "{}: option '{option}' = {value} ({source})",
                self.algorithm
            );
        }
        let typed = T::from_option(&value).ok_or_else(|| Error::OptionTypeMismatch {
            algorithm: self.algorithm.clone(),
            option: option.to_string(),
            expected: T::KIND,
            found: value.kind().to_string(),
        })?;
        self.resolved.insert(option.to_string(), value);
        Ok(typed)
    }

    /// Every option read through [`ConfigResolver::get`] so far.
    pub fn resolved(&self) -> &OptionMap {
        &self.resolved
    }
}
