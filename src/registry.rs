//! Process-wide table of known bank schemas.
//!
//! The table is compiled in by `build.rs` from `bankdefs/banks.json`; the
//! `Arc<Schema>` values are built once on first use and shared by every
//! bank created from the registry.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use crate::error::{Error, Result};
use crate::schema::{ColumnType, Entry, Schema};

/// A compiled-in bank definition.
#[derive(Debug)]
pub struct BankDef {
    pub name: &'static str,
    pub group: i32,
    pub item: i32,
    pub entries: &'static [(&'static str, ColumnType)],
}

include!(concat!(env!("OUT_DIR"), "/bank_defs.rs"));

static SCHEMAS: OnceLock<HashMap<&'static str, Arc<Schema>>> = OnceLock::new();

fn schemas() -> &'static HashMap<&'static str, Arc<Schema>> {
    SCHEMAS.get_or_init(|| {
        let mut map = HashMap::with_capacity(BANK_DEFS.len());
        for def in BANK_DEFS {
            let entries = def
                .entries
                .iter()
                .map(|&(name, ty)| Entry {
                    name: name.to_string(),
                    ty,
                })
                .collect();
            // build.rs already rejects empty or duplicate columns
            match Schema::new(def.name, entries) {
                Ok(schema) => {
                    map.insert(def.name, Arc::new(schema.with_ids(def.group, def.item)));
                }
                Err(e) => log::error!("skipping bank definition '{}': {e}", def.name),
            }
        }
        map
    })
}

/// Shared schema of a registered bank.
pub fn schema(name: &str) -> Result<Arc<Schema>> {
    schemas()
        .get(name)
        .cloned()
        .ok_or_else(|| Error::UnknownBank(name.to_string()))
}

pub fn bank_defs() -> &'static [BankDef] {
    BANK_DEFS
}

pub fn is_registered(name: &str) -> bool {
    schemas().contains_key(name)
}
