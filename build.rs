//! Build script to compile the bank schema registry.
//!
//! Reads `bankdefs/banks.json` and writes `$OUT_DIR/bank_defs.rs`, a static
//! table of bank names, group/item identifiers and typed columns that
//! `src/registry.rs` includes.

use std::collections::HashSet;
use std::env;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use serde_json::Value;

const BANK_DEFS: &str = "bankdefs/banks.json";

fn main() {
    let text = fs::read_to_string(BANK_DEFS)
        .unwrap_or_else(|e| panic!("cannot read {BANK_DEFS}: {e}"));
    let defs: Value =
        serde_json::from_str(&text).unwrap_or_else(|e| panic!("cannot parse {BANK_DEFS}: {e}"));
    let defs = defs
        .as_array()
        .unwrap_or_else(|| panic!("{BANK_DEFS} must hold an array of bank definitions"));

    let mut out = String::new();
    out.push_str("// @generated by build.rs from bankdefs/banks.json\n");
    out.push_str("pub(crate) static BANK_DEFS: &[BankDef] = &[\n");

    let mut names = HashSet::new();
    let mut ids = HashSet::new();
    for def in defs {
        let name = field_str(def, "name");
        let group = field_int(def, "group", name);
        let item = field_int(def, "item", name);
        if !names.insert(name.to_string()) {
            panic!("bank '{name}' is defined twice in {BANK_DEFS}");
        }
        if !ids.insert((group, item)) {
            panic!("bank '{name}': group {group} item {item} is not unique in {BANK_DEFS}");
        }

        let entries = def
            .get("entries")
            .and_then(Value::as_array)
            .unwrap_or_else(|| panic!("bank '{name}' has no 'entries' array"));
        if entries.is_empty() {
            panic!("bank '{name}' has no columns");
        }

        writeln!(out, "    BankDef {{").ok();
        writeln!(out, "        name: {name:?},").ok();
        writeln!(out, "        group: {group},").ok();
        writeln!(out, "        item: {item},").ok();
        writeln!(out, "        entries: &[").ok();
        for entry in entries {
            let column = field_str(entry, "name");
            let variant = match field_str(entry, "type") {
                "B" => "Byte",
                "S" => "Short",
                "I" => "Int",
                "L" => "Long",
                "F" => "Float",
                "D" => "Double",
                other => panic!("bank '{name}' column '{column}': unknown type '{other}'"),
            };
            writeln!(out, "            ({column:?}, ColumnType::{variant}),").ok();
        }
        writeln!(out, "        ],").ok();
        writeln!(out, "    }},").ok();
    }
    out.push_str("];\n");

    let out_dir = env::var("OUT_DIR").unwrap_or_else(|e| panic!("OUT_DIR not set: {e}"));
    let dest = Path::new(&out_dir).join("bank_defs.rs");
    fs::write(&dest, out).unwrap_or_else(|e| panic!("cannot write {}: {e}", dest.display()));

    println!("cargo:rerun-if-changed={BANK_DEFS}");
    println!("cargo:rerun-if-changed=build.rs");
}

fn field_str<'a>(value: &'a Value, key: &str) -> &'a str {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_else(|| panic!("missing string field '{key}' in {value}"))
}

fn field_int(value: &Value, key: &str, bank: &str) -> i64 {
    value
        .get(key)
        .and_then(Value::as_i64)
        .unwrap_or_else(|| panic!("bank '{bank}': missing integer field '{key}'"))
}
