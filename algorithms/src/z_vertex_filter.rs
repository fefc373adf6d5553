//! Cut on the particle vertex z coordinate.

use std::collections::BTreeSet;

use bankseq::{
    Algorithm, BankList, BankRequirement, ConfigResolver, Error, OptionMap, OptionValue, Result,
    Role, show_bank, stage_log_enabled,
};
use log::Level;

pub const CLASS_NAME: &str = "clas12::ZVertexFilter";

/// Particles with `|status|` below this were seen by the forward tagger.
const FORWARD_TAGGER_STATUS: i32 = 2000;

/// Filter on `REC::Particle.vz`.
///
/// Only particles whose PDG code is in `pids` and that were not measured
/// in the forward tagger are cut; everything else passes.
///
/// Options:
/// - `cuts` (list of float): `[low, high]`, exclusive, default `[-13, 12]`
/// - `pids` (set of int): PDG codes the cut applies to, default `{11}`
#[derive(Debug, Clone)]
pub struct ZVertexFilter {
    low: f64,
    high: f64,
    pids: BTreeSet<i32>,
    b_particle: usize,
}

impl Default for ZVertexFilter {
    fn default() -> Self {
        ZVertexFilter {
            low: -13.0,
            high: 12.0,
            pids: BTreeSet::from([11]),
            b_particle: 0,
        }
    }
}

impl ZVertexFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cuts(&self) -> (f64, f64) {
        (self.low, self.high)
    }

    pub fn filter(&self, vz: f64, pid: i32, status: i32) -> bool {
        if self.pids.contains(&pid) && status.abs() >= FORWARD_TAGGER_STATUS {
            vz > self.low && vz < self.high
        } else {
            true
        }
    }
}

impl Algorithm for ZVertexFilter {
    fn class_name(&self) -> &'static str {
        CLASS_NAME
    }

    fn role(&self) -> Role {
        Role::Filter
    }

    fn default_options(&self) -> OptionMap {
        OptionMap::from([
            ("cuts".to_string(), OptionValue::FloatList(vec![-13.0, 12.0])),
            ("pids".to_string(), OptionValue::IntSet(BTreeSet::from([11]))),
        ])
    }

    fn configure(&mut self, config: &mut ConfigResolver) -> Result<()> {
        let cuts: Vec<f64> = config.get("cuts")?;
        let invalid = |reason: String| Error::InvalidOption {
            algorithm: config.algorithm().to_string(),
            option: "cuts".to_string(),
            reason,
        };
        let [low, high] = cuts[..] else {
            return Err(invalid(format!("expected 2 values, got {}", cuts.len())));
        };
        if low >= high {
            return Err(invalid(format!("lower cut {low} is not below upper cut {high}")));
        }
        self.low = low;
        self.high = high;
        self.pids = config.get("pids")?;
        Ok(())
    }

    fn inputs(&self) -> Vec<BankRequirement> {
        vec![BankRequirement::new("REC::Particle").columns(&["pid", "vz", "status"])]
    }

    fn bind(&mut self, banks: &BankList) -> Result<()> {
        self.b_particle = banks.require("REC::Particle")?;
        Ok(())
    }

    fn run(&self, banks: &mut BankList) -> Result<()> {
        show_bank(banks, self.b_particle, "INPUT PARTICLES");
        banks
            .get_mut(self.b_particle)?
            .try_filter_rows(|bank, row| {
                let vz: f32 = bank.get("vz", row)?;
                let pid: i32 = bank.get("pid", row)?;
                let status: i16 = bank.get("status", row)?;
                let accept = self.filter(vz.into(), pid, status.into());
                if stage_log_enabled(Level::Debug) {
                    log::debug!("vz {vz} pid {pid} status {status} -- accept = {accept}");
                }
                Ok(accept)
            })?;
        show_bank(banks, self.b_particle, "OUTPUT PARTICLES");
        Ok(())
    }
}
