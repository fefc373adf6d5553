//! Keep particles whose PDG code is in a configured set.

use std::collections::BTreeSet;

use bankseq::{
    Algorithm, BankList, BankRequirement, ConfigResolver, Error, OptionMap, OptionValue, Result,
    Role, show_bank,
};

pub const CLASS_NAME: &str = "clas12::EventBuilderFilter";

/// Filter on `REC::Particle.pid`.
///
/// Options:
/// - `particle_bank` (string): bank to filter, default `REC::Particle`
/// - `pids` (set of int): accepted PDG codes, default `{11, 211}`
#[derive(Debug, Clone)]
pub struct EventBuilderFilter {
    particle_bank: String,
    pids: BTreeSet<i32>,
    b_particle: usize,
}

impl Default for EventBuilderFilter {
    fn default() -> Self {
        EventBuilderFilter {
            particle_bank: "REC::Particle".to_string(),
            pids: BTreeSet::from([11, 211]),
            b_particle: 0,
        }
    }
}

impl EventBuilderFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a particle with this PDG code is kept.
    pub fn filter(&self, pid: i32) -> bool {
        self.pids.contains(&pid)
    }

    pub fn filter_all(&self, pids: &[i32]) -> Vec<bool> {
        pids.iter().map(|&pid| self.filter(pid)).collect()
    }

    pub fn pids(&self) -> &BTreeSet<i32> {
        &self.pids
    }
}

impl Algorithm for EventBuilderFilter {
    fn class_name(&self) -> &'static str {
        CLASS_NAME
    }

    fn role(&self) -> Role {
        Role::Filter
    }

    fn default_options(&self) -> OptionMap {
        OptionMap::from([
            ("particle_bank".to_string(), OptionValue::from("REC::Particle")),
            ("pids".to_string(), OptionValue::IntSet(BTreeSet::from([11, 211]))),
        ])
    }

    fn configure(&mut self, config: &mut ConfigResolver) -> Result<()> {
        self.particle_bank = config.get("particle_bank")?;
        self.pids = config.get("pids")?;
        if self.pids.is_empty() {
            return Err(Error::InvalidOption {
                algorithm: config.algorithm().to_string(),
                option: "pids".to_string(),
                reason: "at least one PDG code is required".to_string(),
            });
        }
        Ok(())
    }

    fn inputs(&self) -> Vec<BankRequirement> {
        vec![BankRequirement::new(&self.particle_bank).columns(&["pid"])]
    }

    fn bind(&mut self, banks: &BankList) -> Result<()> {
        self.b_particle = banks.require(&self.particle_bank)?;
        Ok(())
    }

    fn run(&self, banks: &mut BankList) -> Result<()> {
        show_bank(banks, self.b_particle, "INPUT PARTICLES");
        banks
            .get_mut(self.b_particle)?
            .try_filter_rows(|bank, row| Ok(self.filter(bank.get("pid", row)?)))?;
        show_bank(banks, self.b_particle, "OUTPUT PARTICLES");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bankseq::{ErrorKind, Stage};

    fn particles(pids: &[i32]) -> BankList {
        let mut banks = BankList::from_registry(&["REC::Particle"]).unwrap();
        let bank = banks.get_mut(0).unwrap();
        bank.set_rows(pids.len());
        for (row, &pid) in pids.iter().enumerate() {
            bank.put("pid", row, pid).unwrap();
        }
        banks
    }

    #[test]
    fn test_action_function() {
        let mut stage = Stage::new(EventBuilderFilter::new());
        stage.start_rows_only().unwrap();
        let filter = stage.algorithm();
        assert!(filter.filter(11));
        assert!(filter.filter(211));
        assert!(!filter.filter(-211));
        assert_eq!(filter.filter_all(&[11, 2212, 211]), vec![true, false, true]);
    }

    #[test]
    fn test_run_selects_rows() {
        let mut banks = particles(&[11, 211, 13]);
        let mut stage = Stage::new(EventBuilderFilter::new());
        stage.start(&mut banks).unwrap();
        stage.run(&mut banks).unwrap();
        assert_eq!(banks.get(0).unwrap().row_list(), vec![0, 1]);
    }

    #[test]
    fn test_pids_option() {
        let mut banks = particles(&[11, 2212, 22, 2212]);
        let mut stage = Stage::new(EventBuilderFilter::new());
        stage.set_option("pids", BTreeSet::from([2212, 22]));
        stage.start(&mut banks).unwrap();
        stage.run(&mut banks).unwrap();
        assert_eq!(banks.get(0).unwrap().row_list(), vec![1, 2, 3]);
    }

    #[test]
    fn test_empty_pids_rejected() {
        let mut stage = Stage::new(EventBuilderFilter::new());
        stage.set_option("pids", BTreeSet::<i32>::new());
        let err = stage.start_rows_only().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_other_particle_bank() {
        let mut banks = particles(&[11]);
        let mut stage = Stage::new(EventBuilderFilter::new());
        stage.set_option("particle_bank", "REC::Electrons");
        let err = stage.start(&mut banks).unwrap_err();
        assert!(matches!(
            err.root(),
            Error::BankNotFound { bank, .. } if bank == "REC::Electrons"
        ));
    }
}
