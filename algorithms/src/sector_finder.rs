//! Find the detector sector of each particle.
//!
//! Creates `REC::Particle::Sector` with one row per `REC::Particle` row:
//! `pindex` is the particle row and `sector` the forward-detector sector
//! (1 to 6), or 0 when no detector response matches the particle.

use std::sync::Arc;

use bankseq::{
    Algorithm, Bank, BankList, BankRequirement, ConfigResolver, Error, OptionMap, OptionValue,
    Result, Role, Schema, registry, show_bank,
};

pub const CLASS_NAME: &str = "clas12::SectorFinder";
pub const RESULT_BANK: &str = "REC::Particle::Sector";

/// Detector ids of the forward detector; other detectors also report
/// "sectors" that must not be used.
pub const FORWARD_DETECTORS: [i32; 6] = [6, 7, 12, 15, 16, 18];

/// Detector banks searched by default, highest priority first.
const DEFAULT_BANKS: [&str; 3] = ["REC::Track", "REC::Scintillator", "REC::Calorimeter"];

const DEFAULT: &str = "default";

/// Sector and particle index of every forward-detector response in a bank.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SectorList {
    pub sectors: Vec<i32>,
    pub pindices: Vec<i32>,
}

impl SectorList {
    /// Collect the active rows of a detector bank.
    pub fn from_bank(bank: &Bank) -> Result<SectorList> {
        let mut list = SectorList::default();
        for row in bank.row_list() {
            if FORWARD_DETECTORS.contains(&narrow(bank, "detector", row)?) {
                list.sectors.push(narrow(bank, "sector", row)?);
                list.pindices.push(narrow(bank, "pindex", row)?);
            }
        }
        Ok(list)
    }

    /// Sector of the first response for particle `pindex`, or -1.
    pub fn get_sector(&self, pindex: i32) -> i32 {
        get_sector(&self.sectors, &self.pindices, pindex)
    }
}

fn narrow(bank: &Bank, column: &str, row: usize) -> Result<i32> {
    let value = bank.get_i64(column, row)?;
    i32::try_from(value).map_err(|_| Error::InvalidData {
        bank: bank.name().to_string(),
        reason: format!("column '{column}' row {row}: {value} does not fit an int"),
    })
}

/// Sector paired with the first occurrence of `pindex`, or -1 when absent.
pub fn get_sector(sectors: &[i32], pindices: &[i32], pindex: i32) -> i32 {
    pindices
        .iter()
        .zip(sectors)
        .find(|&(&p, _)| p == pindex)
        .map_or(-1, |(_, &sector)| sector)
}

/// Where to look for the sector of charged or neutral particles.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Source {
    /// The default detector banks, in priority order.
    Default,
    /// A user-named bank with `sector`, `pindex` and `detector` columns.
    Bank(String),
}

impl Source {
    fn from_option(name: String) -> Source {
        if name == DEFAULT {
            Source::Default
        } else {
            Source::Bank(name)
        }
    }
}

/// Creator of `REC::Particle::Sector`.
///
/// Options:
/// - `bank_charged` (string): bank for charged particles, or `default`
/// - `bank_uncharged` (string): bank for neutral particles, or `default`
///
/// With `default`, `REC::Track`, `REC::Scintillator` and
/// `REC::Calorimeter` are searched in that order.
#[derive(Debug, Clone)]
pub struct SectorFinder {
    charged: Source,
    uncharged: Source,
    b_particle: usize,
    b_result: usize,
    b_defaults: Vec<usize>,
    b_charged: Option<usize>,
    b_uncharged: Option<usize>,
}

impl Default for SectorFinder {
    fn default() -> Self {
        SectorFinder {
            charged: Source::Default,
            uncharged: Source::Default,
            b_particle: 0,
            b_result: 0,
            b_defaults: Vec::new(),
            b_charged: None,
            b_uncharged: None,
        }
    }
}

impl SectorFinder {
    pub fn new() -> Self {
        Self::default()
    }

    fn uses_defaults(&self) -> bool {
        self.charged == Source::Default || self.uncharged == Source::Default
    }

    /// Sector of particle `pindex` from the default banks' lists, taken in
    /// priority order. 0 when none has a response.
    pub fn find_sector(lists: &[SectorList], pindex: i32) -> i32 {
        lists
            .iter()
            .map(|list| list.get_sector(pindex))
            .find(|&sector| sector != -1)
            .unwrap_or(0)
    }

    fn lists(&self, banks: &BankList, index: Option<usize>) -> Result<Option<SectorList>> {
        index
            .map(|i| SectorList::from_bank(banks.get(i)?))
            .transpose()
    }
}

impl Algorithm for SectorFinder {
    fn class_name(&self) -> &'static str {
        CLASS_NAME
    }

    fn role(&self) -> Role {
        Role::Creator
    }

    fn default_options(&self) -> OptionMap {
        OptionMap::from([
            ("bank_charged".to_string(), OptionValue::from(DEFAULT)),
            ("bank_uncharged".to_string(), OptionValue::from(DEFAULT)),
        ])
    }

    fn configure(&mut self, config: &mut ConfigResolver) -> Result<()> {
        self.charged = Source::from_option(config.get("bank_charged")?);
        self.uncharged = Source::from_option(config.get("bank_uncharged")?);
        Ok(())
    }

    fn inputs(&self) -> Vec<BankRequirement> {
        let detector = |name: &str| {
            BankRequirement::new(name).columns(&["detector", "sector", "pindex"])
        };
        let mut inputs = vec![BankRequirement::new("REC::Particle").columns(&["charge"])];
        if self.uses_defaults() {
            inputs.extend(DEFAULT_BANKS.map(detector));
        }
        for source in [&self.charged, &self.uncharged] {
            if let Source::Bank(name) = source
                && !inputs.iter().any(|r| &r.bank == name)
            {
                inputs.push(detector(name.as_str()));
            }
        }
        inputs
    }

    fn outputs(&self) -> Result<Vec<Arc<Schema>>> {
        Ok(vec![registry::schema(RESULT_BANK)?])
    }

    fn bind(&mut self, banks: &BankList) -> Result<()> {
        self.b_particle = banks.require("REC::Particle")?;
        self.b_result = banks.require(RESULT_BANK)?;
        self.b_defaults = if self.uses_defaults() {
            DEFAULT_BANKS
                .iter()
                .map(|name| banks.require(name))
                .collect::<Result<_>>()?
        } else {
            Vec::new()
        };
        let user_bank = |source: &Source| match source {
            Source::Bank(name) => banks.require(name).map(Some),
            Source::Default => Ok(None),
        };
        self.b_charged = user_bank(&self.charged)?;
        self.b_uncharged = user_bank(&self.uncharged)?;
        Ok(())
    }

    fn run(&self, banks: &mut BankList) -> Result<()> {
        let defaults = self
            .b_defaults
            .iter()
            .map(|&i| SectorList::from_bank(banks.get(i)?))
            .collect::<Result<Vec<_>>>()?;
        let charged = self.lists(banks, self.b_charged)?;
        let uncharged = self.lists(banks, self.b_uncharged)?;

        let (particles, result) = banks.split_pair(self.b_particle, self.b_result)?;
        result.set_rows(particles.rows());
        for row in 0..particles.rows() {
            let pindex = i16::try_from(row).map_err(|_| Error::InvalidData {
                bank: RESULT_BANK.to_string(),
                reason: format!("particle row {row} does not fit a short pindex"),
            })?;
            let user = if particles.get::<i8>("charge", row)? == 0 {
                uncharged.as_ref()
            } else {
                charged.as_ref()
            };
            let sector = match user {
                Some(list) => list.get_sector(pindex.into()).max(0),
                None => SectorFinder::find_sector(&defaults, pindex.into()),
            };
            result.put("sector", row, sector)?;
            result.put("pindex", row, pindex)?;
        }
        result.restrict_to(&particles.row_list());

        show_bank(banks, self.b_result, "CREATED BANK");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bankseq::Stage;

    const BANKS: [&str; 4] = [
        "REC::Particle",
        "REC::Track",
        "REC::Scintillator",
        "REC::Calorimeter",
    ];

    /// `(detector, sector, pindex)` responses.
    fn fill(banks: &mut BankList, name: &str, rows: &[(i8, i8, i16)]) {
        let bank = banks.bank_mut(name).unwrap();
        bank.set_rows(rows.len());
        for (row, &(detector, sector, pindex)) in rows.iter().enumerate() {
            bank.put("detector", row, detector).unwrap();
            bank.put("sector", row, sector).unwrap();
            bank.put("pindex", row, pindex).unwrap();
        }
    }

    #[test]
    fn test_get_sector() {
        assert_eq!(get_sector(&[3, 5], &[1, 0], 0), 5);
        assert_eq!(get_sector(&[3, 5], &[1, 0], 2), -1);
        assert_eq!(get_sector(&[3, 4], &[1, 1], 1), 3);
    }

    #[test]
    fn test_priority_order() {
        let track = SectorList { sectors: vec![2], pindices: vec![0] };
        let scint = SectorList { sectors: vec![4, 6], pindices: vec![0, 1] };
        let cal = SectorList { sectors: vec![1], pindices: vec![2] };
        let lists = [track, scint, cal];
        assert_eq!(SectorFinder::find_sector(&lists, 0), 2);
        assert_eq!(SectorFinder::find_sector(&lists, 1), 6);
        assert_eq!(SectorFinder::find_sector(&lists, 2), 1);
        assert_eq!(SectorFinder::find_sector(&lists, 3), 0);
    }

    #[test]
    fn test_only_forward_detectors_count() {
        let mut banks = BankList::from_registry(&["REC::Scintillator"]).unwrap();
        // detector 3 is the central neutron detector
        fill(&mut banks, "REC::Scintillator", &[(3, 5, 0), (12, 2, 0), (6, 1, 1)]);
        let list = SectorList::from_bank(banks.get(0).unwrap()).unwrap();
        assert_eq!(list.sectors, vec![2, 1]);
        assert_eq!(list.pindices, vec![0, 1]);
    }

    #[test]
    fn test_creates_sector_bank() {
        let mut banks = BankList::from_registry(&BANKS).unwrap();
        let mut stage = Stage::new(SectorFinder::new());
        stage.start(&mut banks).unwrap();
        let index = stage.created_bank_index(&banks).unwrap();
        assert_eq!(index, 4);

        let particles = banks.get_mut(0).unwrap();
        particles.set_rows(3);
        particles.put("charge", 0, -1i8).unwrap();
        particles.put("charge", 1, 1i8).unwrap();
        particles.put("charge", 2, 0i8).unwrap();
        particles.apply_selection(|row| row != 1);
        fill(&mut banks, "REC::Track", &[(6, 3, 0), (6, 4, 1)]);
        fill(&mut banks, "REC::Calorimeter", &[(7, 5, 2), (7, 6, 0)]);

        stage.run(&mut banks).unwrap();
        let result = banks.get(index).unwrap();
        assert_eq!(result.rows(), 3);
        assert_eq!(result.column::<i32>("sector").unwrap(), &[3, 4, 5]);
        assert_eq!(result.column::<i16>("pindex").unwrap(), &[0, 1, 2]);
        assert_eq!(result.row_list(), vec![0, 2]);
    }

    #[test]
    fn test_user_bank_for_neutrals() {
        let mut banks = BankList::from_registry(&BANKS).unwrap();
        let mut stage = Stage::new(SectorFinder::new());
        stage.set_option("bank_uncharged", "REC::Calorimeter");
        stage.start(&mut banks).unwrap();

        let particles = banks.get_mut(0).unwrap();
        particles.set_rows(2);
        particles.put("charge", 1, 0i8).unwrap();
        particles.put("charge", 0, 1i8).unwrap();
        fill(&mut banks, "REC::Track", &[(6, 1, 0), (6, 2, 1)]);
        fill(&mut banks, "REC::Calorimeter", &[(7, 6, 1)]);

        stage.run(&mut banks).unwrap();
        let result = banks.bank(RESULT_BANK).unwrap();
        // the neutral particle ignores the track bank
        assert_eq!(result.column::<i32>("sector").unwrap(), &[1, 6]);
    }

    #[test]
    fn test_missing_detector_bank() {
        let mut banks = BankList::from_registry(&["REC::Particle", "REC::Track"]).unwrap();
        let mut stage = Stage::new(SectorFinder::new());
        let err = stage.start(&mut banks).unwrap_err();
        assert!(matches!(
            err.root(),
            Error::BankNotFound { bank, .. } if bank == "REC::Scintillator"
        ));
    }
}
