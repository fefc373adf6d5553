//! Per-sector momentum scale correction.

use std::collections::BTreeSet;

use bankseq::{
    Algorithm, BankList, BankRequirement, ConfigResolver, Error, OptionMap, OptionValue, Result,
    Role, show_bank,
};

use crate::sector_finder::RESULT_BANK as SECTOR_BANK;

pub const CLASS_NAME: &str = "clas12::MomentumScaleCorrection";

const SECTORS: usize = 6;

const DEFAULT_INBENDING: [f64; SECTORS] = [1.0012, 0.9994, 1.0021, 1.0007, 0.9988, 1.0016];
const DEFAULT_OUTBENDING: [f64; SECTORS] = [0.9993, 1.0009, 0.9991, 1.0013, 1.0004, 0.9989];
const DEFAULT_PIDS: [i32; 4] = [11, 211, -211, 2212];

/// Rescale `REC::Particle` momenta by a factor that depends on the
/// particle's sector and on the torus polarity.
///
/// The sector of each particle comes from `REC::Particle::Sector`, matched
/// by `pindex`, so a sector finder has to run first. Particles without a
/// sector (0) or with an uncorrected PDG code are left alone.
///
/// Options:
/// - `scale_inbending` (list of 6 floats): factors for `torus < 0`
/// - `scale_outbending` (list of 6 floats): factors for `torus >= 0`
/// - `pids` (set of int): corrected PDG codes
#[derive(Debug, Clone)]
pub struct MomentumScaleCorrection {
    inbending: [f64; SECTORS],
    outbending: [f64; SECTORS],
    pids: BTreeSet<i32>,
    b_particle: usize,
    b_sector: usize,
    b_config: usize,
}

impl Default for MomentumScaleCorrection {
    fn default() -> Self {
        MomentumScaleCorrection {
            inbending: DEFAULT_INBENDING,
            outbending: DEFAULT_OUTBENDING,
            pids: DEFAULT_PIDS.into(),
            b_particle: 0,
            b_sector: 0,
            b_config: 0,
        }
    }
}

/// Momentum components of the particle rows being corrected.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Momentum {
    pub px: f32,
    pub py: f32,
    pub pz: f32,
}

impl MomentumScaleCorrection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scale factor for one particle; 1 when it is not corrected.
    pub fn sector_scale(&self, sector: i32, pid: i32, torus: f32) -> f64 {
        if !self.pids.contains(&pid) {
            return 1.0;
        }
        let table = if torus < 0.0 {
            &self.inbending
        } else {
            &self.outbending
        };
        usize::try_from(sector)
            .ok()
            .and_then(|s| s.checked_sub(1))
            .and_then(|s| table.get(s))
            .copied()
            .unwrap_or(1.0)
    }

    /// Scalar form: correct one particle.
    pub fn transform(
        &self,
        px: f32,
        py: f32,
        pz: f32,
        sector: i32,
        pid: i32,
        torus: f32,
    ) -> (f32, f32, f32) {
        let scale = self.sector_scale(sector, pid, torus);
        let apply = |p: f32| (f64::from(p) * scale) as f32;
        (apply(px), apply(py), apply(pz))
    }

    /// Vector form: correct every row in `rows`, looking up each particle's
    /// sector among all `(sectors, pindices)` rows of the sector bank.
    ///
    /// `sectors` and `pindices` must be the same length, and every row has
    /// to index both `momenta` and `pids`.
    pub fn transform_all(
        &self,
        momenta: &[Momentum],
        pids: &[i32],
        rows: &[usize],
        sectors: &[i32],
        pindices: &[i32],
        torus: f32,
    ) -> Result<Vec<Momentum>> {
        if sectors.len() != pindices.len() {
            return Err(Error::RowCountMismatch {
                algorithm: CLASS_NAME.to_string(),
                bank: SECTOR_BANK.to_string(),
                rows: sectors.len(),
                expected: pindices.len(),
            });
        }
        rows.iter()
            .map(|&row| {
                let (Some(p), Some(&pid)) = (momenta.get(row), pids.get(row)) else {
                    return Err(Error::InvalidData {
                        bank: "REC::Particle".to_string(),
                        reason: format!(
                            "row {row} out of range ({} momenta, {} pids)",
                            momenta.len(),
                            pids.len()
                        ),
                    });
                };
                let sector = pindices
                    .iter()
                    .zip(sectors)
                    .find(|&(&p, _)| usize::try_from(p).is_ok_and(|p| p == row))
                    .map_or(0, |(_, &sector)| sector);
                let (px, py, pz) = self.transform(p.px, p.py, p.pz, sector, pid, torus);
                Ok(Momentum { px, py, pz })
            })
            .collect()
    }
}

fn table(config: &mut ConfigResolver, option: &str) -> Result<[f64; SECTORS]> {
    let values: Vec<f64> = config.get(option)?;
    <[f64; SECTORS]>::try_from(values.as_slice()).map_err(|_| Error::InvalidOption {
        algorithm: config.algorithm().to_string(),
        option: option.to_string(),
        reason: format!("expected {SECTORS} values, one per sector, got {}", values.len()),
    })
}

impl Algorithm for MomentumScaleCorrection {
    fn class_name(&self) -> &'static str {
        CLASS_NAME
    }

    fn role(&self) -> Role {
        Role::Transformer
    }

    fn default_options(&self) -> OptionMap {
        OptionMap::from([
            (
                "scale_inbending".to_string(),
                OptionValue::FloatList(DEFAULT_INBENDING.to_vec()),
            ),
            (
                "scale_outbending".to_string(),
                OptionValue::FloatList(DEFAULT_OUTBENDING.to_vec()),
            ),
            ("pids".to_string(), OptionValue::IntSet(DEFAULT_PIDS.into())),
        ])
    }

    fn configure(&mut self, config: &mut ConfigResolver) -> Result<()> {
        self.inbending = table(config, "scale_inbending")?;
        self.outbending = table(config, "scale_outbending")?;
        self.pids = config.get("pids")?;
        Ok(())
    }

    fn inputs(&self) -> Vec<BankRequirement> {
        vec![
            BankRequirement::new("REC::Particle").columns(&["pid", "px", "py", "pz"]),
            BankRequirement::new(SECTOR_BANK).columns(&["sector", "pindex"]),
            BankRequirement::new("RUN::config").columns(&["torus"]),
        ]
    }

    fn bind(&mut self, banks: &BankList) -> Result<()> {
        self.b_particle = banks.require("REC::Particle")?;
        self.b_sector = banks.require(SECTOR_BANK)?;
        self.b_config = banks.require("RUN::config")?;
        Ok(())
    }

    fn run(&self, banks: &mut BankList) -> Result<()> {
        let config = banks.get(self.b_config)?;
        if config.rows() == 0 {
            return Err(Error::InvalidData {
                bank: config.name().to_string(),
                reason: "no row to read the torus polarity from".to_string(),
            });
        }
        let torus: f32 = config.get("torus", 0)?;

        let sector_bank = banks.get(self.b_sector)?;
        let mut sectors = Vec::with_capacity(sector_bank.rows());
        let mut pindices = Vec::with_capacity(sector_bank.rows());
        for row in 0..sector_bank.rows() {
            sectors.push(sector_bank.get::<i32>("sector", row)?);
            pindices.push(i32::from(sector_bank.get::<i16>("pindex", row)?));
        }

        show_bank(banks, self.b_particle, "INPUT PARTICLES");
        let particles = banks.get_mut(self.b_particle)?;
        let rows = particles.row_list();
        let momenta = {
            let px = particles.column::<f32>("px")?;
            let py = particles.column::<f32>("py")?;
            let pz = particles.column::<f32>("pz")?;
            (0..particles.rows())
                .map(|r| Momentum {
                    px: px[r],
                    py: py[r],
                    pz: pz[r],
                })
                .collect::<Vec<_>>()
        };
        let pids = particles.column::<i32>("pid")?.to_vec();

        let corrected = self.transform_all(&momenta, &pids, &rows, &sectors, &pindices, torus)?;
        for (&row, p) in rows.iter().zip(corrected) {
            particles.put("px", row, p.px)?;
            particles.put("py", row, p.py)?;
            particles.put("pz", row, p.pz)?;
        }
        show_bank(banks, self.b_particle, "OUTPUT PARTICLES");
        Ok(())
    }
}
