//! Lorentz boosts of particle momenta.

use bankseq::{
    Algorithm, BankList, BankRequirement, ConfigResolver, Error, OptionMap, OptionValue, Result,
    Role, show_bank,
};

pub const CLASS_NAME: &str = "clas12::LorentzTransformer";

pub const BEAM_REST_FRAME: &str = "beam_rest_frame";

/// Electron mass, GeV.
const ELECTRON_MASS: f64 = 0.000_510_998_95;

/// Rest mass in GeV of a particle with PDG code `pid`, if known.
pub fn mass(pid: i32) -> Option<f64> {
    match pid.abs() {
        11 => Some(ELECTRON_MASS),
        22 => Some(0.0),
        211 => Some(0.139_570_39),
        321 => Some(0.493_677),
        2112 => Some(0.939_565_420_52),
        2212 => Some(0.938_272_088_16),
        _ => None,
    }
}

/// Four-momentum after a boost.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Momentum4 {
    pub px: f64,
    pub py: f64,
    pub pz: f64,
    pub e: f64,
}

/// Boost `(px, py, pz, e)` by velocity `beta`.
///
/// A boost with `|beta| >= 1` is refused: the input comes back unchanged
/// and an error is logged.
pub fn boost(px: f64, py: f64, pz: f64, e: f64, beta: [f64; 3]) -> Momentum4 {
    let [bx, by, bz] = beta;
    let b2 = bx * bx + by * by + bz * bz;
    if b2 >= 1.0 {
        log::error!(
            "attempt to boost with |beta| = {} >= 1; will NOT boost this momentum",
            b2.sqrt()
        );
        return Momentum4 { px, py, pz, e };
    }
    if b2 == 0.0 {
        return Momentum4 { px, py, pz, e };
    }
    let gamma = 1.0 / (1.0 - b2).sqrt();
    let bp = bx * px + by * py + bz * pz;
    let scale = (gamma - 1.0) * bp / b2 + gamma * e;
    Momentum4 {
        px: px + scale * bx,
        py: py + scale * by,
        pz: pz + scale * bz,
        e: gamma * (e + bp),
    }
}

/// Boost `REC::Particle` momenta into another frame.
///
/// Options:
/// - `frame` (string): only `beam_rest_frame` is supported
/// - `beam_energy` (float): beam electron energy in GeV, default 10.6
#[derive(Debug, Clone)]
pub struct LorentzTransformer {
    beam_energy: f64,
    beta: [f64; 3],
    b_particle: usize,
}

impl Default for LorentzTransformer {
    fn default() -> Self {
        let mut transformer = LorentzTransformer {
            beam_energy: 10.6,
            beta: [0.0; 3],
            b_particle: 0,
        };
        transformer.beta = transformer.rest_frame_beta();
        transformer
    }
}

impl LorentzTransformer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Velocity that takes lab momenta into the beam electron rest frame.
    fn rest_frame_beta(&self) -> [f64; 3] {
        let e = self.beam_energy;
        [0.0, 0.0, -e / e.hypot(ELECTRON_MASS)]
    }

    pub fn beta(&self) -> [f64; 3] {
        self.beta
    }

    /// Scalar form: boost one particle, taking its energy from its mass.
    /// Unknown PDG codes are treated as massless.
    pub fn transform(&self, px: f32, py: f32, pz: f32, pid: i32) -> (f32, f32, f32) {
        let (px, py, pz) = (f64::from(px), f64::from(py), f64::from(pz));
        let m = mass(pid).unwrap_or(0.0);
        let e = (px * px + py * py + pz * pz + m * m).sqrt();
        let out = boost(px, py, pz, e, self.beta);
        (out.px as f32, out.py as f32, out.pz as f32)
    }

    /// Vector form over the `rows` of full particle columns.
    pub fn boost_all(
        &self,
        px: &[f32],
        py: &[f32],
        pz: &[f32],
        pids: &[i32],
        rows: &[usize],
    ) -> Vec<(f32, f32, f32)> {
        rows.iter()
            .map(|&r| self.transform(px[r], py[r], pz[r], pids[r]))
            .collect()
    }
}

impl Algorithm for LorentzTransformer {
    fn class_name(&self) -> &'static str {
        CLASS_NAME
    }

    fn role(&self) -> Role {
        Role::Transformer
    }

    fn default_options(&self) -> OptionMap {
        OptionMap::from([
            ("frame".to_string(), OptionValue::from(BEAM_REST_FRAME)),
            ("beam_energy".to_string(), OptionValue::Float(10.6)),
        ])
    }

    fn configure(&mut self, config: &mut ConfigResolver) -> Result<()> {
        let frame: String = config.get("frame")?;
        if frame != BEAM_REST_FRAME {
            return Err(Error::InvalidOption {
                algorithm: config.algorithm().to_string(),
                option: "frame".to_string(),
                reason: format!("unknown frame '{frame}'"),
            });
        }
        self.beam_energy = config.get("beam_energy")?;
        if !(self.beam_energy.is_finite() && self.beam_energy > 0.0) {
            return Err(Error::InvalidOption {
                algorithm: config.algorithm().to_string(),
                option: "beam_energy".to_string(),
                reason: format!("must be positive and finite, got {}", self.beam_energy),
            });
        }
        self.beta = self.rest_frame_beta();
        Ok(())
    }

    fn inputs(&self) -> Vec<BankRequirement> {
        vec![BankRequirement::new("REC::Particle").columns(&["pid", "px", "py", "pz"])]
    }

    fn bind(&mut self, banks: &BankList) -> Result<()> {
        self.b_particle = banks.require("REC::Particle")?;
        Ok(())
    }

    fn run(&self, banks: &mut BankList) -> Result<()> {
        show_bank(banks, self.b_particle, "INPUT PARTICLES");
        let particles = banks.get_mut(self.b_particle)?;
        let rows = particles.row_list();
        let boosted = self.boost_all(
            particles.column("px")?,
            particles.column("py")?,
            particles.column("pz")?,
            particles.column("pid")?,
            &rows,
        );
        for (&row, (px, py, pz)) in rows.iter().zip(boosted) {
            particles.put("px", row, px)?;
            particles.put("py", row, py)?;
            particles.put("pz", row, pz)?;
        }
        show_bank(banks, self.b_particle, "OUTPUT PARTICLES");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bankseq::Stage;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9 * a.abs().max(1.0)
    }

    #[test]
    fn test_boost_preserves_invariant_mass() {
        let m: f64 = 0.938_272_088_16;
        let (px, py, pz) = (0.3, -0.4, 2.0);
        let e = (px * px + py * py + pz * pz + m * m).sqrt();
        let out = boost(px, py, pz, e, [0.1, 0.2, -0.6]);
        let m2 = out.e * out.e - out.px * out.px - out.py * out.py - out.pz * out.pz;
        assert!(close(m2.sqrt(), m));
    }

    #[test]
    fn test_boost_to_rest() {
        // a particle moving with velocity beta is at rest after boosting by -beta
        let m: f64 = 1.0;
        let pz = 0.75;
        let e = (pz * pz + m * m).sqrt();
        let out = boost(0.0, 0.0, pz, e, [0.0, 0.0, -pz / e]);
        assert!(out.pz.abs() < 1e-12);
        assert!(close(out.e, m));
    }

    #[test]
    fn test_superluminal_boost_refused() {
        let out = boost(1.0, 2.0, 3.0, 4.0, [0.0, 0.0, 1.0]);
        assert_eq!(out, Momentum4 { px: 1.0, py: 2.0, pz: 3.0, e: 4.0 });
    }

    #[test]
    fn test_beam_electron_is_at_rest_in_its_frame() {
        let mut stage = Stage::new(LorentzTransformer::new());
        stage.set_option("beam_energy", 6.0);
        stage.start_rows_only().unwrap();
        let algo = stage.algorithm();
        // beam_energy is the beam momentum
        let e = 6.0f64.hypot(ELECTRON_MASS);
        let out = boost(0.0, 0.0, 6.0, e, algo.beta());
        assert!(out.pz.abs() < 1e-6);
        assert!((out.e - ELECTRON_MASS).abs() < 1e-6);
    }

    #[test]
    fn test_beam_energy_must_be_finite() {
        for bad in [0.0, -1.0, f64::INFINITY, f64::NAN] {
            let mut stage = Stage::new(LorentzTransformer::new());
            stage.set_option("beam_energy", bad);
            let err = stage.start_rows_only().unwrap_err();
            assert!(matches!(
                err.root(),
                Error::InvalidOption { option, .. } if option == "beam_energy"
            ));
        }
    }

    #[test]
    fn test_unknown_frame() {
        let mut stage = Stage::new(LorentzTransformer::new());
        stage.set_option("frame", "breit");
        let err = stage.start_rows_only().unwrap_err();
        assert!(err.to_string().contains("breit"));
    }

    #[test]
    fn test_vector_form_matches_scalar_form() {
        let stage = {
            let mut stage = Stage::new(LorentzTransformer::new());
            stage.start_rows_only().unwrap();
            stage
        };
        let algo = stage.algorithm();
        let px = [0.1, -0.2, 0.3];
        let py = [0.0, 0.5, -0.5];
        let pz = [4.0, 1.0, 0.2];
        let pids = [11, 2212, 9999];
        let rows = [0, 2];
        let vector = algo.boost_all(&px, &py, &pz, &pids, &rows);
        for (&r, out) in rows.iter().zip(vector) {
            assert_eq!(out, algo.transform(px[r], py[r], pz[r], pids[r]));
        }
    }

    #[test]
    fn test_run_skips_inactive_rows() {
        let mut banks = BankList::from_registry(&["REC::Particle"]).unwrap();
        let particles = banks.get_mut(0).unwrap();
        particles.set_rows(2);
        for row in 0..2 {
            particles.put("pid", row, 11).unwrap();
            particles.put("pz", row, 2.0f32).unwrap();
        }
        particles.apply_selection(|row| row == 1);

        let mut stage = Stage::new(LorentzTransformer::new());
        stage.start(&mut banks).unwrap();
        stage.run(&mut banks).unwrap();
        let pz = banks.get(0).unwrap().column::<f32>("pz").unwrap();
        assert_eq!(pz[0], 2.0);
        assert!(pz[1] < 0.0);
    }
}
