//! CLAS12-style algorithms for `bankseq`, plus JSON event I/O for the
//! `seq-run` tool.

pub mod event_builder_filter;
pub mod event_io;
pub mod lorentz_transformer;
pub mod momentum_scale_correction;
pub mod sector_finder;
pub mod z_vertex_filter;

use bankseq::{Algorithm, AlgorithmFactory, Result};

pub use event_builder_filter::EventBuilderFilter;
pub use lorentz_transformer::LorentzTransformer;
pub use momentum_scale_correction::MomentumScaleCorrection;
pub use sector_finder::SectorFinder;
pub use z_vertex_filter::ZVertexFilter;

/// Banks a reconstruction file provides, in reader order.
pub const DEFAULT_BANKS: [&str; 5] = [
    "REC::Particle",
    "RUN::config",
    "REC::Track",
    "REC::Calorimeter",
    "REC::Scintillator",
];

fn construct<A: Algorithm + Default + 'static>() -> Box<dyn Algorithm> {
    Box::new(A::default())
}

/// Register every algorithm of this crate.
pub fn register_all(factory: &mut AlgorithmFactory) -> Result<()> {
    factory.register(
        event_builder_filter::CLASS_NAME,
        construct::<EventBuilderFilter>,
        &[],
    )?;
    factory.register(z_vertex_filter::CLASS_NAME, construct::<ZVertexFilter>, &[])?;
    factory.register(
        sector_finder::CLASS_NAME,
        construct::<SectorFinder>,
        &[sector_finder::RESULT_BANK],
    )?;
    factory.register(
        momentum_scale_correction::CLASS_NAME,
        construct::<MomentumScaleCorrection>,
        &[],
    )?;
    factory.register(
        lorentz_transformer::CLASS_NAME,
        construct::<LorentzTransformer>,
        &[],
    )?;
    Ok(())
}

/// A factory holding every algorithm of this crate.
pub fn factory() -> Result<AlgorithmFactory> {
    let mut factory = AlgorithmFactory::new();
    register_all(&mut factory)?;
    Ok(factory)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bankseq::Role;

    #[test]
    fn test_factory_knows_every_algorithm() {
        let factory = factory().unwrap();
        assert_eq!(factory.classes().count(), 5);
        for class in factory.classes() {
            assert_eq!(factory.create(class).unwrap().class_name(), class);
        }
        assert_eq!(
            factory.create(sector_finder::CLASS_NAME).unwrap().role(),
            Role::Creator
        );
    }

    #[test]
    fn test_creator_hint() {
        let factory = factory().unwrap();
        assert_eq!(
            factory.creators_of(sector_finder::RESULT_BANK),
            vec![sector_finder::CLASS_NAME]
        );
    }

    #[test]
    fn test_register_twice() {
        let mut factory = factory().unwrap();
        assert!(register_all(&mut factory).is_err());
    }
}
