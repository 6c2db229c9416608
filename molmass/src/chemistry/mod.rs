mod caution;
mod element;
/// Formula parsing and the composition tally it produces.
pub mod formula;
mod isotopes;
mod mass_mode;

pub use element::{Element, ElementTable, Isotope};
pub use formula::{Composition, PercentComposition, Species};
pub use isotopes::{
    ConvolutionSettings, IsotopeHeaders, IsotopicDistribution, Stick, gaussian_profile,
};
pub use mass_mode::MassMode;
