#![doc = include_str!("../README.md")]

mod helper_functions;

/// User-extensible abbreviations and their validation states.
pub mod abbreviation;
mod cancel;
/// Contains all things related to the underlying chemistry.
pub mod chemistry;
mod environment;
/// Structured error values for expected failures.
pub mod error;

pub use cancel::CancelToken;
pub use environment::{Environment, Options, PROTON_MASS, StdDevMode};

/// A subset of the types that are envisioned to be used the most, importing
/// this is a good starting point for working with the crate.
pub mod prelude {
    pub use crate::abbreviation::{Abbreviation, AbbreviationTable, Validity};
    pub use crate::cancel::CancelToken;
    pub use crate::chemistry::{
        Composition, ConvolutionSettings, Element, ElementTable, Isotope, IsotopeHeaders,
        IsotopicDistribution, MassMode, PercentComposition, Species, Stick, gaussian_profile,
    };
    pub use crate::environment::{Environment, Options, StdDevMode};
    pub use crate::error::{
        AbbreviationError, ComputeError, ElementError, ParseError, ParseErrorKind,
    };
}
