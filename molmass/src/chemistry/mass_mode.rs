use std::fmt;

use serde::{Deserialize, Serialize};

/// The mass table used for every computation until changed: average
/// (standard atomic weight), isotopic (monoisotopic), or integer (nominal)
/// masses. Selected on the [`Environment`](crate::Environment) and applied
/// process wide for that environment.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum MassMode {
    /// Average mass over the natural isotopic distribution. The only mode
    /// with a meaningful mass uncertainty.
    #[default]
    Average,
    /// Monoisotopic mass, the mass of the most abundant isotope.
    Isotopic,
    /// Nominal integer mass.
    Integer,
}

impl fmt::Display for MassMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::Average => "average",
                Self::Isotopic => "isotopic",
                Self::Integer => "integer",
            }
        )
    }
}
