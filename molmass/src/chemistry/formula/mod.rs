mod composition;
mod empirical;
mod mass;
mod parse;

pub use composition::{Composition, Species};
pub use mass::PercentComposition;

pub(crate) use empirical::element_priority;
pub(crate) use parse::{Expansion, MAX_SYMBOL_LEN, parse_formula};
