//! Structured error values for every expected failure of the engine.
//!
//! Malformed user input is never a panic: parsing returns a [`ParseError`]
//! pinpointing the first offending character, abbreviation mutations return
//! an [`AbbreviationError`], and the isotope engine returns a
//! [`ComputeError`] that distinguishes user abort from real failures.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The kind of a [`ParseError`]. Kinds form the stable taxonomy; the numeric
/// codes of any message catalog built on top are not part of this API.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[non_exhaustive]
pub enum ParseErrorKind {
    /// A symbol that is neither an element nor a registered abbreviation.
    UnknownSymbol,
    /// An opening parenthesis without a matching `)`.
    MissingClosingParenthesis,
    /// A closing parenthesis without a matching `(`.
    UnmatchedParenthesis,
    /// An opening square bracket without a matching `]`.
    MissingClosingBracket,
    /// A closing square bracket without a matching `[`.
    UnmatchedBracket,
    /// A square bracket group inside another square bracket group.
    NestedBrackets,
    /// A number somewhere no number can be attached to.
    MisplacedNumber,
    /// A second decimal point within one numeric token.
    DuplicateDecimalPoint,
    /// A count of exactly zero directly after an element or a dash.
    ZeroCount,
    /// A count after `]` while the bracket had no leading multiplier.
    NumberAfterRightBracket,
    /// A square bracket group without the required leading multiplier.
    NumberRequiredInBracket,
    /// A caret without the isotope number that must follow it.
    NumberRequiredAfterCaret,
    /// An isotope tag attached to an abbreviation or other non-element.
    IsotopeOnNonElement,
    /// An isotope tag that is zero or negative.
    NegativeIsotopeMass,
    /// A `>` right-hand side not fully present on the left.
    InvalidSubtraction,
    /// An abbreviation whose expansion revisits a symbol being expanded.
    CircularReference,
    /// An abbreviation referencing another abbreviation that is invalid.
    InvalidDependency,
}

/// The first failure found while parsing a formula. Parsing stops at the
/// first error; a malformed component is never partially applied.
#[derive(Clone, Debug, Deserialize, Error, PartialEq, Serialize)]
#[error("{description} (position {position}, '{character}')")]
pub struct ParseError {
    /// The taxonomy kind.
    pub kind: ParseErrorKind,
    /// 0-based character position in the *original* input, before any
    /// whitespace or stray characters were stripped.
    pub position: usize,
    /// The offending character as found in the original input.
    pub character: char,
    /// Human readable description of what went wrong.
    pub description: String,
}

impl ParseError {
    pub(crate) fn new(
        kind: ParseErrorKind,
        position: usize,
        character: char,
        description: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            position,
            character,
            description: description.into(),
        }
    }
}

/// Failures of the abbreviation CRUD operations.
#[derive(Clone, Debug, Deserialize, Error, PartialEq, Serialize)]
#[non_exhaustive]
pub enum AbbreviationError {
    /// The symbol is empty, too long, or not purely alphabetic.
    #[error(
        "invalid abbreviation symbol '{0}': use 1 to 6 letters, starting with an uppercase letter"
    )]
    InvalidSymbol(String),
    /// The symbol would shadow an element symbol.
    #[error("abbreviation symbol '{0}' matches an element symbol")]
    ShadowsElement(String),
    /// The symbol is already used by a different abbreviation.
    #[error("abbreviation symbol '{0}' is already in use")]
    DuplicateSymbol(String),
    /// The defining formula text is empty.
    #[error("the abbreviation formula may not be empty")]
    EmptyFormula,
    /// The one-letter code is not a letter.
    #[error("the one letter code '{0}' is not a letter")]
    InvalidOneLetter(char),
    /// No abbreviation with the given symbol exists.
    #[error("no abbreviation with symbol '{0}'")]
    UnknownSymbol(String),
    /// No abbreviation with the given id exists.
    #[error("no abbreviation with id {0}")]
    UnknownId(u32),
    /// Validation of the defining formula failed; the mutation was rolled
    /// back. Circular references and invalid dependencies surface here with
    /// their own [`ParseErrorKind`].
    #[error("invalid abbreviation formula: {0}")]
    Formula(#[from] ParseError),
}

/// Failures of the element table setters.
#[derive(Clone, Debug, Deserialize, Error, PartialEq, Serialize)]
#[non_exhaustive]
pub enum ElementError {
    /// The symbol does not name an element.
    #[error("no element with symbol '{0}'")]
    UnknownElement(String),
    /// Masses must stay strictly positive in Average and Integer modes.
    #[error("an element mass must be greater than 0 (got {0})")]
    NonPositiveMass(f64),
    /// Isotope abundances for one element must sum to 1.
    #[error("isotope abundances must sum to 1.0 (got {0})")]
    AbundanceSum(f64),
}

/// Failures of the isotope distribution engine and its display helpers.
#[derive(Clone, Debug, Deserialize, Error, PartialEq, Serialize)]
#[non_exhaustive]
pub enum ComputeError {
    /// The input formula did not parse.
    #[error(transparent)]
    Parse(#[from] ParseError),
    /// The computation was cancelled through its [`crate::CancelToken`].
    /// No partial results are returned.
    #[error("the computation was aborted")]
    Aborted,
    /// A display parameter (resolution, quality factor, ...) is out of range.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_error_display() {
        let error = ParseError::new(
            ParseErrorKind::UnknownSymbol,
            4,
            'Q',
            "Unknown element or abbreviation 'Qx'",
        );
        assert_eq!(
            error.to_string(),
            "Unknown element or abbreviation 'Qx' (position 4, 'Q')"
        );
    }
}
