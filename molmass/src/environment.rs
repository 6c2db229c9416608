use log::debug;
use serde::{Deserialize, Serialize};

use crate::abbreviation::{AbbreviationTable, Validity};
use crate::chemistry::formula::{Composition, Expansion, parse_formula};
use crate::chemistry::{ConvolutionSettings, ElementTable, Isotope, MassMode};
use crate::error::{AbbreviationError, ElementError, ParseError, ParseErrorKind};
use crate::helper_functions::capitalized;

/// The monoisotopic mass of a proton, the default charge carrier.
pub const PROTON_MASS: f64 = 1.00727646688;

/// How a mass uncertainty is rendered. Text formatting only; the numeric
/// uncertainty never depends on this.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum StdDevMode {
    /// Compact parenthesized last-digit notation, `18.0153(4)`.
    #[default]
    Short,
    /// Exponent notation, `18.0153 (±4.1e-4)`.
    Scientific,
    /// Plain decimal notation, `18.0153 (±0.0004)`.
    Decimal,
}

/// Caller-tunable parse and formatting options.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub struct Options {
    /// Treat `[` and `]` exactly like parentheses instead of as
    /// multiplier-first groups.
    pub brackets_as_parentheses: bool,
    /// The character accepted as decimal separator, normalized to `.`
    /// before tokenizing.
    pub decimal_separator: char,
    /// How uncertainties are rendered by [`Environment::format_mass`].
    pub std_dev_mode: StdDevMode,
    /// Significant digits used by the text formatting helpers.
    pub significant_digits: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            brackets_as_parentheses: false,
            decimal_separator: '.',
            std_dev_mode: StdDevMode::default(),
            significant_digits: 5,
        }
    }
}

/// The explicit, caller-owned home of all engine state: the element table,
/// the abbreviation table, the mass mode, and the tunable settings.
///
/// There are no hidden singletons. Every computation is a pure function of
/// the input text and this value; switching mass mode or mutating tables is
/// a configuration change for everything computed afterwards, so share an
/// environment across threads only behind external synchronization (or give
/// each logical session its own clone).
#[derive(Clone, Debug)]
pub struct Environment {
    elements: ElementTable,
    abbreviations: AbbreviationTable,
    mode: MassMode,
    /// Parse and formatting options.
    pub options: Options,
    /// Binning and pruning limits for the isotope convolution engine.
    pub convolution: ConvolutionSettings,
    /// The mass added per charge when a charge carrier is applied.
    pub charge_carrier_mass: f64,
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment {
    /// A fresh environment: built in element and abbreviation tables,
    /// average mass mode, default options.
    pub fn new() -> Self {
        Self {
            elements: ElementTable::builtin(),
            abbreviations: AbbreviationTable::builtin(),
            mode: MassMode::default(),
            options: Options::default(),
            convolution: ConvolutionSettings::default(),
            charge_carrier_mass: PROTON_MASS,
        }
    }

    /// The current mass mode.
    pub const fn mode(&self) -> MassMode {
        self.mode
    }

    /// Switch the mass mode. Affects every subsequent computation.
    pub fn set_mode(&mut self, mode: MassMode) {
        self.mode = mode;
    }

    /// The element table.
    pub const fn elements(&self) -> &ElementTable {
        &self.elements
    }

    /// The abbreviation table.
    pub const fn abbreviations(&self) -> &AbbreviationTable {
        &self.abbreviations
    }

    /// Parse a formula into its composition tally using the current mode
    /// and options.
    ///
    /// # Errors
    /// The first parse failure, with its exact position in `text`.
    pub fn parse(&self, text: &str) -> Result<Composition, ParseError> {
        let mut expansion = Expansion::default();
        parse_formula(self, text, &mut expansion, false, true)
    }

    /// Override the mass of one element in the current mode (and its
    /// uncertainty, meaningful in Average mode).
    ///
    /// # Errors
    /// When the symbol is unknown or the mass is out of range for the mode.
    pub fn set_element_mass(
        &mut self,
        symbol: &str,
        mass: f64,
        uncertainty: f64,
    ) -> Result<(), ElementError> {
        self.elements.set_mass(symbol, self.mode, mass, uncertainty)
    }

    /// Override the default charge of one element.
    ///
    /// # Errors
    /// When the symbol is unknown.
    pub fn set_element_charge(&mut self, symbol: &str, charge: f64) -> Result<(), ElementError> {
        self.elements.set_charge(symbol, charge)
    }

    /// Replace the isotope distribution of one element.
    ///
    /// # Errors
    /// When the symbol is unknown or the abundances do not sum to 1.
    pub fn set_element_isotopes(
        &mut self,
        symbol: &str,
        isotopes: Vec<Isotope>,
    ) -> Result<(), ElementError> {
        self.elements.set_isotopes(symbol, isotopes)
    }

    /// Restore the built in element table, dropping all overrides.
    pub fn reset_elements(&mut self) {
        self.elements = ElementTable::builtin();
    }

    /// Restore the built in abbreviation table, dropping all user entries.
    pub fn reset_abbreviations(&mut self) {
        self.abbreviations = AbbreviationTable::builtin();
    }

    /// Create or update an abbreviation, matched case-insensitively by
    /// symbol, and return its stable id.
    ///
    /// With `validate` set the definition is applied provisionally, parsed
    /// with itself on the expansion stack (so self references and cycles are
    /// caught), and rolled back on any error. With `validate` unset the
    /// entry is stored as is: the escape hatch for bulk-loading mutually
    /// dependent definitions before a final [`Self::validate_abbreviations`].
    ///
    /// Either way every abbreviation's validity is re-derived afterwards;
    /// dependents of a changed definition are never silently trusted.
    ///
    /// # Errors
    /// On a malformed symbol, an element collision, an empty formula, or a
    /// failed validation (the parse error carries the exact cause, circular
    /// references included).
    #[expect(clippy::too_many_arguments)]
    pub fn set_abbreviation(
        &mut self,
        symbol: &str,
        formula: &str,
        charge: f64,
        is_amino_acid: bool,
        one_letter: Option<char>,
        comment: &str,
        validate: bool,
    ) -> Result<u32, AbbreviationError> {
        let canon = self.check_symbol(symbol, None)?;
        Self::check_definition(formula, one_letter)?;
        let (id, previous) = self.abbreviations.put(
            &canon,
            formula,
            charge,
            is_amino_acid,
            one_letter,
            comment,
        );
        if validate && let Err(error) = self.validate_definition(&canon, formula) {
            self.abbreviations.restore(previous, &canon);
            return Err(AbbreviationError::Formula(error));
        }
        self.revalidate();
        Ok(id)
    }

    /// Update an abbreviation by its stable id, optionally renaming it.
    ///
    /// # Errors
    /// As [`Self::set_abbreviation`], plus when the id is unknown or the new
    /// symbol collides with another abbreviation.
    #[expect(clippy::too_many_arguments)]
    pub fn set_abbreviation_by_id(
        &mut self,
        id: u32,
        symbol: &str,
        formula: &str,
        charge: f64,
        is_amino_acid: bool,
        one_letter: Option<char>,
        comment: &str,
        validate: bool,
    ) -> Result<(), AbbreviationError> {
        let index = self
            .abbreviations
            .index_by_id(id)
            .ok_or(AbbreviationError::UnknownId(id))?;
        let canon = self.check_symbol(symbol, Some(id))?;
        Self::check_definition(formula, one_letter)?;
        let previous = self.abbreviations.update_at(
            index,
            &canon,
            formula,
            charge,
            is_amino_acid,
            one_letter,
            comment,
        );
        if validate && let Err(error) = self.validate_definition(&canon, formula) {
            self.abbreviations.restore_at(index, previous);
            return Err(AbbreviationError::Formula(error));
        }
        self.revalidate();
        Ok(())
    }

    /// Remove an abbreviation by symbol. Dependents are re-validated and
    /// flip to invalid when their definition no longer resolves.
    ///
    /// # Errors
    /// When no abbreviation has the symbol.
    pub fn remove_abbreviation(&mut self, symbol: &str) -> Result<(), AbbreviationError> {
        self.abbreviations.remove(symbol)?;
        self.revalidate();
        Ok(())
    }

    /// Remove an abbreviation by stable id.
    ///
    /// # Errors
    /// When no abbreviation has the id.
    pub fn remove_abbreviation_by_id(&mut self, id: u32) -> Result<(), AbbreviationError> {
        self.abbreviations.remove_by_id(id)?;
        self.revalidate();
        Ok(())
    }

    /// Re-validate every abbreviation and return how many are invalid.
    ///
    /// Each definition is judged afresh (stored validity flags are ignored,
    /// only the visited-stack check decides), so a cycle flips exactly its
    /// members to the cycle state, whatever its length, while definitions
    /// that merely reference a failing abbreviation get the distinct
    /// invalid-dependency state.
    pub fn validate_abbreviations(&mut self) -> usize {
        let count = self.abbreviations.len();
        let mut results = Vec::with_capacity(count);
        for index in 0..count {
            let abbreviation = self.abbreviations.entry(index);
            let mut expansion = Expansion::seeded(abbreviation.symbol());
            let validity =
                match parse_formula(self, abbreviation.formula(), &mut expansion, true, false) {
                    Ok(_) => Validity::Valid,
                    Err(error) => {
                        debug!("abbreviation {} is invalid: {error}", abbreviation.symbol());
                        match error.kind {
                            ParseErrorKind::CircularReference => Validity::Cycle,
                            ParseErrorKind::InvalidDependency => Validity::InvalidDependency,
                            _ => Validity::BadFormula,
                        }
                    }
                };
            results.push(validity);
        }
        for (index, validity) in results.into_iter().enumerate() {
            self.abbreviations.set_validity(index, validity);
        }
        self.abbreviations.iter().filter(|a| !a.is_valid()).count()
    }

    fn revalidate(&mut self) {
        let invalid = self.validate_abbreviations();
        if invalid > 0 {
            debug!("{invalid} abbreviations are invalid after mutation");
        }
    }

    /// Shape-check a symbol and return its canonical casing. `keep_id`
    /// allows the symbol to stay on the entry being renamed.
    fn check_symbol(
        &self,
        symbol: &str,
        keep_id: Option<u32>,
    ) -> Result<String, AbbreviationError> {
        if symbol.is_empty()
            || symbol.len() > crate::chemistry::formula::MAX_SYMBOL_LEN
            || !symbol.chars().all(|c| c.is_ascii_alphabetic())
        {
            return Err(AbbreviationError::InvalidSymbol(symbol.to_string()));
        }
        let canon = capitalized(symbol);
        if self.elements.get(&canon).is_some() {
            return Err(AbbreviationError::ShadowsElement(canon));
        }
        if let Some(existing) = self.abbreviations.get(&canon)
            && keep_id.is_some_and(|id| existing.id() != id)
        {
            return Err(AbbreviationError::DuplicateSymbol(canon));
        }
        Ok(canon)
    }

    fn check_definition(formula: &str, one_letter: Option<char>) -> Result<(), AbbreviationError> {
        if formula.trim().is_empty() {
            return Err(AbbreviationError::EmptyFormula);
        }
        if let Some(code) = one_letter
            && !code.is_ascii_alphabetic()
        {
            return Err(AbbreviationError::InvalidOneLetter(code));
        }
        Ok(())
    }

    fn validate_definition(&self, canon: &str, formula: &str) -> Result<(), ParseError> {
        let mut expansion = Expansion::seeded(canon);
        parse_formula(self, formula, &mut expansion, true, false).map(|_| ())
    }
}
