//! User-extensible abbreviations: named shorthands (`Ph`, `Oac`, the amino
//! acid residues) expanding to an elemental formula, possibly referencing
//! other abbreviations. The table itself only handles storage and symbol
//! bookkeeping; formula validation and cycle detection live on
//! [`Environment`](crate::Environment) because they need the parser.

use serde::{Deserialize, Serialize};

use crate::error::AbbreviationError;

/// The validation state of one abbreviation. Anything but [`Self::Valid`]
/// makes formulas using the abbreviation fail with an invalid-dependency
/// error until the definition is fixed.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum Validity {
    /// The definition resolves to elements.
    #[default]
    Valid,
    /// The definition directly or transitively references itself.
    Cycle,
    /// The definition references another abbreviation that is itself
    /// invalid.
    InvalidDependency,
    /// The definition does not parse for another reason.
    BadFormula,
}

/// A named shorthand expanding to a formula, with an explicit charge
/// contribution. Identified by a case-insensitively unique symbol and a
/// stable integer id that survives updates.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Abbreviation {
    id: u32,
    symbol: String,
    formula: String,
    charge: f64,
    is_amino_acid: bool,
    one_letter: Option<char>,
    comment: String,
    validity: Validity,
}

impl Abbreviation {
    /// The stable id, assigned at creation and kept across updates.
    pub const fn id(&self) -> u32 {
        self.id
    }

    /// The symbol, canonical casing.
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// The defining formula text.
    pub fn formula(&self) -> &str {
        &self.formula
    }

    /// The declared charge contribution per occurrence.
    pub const fn charge(&self) -> f64 {
        self.charge
    }

    /// Whether this is an amino acid residue.
    pub const fn is_amino_acid(&self) -> bool {
        self.is_amino_acid
    }

    /// The one letter code, if any (amino acids).
    pub const fn one_letter(&self) -> Option<char> {
        self.one_letter
    }

    /// The free-form comment.
    pub fn comment(&self) -> &str {
        &self.comment
    }

    /// The current validation state.
    pub const fn validity(&self) -> Validity {
        self.validity
    }

    /// Whether the abbreviation can be used in formulas right now.
    pub fn is_valid(&self) -> bool {
        self.validity == Validity::Valid
    }
}

/// The table of abbreviations: the built-ins loaded at startup plus
/// whatever the user added. Symbols are unique ignoring case.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct AbbreviationTable {
    entries: Vec<Abbreviation>,
    next_id: u32,
}

impl Default for AbbreviationTable {
    fn default() -> Self {
        Self::builtin()
    }
}

impl AbbreviationTable {
    /// The built in table: common groups and the twenty amino acid
    /// residues.
    pub fn builtin() -> Self {
        let mut table = Self {
            entries: Vec::new(),
            next_id: 1,
        };
        for &(symbol, formula, charge, comment) in BUILTIN_GROUPS {
            table.insert_raw(symbol, formula, charge, false, None, comment);
        }
        for &(symbol, one_letter, formula, comment) in BUILTIN_AMINO_ACIDS {
            table.insert_raw(symbol, formula, 0.0, true, Some(one_letter), comment);
        }
        table
    }

    fn insert_raw(
        &mut self,
        symbol: &str,
        formula: &str,
        charge: f64,
        is_amino_acid: bool,
        one_letter: Option<char>,
        comment: &str,
    ) {
        let id = self.next_id;
        self.next_id += 1;
        self.entries.push(Abbreviation {
            id,
            symbol: symbol.to_string(),
            formula: formula.to_string(),
            charge,
            is_amino_acid,
            one_letter,
            comment: comment.to_string(),
            validity: Validity::Valid,
        });
    }

    /// Look up an abbreviation by symbol, ignoring case.
    pub fn get(&self, symbol: &str) -> Option<&Abbreviation> {
        self.find_index(symbol).map(|index| &self.entries[index])
    }

    /// Look up an abbreviation by its stable id.
    pub fn by_id(&self, id: u32) -> Option<&Abbreviation> {
        self.entries.iter().find(|a| a.id == id)
    }

    /// All abbreviations, built-ins first, in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Abbreviation> {
        self.entries.iter()
    }

    /// The number of abbreviations.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn find_index(&self, symbol: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|a| a.symbol.eq_ignore_ascii_case(symbol))
    }

    pub(crate) fn index_by_id(&self, id: u32) -> Option<usize> {
        self.entries.iter().position(|a| a.id == id)
    }

    pub(crate) fn entry(&self, index: usize) -> &Abbreviation {
        &self.entries[index]
    }

    pub(crate) fn set_validity(&mut self, index: usize, validity: Validity) {
        self.entries[index].validity = validity;
    }

    /// Insert or update by symbol; the previous entry is returned for
    /// rollback. Symbol shape checks belong to the caller.
    pub(crate) fn put(
        &mut self,
        symbol: &str,
        formula: &str,
        charge: f64,
        is_amino_acid: bool,
        one_letter: Option<char>,
        comment: &str,
    ) -> (u32, Option<Abbreviation>) {
        if let Some(index) = self.find_index(symbol) {
            let previous = self.entries[index].clone();
            let entry = &mut self.entries[index];
            entry.symbol = symbol.to_string();
            entry.formula = formula.to_string();
            entry.charge = charge;
            entry.is_amino_acid = is_amino_acid;
            entry.one_letter = one_letter;
            entry.comment = comment.to_string();
            entry.validity = Validity::Valid;
            (entry.id, Some(previous))
        } else {
            self.insert_raw(symbol, formula, charge, is_amino_acid, one_letter, comment);
            (self.next_id - 1, None)
        }
    }

    /// Update the entry at `index` in place, keeping its id. The previous
    /// entry is returned for rollback.
    #[expect(clippy::too_many_arguments)]
    pub(crate) fn update_at(
        &mut self,
        index: usize,
        symbol: &str,
        formula: &str,
        charge: f64,
        is_amino_acid: bool,
        one_letter: Option<char>,
        comment: &str,
    ) -> Abbreviation {
        let previous = self.entries[index].clone();
        let entry = &mut self.entries[index];
        entry.symbol = symbol.to_string();
        entry.formula = formula.to_string();
        entry.charge = charge;
        entry.is_amino_acid = is_amino_acid;
        entry.one_letter = one_letter;
        entry.comment = comment.to_string();
        entry.validity = Validity::Valid;
        previous
    }

    pub(crate) fn restore_at(&mut self, index: usize, previous: Abbreviation) {
        self.entries[index] = previous;
    }

    pub(crate) fn restore(&mut self, previous: Option<Abbreviation>, symbol: &str) {
        if let Some(previous) = previous {
            if let Some(index) = self.find_index(symbol) {
                self.entries[index] = previous;
            }
        } else if let Some(index) = self.find_index(symbol) {
            let removed = self.entries.remove(index);
            // A rolled back insert frees its id again.
            if removed.id + 1 == self.next_id {
                self.next_id = removed.id;
            }
        }
    }

    /// Remove by symbol (case-insensitive).
    ///
    /// # Errors
    /// When no abbreviation has the symbol.
    pub fn remove(&mut self, symbol: &str) -> Result<Abbreviation, AbbreviationError> {
        self.find_index(symbol)
            .map(|index| self.entries.remove(index))
            .ok_or_else(|| AbbreviationError::UnknownSymbol(symbol.to_string()))
    }

    /// Remove by stable id.
    ///
    /// # Errors
    /// When no abbreviation has the id.
    pub fn remove_by_id(&mut self, id: u32) -> Result<Abbreviation, AbbreviationError> {
        self.index_by_id(id)
            .map(|index| self.entries.remove(index))
            .ok_or(AbbreviationError::UnknownId(id))
    }

    /// Serialize the whole table to JSON, for persisting user tables.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    /// Load a table previously produced by [`Self::to_json`].
    ///
    /// # Errors
    /// When the value does not describe an abbreviation table.
    pub fn from_json(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }
}

/// Built in common groups: (symbol, formula, charge, comment).
const BUILTIN_GROUPS: &[(&str, &str, f64, &str)] = &[
    ("Bpy", "C10H8N2", 0.0, "bipyridine"),
    ("Bu", "C4H9", 1.0, "butyl"),
    ("D", "^2.014H", 1.0, "deuterium"),
    ("En", "C2H8N2", 0.0, "ethylenediamine"),
    ("Et", "C2H5", 1.0, "ethyl"),
    ("Me", "CH3", 1.0, "methyl"),
    ("Ms", "CH3SOO", -1.0, "mesyl"),
    ("Oac", "C2H3O2", -1.0, "acetate"),
    ("Otf", "OSO2CF3", -1.0, "triflate"),
    ("Ox", "C2O4", -2.0, "oxalate"),
    ("Ph", "C6H5", 1.0, "phenyl"),
    ("Phen", "C12H8N2", 0.0, "phenanthroline"),
    ("Py", "C5H5N", 0.0, "pyridine"),
    ("Tpp", "(C4H2N(C6H5C))4H2", 0.0, "tetraphenylporphyrin"),
    ("Tfa", "C2F3O2", -1.0, "trifluoroacetate"),
    ("Ts", "CH3C6H4SOO", -1.0, "tosyl"),
    ("Urea", "H2NCONH2", 0.0, "urea"),
];

/// Built in amino acid residues: (symbol, one letter code, formula,
/// comment).
const BUILTIN_AMINO_ACIDS: &[(&str, char, &str, &str)] = &[
    ("Ala", 'A', "C3H5NO", "alanine"),
    ("Arg", 'R', "C6H12N4O", "arginine"),
    ("Asn", 'N', "C4H6N2O2", "asparagine"),
    ("Asp", 'D', "C4H5NO3", "aspartic acid"),
    ("Cys", 'C', "C3H5NOS", "cysteine"),
    ("Gln", 'Q', "C5H8N2O2", "glutamine"),
    ("Glu", 'E', "C5H7NO3", "glutamic acid"),
    ("Gly", 'G', "C2H3NO", "glycine"),
    ("His", 'H', "C6H7N3O", "histidine"),
    ("Ile", 'I', "C6H11NO", "isoleucine"),
    ("Leu", 'L', "C6H11NO", "leucine"),
    ("Lys", 'K', "C6H12N2O", "lysine"),
    ("Met", 'M', "C5H9NOS", "methionine"),
    ("Phe", 'F', "C9H9NO", "phenylalanine"),
    ("Pro", 'P', "C5H7NO", "proline"),
    ("Ser", 'S', "C3H5NO2", "serine"),
    ("Thr", 'T', "C4H7NO2", "threonine"),
    ("Trp", 'W', "C11H10N2O", "tryptophan"),
    ("Tyr", 'Y', "C9H9NO2", "tyrosine"),
    ("Val", 'V', "C5H9NO", "valine"),
];
