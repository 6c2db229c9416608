//! Canonical (empirical) formula text and textual abbreviation expansion.

use itertools::Itertools;

use crate::chemistry::formula::parse::{SymbolTarget, match_symbol, strip};
use crate::chemistry::formula::Composition;
use crate::environment::Environment;
use crate::error::{ParseError, ParseErrorKind};
use crate::helper_functions::format_count;

/// Sort key for the fixed element ordering convention of empirical
/// formulas: carbon first, hydrogen second, everything else alphabetical.
pub(crate) fn element_priority(symbol: &str) -> (u8, String) {
    let rank = match symbol {
        "C" => 0,
        "H" => 1,
        _ => 2,
    };
    (rank, symbol.to_string())
}

impl Environment {
    /// Flatten a composition into its canonical, non-nested formula text:
    /// elements ordered C, H, then alphabetical, isotope tags kept on their
    /// owning element (the untagged entry first, tags ascending), counts of
    /// one omitted and fractional counts trimmed.
    ///
    /// A tagged element and its untagged counterpart are distinct tally
    /// keys throughout the engine, so a subtraction like `D10C6>H10` does
    /// not cancel the tagged hydrogen against the plain one; both species
    /// remain visible here.
    pub fn to_empirical(&self, composition: &Composition) -> String {
        let mut groups: Vec<(String, Vec<(Option<f64>, f64)>)> = composition
            .entries()
            .iter()
            .chunk_by(|(species, _)| species.element_index())
            .into_iter()
            .map(|(element, entries)| {
                (
                    self.elements().by_index(element).symbol().to_string(),
                    entries
                        .map(|(species, count)| (species.tag(), *count))
                        .collect(),
                )
            })
            .collect();
        groups.sort_by_key(|(symbol, _)| element_priority(symbol));

        let mut text = String::new();
        for (symbol, species) in groups {
            for (tag, count) in species {
                if let Some(tag) = tag {
                    text.push('^');
                    text.push_str(&format_count(tag));
                }
                text.push_str(&symbol);
                if (count - 1.0).abs() > 1e-12 {
                    text.push_str(&format_count(count));
                }
            }
        }
        text
    }

    /// Replace every abbreviation occurrence in `text` with its defining
    /// formula, recursively, wrapping a substituted group in parentheses
    /// whenever a trailing count would otherwise fail to distribute over
    /// it. Elements, counts, and structure are kept as typed (after the
    /// usual stray character stripping).
    ///
    /// # Errors
    /// On unknown symbols or circular abbreviation references.
    pub fn expand_abbreviations(&self, text: &str) -> Result<String, ParseError> {
        let mut stack = Vec::new();
        self.expand_inner(text, &mut stack)
    }

    fn expand_inner(&self, text: &str, stack: &mut Vec<String>) -> Result<String, ParseError> {
        let (chars, map) = strip(self, text);
        let mut output = String::new();
        let mut pos = 0;
        while pos < chars.len() {
            let c = chars[pos];
            if !c.is_ascii_alphabetic() {
                output.push(c);
                pos += 1;
                continue;
            }
            let token: String = std::iter::once(c)
                .chain(
                    chars[pos + 1..]
                        .iter()
                        .copied()
                        .take_while(char::is_ascii_lowercase),
                )
                .collect();
            let Some(matched) = match_symbol(self, &token) else {
                return Err(ParseError::new(
                    ParseErrorKind::UnknownSymbol,
                    map[pos],
                    c,
                    format!("Unknown element or abbreviation '{token}'"),
                ));
            };
            match matched.target {
                SymbolTarget::Element(_) => {
                    output.extend(&chars[pos..pos + matched.len]);
                    pos += matched.len;
                }
                SymbolTarget::Abbreviation(index) => {
                    let abbreviation = self.abbreviations().entry(index);
                    let symbol = abbreviation.symbol().to_string();
                    let lowered = symbol.to_ascii_lowercase();
                    if stack.contains(&lowered) {
                        return Err(ParseError::new(
                            ParseErrorKind::CircularReference,
                            map[pos],
                            c,
                            format!(
                                "Circular reference while expanding the abbreviation '{symbol}'"
                            ),
                        ));
                    }
                    stack.push(lowered);
                    let expanded = self.expand_inner(abbreviation.formula(), stack);
                    stack.pop();
                    let expanded = expanded?;
                    pos += matched.len;
                    let followed_by_count =
                        matches!(chars.get(pos), Some(c) if c.is_ascii_digit() || *c == '.');
                    if followed_by_count {
                        output.push('(');
                        output.push_str(&expanded);
                        output.push(')');
                    } else {
                        output.push_str(&expanded);
                    }
                }
            }
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use crate::environment::Environment;

    #[test]
    fn hydrate_flattens_with_hydrogen_first() {
        let env = Environment::new();
        let composition = env.parse("FeCl3-6H2O").unwrap();
        assert_eq!(env.to_empirical(&composition), "H12Cl3FeO6");
    }

    #[test]
    fn carbon_leads_when_present() {
        let env = Environment::new();
        let ethanol = env.parse("C2H5OH").unwrap();
        assert_eq!(env.to_empirical(&ethanol), "C2H6O");
    }

    #[test]
    fn empirical_is_idempotent_on_mass() {
        let env = Environment::new();
        for formula in ["FeCl3-6H2O", "Ca(NO3)2", "[2CaOH]3Na", "C6H5OH-0.5H2O"] {
            let first = env.parse(formula).unwrap();
            let empirical = env.to_empirical(&first);
            let second = env.parse(&empirical).unwrap();
            assert!(
                (env.mass(&first) - env.mass(&second)).abs() < 1e-7,
                "{formula} -> {empirical}"
            );
        }
    }

    #[test]
    fn isotope_tags_stay_on_their_element() {
        let env = Environment::new();
        let labelled = env.parse("^13C2C4H6").unwrap();
        assert_eq!(env.to_empirical(&labelled), "C4^13C2H6");
    }

    #[test]
    fn counts_of_one_are_omitted_and_fractions_trimmed() {
        let env = Environment::new();
        let composition = env.parse("FeCl3-1.5H2O").unwrap();
        assert_eq!(env.to_empirical(&composition), "H3Cl3FeO1.5");
    }

    #[test]
    fn expansion_substitutes_recursively() {
        let mut env = Environment::new();
        assert_eq!(env.expand_abbreviations("PhOH").unwrap(), "C6H5OH");
        // A trailing count forces parentheses around the substitution.
        assert_eq!(env.expand_abbreviations("Me2O").unwrap(), "(CH3)2O");
        env.set_abbreviation("Dmso", "Me2SO", 0.0, false, None, "", true)
            .unwrap();
        assert_eq!(env.expand_abbreviations("Dmso"), Ok("(CH3)2SO".to_string()));
    }

    #[test]
    fn expansion_detects_cycles() {
        let mut env = Environment::new();
        env.set_abbreviation("Aa", "BbH2O", 0.0, false, None, "", false)
            .unwrap();
        env.set_abbreviation("Bb", "AaCaOH", 0.0, false, None, "", false)
            .unwrap();
        let error = env.expand_abbreviations("Aa2O").unwrap_err();
        assert_eq!(
            error.kind,
            crate::error::ParseErrorKind::CircularReference
        );
    }
}
