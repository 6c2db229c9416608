//! The recursive descent formula parser: text in, [`Composition`] or a
//! position-accurate [`ParseError`] out. The first failure wins and stops
//! the parse; a malformed component is never partially applied.

use log::trace;

use crate::chemistry::caution::caution_for;
use crate::chemistry::formula::{Composition, Species};
use crate::environment::Environment;
use crate::error::{ParseError, ParseErrorKind};
use crate::helper_functions::capitalized;

/// Longest symbol considered during matching (abbreviation symbols are
/// capped at this length).
pub(crate) const MAX_SYMBOL_LEN: usize = 6;

/// The shared state of one recursive expansion: the abbreviation symbols
/// currently being expanded (lowercased) for the visited-stack cycle check,
/// and the symbol whose revisit started an unwinding cycle error, so frames
/// below the cycle itself can report an invalid dependency instead.
#[derive(Debug, Default)]
pub(crate) struct Expansion {
    stack: Vec<String>,
    cycle_root: Option<String>,
}

impl Expansion {
    /// An expansion with one symbol already on the stack: used when
    /// validating that symbol's own definition, so direct and indirect self
    /// references surface as circular references.
    pub(crate) fn seeded(symbol: &str) -> Self {
        Self {
            stack: vec![symbol.to_ascii_lowercase()],
            cycle_root: None,
        }
    }
}

/// Parse a formula against the given environment.
///
/// `expansion` carries the cycle detection state across recursive
/// abbreviation parses; `ignore_validity` makes the parser judge
/// abbreviation definitions afresh instead of trusting their stored
/// validity flags (used by validation); `direct` is true for user input and
/// false inside abbreviation definitions, where element charges do not
/// contribute to the aggregate charge.
pub(crate) fn parse_formula(
    env: &Environment,
    text: &str,
    expansion: &mut Expansion,
    ignore_validity: bool,
    direct: bool,
) -> Result<Composition, ParseError> {
    trace!("parsing formula {text:?} (depth {})", expansion.stack.len());
    let (chars, map) = strip(env, text);
    let mut cursor = Cursor {
        env,
        chars: &chars,
        map: &map,
        pos: 0,
        expansion,
        ignore_validity,
        direct,
        in_square: false,
    };
    cursor.parse_top()
}

/// Strip whitespace and stray characters, keeping a map from stripped to
/// original character positions. The configured decimal separator is
/// normalized to `.` and braces are accepted as parenthesis aliases.
pub(crate) fn strip(env: &Environment, text: &str) -> (Vec<char>, Vec<usize>) {
    let mut chars = Vec::with_capacity(text.len());
    let mut map = Vec::with_capacity(text.len());
    for (position, c) in text.chars().enumerate() {
        let c = if c == env.options.decimal_separator {
            '.'
        } else {
            c
        };
        let c = match c {
            '{' => '(',
            '}' => ')',
            other => other,
        };
        if c.is_ascii_alphanumeric() || "()[].^>-".contains(c) {
            chars.push(c);
            map.push(position);
        }
    }
    (chars, map)
}

/// What a symbol token resolved to.
#[derive(Clone, Copy, Debug)]
pub(crate) enum SymbolTarget {
    /// Index into the element table.
    Element(usize),
    /// Index into the abbreviation table.
    Abbreviation(usize),
}

/// A resolved symbol token: its target, how many characters it consumed,
/// and its canonical casing.
#[derive(Clone, Debug)]
pub(crate) struct SymbolMatch {
    pub(crate) target: SymbolTarget,
    pub(crate) len: usize,
    pub(crate) canon: String,
}

/// Longest-first resolution of a token prefix against elements (canonical
/// casing wins at equal length) and abbreviations (case-insensitive).
pub(crate) fn match_symbol(env: &Environment, token: &str) -> Option<SymbolMatch> {
    for len in (1..=token.len().min(MAX_SYMBOL_LEN)).rev() {
        let canon = capitalized(&token[..len]);
        if let Some(element) = env.elements().index_of(&canon) {
            return Some(SymbolMatch {
                target: SymbolTarget::Element(element),
                len,
                canon,
            });
        }
        if let Some(abbreviation) = env.abbreviations().find_index(&canon) {
            return Some(SymbolMatch {
                target: SymbolTarget::Abbreviation(abbreviation),
                len,
                canon,
            });
        }
    }
    None
}

/// An isotope mass override waiting for its element.
#[derive(Clone, Copy)]
struct Tag {
    mass: f64,
    number_pos: usize,
    /// Written with a caret, as opposed to the bare leading integer
    /// shorthand (`57Fe`).
    from_caret: bool,
}

struct Cursor<'a, 'env> {
    env: &'env Environment,
    chars: &'a [char],
    map: &'a [usize],
    pos: usize,
    expansion: &'a mut Expansion,
    ignore_validity: bool,
    direct: bool,
    in_square: bool,
}

impl Cursor<'_, '_> {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    /// Build an error pointing at the stripped index, reported in original
    /// input coordinates. Indices past the end clamp to the last character.
    fn err(
        &self,
        index: usize,
        kind: ParseErrorKind,
        description: impl Into<String>,
    ) -> ParseError {
        if self.chars.is_empty() {
            return ParseError::new(kind, 0, ' ', description);
        }
        let index = index.min(self.chars.len() - 1);
        ParseError::new(kind, self.map[index], self.chars[index], description)
    }

    fn parse_top(&mut self) -> Result<Composition, ParseError> {
        let mut total = self.parse_additive(true)?;
        while self.peek() == Some('>') {
            let gt = self.pos;
            self.pos += 1;
            let right = self.parse_additive(true)?;
            if let Err(species) = total.subtract(&right) {
                return Err(self.err(
                    gt,
                    ParseErrorKind::InvalidSubtraction,
                    format!(
                        "Invalid formula subtraction; {} is not present in sufficient quantity on the left of '>'",
                        self.species_text(species)
                    ),
                ));
            }
        }
        if self.pos < self.chars.len() {
            return Err(if self.chars[self.pos] == ']' {
                self.err(
                    self.pos,
                    ParseErrorKind::UnmatchedBracket,
                    "Unmatched bracket; ']' without a matching '['",
                )
            } else {
                self.err(
                    self.pos,
                    ParseErrorKind::UnmatchedParenthesis,
                    "Unmatched parenthesis; ')' without a matching '('",
                )
            });
        }
        total.retain_significant();
        Ok(total)
    }

    /// A run of dash-separated components. At the top level each component
    /// closes its own hydrogen/carbon charge accounting; inside a group the
    /// bookkeeping flows up to the enclosing component.
    fn parse_additive(&mut self, top: bool) -> Result<Composition, ParseError> {
        let mut accumulated = Composition::default();
        let mut after_dash = false;
        loop {
            let mut component = self.parse_component(after_dash)?;
            if top {
                component.close_component();
            }
            accumulated.absorb(&component, 1.0, true);
            if self.peek() == Some('-') {
                self.pos += 1;
                after_dash = true;
            } else {
                return Ok(accumulated);
            }
        }
    }

    /// One component: an optional leading number, then units until a
    /// component terminator.
    fn parse_component(&mut self, after_dash: bool) -> Result<Composition, ParseError> {
        let mut component = Composition::default();
        let mut multiplier: Option<f64> = None;
        let mut quirk: Option<Tag> = None;

        if let Some(c) = self.peek()
            && (c.is_ascii_digit() || c == '.')
        {
            let start = self.pos;
            let (value, had_decimal) = self.scan_number()?;
            if value == 0.0 && after_dash {
                return Err(self.err(
                    start,
                    ParseErrorKind::ZeroCount,
                    "Cannot have a 0 directly after an element or dash",
                ));
            }
            if after_dash {
                // Hydrate style multiplier: FeCl3-6H2O, C6H6-.1H2O.
                multiplier = Some(value);
            } else {
                match self.peek() {
                    Some('(' | '[') => {
                        // Group prefix multiplier, rescanned by the unit loop.
                        self.pos = start;
                    }
                    Some(c) if c.is_ascii_alphabetic() && !had_decimal => {
                        // Backwards compatible isotope shorthand: 57Fe means
                        // ^57Fe when the symbol resolves to an element.
                        quirk = Some(Tag {
                            mass: value,
                            number_pos: start,
                            from_caret: false,
                        });
                    }
                    Some(c) if c.is_ascii_alphabetic() => multiplier = Some(value),
                    _ => {
                        return Err(self.err(
                            start,
                            ParseErrorKind::MisplacedNumber,
                            "Misplaced number; a number should follow an element, '(', '[', ')', '-', or '^'",
                        ));
                    }
                }
            }
        }

        loop {
            match self.peek() {
                None | Some('-' | '>' | ')' | ']') => break,
                Some('^') => self.parse_caret(&mut component)?,
                Some('(') => self.parse_paren_group(&mut component, None)?,
                Some('[') => self.parse_bracket_group(&mut component, None)?,
                Some(c) if c.is_ascii_alphabetic() => {
                    let tag = quirk.take();
                    self.parse_symbol(&mut component, tag, &mut multiplier)?;
                }
                Some(c) if c.is_ascii_digit() || c == '.' => {
                    let start = self.pos;
                    let (value, _) = self.scan_number()?;
                    match self.peek() {
                        Some('(') => {
                            self.parse_paren_group(&mut component, Some(value))?;
                        }
                        Some('[') => {
                            self.parse_bracket_group(&mut component, Some((value, start)))?;
                        }
                        _ => {
                            return Err(self.err(
                                start,
                                ParseErrorKind::MisplacedNumber,
                                "Misplaced number; a number should follow an element, '(', '[', ')', '-', or '^'",
                            ));
                        }
                    }
                }
                Some(other) => {
                    return Err(self.err(
                        self.pos,
                        ParseErrorKind::UnknownSymbol,
                        format!("Unexpected character '{other}'"),
                    ));
                }
            }
        }

        if let Some(multiplier) = multiplier {
            component.scale(multiplier);
        }
        Ok(component)
    }

    /// `^` followed by the isotope number and its element.
    fn parse_caret(&mut self, component: &mut Composition) -> Result<(), ParseError> {
        self.pos += 1;
        match self.peek() {
            Some('-') => Err(self.err(
                self.pos,
                ParseErrorKind::NegativeIsotopeMass,
                "A negative isotopic mass is not allowed after a caret",
            )),
            Some(c) if c.is_ascii_digit() || c == '.' => {
                let start = self.pos;
                let (mass, _) = self.scan_number()?;
                if mass <= 0.0 {
                    return Err(self.err(
                        start,
                        ParseErrorKind::NegativeIsotopeMass,
                        "An isotopic mass must be greater than 0",
                    ));
                }
                if matches!(self.peek(), Some(c) if c.is_ascii_alphabetic()) {
                    let tag = Some(Tag {
                        mass,
                        number_pos: start,
                        from_caret: true,
                    });
                    let mut no_multiplier = None;
                    self.parse_symbol(component, tag, &mut no_multiplier)
                } else {
                    Err(self.err(
                        self.pos,
                        ParseErrorKind::IsotopeOnNonElement,
                        "An isotopic mass must be directly followed by an element",
                    ))
                }
            }
            _ => Err(self.err(
                self.pos,
                ParseErrorKind::NumberRequiredAfterCaret,
                "A number must be present after a caret",
            )),
        }
    }

    /// An element or abbreviation token with its optional count suffix.
    fn parse_symbol(
        &mut self,
        component: &mut Composition,
        tag: Option<Tag>,
        multiplier: &mut Option<f64>,
    ) -> Result<(), ParseError> {
        let start = self.pos;
        let token = self.natural_token();
        let Some(matched) = match_symbol(self.env, &token) else {
            return Err(self.err(
                start,
                ParseErrorKind::UnknownSymbol,
                format!("Unknown element or abbreviation '{token}'"),
            ));
        };
        self.pos += matched.len;
        if let Some(caution) = caution_for(&matched.canon) {
            component.push_caution(caution);
        }

        match matched.target {
            SymbolTarget::Element(element) => {
                let species = match tag {
                    Some(tag) => {
                        if tag.mass <= 0.0 {
                            return Err(self.err(
                                tag.number_pos,
                                ParseErrorKind::NegativeIsotopeMass,
                                "An isotopic mass must be greater than 0",
                            ));
                        }
                        Species::tagged(element, tag.mass)
                    }
                    None => Species::untagged(element),
                };
                let count = self.scan_count_suffix(true)?.unwrap_or(1.0);
                component.add(species, count);
                if self.direct {
                    if matched.canon == "C" {
                        component.has_carbon = true;
                    }
                    if species.tag().is_none() {
                        if matched.canon == "H" {
                            component.direct_hydrogen += count;
                        } else {
                            component
                                .add_charge(self.env.elements().by_index(element).charge() * count);
                        }
                    }
                }
                Ok(())
            }
            SymbolTarget::Abbreviation(index) => {
                if let Some(tag) = tag {
                    if tag.from_caret {
                        return Err(self.err(
                            start,
                            ParseErrorKind::IsotopeOnNonElement,
                            format!(
                                "An isotopic mass cannot be applied to the abbreviation '{}'",
                                matched.canon
                            ),
                        ));
                    }
                    // A bare leading integer before an abbreviation is a
                    // plain component multiplier, not an isotope tag.
                    *multiplier = Some(tag.mass);
                }
                self.expand_abbreviation(component, index, start)
            }
        }
    }

    fn expand_abbreviation(
        &mut self,
        component: &mut Composition,
        index: usize,
        start: usize,
    ) -> Result<(), ParseError> {
        let abbreviation = self.env.abbreviations().entry(index);
        let symbol = abbreviation.symbol().to_string();
        if !abbreviation.is_valid() && !self.ignore_validity {
            return Err(self.err(
                start,
                ParseErrorKind::InvalidDependency,
                format!("The abbreviation '{symbol}' is invalid and cannot be used"),
            ));
        }
        let lowered = symbol.to_ascii_lowercase();
        if self.expansion.stack.contains(&lowered) {
            self.expansion.cycle_root = Some(lowered);
            return Err(self.err(
                start,
                ParseErrorKind::CircularReference,
                format!("Circular reference while expanding the abbreviation '{symbol}'"),
            ));
        }
        self.expansion.stack.push(lowered);
        let expanded = parse_formula(
            self.env,
            abbreviation.formula(),
            self.expansion,
            self.ignore_validity,
            false,
        );
        self.expansion.stack.pop();
        let expanded = match expanded {
            Ok(expanded) => expanded,
            Err(inner) => {
                // Surface definition errors at the abbreviation's position
                // in the caller's text. A cycle error stays a cycle error
                // while unwinding through the cycle's own members; any
                // other failure of a referenced definition is an invalid
                // dependency from the caller's point of view.
                let still_in_cycle = inner.kind == ParseErrorKind::CircularReference
                    && self
                        .expansion
                        .cycle_root
                        .as_ref()
                        .is_some_and(|root| self.expansion.stack.contains(root));
                let kind = if still_in_cycle {
                    ParseErrorKind::CircularReference
                } else {
                    ParseErrorKind::InvalidDependency
                };
                return Err(self.err(
                    start,
                    kind,
                    format!("{} (inside the abbreviation '{symbol}')", inner.description),
                ));
            }
        };
        let count = self.scan_count_suffix(true)?.unwrap_or(1.0);
        component.absorb(&expanded, count, false);
        component.add_charge(self.env.abbreviations().entry(index).charge() * count);
        Ok(())
    }

    /// `(formula)` with an optional prefix and/or suffix multiplier.
    fn parse_paren_group(
        &mut self,
        component: &mut Composition,
        prefix: Option<f64>,
    ) -> Result<(), ParseError> {
        let open = self.pos;
        self.pos += 1;
        let inner = self.parse_additive(false)?;
        if self.peek() == Some(')') {
            self.pos += 1;
        } else {
            return Err(self.err(
                open,
                ParseErrorKind::MissingClosingParenthesis,
                "Missing closing parenthesis",
            ));
        }
        let suffix = self.scan_count_suffix(false)?.unwrap_or(1.0);
        component.absorb(&inner, prefix.unwrap_or(1.0) * suffix, true);
        Ok(())
    }

    /// `[multiplier formula]`: the multiplier is required up front, and a
    /// trailing count is only legal when it is present.
    fn parse_bracket_group(
        &mut self,
        component: &mut Composition,
        prefix: Option<(f64, usize)>,
    ) -> Result<(), ParseError> {
        if self.env.options.brackets_as_parentheses {
            return self.parse_bracket_as_paren(component, prefix.map(|p| p.0));
        }
        let open = self.pos;
        if let Some((_, number_pos)) = prefix {
            return Err(self.err(
                number_pos,
                ParseErrorKind::MisplacedNumber,
                "Numbers should follow left brackets, not precede them",
            ));
        }
        if self.in_square {
            return Err(self.err(
                open,
                ParseErrorKind::NestedBrackets,
                "Nested brackets are not allowed",
            ));
        }
        self.pos += 1;
        let leading = if matches!(self.peek(), Some(c) if c.is_ascii_digit() || c == '.') {
            Some(self.scan_number()?.0)
        } else {
            None
        };
        self.in_square = true;
        let inner = self.parse_additive(false);
        self.in_square = false;
        let inner = inner?;
        if self.peek() == Some(']') {
            self.pos += 1;
        } else {
            return Err(self.err(
                open,
                ParseErrorKind::MissingClosingBracket,
                "Missing closing bracket, ']'",
            ));
        }
        let suffix_pos = self.pos;
        let suffix = self.scan_count_suffix(false)?;
        let count = match (leading, suffix) {
            (Some(leading), Some(suffix)) => leading * suffix,
            (Some(leading), None) => leading,
            (None, Some(_)) => {
                return Err(self.err(
                    suffix_pos,
                    ParseErrorKind::NumberAfterRightBracket,
                    "Numbers should follow left brackets, not right brackets",
                ));
            }
            (None, None) => {
                return Err(self.err(
                    open + 1,
                    ParseErrorKind::NumberRequiredInBracket,
                    "A number must be present after a bracket",
                ));
            }
        };
        component.absorb(&inner, count, true);
        Ok(())
    }

    /// `[` treated as `(` under the brackets-as-parentheses option.
    fn parse_bracket_as_paren(
        &mut self,
        component: &mut Composition,
        prefix: Option<f64>,
    ) -> Result<(), ParseError> {
        let open = self.pos;
        self.pos += 1;
        let inner = self.parse_additive(false)?;
        if self.peek() == Some(']') {
            self.pos += 1;
        } else {
            return Err(self.err(
                open,
                ParseErrorKind::MissingClosingBracket,
                "Missing closing bracket, ']'",
            ));
        }
        let suffix = self.scan_count_suffix(false)?.unwrap_or(1.0);
        component.absorb(&inner, prefix.unwrap_or(1.0) * suffix, true);
        Ok(())
    }

    /// The natural symbol token at the cursor: one letter plus the
    /// following lowercase run, in canonical casing for matching while the
    /// typed form is kept for error messages.
    fn natural_token(&self) -> String {
        let mut token = String::new();
        token.push(self.chars[self.pos]);
        token.extend(
            self.chars[self.pos + 1..]
                .iter()
                .take_while(|c| c.is_ascii_lowercase()),
        );
        token
    }

    /// A numeric token: digits with at most one decimal point.
    fn scan_number(&mut self) -> Result<(f64, bool), ParseError> {
        let start = self.pos;
        let mut seen_decimal = false;
        let mut digits = 0_usize;
        let mut text = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                digits += 1;
                text.push(c);
                self.pos += 1;
            } else if c == '.' {
                if seen_decimal {
                    return Err(self.err(
                        self.pos,
                        ParseErrorKind::DuplicateDecimalPoint,
                        "Only one decimal point is allowed per number",
                    ));
                }
                seen_decimal = true;
                text.push(c);
                self.pos += 1;
            } else {
                break;
            }
        }
        if digits == 0 {
            return Err(self.err(
                start,
                ParseErrorKind::MisplacedNumber,
                "A number must be present after the decimal point",
            ));
        }
        let value = text.parse::<f64>().map_err(|_| {
            self.err(
                start,
                ParseErrorKind::MisplacedNumber,
                format!("'{text}' is not a valid number"),
            )
        })?;
        Ok((value, seen_decimal))
    }

    /// The optional count after a unit: bare digits, or a parenthesized
    /// signed integer delta like `(2)` or `(-1)`. A count of exactly zero
    /// directly after an element is an error.
    fn scan_count_suffix(&mut self, after_element: bool) -> Result<Option<f64>, ParseError> {
        match self.peek() {
            Some(c) if c.is_ascii_digit() || c == '.' => {
                let start = self.pos;
                let (value, _) = self.scan_number()?;
                if after_element && value == 0.0 {
                    return Err(self.err(
                        start,
                        ParseErrorKind::ZeroCount,
                        "Cannot have a 0 directly after an element or dash",
                    ));
                }
                Ok(Some(value))
            }
            Some('(') => {
                // Only a parenthesis holding nothing but an optionally
                // signed integer is a count; anything else is a group.
                let mut index = self.pos + 1;
                let negative = self.chars.get(index) == Some(&'-');
                if negative {
                    index += 1;
                }
                let digit_start = index;
                while matches!(self.chars.get(index), Some(c) if c.is_ascii_digit()) {
                    index += 1;
                }
                if index > digit_start && self.chars.get(index) == Some(&')') {
                    let digits: String = self.chars[digit_start..index].iter().collect();
                    let value = digits.parse::<f64>().map_err(|_| {
                        self.err(
                            digit_start,
                            ParseErrorKind::MisplacedNumber,
                            format!("'{digits}' is not a valid number"),
                        )
                    })?;
                    let value = if negative { -value } else { value };
                    if after_element && value == 0.0 {
                        return Err(self.err(
                            digit_start,
                            ParseErrorKind::ZeroCount,
                            "Cannot have a 0 directly after an element or dash",
                        ));
                    }
                    self.pos = index + 1;
                    Ok(Some(value))
                } else {
                    Ok(None)
                }
            }
            _ => Ok(None),
        }
    }

    fn species_text(&self, species: Species) -> String {
        let symbol = self.env.elements().by_index(species.element_index()).symbol();
        species.tag().map_or_else(
            || format!("'{symbol}'"),
            |tag| format!("'^{tag}{symbol}'"),
        )
    }
}

#[cfg(test)]
mod tests {
    use crate::chemistry::formula::{Composition, Species};
    use crate::environment::Environment;
    use crate::error::ParseErrorKind;

    fn count(env: &Environment, composition: &Composition, symbol: &str) -> f64 {
        let element = env.elements().index_of(symbol).unwrap();
        composition.count(&Species::untagged(element))
    }

    fn tagged_count(env: &Environment, composition: &Composition, symbol: &str, tag: f64) -> f64 {
        let element = env.elements().index_of(symbol).unwrap();
        composition.count(&Species::tagged(element, tag))
    }

    fn kind_of(env: &Environment, formula: &str) -> ParseErrorKind {
        env.parse(formula).unwrap_err().kind
    }

    #[test]
    fn water() {
        let env = Environment::new();
        let water = env.parse("H2O").unwrap();
        assert_eq!(count(&env, &water, "H"), 2.0);
        assert_eq!(count(&env, &water, "O"), 1.0);
        assert_eq!(water.charge(), 0.0);
    }

    #[test]
    fn whitespace_and_stray_characters_are_ignored() {
        let env = Environment::new();
        assert_eq!(env.parse(" H 2 O "), env.parse("H2O"));
        assert_eq!(env.parse("H2O!?_+="), env.parse("H2O"));
        // Braces are parenthesis aliases.
        assert_eq!(env.parse("Ca{OH}2"), env.parse("Ca(OH)2"));
    }

    #[test]
    fn hydrate_components_add() {
        let env = Environment::new();
        let hydrate = env.parse("FeCl3-6H2O").unwrap();
        assert_eq!(count(&env, &hydrate, "Fe"), 1.0);
        assert_eq!(count(&env, &hydrate, "Cl"), 3.0);
        assert_eq!(count(&env, &hydrate, "H"), 12.0);
        assert_eq!(count(&env, &hydrate, "O"), 6.0);
    }

    #[test]
    fn decimal_hydrate_multipliers() {
        let env = Environment::new();
        let half = env.parse("C6H5OH-.5H2O").unwrap();
        assert_eq!(count(&env, &half, "H"), 7.0);
        assert_eq!(count(&env, &half, "O"), 1.5);
        // A leading decimal multiplier also works at the formula start.
        let tenth = env.parse("1.5H2O").unwrap();
        assert_eq!(count(&env, &tenth, "H"), 3.0);
    }

    #[test]
    fn parenthesized_groups() {
        let env = Environment::new();
        let phosphate = env.parse("Ca3(PO4)2").unwrap();
        assert_eq!(count(&env, &phosphate, "Ca"), 3.0);
        assert_eq!(count(&env, &phosphate, "P"), 2.0);
        assert_eq!(count(&env, &phosphate, "O"), 8.0);
        // Multipliers are accepted before the group, after it, or both.
        let both = env.parse("2(NH4)3PO4").unwrap();
        assert_eq!(count(&env, &both, "N"), 6.0);
        assert_eq!(count(&env, &both, "H"), 24.0);
    }

    #[test]
    fn bracket_groups_take_their_multiplier_up_front() {
        let env = Environment::new();
        let bracket = env.parse("[2CaOH]").unwrap();
        assert_eq!(count(&env, &bracket, "Ca"), 2.0);
        assert_eq!(count(&env, &bracket, "H"), 2.0);
        // A trailing count is only legal with the up front multiplier.
        let six = env.parse("[2CaOH]3").unwrap();
        assert_eq!(count(&env, &six, "Ca"), 6.0);
        assert_eq!(
            kind_of(&env, "[CaOH]5"),
            ParseErrorKind::NumberAfterRightBracket
        );
        assert_eq!(
            kind_of(&env, "[CaOH]"),
            ParseErrorKind::NumberRequiredInBracket
        );
        assert_eq!(
            kind_of(&env, "[2Ca[OH]2]"),
            ParseErrorKind::NestedBrackets
        );
        assert_eq!(
            kind_of(&env, "[2CaOH"),
            ParseErrorKind::MissingClosingBracket
        );
    }

    #[test]
    fn brackets_as_parentheses_option() {
        let mut env = Environment::new();
        env.options.brackets_as_parentheses = true;
        let composition = env.parse("[CaOH]2").unwrap();
        assert_eq!(count(&env, &composition, "Ca"), 2.0);
        assert_eq!(count(&env, &composition, "O"), 2.0);
    }

    #[test]
    fn parenthesis_errors_are_position_accurate() {
        let env = Environment::new();
        let missing = env.parse("Ca(OH2").unwrap_err();
        assert_eq!(missing.kind, ParseErrorKind::MissingClosingParenthesis);
        assert_eq!(missing.position, 2);
        assert_eq!(missing.character, '(');
        let unmatched = env.parse("CaOH)2").unwrap_err();
        assert_eq!(unmatched.kind, ParseErrorKind::UnmatchedParenthesis);
        assert_eq!(unmatched.position, 4);
        let bracket = env.parse("H2O]").unwrap_err();
        assert_eq!(bracket.kind, ParseErrorKind::UnmatchedBracket);
    }

    #[test]
    fn zero_counts_are_rejected() {
        let env = Environment::new();
        assert_eq!(kind_of(&env, "H0"), ParseErrorKind::ZeroCount);
        assert_eq!(kind_of(&env, "CaCO3-0H2O"), ParseErrorKind::ZeroCount);
        assert_eq!(kind_of(&env, "H(0)"), ParseErrorKind::ZeroCount);
    }

    #[test]
    fn one_decimal_point_per_number() {
        let env = Environment::new();
        let error = env.parse("H2.3.4O").unwrap_err();
        assert_eq!(error.kind, ParseErrorKind::DuplicateDecimalPoint);
        assert_eq!(error.position, 4);
        assert_eq!(error.character, '.');
        assert_eq!(
            kind_of(&env, "^13.0.1C"),
            ParseErrorKind::DuplicateDecimalPoint
        );
        assert_eq!(
            kind_of(&env, "[2.3.4CaOH]"),
            ParseErrorKind::DuplicateDecimalPoint
        );
    }

    #[test]
    fn unknown_symbols_point_at_the_token() {
        let env = Environment::new();
        let error = env.parse("H2O Qx3").unwrap_err();
        assert_eq!(error.kind, ParseErrorKind::UnknownSymbol);
        assert_eq!(error.position, 4);
        assert_eq!(error.character, 'Q');
        assert!(error.description.contains("'Qx'"), "{}", error.description);
    }

    #[test]
    fn isotope_tags() {
        let mut env = Environment::new();
        env.set_mode(crate::chemistry::MassMode::Isotopic);
        let caret = env.parse("^57Fe").unwrap();
        assert_eq!(tagged_count(&env, &caret, "Fe", 57.0), 1.0);
        // The bare leading integer shorthand means the same thing.
        assert_eq!(env.parse("57Fe"), env.parse("^57Fe"));
        // A decimal tag is an exact override mass.
        let exact = env.parse("^2.014H2O").unwrap();
        assert_eq!(tagged_count(&env, &exact, "H", 2.014), 2.0);
        assert_eq!(count(&env, &exact, "H"), 0.0);
    }

    #[test]
    fn caret_errors() {
        let env = Environment::new();
        assert_eq!(kind_of(&env, "^C6H6"), ParseErrorKind::NumberRequiredAfterCaret);
        assert_eq!(kind_of(&env, "^-13C"), ParseErrorKind::NegativeIsotopeMass);
        assert_eq!(kind_of(&env, "^13Me"), ParseErrorKind::IsotopeOnNonElement);
        assert_eq!(kind_of(&env, "^13(CH)2"), ParseErrorKind::IsotopeOnNonElement);
    }

    #[test]
    fn misplaced_numbers() {
        let env = Environment::new();
        assert_eq!(kind_of(&env, "(3)H2O"), ParseErrorKind::MisplacedNumber);
        assert_eq!(kind_of(&env, "3-H2O"), ParseErrorKind::MisplacedNumber);
        assert_eq!(kind_of(&env, "H(2)3"), ParseErrorKind::MisplacedNumber);
        assert_eq!(kind_of(&env, "2[2CaOH]"), ParseErrorKind::MisplacedNumber);
        // Whitespace stripping makes a detached trailing digit a count.
        let ozone_water = env.parse("H2O 3").unwrap();
        assert_eq!(count(&env, &ozone_water, "O"), 3.0);
    }

    #[test]
    fn parenthesized_signed_counts() {
        let env = Environment::new();
        let positive = env.parse("H(2)O").unwrap();
        assert_eq!(count(&env, &positive, "H"), 2.0);
        let negative = env.parse("C2H6O>H2O").unwrap();
        let delta = env.parse("C2H6OH(-2)O(-1)").unwrap();
        assert_eq!(
            count(&env, &negative, "H"),
            count(&env, &delta, "H")
        );
        assert_eq!(
            count(&env, &negative, "O"),
            count(&env, &delta, "O")
        );
    }

    #[test]
    fn subtraction() {
        let env = Environment::new();
        let anhydride = env.parse("C6H12O6>H2O").unwrap();
        assert_eq!(count(&env, &anhydride, "C"), 6.0);
        assert_eq!(count(&env, &anhydride, "H"), 10.0);
        assert_eq!(count(&env, &anhydride, "O"), 5.0);
        // Each further > segment subtracts from the accumulated left side.
        let twice = env.parse("C6H12O6>H2O>H2O").unwrap();
        assert_eq!(count(&env, &twice, "H"), 8.0);
    }

    #[test]
    fn invalid_subtraction_is_an_error() {
        let env = Environment::new();
        let error = env.parse("C6H5>H6").unwrap_err();
        assert_eq!(error.kind, ParseErrorKind::InvalidSubtraction);
        assert_eq!(error.character, '>');
        assert_eq!(error.position, 4);
        // Elements missing entirely on the left fail too.
        assert_eq!(kind_of(&env, "H2O>Na"), ParseErrorKind::InvalidSubtraction);
        // Isotope-tagged hydrogen does not cancel against plain hydrogen.
        assert_eq!(kind_of(&env, "D10C6>H10"), ParseErrorKind::InvalidSubtraction);
    }

    #[test]
    fn smart_case_and_cautions() {
        let env = Environment::new();
        // Lowercase input is case-corrected.
        assert_eq!(env.parse("h2o"), env.parse("H2O"));
        let cobalt = env.parse("co2").unwrap();
        assert_eq!(count(&env, &cobalt, "Co"), 2.0);
        assert!(!cobalt.cautions().is_empty());
        // CO stays carbon monoxide, without the cobalt caution.
        let monoxide = env.parse("CO").unwrap();
        assert_eq!(count(&env, &monoxide, "C"), 1.0);
        assert_eq!(count(&env, &monoxide, "O"), 1.0);
    }

    #[test]
    fn abbreviations_expand_recursively() {
        let env = Environment::new();
        let phenol = env.parse("PhOH").unwrap();
        assert_eq!(count(&env, &phenol, "C"), 6.0);
        assert_eq!(count(&env, &phenol, "H"), 6.0);
        assert_eq!(count(&env, &phenol, "O"), 1.0);
        // Declared abbreviation charges contribute to the total.
        let acetate = env.parse("NaOac").unwrap();
        assert_eq!(acetate.charge(), 0.0);
        // Amino acid residues are ordinary abbreviations.
        let dipeptide = env.parse("HGlyGlyOH").unwrap();
        assert_eq!(count(&env, &dipeptide, "C"), 4.0);
        assert_eq!(count(&env, &dipeptide, "N"), 2.0);
    }

    #[test]
    fn deuterium_is_a_tagged_abbreviation() {
        let mut env = Environment::new();
        env.set_mode(crate::chemistry::MassMode::Isotopic);
        let heavy_water = env.parse("D2O").unwrap();
        assert_eq!(tagged_count(&env, &heavy_water, "H", 2.014), 2.0);
        let mass = env.mass(&heavy_water);
        assert!((mass - (2.0 * 2.014 + 15.99491461956)).abs() < 1e-9);
    }

    #[test]
    fn longest_match_wins_over_shorter_elements() {
        let env = Environment::new();
        // Pro is proline, not praseodymium plus oxygen.
        let proline = env.parse("Pro").unwrap();
        assert_eq!(count(&env, &proline, "C"), 5.0);
        assert_eq!(count(&env, &proline, "Pr"), 0.0);
        // Exact element casing still wins where it applies.
        let oxide = env.parse("PrO").unwrap();
        assert_eq!(count(&env, &oxide, "Pr"), 1.0);
        assert_eq!(count(&env, &oxide, "O"), 1.0);
    }

    #[test]
    fn comma_decimal_separator() {
        let mut env = Environment::new();
        env.options.decimal_separator = ',';
        let half = env.parse("CaSO4-0,5H2O").unwrap();
        assert_eq!(count(&env, &half, "H"), 1.0);
        assert_eq!(count(&env, &half, "O"), 4.5);
    }

    #[test]
    fn empty_input_is_an_empty_tally() {
        let env = Environment::new();
        let empty = env.parse("").unwrap();
        assert!(empty.is_empty());
        assert_eq!(env.mass(&empty), 0.0);
    }

    #[test]
    fn circular_references_are_rejected_at_definition_time() {
        let mut env = Environment::new();
        env.set_abbreviation("Try", "FailH2O2", 0.0, false, None, "", false)
            .unwrap();
        let error = env
            .set_abbreviation("Fail", "TryCaOH", 0.0, false, None, "", true)
            .unwrap_err();
        let crate::error::AbbreviationError::Formula(parse_error) = error else {
            panic!("expected a formula error, got {error:?}");
        };
        assert_eq!(parse_error.kind, ParseErrorKind::CircularReference);
        // The failed definition was rolled back.
        assert!(env.abbreviations().get("Fail").is_none());
    }

    #[test]
    fn validate_all_flags_exactly_the_cycle_members() {
        let mut env = Environment::new();
        let baseline = env.validate_abbreviations();
        assert_eq!(baseline, 0);
        env.set_abbreviation("Aaa", "BbbH2O", 0.0, false, None, "", false)
            .unwrap();
        env.set_abbreviation("Bbb", "CccO2", 0.0, false, None, "", false)
            .unwrap();
        env.set_abbreviation("Ccc", "AaaN3", 0.0, false, None, "", false)
            .unwrap();
        assert_eq!(env.validate_abbreviations(), 3);
        for symbol in ["Aaa", "Bbb", "Ccc"] {
            assert_eq!(
                env.abbreviations().get(symbol).unwrap().validity(),
                crate::abbreviation::Validity::Cycle
            );
        }
        // The built-ins are untouched.
        assert!(env.abbreviations().get("Gly").unwrap().is_valid());
        // Using a cycle member in a formula fails with its position.
        let error = env.parse("H2OAaa").unwrap_err();
        assert_eq!(error.kind, ParseErrorKind::InvalidDependency);
        assert_eq!(error.position, 3);
    }

    #[test]
    fn self_reference_is_a_cycle() {
        let mut env = Environment::new();
        let error = env
            .set_abbreviation("Selfy", "Selfy2O", 0.0, false, None, "", true)
            .unwrap_err();
        let crate::error::AbbreviationError::Formula(parse_error) = error else {
            panic!("expected a formula error, got {error:?}");
        };
        assert_eq!(parse_error.kind, ParseErrorKind::CircularReference);
    }

    #[test]
    fn invalid_dependencies_are_distinct_from_cycles() {
        let mut env = Environment::new();
        env.set_abbreviation("Broke", "Qx2", 0.0, false, None, "", false)
            .unwrap();
        env.set_abbreviation("User", "BrokeO2", 0.0, false, None, "", false)
            .unwrap();
        assert_eq!(env.validate_abbreviations(), 2);
        assert_eq!(
            env.abbreviations().get("Broke").unwrap().validity(),
            crate::abbreviation::Validity::BadFormula
        );
        assert_eq!(
            env.abbreviations().get("User").unwrap().validity(),
            crate::abbreviation::Validity::InvalidDependency
        );
    }

    #[test]
    fn bulk_load_then_validate() {
        let mut env = Environment::new();
        // Mutually referencing but acyclic definitions load fine without
        // validation and resolve afterwards.
        env.set_abbreviation("Outer", "InnerO2", 0.0, false, None, "", false)
            .unwrap();
        env.set_abbreviation("Inner", "CH2", 0.0, false, None, "", false)
            .unwrap();
        assert_eq!(env.validate_abbreviations(), 0);
        let composition = env.parse("Outer2").unwrap();
        assert_eq!(count(&env, &composition, "C"), 2.0);
        assert_eq!(count(&env, &composition, "O"), 4.0);
    }
}
