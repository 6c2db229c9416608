//! Reduction of a [`Composition`] to mass, uncertainty, and percent
//! composition under the environment's current mass mode.

use itertools::Itertools;

use crate::chemistry::MassMode;
use crate::chemistry::formula::{Composition, Species, element_priority};
use crate::environment::Environment;
use crate::helper_functions::format_significant;

/// The share of the total mass carried by one element.
#[derive(Clone, Debug, PartialEq)]
pub struct PercentComposition {
    /// The element symbol.
    pub symbol: String,
    /// The percentage of the total mass, 0..=100 for ordinary tallies.
    pub percent: f64,
}

impl Environment {
    /// The mass of one occurrence of a species: the isotope tag when
    /// present (tags override this occurrence only, never the element
    /// table), the element mass in the current mode otherwise.
    pub fn species_mass(&self, species: &Species) -> f64 {
        species.tag().unwrap_or_else(|| {
            self.elements()
                .by_index(species.element_index())
                .mass(self.mode())
        })
    }

    /// The total mass of a composition in the current mass mode.
    pub fn mass(&self, composition: &Composition) -> f64 {
        composition
            .entries()
            .iter()
            .map(|(species, count)| count * self.species_mass(species))
            .sum()
    }

    /// The propagated mass uncertainty, the quadrature sum of the per
    /// element uncertainties. Only meaningful in Average mode; isotopic and
    /// integer masses, and isotope-tagged occurrences, are exact.
    pub fn uncertainty(&self, composition: &Composition) -> f64 {
        if self.mode() != MassMode::Average {
            return 0.0;
        }
        composition
            .entries()
            .iter()
            .filter(|(species, _)| species.tag().is_none())
            .map(|(species, count)| {
                let uncertainty = self
                    .elements()
                    .by_index(species.element_index())
                    .uncertainty(self.mode());
                (count * uncertainty).powi(2)
            })
            .sum::<f64>()
            .sqrt()
    }

    /// The percent of the total mass carried by each distinct element
    /// present, tagged and untagged occurrences combined, ordered like the
    /// empirical formula (C, H, then alphabetical).
    pub fn percent_composition(&self, composition: &Composition) -> Vec<PercentComposition> {
        let total = self.mass(composition);
        if total == 0.0 {
            return Vec::new();
        }
        let mut shares: Vec<PercentComposition> = composition
            .entries()
            .iter()
            .chunk_by(|(species, _)| species.element_index())
            .into_iter()
            .map(|(element, entries)| {
                let mass: f64 = entries
                    .map(|(species, count)| count * self.species_mass(species))
                    .sum();
                PercentComposition {
                    symbol: self.elements().by_index(element).symbol().to_string(),
                    percent: mass / total * 100.0,
                }
            })
            .collect();
        shares.sort_by_key(|share| element_priority(&share.symbol));
        shares
    }

    /// The percent composition as display text, one `symbol: percent` line
    /// per element, using the configured significant digit policy.
    pub fn percent_composition_report(&self, composition: &Composition) -> String {
        self.percent_composition(composition)
            .iter()
            .map(|share| {
                format!(
                    "{}: {}%",
                    share.symbol,
                    format_significant(share.percent, self.options.significant_digits)
                )
            })
            .join("\n")
    }

    /// Render a mass with its uncertainty according to the configured
    /// [`StdDevMode`](crate::StdDevMode). Formatting only; the numeric
    /// values are untouched.
    pub fn format_mass(&self, mass: f64, uncertainty: f64) -> String {
        use crate::environment::StdDevMode;

        if uncertainty <= 0.0 || !uncertainty.is_finite() {
            return format_significant(mass, self.options.significant_digits);
        }
        let exponent = uncertainty.log10().floor();
        let decimals = (-exponent).max(0.0) as usize;
        match self.options.std_dev_mode {
            StdDevMode::Short => {
                let mut digit = (uncertainty / 10_f64.powf(exponent)).round();
                let mut decimals = decimals;
                if digit >= 10.0 {
                    digit = 1.0;
                    decimals = decimals.saturating_sub(1);
                }
                format!("{mass:.decimals$}({digit})")
            }
            StdDevMode::Scientific => format!("{mass:.decimals$} (±{uncertainty:.1e})"),
            StdDevMode::Decimal => format!("{mass:.decimals$} (±{uncertainty:.decimals$})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use crate::chemistry::MassMode;
    use crate::environment::{Environment, StdDevMode};

    #[test]
    fn water_masses() {
        let mut env = Environment::new();
        let water = env.parse("H2O").unwrap();
        assert_relative_eq!(env.mass(&water), 18.0153, epsilon = 1e-4);
        env.set_mode(MassMode::Isotopic);
        assert_relative_eq!(env.mass(&water), 18.01056468403, epsilon = 1e-7);
        env.set_mode(MassMode::Integer);
        assert_relative_eq!(env.mass(&water), 18.0, epsilon = 1e-12);
    }

    #[test]
    fn average_and_isotopic_differ() {
        let mut env = Environment::new();
        let glucose = env.parse("C6H12O6").unwrap();
        let average = env.mass(&glucose);
        env.set_mode(MassMode::Isotopic);
        let isotopic = env.mass(&glucose);
        assert!((average - isotopic).abs() > 1e-3);
    }

    #[test]
    fn uncertainty_is_quadrature_and_average_only() {
        let mut env = Environment::new();
        let water = env.parse("H2O").unwrap();
        let expected = (2.0_f64 * 0.00007).powi(2) + 0.0003_f64.powi(2);
        assert_relative_eq!(env.uncertainty(&water), expected.sqrt(), epsilon = 1e-9);
        env.set_mode(MassMode::Isotopic);
        assert_relative_eq!(env.uncertainty(&water), 0.0);
    }

    #[test]
    fn tagged_occurrences_override_only_their_own_mass() {
        let mut env = Environment::new();
        env.set_mode(MassMode::Isotopic);
        let labelled = env.parse("^13C1C1").unwrap();
        assert_relative_eq!(env.mass(&labelled), 25.0, epsilon = 1e-9);
        // The element table itself is untouched.
        assert_relative_eq!(
            env.elements().get("C").unwrap().mass(MassMode::Isotopic),
            12.0
        );
    }

    #[test]
    fn labelled_benzene_hydrate() {
        let mut env = Environment::new();
        env.set_mode(MassMode::Isotopic);
        let composition = env.parse("^13C6H6-.1H2O").unwrap();
        assert_relative_eq!(env.mass(&composition), 85.848006661783, epsilon = 1e-7);
        assert_relative_eq!(composition.charge(), -6.0, epsilon = 1e-9);
    }

    #[test]
    fn percent_composition_sums_to_hundred() {
        let env = Environment::new();
        let caffeine = env.parse("C8H10N4O2").unwrap();
        let shares = env.percent_composition(&caffeine);
        assert_eq!(shares.len(), 4);
        assert_eq!(shares[0].symbol, "C");
        assert_eq!(shares[1].symbol, "H");
        let total: f64 = shares.iter().map(|s| s.percent).sum();
        assert_relative_eq!(total, 100.0, epsilon = 1e-9);
        // Carbon carries about half the mass of caffeine.
        assert_relative_eq!(shares[0].percent, 49.48, epsilon = 0.01);
    }

    #[test]
    fn format_mass_modes() {
        let mut env = Environment::new();
        env.options.std_dev_mode = StdDevMode::Short;
        assert_eq!(env.format_mass(18.01528, 0.0004), "18.0153(4)");
        env.options.std_dev_mode = StdDevMode::Decimal;
        assert_eq!(env.format_mass(18.01528, 0.0004), "18.0153 (±0.0004)");
        // No uncertainty falls back to significant digits.
        assert_eq!(env.format_mass(18.01528, 0.0), "18.015");
    }
}
