//! The isotope distribution engine: convolve the per element isotope
//! distributions of a composition into a whole molecule stick spectrum,
//! optionally converted to m/z, plus a Gaussian display approximation.
//!
//! Unrestricted pairwise convolution is exponential in atom count, so every
//! intermediate list is binned by a minimum mass resolution and pruned
//! below a probability floor. Both limits are tunable per environment.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::cancel::CancelToken;
use crate::environment::Environment;
use crate::error::ComputeError;

/// One stick of an isotope spectrum: a mass (or m/z) and its probability.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub struct Stick {
    /// Mass in Dalton, or m/z after charge conversion.
    pub mass: f64,
    /// Normalized probability of this isotopologue bin.
    pub probability: f64,
}

impl std::fmt::Display for Stick {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.5} ({:.7})", self.mass, self.probability)
    }
}

/// Binning and pruning limits bounding the convolution working set.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub struct ConvolutionSettings {
    /// Sticks closer together than this merge into one probability
    /// weighted bin.
    pub mass_resolution: f64,
    /// Sticks below this probability are dropped after each convolution
    /// step.
    pub probability_floor: f64,
}

impl Default for ConvolutionSettings {
    fn default() -> Self {
        Self {
            mass_resolution: 1e-3,
            probability_floor: 1e-9,
        }
    }
}

/// The header strings of the rendered report, supplied by the caller so
/// the text matches its display language.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct IsotopeHeaders {
    /// Title line prefix, completed with the formula.
    pub title: String,
    /// Column header for the mass (or m/z) column.
    pub mass_label: String,
    /// Column header for the probability column.
    pub fraction_label: String,
    /// Column header for the relative intensity column.
    pub intensity_label: String,
}

impl Default for IsotopeHeaders {
    fn default() -> Self {
        Self {
            title: "Isotopic Abundances for".to_string(),
            mass_label: "Mass/Charge".to_string(),
            fraction_label: "Fraction".to_string(),
            intensity_label: "Intensity".to_string(),
        }
    }
}

/// The result of an isotope distribution computation: the rendered report
/// and the raw stick spectrum it was rendered from.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct IsotopicDistribution {
    /// Display table built from the caller supplied headers.
    pub report: String,
    /// Mass ascending sticks, probabilities summing to ~1.
    pub sticks: Vec<Stick>,
}

impl Environment {
    /// Compute the isotopic distribution of `formula`.
    ///
    /// Abbreviations and isotope tags are fully expanded first. Each
    /// element's single atom distribution is self-convolved to its atom
    /// count, the per element results are convolved together, and the
    /// spectrum is renormalized and sorted by mass. With a non-zero
    /// `charge_state` every stick is converted to m/z, adding the
    /// environment's charge carrier mass per charge when
    /// `add_proton_charge_carrier` is set.
    ///
    /// Isotope-tagged occurrences contribute a single exact stick. Species
    /// with a negative count are skipped, and fractional counts are rounded
    /// to the nearest atom.
    ///
    /// # Errors
    /// A parse failure of `formula`, or [`ComputeError::Aborted`] when the
    /// token is cancelled (checked once per convolution round; no partial
    /// results are returned).
    pub fn isotopic_distribution(
        &self,
        formula: &str,
        charge_state: i32,
        add_proton_charge_carrier: bool,
        headers: &IsotopeHeaders,
        cancel: &CancelToken,
    ) -> Result<IsotopicDistribution, ComputeError> {
        let composition = self.parse(formula)?;
        let settings = self.convolution;

        let mut spectrum = vec![Stick {
            mass: 0.0,
            probability: 1.0,
        }];
        for &(species, count) in composition.entries() {
            if cancel.is_cancelled() {
                return Err(ComputeError::Aborted);
            }
            if count <= 0.0 {
                debug!("skipping species with non-positive count {count}");
                continue;
            }
            if (count - count.round()).abs() > 1e-9 {
                debug!("rounding fractional count {count} to whole atoms");
            }
            let atoms = count.round() as u64;
            if atoms == 0 {
                continue;
            }
            let single: Vec<Stick> = match species.tag() {
                Some(mass) => vec![Stick {
                    mass,
                    probability: 1.0,
                }],
                None => self
                    .elements()
                    .by_index(species.element_index())
                    .isotopes()
                    .iter()
                    .map(|isotope| Stick {
                        mass: isotope.mass,
                        probability: isotope.abundance,
                    })
                    .collect(),
            };
            let powered = self_convolve(&single, atoms, settings, cancel)?;
            spectrum = convolve(&spectrum, &powered, settings);
        }

        let total: f64 = spectrum.iter().map(|s| s.probability).sum();
        if total > 0.0 {
            for stick in &mut spectrum {
                stick.probability /= total;
            }
        }
        spectrum.sort_by(|a, b| a.mass.total_cmp(&b.mass));

        if charge_state != 0 {
            let carrier = if add_proton_charge_carrier {
                self.charge_carrier_mass
            } else {
                0.0
            };
            let z = f64::from(charge_state);
            for stick in &mut spectrum {
                stick.mass = (stick.mass + z * carrier) / z;
            }
            spectrum.sort_by(|a, b| a.mass.total_cmp(&b.mass));
        }

        let report = render_report(formula, &spectrum, headers);
        Ok(IsotopicDistribution { report, sticks: spectrum })
    }
}

/// Convolve `base` with itself `atoms` times by exponentiation through
/// repeated squaring, binning and pruning after every multiplication.
fn self_convolve(
    base: &[Stick],
    atoms: u64,
    settings: ConvolutionSettings,
    cancel: &CancelToken,
) -> Result<Vec<Stick>, ComputeError> {
    let mut result = vec![Stick {
        mass: 0.0,
        probability: 1.0,
    }];
    let mut square = compact(base.to_vec(), settings);
    let mut remaining = atoms;
    loop {
        if cancel.is_cancelled() {
            return Err(ComputeError::Aborted);
        }
        if remaining & 1 == 1 {
            result = convolve(&result, &square, settings);
        }
        remaining >>= 1;
        if remaining == 0 {
            return Ok(result);
        }
        square = convolve(&square, &square, settings);
    }
}

/// Pairwise discrete convolution: all mass sums with probability products,
/// then binned and pruned.
fn convolve(a: &[Stick], b: &[Stick], settings: ConvolutionSettings) -> Vec<Stick> {
    let mut sticks = Vec::with_capacity(a.len() * b.len());
    for x in a {
        for y in b {
            sticks.push(Stick {
                mass: x.mass + y.mass,
                probability: x.probability * y.probability,
            });
        }
    }
    compact(sticks, settings)
}

/// Merge sticks within the mass resolution into probability weighted bins
/// and drop those below the probability floor.
fn compact(mut sticks: Vec<Stick>, settings: ConvolutionSettings) -> Vec<Stick> {
    sticks.sort_by(|a, b| a.mass.total_cmp(&b.mass));
    let mut merged: Vec<Stick> = Vec::with_capacity(sticks.len());
    let mut bin_start = f64::NEG_INFINITY;
    let mut weighted_mass = 0.0;
    let mut probability = 0.0;
    for stick in sticks {
        if stick.mass - bin_start <= settings.mass_resolution {
            weighted_mass += stick.mass * stick.probability;
            probability += stick.probability;
        } else {
            if probability > settings.probability_floor {
                merged.push(Stick {
                    mass: weighted_mass / probability,
                    probability,
                });
            }
            bin_start = stick.mass;
            weighted_mass = stick.mass * stick.probability;
            probability = stick.probability;
        }
    }
    if probability > settings.probability_floor {
        merged.push(Stick {
            mass: weighted_mass / probability,
            probability,
        });
    }
    merged
}

fn render_report(formula: &str, sticks: &[Stick], headers: &IsotopeHeaders) -> String {
    let maximum = sticks
        .iter()
        .map(|s| s.probability)
        .fold(f64::MIN_POSITIVE, f64::max);
    let mut report = format!("{} {formula}\n\n", headers.title);
    report.push_str(&format!(
        "{}\t{}\t{}\n",
        headers.mass_label, headers.fraction_label, headers.intensity_label
    ));
    for stick in sticks {
        report.push_str(&format!(
            "{:.5}\t{:.7}\t{:.2}\n",
            stick.mass,
            stick.probability,
            stick.probability / maximum * 100.0
        ));
    }
    report
}

/// Replace each stick with a Gaussian whose width follows from the mass
/// resolving power `resolution` at `resolution_mass`, summed on a regular
/// mass grid whose density follows from `quality_factor` (clamped to
/// 1..=75). A display approximation, never used for exact mass answers.
///
/// # Errors
/// When `resolution` or `resolution_mass` is not strictly positive.
pub fn gaussian_profile(
    sticks: &[Stick],
    resolution: f64,
    resolution_mass: f64,
    quality_factor: u32,
) -> Result<Vec<(f64, f64)>, ComputeError> {
    if sticks.is_empty() {
        return Ok(Vec::new());
    }
    if resolution <= 0.0 {
        return Err(ComputeError::InvalidParameter(format!(
            "resolution must be greater than 0 (got {resolution})"
        )));
    }
    if resolution_mass <= 0.0 {
        return Err(ComputeError::InvalidParameter(format!(
            "resolution mass must be greater than 0 (got {resolution_mass})"
        )));
    }
    let quality = quality_factor.clamp(1, 75);
    let fwhm = resolution_mass / resolution;
    let sigma = fwhm / (2.0 * (2.0 * 2.0_f64.ln()).sqrt());
    let window = 5.0 * fwhm;
    let mut step = fwhm / f64::from(quality);

    let low = sticks
        .iter()
        .map(|s| s.mass)
        .fold(f64::INFINITY, f64::min)
        - window;
    let high = sticks
        .iter()
        .map(|s| s.mass)
        .fold(f64::NEG_INFINITY, f64::max)
        + window;
    let mut points = ((high - low) / step).ceil() as usize + 1;
    // Keep pathological spans displayable rather than exhausting memory.
    const MAX_POINTS: usize = 2_000_000;
    if points > MAX_POINTS {
        step = (high - low) / (MAX_POINTS - 1) as f64;
        points = MAX_POINTS;
    }

    let mut curve: Vec<(f64, f64)> = (0..points)
        .map(|i| (low + i as f64 * step, 0.0))
        .collect();
    let reach = (window / step).ceil() as usize;
    for stick in sticks {
        let center = ((stick.mass - low) / step).round() as isize;
        let from = center.saturating_sub(reach as isize).max(0) as usize;
        let to = ((center + reach as isize) as usize).min(points - 1);
        for point in &mut curve[from..=to] {
            let offset = point.0 - stick.mass;
            point.1 += stick.probability * (-offset * offset / (2.0 * sigma * sigma)).exp();
        }
    }
    Ok(curve)
}
