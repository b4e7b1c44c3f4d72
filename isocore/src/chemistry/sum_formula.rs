use std::collections::HashMap;

use thiserror::Error;

use crate::algorithm::isotope::{CoarsePatternGenerator, IsotopeDistribution};
use crate::chemistry::constants::MASS_PROTON;
use crate::chemistry::elements::{
    atomic_weights_average, atomic_weights_mono_isotopic, labeled_atomic_weights,
};
use crate::data::spectrum::MzSpectrum;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormulaError {
    #[error("unknown element: {0}")]
    UnknownElement(String),
    #[error("malformed formula: {0}")]
    Malformed(String),
}

/// calculate the m/z of an ion from its monoisotopic mass and charge
///
/// A charge of zero returns the neutral mass unchanged.
///
/// # Examples
///
/// ```
/// use isocore::chemistry::sum_formula::calculate_mz;
///
/// let mz = calculate_mz(1000.0, 2);
/// assert!((mz - 501.007276466621).abs() < 1e-9);
/// ```
pub fn calculate_mz(monoisotopic_mass: f64, charge: i32) -> f64 {
    if charge == 0 {
        return monoisotopic_mass;
    }
    (monoisotopic_mass + charge as f64 * MASS_PROTON) / charge as f64
}

/// A chemical sum formula, e.g. "C6H12O6" or "[13]C2C4H12O6".
///
/// Isotope labeled atoms are written with the nucleon number in square
/// brackets in front of the element symbol and contribute a single exact
/// mass instead of a natural isotope ladder.
#[derive(Debug, Clone)]
pub struct SumFormula {
    pub formula: String,
    pub elements: HashMap<String, i32>,
}

impl SumFormula {
    /// # Examples
    ///
    /// ```
    /// use isocore::chemistry::sum_formula::SumFormula;
    ///
    /// let glucose = SumFormula::new("C6H12O6").unwrap();
    /// assert_eq!(glucose.elements["C"], 6);
    /// assert!(SumFormula::new("Xy2").is_err());
    /// ```
    pub fn new(formula: &str) -> Result<Self, FormulaError> {
        let elements = parse_formula(formula)?;
        Ok(SumFormula {
            formula: formula.to_string(),
            elements,
        })
    }

    /// build a formula from an element count table, e.g. from an averagine
    /// estimate
    pub fn from_counts(elements: HashMap<String, i32>) -> Self {
        let mut symbols: Vec<&String> = elements.keys().collect();
        symbols.sort();
        let formula = symbols
            .iter()
            .map(|symbol| format!("{}{}", symbol, elements[*symbol]))
            .collect::<Vec<String>>()
            .join("");
        SumFormula { formula, elements }
    }

    pub fn monoisotopic_weight(&self) -> f64 {
        let atomic_weights = atomic_weights_mono_isotopic();
        let labeled_weights = labeled_atomic_weights();
        self.elements.iter().fold(0.0, |acc, (element, count)| {
            let weight = labeled_weights
                .get(element.as_str())
                .copied()
                .unwrap_or_else(|| atomic_weights[element.as_str()]);
            acc + weight * *count as f64
        })
    }

    pub fn average_weight(&self) -> f64 {
        let atomic_weights = atomic_weights_average();
        let labeled_weights = labeled_atomic_weights();
        self.elements.iter().fold(0.0, |acc, (element, count)| {
            let weight = labeled_weights
                .get(element.as_str())
                .copied()
                .unwrap_or_else(|| atomic_weights[element.as_str()]);
            acc + weight * *count as f64
        })
    }

    /// theoretical isotope pattern of the neutral molecule
    pub fn isotope_distribution(&self, generator: &CoarsePatternGenerator) -> IsotopeDistribution {
        generator.isotope_distribution(self)
    }

    /// isotope pattern rendered to m/z at the given charge state
    pub fn mz_spectrum(&self, generator: &CoarsePatternGenerator, charge: i32) -> MzSpectrum {
        let distribution = self.isotope_distribution(generator);
        let mz = distribution
            .entries
            .iter()
            .map(|&(mass, _)| calculate_mz(mass, charge))
            .collect();
        let intensity = distribution.entries.iter().map(|&(_, p)| p).collect();
        MzSpectrum::new(mz, intensity)
    }
}

fn parse_formula(formula: &str) -> Result<HashMap<String, i32>, FormulaError> {
    let atomic_weights = atomic_weights_mono_isotopic();
    let labeled_weights = labeled_atomic_weights();
    let mut element_counts: HashMap<String, i32> = HashMap::new();
    let mut chars = formula.chars().peekable();

    while let Some(c) = chars.next() {
        let mut symbol = String::new();

        if c == '[' {
            symbol.push('[');
            while let Some(&d) = chars.peek() {
                if d.is_ascii_digit() {
                    symbol.push(d);
                    chars.next();
                } else {
                    break;
                }
            }
            match chars.next() {
                Some(']') => symbol.push(']'),
                _ => return Err(FormulaError::Malformed(formula.to_string())),
            }
            match chars.next() {
                Some(e) if e.is_ascii_uppercase() => symbol.push(e),
                _ => return Err(FormulaError::Malformed(formula.to_string())),
            }
        } else if c.is_ascii_uppercase() {
            symbol.push(c);
        } else {
            return Err(FormulaError::Malformed(formula.to_string()));
        }

        while let Some(&l) = chars.peek() {
            if l.is_ascii_lowercase() {
                symbol.push(l);
                chars.next();
            } else {
                break;
            }
        }

        let mut digits = String::new();
        while let Some(&d) = chars.peek() {
            if d.is_ascii_digit() {
                digits.push(d);
                chars.next();
            } else {
                break;
            }
        }
        let count = if digits.is_empty() {
            1
        } else {
            digits
                .parse::<i32>()
                .map_err(|_| FormulaError::Malformed(formula.to_string()))?
        };

        let known = if symbol.starts_with('[') {
            labeled_weights.contains_key(symbol.as_str())
        } else {
            atomic_weights.contains_key(symbol.as_str())
        };
        if !known {
            return Err(FormulaError::UnknownElement(symbol));
        }
        *element_counts.entry(symbol).or_insert(0) += count;
    }

    Ok(element_counts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_simple_formula() {
        let formula = SumFormula::new("C6H12O6").unwrap();
        assert_eq!(formula.elements["C"], 6);
        assert_eq!(formula.elements["H"], 12);
        assert_eq!(formula.elements["O"], 6);
    }

    #[test]
    fn parse_multi_letter_and_repeats() {
        let formula = SumFormula::new("NaClNaCl").unwrap();
        assert_eq!(formula.elements["Na"], 2);
        assert_eq!(formula.elements["Cl"], 2);
    }

    #[test]
    fn parse_labeled_atoms() {
        let formula = SumFormula::new("[13]C2C4H12O6").unwrap();
        assert_eq!(formula.elements["[13]C"], 2);
        assert_eq!(formula.elements["C"], 4);
        // two heavy carbons push the weight up by ~2 mass units
        let light = SumFormula::new("C6H12O6").unwrap();
        let delta = formula.monoisotopic_weight() - light.monoisotopic_weight();
        assert!((delta - 2.0 * 1.00335483507).abs() < 1e-9);
    }

    #[test]
    fn parse_errors() {
        assert!(matches!(
            SumFormula::new("Xy2"),
            Err(FormulaError::UnknownElement(_))
        ));
        assert!(matches!(
            SumFormula::new("c6"),
            Err(FormulaError::Malformed(_))
        ));
        assert!(matches!(
            SumFormula::new("[13C"),
            Err(FormulaError::Malformed(_))
        ));
    }

    #[test]
    fn monoisotopic_weight_water() {
        let water = SumFormula::new("H2O").unwrap();
        assert!((water.monoisotopic_weight() - 18.0105646863).abs() < 1e-6);
    }

    #[test]
    fn average_above_monoisotopic() {
        let peptide_like = SumFormula::new("C50H80N14O15S").unwrap();
        assert!(peptide_like.average_weight() > peptide_like.monoisotopic_weight());
    }
}
