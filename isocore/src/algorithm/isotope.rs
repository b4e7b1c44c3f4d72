use std::collections::{HashMap, HashSet};

use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::chemistry::constants::MASS_C13_C12_SHIFT;
use crate::chemistry::elements::{
    atomic_weights_average, isotopic_abundance, isotopic_weights, labeled_atomic_weights,
};
use crate::chemistry::sum_formula::SumFormula;

// helper types for easier reading
pub type Mass = f64;
pub type Abundance = f64;

/// A coarse isotope pattern: (mass, abundance) pairs sorted by increasing
/// mass, one entry per nominal isotope peak.
///
/// Abundances are not required to sum to one at all times, partial patterns
/// occur during conditioning. `renormalize` restores the sum-to-one state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IsotopeDistribution {
    pub entries: Vec<(Mass, Abundance)>,
}

impl IsotopeDistribution {
    pub fn new(entries: Vec<(Mass, Abundance)>) -> Self {
        IsotopeDistribution { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total_abundance(&self) -> f64 {
        self.entries.iter().map(|&(_, p)| p).sum()
    }

    /// rescale abundances to sum to one
    ///
    /// An all-zero or empty distribution is left untouched instead of
    /// producing NaN entries.
    pub fn renormalize(&mut self) {
        let total = self.total_abundance();
        if total > 0.0 {
            for entry in self.entries.iter_mut() {
                entry.1 /= total;
            }
        }
    }

    pub fn scale(&mut self, factor: f64) {
        for entry in self.entries.iter_mut() {
            entry.1 *= factor;
        }
    }

    /// remove all entries below the abundance cutoff
    pub fn trim_intensities(&mut self, cutoff: f64) {
        self.entries.retain(|&(_, p)| p >= cutoff);
    }

    /// remove trailing entries below the abundance cutoff
    pub fn trim_right(&mut self, cutoff: f64) {
        while let Some(&(_, p)) = self.entries.last() {
            if p < cutoff {
                self.entries.pop();
            } else {
                break;
            }
        }
    }

    /// remove leading entries below the abundance cutoff
    pub fn trim_left(&mut self, cutoff: f64) {
        let keep = self
            .entries
            .iter()
            .position(|&(_, p)| p >= cutoff)
            .unwrap_or(self.entries.len());
        self.entries.drain(..keep);
    }

    pub fn most_abundant(&self) -> Option<(Mass, Abundance)> {
        self.entries
            .iter()
            .copied()
            .max_by(|a, b| a.1.total_cmp(&b.1))
    }

    pub fn sort_by_mass(&mut self) {
        self.entries.sort_by(|a, b| a.0.total_cmp(&b.0));
    }

    pub fn sort_by_intensity(&mut self) {
        self.entries.sort_by(|a, b| b.1.total_cmp(&a.1));
    }
}

/// fill missing nominal isotope slots with zero abundance entries
///
/// Convolution arithmetic walks dense arrays indexed by nominal offset, so
/// gapped ladders (e.g. Br with isotopes at 79 and 81 Da) need explicit
/// zero entries in between.
pub fn fill_gaps(dist: &[(Mass, Abundance)]) -> Vec<(Mass, Abundance)> {
    let mut out: Vec<(Mass, Abundance)> = Vec::with_capacity(dist.len());
    for &(mass, abundance) in dist {
        if let Some(&(prev_mass, _)) = out.last() {
            let mut gap = (mass - prev_mass).round() as i64;
            let mut fill = prev_mass;
            while gap > 1 {
                fill += 1.0;
                out.push((fill, 0.0));
                gap -= 1;
            }
        }
        out.push((mass, abundance));
    }
    out
}

/// Computes coarse (unit mass resolution) isotope patterns of sum formulas
/// by convolution of the per-element natural isotope ladders.
///
/// `max_isotope` bounds the pattern length: after every convolution the
/// result is truncated to at most `max_isotope + 1` entries, 0 means
/// unbounded. `round_masses` reports nominal integer masses instead of
/// accurate ones, which is convenient when matching against centroided low
/// resolution peaks.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CoarsePatternGenerator {
    pub max_isotope: usize,
    pub round_masses: bool,
}

impl CoarsePatternGenerator {
    pub fn new(max_isotope: usize) -> Self {
        CoarsePatternGenerator {
            max_isotope,
            round_masses: false,
        }
    }

    fn truncated_len(&self, len: usize) -> usize {
        if self.max_isotope != 0 && len > self.max_isotope + 1 {
            self.max_isotope + 1
        } else {
            len
        }
    }

    /// convolve two isotope patterns
    ///
    /// Both inputs are gap filled first. Output masses are pre-filled as
    /// `left[0] + right[0] + k`; the abundance of slot k is the discrete
    /// convolution sum over all i + j == k, accumulated from high indices
    /// to low so that the small contributions are added first.
    ///
    /// # Arguments
    ///
    /// * `left` - first pattern, (mass, abundance) pairs with ascending mass
    /// * `right` - second pattern
    ///
    /// Returns:
    ///
    /// * `Vec<(f64, f64)>` - combined pattern of length
    ///   `left.len() + right.len() - 1`, truncated to `max_isotope + 1`;
    ///   empty if either input is empty
    ///
    /// # Examples
    ///
    /// ```
    /// use isocore::algorithm::isotope::CoarsePatternGenerator;
    ///
    /// let generator = CoarsePatternGenerator::default();
    /// let dist = vec![(100.0, 0.5), (101.0, 0.5)];
    /// let result = generator.convolve(&dist, &dist);
    /// assert_eq!(result, vec![(200.0, 0.25), (201.0, 0.5), (202.0, 0.25)]);
    /// ```
    pub fn convolve(
        &self,
        left: &[(Mass, Abundance)],
        right: &[(Mass, Abundance)],
    ) -> Vec<(Mass, Abundance)> {
        if left.is_empty() || right.is_empty() {
            return Vec::new();
        }

        let left = fill_gaps(left);
        let right = fill_gaps(right);
        let r_max = self.truncated_len(left.len() + right.len() - 1);

        let mut result: Vec<(Mass, Abundance)> = (0..r_max)
            .map(|k| (left[0].0 + right[0].0 + k as f64, 0.0))
            .collect();

        for i in (0..left.len().min(r_max)).rev() {
            for j in (0..right.len().min(r_max - i)).rev() {
                result[i + j].1 += left[i].1 * right[j].1;
            }
        }

        result
    }

    /// convolve a pattern with itself n times using square and multiply
    ///
    /// Runs O(log n) convolutions instead of n. `n == 1` returns the input
    /// unchanged and the exponent bit loop is clamped to the width of
    /// `usize`, so arbitrarily large element counts terminate.
    ///
    /// # Examples
    ///
    /// ```
    /// use isocore::algorithm::isotope::CoarsePatternGenerator;
    ///
    /// let generator = CoarsePatternGenerator::default();
    /// let dist = vec![(100.0, 0.5), (101.0, 0.5)];
    /// let result = generator.convolve_pow(&dist, 2);
    /// assert_eq!(result, vec![(200.0, 0.25), (201.0, 0.5), (202.0, 0.25)]);
    /// ```
    pub fn convolve_pow(&self, input: &[(Mass, Abundance)], n: usize) -> Vec<(Mass, Abundance)> {
        if n == 0 {
            return vec![(0.0, 1.0)]; // the delta pattern
        }
        if n == 1 {
            return input.to_vec();
        }

        // number of bits in the exponent, clamped to the counter width
        let mut log2n: u32 = 0;
        while log2n < usize::BITS && (n >> log2n) != 0 {
            log2n += 1;
        }

        let input = fill_gaps(input);

        // the top bit is always set, start from the input itself
        let mut result = input.clone();
        for bit in (0..log2n - 1).rev() {
            result = self.convolve(&result, &result);
            if (n >> bit) & 1 == 1 {
                result = self.convolve(&result, &input);
            }
        }
        result
    }

    /// replace the synthetic masses left behind by convolution with real
    /// ones, anchored at the monoisotopic mass
    ///
    /// Slot k becomes `mono_mass + k * (mass((13)C) - mass((12)C))`; the
    /// coarse unit of isotope spacing is the C13 shift no matter which
    /// element contributed the extra neutron. With `round_masses` set the
    /// results are rounded to whole numbers.
    pub fn correct_mass(
        &self,
        dist: &[(Mass, Abundance)],
        mono_mass: f64,
    ) -> Vec<(Mass, Abundance)> {
        dist.iter()
            .enumerate()
            .map(|(k, &(_, abundance))| {
                let mass = mono_mass + k as f64 * MASS_C13_C12_SHIFT;
                let mass = if self.round_masses { mass.round() } else { mass };
                (mass, abundance)
            })
            .collect()
    }

    /// generate the isotope pattern of a sum formula
    ///
    /// Folds the power-convolved per-element ladders, corrects the masses
    /// from the formula's monoisotopic weight and renormalizes. A formula
    /// referencing an element missing from the isotope tables yields an
    /// empty pattern and a warning rather than an error, so one bad formula
    /// cannot abort a batch.
    ///
    /// # Examples
    ///
    /// ```
    /// use isocore::algorithm::isotope::CoarsePatternGenerator;
    /// use isocore::chemistry::sum_formula::SumFormula;
    ///
    /// let generator = CoarsePatternGenerator::new(2);
    /// let carbon = SumFormula::new("C").unwrap();
    /// let pattern = generator.isotope_distribution(&carbon);
    /// assert_eq!(pattern.len(), 2);
    /// assert!((pattern.entries[0].1 - 0.9893).abs() < 1e-9);
    /// ```
    pub fn isotope_distribution(&self, formula: &SumFormula) -> IsotopeDistribution {
        let weights = isotopic_weights();
        let abundances = isotopic_abundance();
        let labeled = labeled_atomic_weights();

        let mut symbols: Vec<(&String, &i32)> = formula.elements.iter().collect();
        symbols.sort();

        let mut result: Vec<(Mass, Abundance)> = vec![(0.0, 1.0)];
        for (symbol, &count) in symbols {
            if count <= 0 {
                continue;
            }
            let element_dist: Vec<(Mass, Abundance)> =
                if let Some(&mass) = labeled.get(symbol.as_str()) {
                    vec![(mass, 1.0)]
                } else {
                    match (weights.get(symbol.as_str()), abundances.get(symbol.as_str())) {
                        (Some(w), Some(a)) => {
                            w.iter().zip(a.iter()).map(|(&m, &p)| (m, p)).collect()
                        }
                        _ => {
                            warn!(
                                "element {} is missing from the isotope tables, \
                                 returning an empty pattern for {}",
                                symbol, formula.formula
                            );
                            return IsotopeDistribution::default();
                        }
                    }
                };
            result = self.convolve(&result, &self.convolve_pow(&element_dist, count as usize));
        }

        let mut dist =
            IsotopeDistribution::new(self.correct_mass(&result, formula.monoisotopic_weight()));
        dist.renormalize();
        dist
    }

    /// condition a fragment isotope pattern on the precursor isotopes that
    /// were co-isolated before fragmentation
    ///
    /// For every fragment slot i the abundance becomes
    /// `fragment[i] * sum over p in precursor_isotopes, p >= i of
    /// complement[p - i]`, exploiting that the events of the complement
    /// carrying exactly p - i extra neutrons are mutually exclusive. A
    /// precursor index beyond what the complement can represent
    /// contributes zero.
    ///
    /// The result is NOT renormalized, so multiple constraints can be
    /// composed before paying the normalization once; callers wanting true
    /// conditional probabilities call `renormalize` on the result. Masses
    /// are rebuilt from `fragment_mono_mass`.
    pub fn calc_fragment_isotope_dist(
        &self,
        fragment_dist: &IsotopeDistribution,
        comp_fragment_dist: &IsotopeDistribution,
        precursor_isotopes: &HashSet<usize>,
        fragment_mono_mass: f64,
    ) -> IsotopeDistribution {
        if fragment_dist.is_empty() || comp_fragment_dist.is_empty() {
            warn!("empty fragment or complement pattern, returning an empty result");
            return IsotopeDistribution::default();
        }

        let fragment = fill_gaps(&fragment_dist.entries);
        let comp = fill_gaps(&comp_fragment_dist.entries);
        let r_max = self.truncated_len(fragment.len());

        let mut result: Vec<(Mass, Abundance)> = vec![(0.0, 0.0); r_max];
        for (i, slot) in result.iter_mut().enumerate() {
            let mut comp_sum = 0.0;
            for &precursor in precursor_isotopes {
                if precursor >= i && precursor - i < comp.len() {
                    comp_sum += comp[precursor - i].1;
                }
            }
            slot.1 = fragment[i].1 * comp_sum;
        }

        IsotopeDistribution::new(self.correct_mass(&result, fragment_mono_mass))
    }

    /// estimate the isotope pattern of a molecule from its average weight
    /// and relative elemental composition
    ///
    /// The ratios are scaled so that the average weight of the rounded
    /// element counts matches the target weight, then the pattern of the
    /// scaled formula is computed.
    pub fn estimate_from_weight_and_comp(
        &self,
        average_weight: f64,
        c: f64,
        h: f64,
        n: f64,
        o: f64,
        s: f64,
        p: f64,
    ) -> IsotopeDistribution {
        let counts = scaled_elemental_counts(average_weight, c, h, n, o, s, p);
        if counts.is_empty() {
            warn!(
                "cannot scale composition to average weight {}, returning an empty pattern",
                average_weight
            );
            return IsotopeDistribution::default();
        }
        self.isotope_distribution(&SumFormula::from_counts(counts))
    }

    /// like `estimate_from_weight_and_comp`, but with an exact sulfur count
    ///
    /// Sulfur isotope spacing shapes the pattern strongly enough that a
    /// known sulfur count is worth fixing; only the remaining elements are
    /// fitted against the residual average weight.
    pub fn estimate_from_weight_and_comp_and_s(
        &self,
        average_weight: f64,
        sulfur: i32,
        c: f64,
        h: f64,
        n: f64,
        o: f64,
        p: f64,
    ) -> IsotopeDistribution {
        let averages = atomic_weights_average();
        let remaining_weight = average_weight - sulfur as f64 * averages["S"];
        if remaining_weight < 0.0 {
            warn!(
                "sulfur count {} exceeds the average weight {}, returning an empty pattern",
                sulfur, average_weight
            );
            return IsotopeDistribution::default();
        }
        let mut counts = scaled_elemental_counts(remaining_weight, c, h, n, o, 0.0, p);
        if sulfur > 0 {
            counts.insert("S".to_string(), sulfur);
        }
        if counts.is_empty() {
            warn!(
                "cannot scale composition to average weight {}, returning an empty pattern",
                average_weight
            );
            return IsotopeDistribution::default();
        }
        self.isotope_distribution(&SumFormula::from_counts(counts))
    }

    pub fn estimate_from_peptide_weight(&self, average_weight: f64) -> IsotopeDistribution {
        self.estimate_from_weight_and_comp(
            average_weight,
            AVERAGINE_C,
            AVERAGINE_H,
            AVERAGINE_N,
            AVERAGINE_O,
            AVERAGINE_S,
            0.0,
        )
    }

    pub fn estimate_from_peptide_weight_and_s(
        &self,
        average_weight: f64,
        sulfur: i32,
    ) -> IsotopeDistribution {
        self.estimate_from_weight_and_comp_and_s(
            average_weight,
            sulfur,
            AVERAGINE_C,
            AVERAGINE_H,
            AVERAGINE_N,
            AVERAGINE_O,
            0.0,
        )
    }

    pub fn estimate_from_rna_weight(&self, average_weight: f64) -> IsotopeDistribution {
        self.estimate_from_weight_and_comp(average_weight, 9.75, 12.25, 3.75, 7.0, 0.0, 1.0)
    }

    pub fn estimate_from_dna_weight(&self, average_weight: f64) -> IsotopeDistribution {
        self.estimate_from_weight_and_comp(average_weight, 9.75, 12.25, 3.75, 6.0, 0.0, 1.0)
    }

    /// estimate the conditioned fragment pattern for a fragment of a
    /// precursor when only the given precursor isotopes were isolated
    ///
    /// Fragment and complementary fragment formulas are estimated from
    /// their average weights, their patterns are computed deep enough to
    /// cover the highest isolated precursor isotope and the fragment
    /// pattern is conditioned on the isolation set. The result is not
    /// renormalized.
    #[allow(clippy::too_many_arguments)]
    pub fn estimate_for_fragment_from_weight_and_comp(
        &self,
        average_weight_precursor: f64,
        average_weight_fragment: f64,
        precursor_isotopes: &HashSet<usize>,
        c: f64,
        h: f64,
        n: f64,
        o: f64,
        s: f64,
        p: f64,
    ) -> IsotopeDistribution {
        let comp_weight = average_weight_precursor - average_weight_fragment;
        if comp_weight < 0.0 || precursor_isotopes.is_empty() {
            warn!(
                "fragment weight {} and precursor weight {} are inconsistent, \
                 returning an empty pattern",
                average_weight_fragment, average_weight_precursor
            );
            return IsotopeDistribution::default();
        }

        let solver = self.fragment_solver(precursor_isotopes);
        let fragment_counts = scaled_elemental_counts(average_weight_fragment, c, h, n, o, s, p);
        let comp_counts = scaled_elemental_counts(comp_weight, c, h, n, o, s, p);
        if fragment_counts.is_empty() || comp_counts.is_empty() {
            warn!(
                "cannot scale composition to fragment weight {} / complement weight {}, \
                 returning an empty pattern",
                average_weight_fragment, comp_weight
            );
            return IsotopeDistribution::default();
        }

        let fragment_formula = SumFormula::from_counts(fragment_counts);
        let fragment = solver.isotope_distribution(&fragment_formula);
        let comp = solver.isotope_distribution(&SumFormula::from_counts(comp_counts));
        self.calc_fragment_isotope_dist(
            &fragment,
            &comp,
            precursor_isotopes,
            fragment_formula.monoisotopic_weight(),
        )
    }

    pub fn estimate_for_fragment_from_peptide_weight(
        &self,
        average_weight_precursor: f64,
        average_weight_fragment: f64,
        precursor_isotopes: &HashSet<usize>,
    ) -> IsotopeDistribution {
        self.estimate_for_fragment_from_weight_and_comp(
            average_weight_precursor,
            average_weight_fragment,
            precursor_isotopes,
            AVERAGINE_C,
            AVERAGINE_H,
            AVERAGINE_N,
            AVERAGINE_O,
            AVERAGINE_S,
            0.0,
        )
    }

    /// fragment conditioning with exact sulfur counts on both sides
    pub fn estimate_for_fragment_from_peptide_weight_and_s(
        &self,
        average_weight_precursor: f64,
        sulfur_precursor: i32,
        average_weight_fragment: f64,
        sulfur_fragment: i32,
        precursor_isotopes: &HashSet<usize>,
    ) -> IsotopeDistribution {
        let comp_weight = average_weight_precursor - average_weight_fragment;
        let comp_sulfur = sulfur_precursor - sulfur_fragment;
        if comp_weight < 0.0 || comp_sulfur < 0 || precursor_isotopes.is_empty() {
            warn!(
                "fragment and precursor weight or sulfur counts are inconsistent, \
                 returning an empty pattern"
            );
            return IsotopeDistribution::default();
        }

        let solver = self.fragment_solver(precursor_isotopes);
        let fragment = solver.estimate_from_peptide_weight_and_s(
            average_weight_fragment,
            sulfur_fragment,
        );
        let comp = solver.estimate_from_peptide_weight_and_s(comp_weight, comp_sulfur);
        if fragment.is_empty() || comp.is_empty() {
            return IsotopeDistribution::default();
        }
        // the estimated pattern is already anchored at the fragment's
        // monoisotopic mass
        let mono_mass = fragment.entries[0].0;
        self.calc_fragment_isotope_dist(&fragment, &comp, precursor_isotopes, mono_mass)
    }

    pub fn estimate_for_fragment_from_rna_weight(
        &self,
        average_weight_precursor: f64,
        average_weight_fragment: f64,
        precursor_isotopes: &HashSet<usize>,
    ) -> IsotopeDistribution {
        self.estimate_for_fragment_from_weight_and_comp(
            average_weight_precursor,
            average_weight_fragment,
            precursor_isotopes,
            9.75,
            12.25,
            3.75,
            7.0,
            0.0,
            1.0,
        )
    }

    pub fn estimate_for_fragment_from_dna_weight(
        &self,
        average_weight_precursor: f64,
        average_weight_fragment: f64,
        precursor_isotopes: &HashSet<usize>,
    ) -> IsotopeDistribution {
        self.estimate_for_fragment_from_weight_and_comp(
            average_weight_precursor,
            average_weight_fragment,
            precursor_isotopes,
            9.75,
            12.25,
            3.75,
            6.0,
            0.0,
            1.0,
        )
    }

    /// solver for the fragment / complement patterns, deep enough to cover
    /// the highest isolated precursor isotope
    fn fragment_solver(&self, precursor_isotopes: &HashSet<usize>) -> CoarsePatternGenerator {
        let max_depth = precursor_isotopes.iter().max().copied().unwrap_or(0) + 1;
        CoarsePatternGenerator {
            max_isotope: max_depth,
            round_masses: false,
        }
    }
}

// Averagine model: average elemental composition per 1 Da of peptide
const AVERAGINE_C: f64 = 4.9384;
const AVERAGINE_H: f64 = 7.7583;
const AVERAGINE_N: f64 = 1.3577;
const AVERAGINE_O: f64 = 1.4773;
const AVERAGINE_S: f64 = 0.0417;

/// scale stoichiometric element ratios so the rounded counts reach the
/// target average weight
fn scaled_elemental_counts(
    average_weight: f64,
    c: f64,
    h: f64,
    n: f64,
    o: f64,
    s: f64,
    p: f64,
) -> HashMap<String, i32> {
    let averages = atomic_weights_average();
    let ratios = [("C", c), ("H", h), ("N", n), ("O", o), ("S", s), ("P", p)];
    let average_total: f64 = ratios.iter().map(|&(e, r)| averages[e] * r).sum();
    if average_total <= 0.0 || average_weight <= 0.0 {
        return HashMap::new();
    }
    let norm = average_weight / average_total;
    ratios
        .iter()
        .map(|&(e, r)| (e.to_string(), (r * norm).round() as i32))
        .filter(|&(_, count)| count > 0)
        .collect()
}

/// generate isotope patterns for a batch of formulas using multiple threads
///
/// Each formula is an independent unit of work, the element tables are only
/// read.
pub fn isotope_distributions_for_formulas(
    formulas: &[SumFormula],
    generator: &CoarsePatternGenerator,
    num_threads: usize,
) -> Vec<IsotopeDistribution> {
    let thread_pool = ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .build()
        .unwrap();
    thread_pool.install(|| {
        formulas
            .par_iter()
            .map(|formula| generator.isotope_distribution(formula))
            .collect()
    })
}

/// condition a batch of fragment / complement pattern pairs on the same
/// precursor isolation using multiple threads
pub fn fragment_isotope_distributions(
    pairs: &[(IsotopeDistribution, IsotopeDistribution, f64)],
    precursor_isotopes: &HashSet<usize>,
    generator: &CoarsePatternGenerator,
    num_threads: usize,
) -> Vec<IsotopeDistribution> {
    let thread_pool = ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .build()
        .unwrap();
    thread_pool.install(|| {
        pairs
            .par_iter()
            .map(|(fragment, comp, mono_mass)| {
                generator.calc_fragment_isotope_dist(
                    fragment,
                    comp,
                    precursor_isotopes,
                    *mono_mass,
                )
            })
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const CARBON: [(f64, f64); 2] = [(12.0, 0.9893), (13.00335483507, 0.0107)];
    const BROMINE: [(f64, f64); 2] = [(78.9183376, 0.5069), (80.9162906, 0.4931)];
    const OXYGEN: [(f64, f64); 3] = [
        (15.99491461957, 0.99757),
        (16.99913175650, 0.00038),
        (17.99915961286, 0.00205),
    ];

    fn assert_abundances_close(left: &[(f64, f64)], right: &[(f64, f64)], tol: f64) {
        assert_eq!(left.len(), right.len());
        for (l, r) in left.iter().zip(right.iter()) {
            assert!(
                (l.1 - r.1).abs() < tol,
                "abundance mismatch: {} vs {}",
                l.1,
                r.1
            );
        }
    }

    #[test]
    fn convolve_empty_input_yields_empty_output() {
        let generator = CoarsePatternGenerator::default();
        assert!(generator.convolve(&[], &CARBON).is_empty());
        assert!(generator.convolve(&CARBON, &[]).is_empty());
    }

    #[test]
    fn convolve_conserves_probability() {
        let generator = CoarsePatternGenerator::default();
        let result = generator.convolve(&CARBON, &OXYGEN);
        let total: f64 = result.iter().map(|&(_, p)| p).sum();
        let expected: f64 = CARBON.iter().map(|&(_, p)| p).sum::<f64>()
            * OXYGEN.iter().map(|&(_, p)| p).sum::<f64>();
        assert!((total - expected).abs() < 1e-12);
    }

    #[test]
    fn convolve_commutes() {
        let generator = CoarsePatternGenerator::default();
        let ab = generator.convolve(&CARBON, &BROMINE);
        let ba = generator.convolve(&BROMINE, &CARBON);
        assert_abundances_close(&ab, &ba, 1e-15);
    }

    #[test]
    fn convolve_associates() {
        let generator = CoarsePatternGenerator::default();
        let left = generator.convolve(&generator.convolve(&CARBON, &OXYGEN), &BROMINE);
        let right = generator.convolve(&CARBON, &generator.convolve(&OXYGEN, &BROMINE));
        assert_abundances_close(&left, &right, 1e-12);
    }

    #[test]
    fn convolve_pow_returns_input_for_one() {
        let generator = CoarsePatternGenerator::default();
        let result = generator.convolve_pow(&BROMINE, 1);
        assert_eq!(result, BROMINE.to_vec());
    }

    #[test]
    fn convolve_pow_returns_delta_for_zero() {
        let generator = CoarsePatternGenerator::default();
        assert_eq!(generator.convolve_pow(&CARBON, 0), vec![(0.0, 1.0)]);
    }

    #[test]
    fn convolve_pow_matches_repeated_convolution() {
        let generator = CoarsePatternGenerator::default();
        let mut repeated = CARBON.to_vec();
        for n in 2..=5 {
            repeated = generator.convolve(&repeated, &CARBON);
            let fast = generator.convolve_pow(&CARBON, n);
            assert_abundances_close(&fast, &repeated, 1e-12);
        }
    }

    #[test]
    fn gap_filling_makes_bromine_ladders_dense() {
        let filled = fill_gaps(&BROMINE);
        assert_eq!(filled.len(), 3);
        assert!((filled[1].0 - 79.9183376).abs() < 1e-9);
        assert_eq!(filled[1].1, 0.0);
    }

    #[test]
    fn bromine_self_convolution_keeps_gap_alignment() {
        let generator = CoarsePatternGenerator::default();
        let result = generator.convolve(&BROMINE, &BROMINE);
        let expected = [
            (158.0, 0.5069 * 0.5069),
            (159.0, 0.0),
            (160.0, 2.0 * 0.5069 * 0.4931),
            (161.0, 0.0),
            (162.0, 0.4931 * 0.4931),
        ];
        assert_eq!(result.len(), expected.len());
        for (got, want) in result.iter().zip(expected.iter()) {
            assert_eq!(got.0.round(), want.0);
            assert!((got.1 - want.1).abs() < 1e-12);
        }
    }

    #[test]
    fn carbon_bromine_formula_pattern() {
        let generator = CoarsePatternGenerator::default();
        let formula = SumFormula::new("CBr2").unwrap();
        let pattern = generator.isotope_distribution(&formula);

        let expected = [
            0.254198270573,
            0.002749339427,
            0.494555798854,
            0.005348981146,
            0.240545930573,
            0.002601679427,
        ];
        assert_eq!(pattern.len(), expected.len());
        for (&(_, got), &want) in pattern.entries.iter().zip(expected.iter()) {
            assert!((got - want).abs() < 1e-9);
        }
        // masses anchored at the monoisotopic weight of C + 2 Br
        let mono = 12.0 + 2.0 * 78.9183376;
        assert!((pattern.entries[0].0 - mono).abs() < 1e-9);
        assert_eq!(pattern.entries[0].0.round(), 170.0);
    }

    #[test]
    fn carbon_pattern_with_bounded_depth() {
        let generator = CoarsePatternGenerator::new(2);
        let formula = SumFormula::new("C").unwrap();
        let pattern = generator.isotope_distribution(&formula);
        assert_eq!(pattern.len(), 2);
        assert!((pattern.entries[0].1 - 0.9893).abs() < 1e-12);
        assert!((pattern.entries[1].1 - 0.0107).abs() < 1e-12);
        assert!(pattern.entries[0].1 > pattern.entries[1].1);
        assert!((pattern.entries[0].0 - 12.0).abs() < 1e-12);
    }

    #[test]
    fn glucose_pattern_end_to_end() {
        let generator = CoarsePatternGenerator::default();
        let formula = SumFormula::new("C6H12O6").unwrap();
        let pattern = generator.isotope_distribution(&formula);

        // each element ladder sums to one, so the normalized monoisotopic
        // abundance equals the closed form product
        let expected_p0 = 0.9893f64.powi(6) * 0.999885f64.powi(12) * 0.99757f64.powi(6);
        assert!((pattern.entries[0].1 - expected_p0).abs() < 1e-9);
        assert!((pattern.total_abundance() - 1.0).abs() < 1e-9);
        assert!((pattern.entries[0].0 - 180.06338810).abs() < 1e-6);
        // slots are one coarse neutron shift apart
        let spacing = pattern.entries[1].0 - pattern.entries[0].0;
        assert!((spacing - MASS_C13_C12_SHIFT).abs() < 1e-12);
    }

    #[test]
    fn truncation_caps_pattern_length() {
        let generator = CoarsePatternGenerator::new(3);
        let formula = SumFormula::new("C6H12O6").unwrap();
        let pattern = generator.isotope_distribution(&formula);
        assert_eq!(pattern.len(), 4);
    }

    #[test]
    fn rounded_masses_are_integers() {
        let generator = CoarsePatternGenerator {
            max_isotope: 3,
            round_masses: true,
        };
        let formula = SumFormula::new("C6H12O6").unwrap();
        let pattern = generator.isotope_distribution(&formula);
        for &(mass, _) in &pattern.entries {
            assert_eq!(mass.fract(), 0.0);
        }
        assert_eq!(pattern.entries[0].0, 180.0);
    }

    #[test]
    fn fragment_conditioning_single_isolated_isotope() {
        // precursor C2, fragment C, complement C
        let generator = CoarsePatternGenerator::default();
        let fragment = IsotopeDistribution::new(CARBON.to_vec());
        let comp = IsotopeDistribution::new(CARBON.to_vec());

        let isolated: HashSet<usize> = [0].into_iter().collect();
        let mut conditioned =
            generator.calc_fragment_isotope_dist(&fragment, &comp, &isolated, 12.0);
        // unnormalized: P(fragment = 0) * P(complement = 0)
        assert!((conditioned.entries[0].1 - 0.9893 * 0.9893).abs() < 1e-12);
        assert_eq!(conditioned.entries[1].1, 0.0);
        conditioned.renormalize();
        assert!((conditioned.entries[0].1 - 1.0).abs() < 1e-12);
    }

    #[test]
    fn fragment_conditioning_full_isolation_recovers_natural_pattern() {
        let generator = CoarsePatternGenerator::default();
        let fragment = IsotopeDistribution::new(CARBON.to_vec());
        let comp = IsotopeDistribution::new(CARBON.to_vec());

        let isolated: HashSet<usize> = [0, 1, 2].into_iter().collect();
        let mut conditioned =
            generator.calc_fragment_isotope_dist(&fragment, &comp, &isolated, 12.0);
        conditioned.renormalize();
        assert!((conditioned.entries[0].1 - 0.9893).abs() < 1e-12);
        assert!((conditioned.entries[1].1 - 0.0107).abs() < 1e-12);
        // masses rebuilt from the fragment monoisotopic mass
        assert!((conditioned.entries[0].0 - 12.0).abs() < 1e-12);
        assert!((conditioned.entries[1].0 - 13.0033548378).abs() < 1e-9);
    }

    #[test]
    fn fragment_conditioning_empty_inputs_short_circuit() {
        let generator = CoarsePatternGenerator::default();
        let empty = IsotopeDistribution::default();
        let comp = IsotopeDistribution::new(CARBON.to_vec());
        let isolated: HashSet<usize> = [0].into_iter().collect();
        let result = generator.calc_fragment_isotope_dist(&empty, &comp, &isolated, 0.0);
        assert!(result.is_empty());
    }

    #[test]
    fn averagine_estimate_matches_explicit_composition() {
        let generator = CoarsePatternGenerator::new(3);
        let from_peptide = generator.estimate_from_peptide_weight(1000.0);
        let explicit = generator.estimate_from_weight_and_comp(
            1000.0, 4.9384, 7.7583, 1.3577, 1.4773, 0.0417, 0.0,
        );
        assert_eq!(from_peptide, explicit);
        assert_eq!(from_peptide.len(), 4);
        assert!((from_peptide.total_abundance() - 1.0).abs() < 1e-9);
        assert!(from_peptide.entries[0].1 > from_peptide.entries[3].1);
    }

    #[test]
    fn averagine_estimate_rejects_degenerate_weight() {
        let generator = CoarsePatternGenerator::new(3);
        assert!(generator.estimate_from_peptide_weight(0.0).is_empty());
        assert!(generator
            .estimate_from_weight_and_comp(1000.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0)
            .is_empty());
    }

    #[test]
    fn sulfur_count_changes_the_estimate() {
        let generator = CoarsePatternGenerator::new(3);
        let without = generator.estimate_from_peptide_weight_and_s(1000.0, 0);
        let with = generator.estimate_from_peptide_weight_and_s(1000.0, 2);
        assert!((without.total_abundance() - 1.0).abs() < 1e-9);
        assert!((with.total_abundance() - 1.0).abs() < 1e-9);
        // the heavy sulfur isotope feeds the M+2 slot
        assert!(with.entries[2].1 > without.entries[2].1);
    }

    #[test]
    fn fragment_estimate_with_full_isolation_matches_unconditioned() {
        let generator = CoarsePatternGenerator::default();
        let isolated: HashSet<usize> = (0..20).collect();
        let mut conditioned = generator.estimate_for_fragment_from_peptide_weight(
            2000.0, 1000.0, &isolated,
        );
        conditioned.renormalize();

        let solver = CoarsePatternGenerator::new(21);
        let mut unconditioned = solver.estimate_from_peptide_weight(1000.0);
        unconditioned.renormalize();

        for (got, want) in conditioned
            .entries
            .iter()
            .zip(unconditioned.entries.iter())
            .take(3)
        {
            assert!((got.1 - want.1).abs() < 1e-6);
        }
    }

    #[test]
    fn fragment_estimate_rejects_inconsistent_weights() {
        let generator = CoarsePatternGenerator::default();
        let isolated: HashSet<usize> = [0, 1].into_iter().collect();
        let result =
            generator.estimate_for_fragment_from_peptide_weight(100.0, 200.0, &isolated);
        assert!(result.is_empty());
        let result = generator.estimate_for_fragment_from_peptide_weight_and_s(
            200.0, 0, 100.0, 1, &isolated,
        );
        assert!(result.is_empty());
    }

    #[test]
    fn renormalize_handles_zero_total() {
        let mut dist = IsotopeDistribution::new(vec![(100.0, 0.0), (101.0, 0.0)]);
        dist.renormalize();
        assert_eq!(dist.entries[0].1, 0.0);
        let mut empty = IsotopeDistribution::default();
        empty.renormalize();
        assert!(empty.is_empty());
    }

    #[test]
    fn trim_operations() {
        let mut dist = IsotopeDistribution::new(vec![
            (100.0, 0.001),
            (101.0, 0.6),
            (102.0, 0.3),
            (103.0, 0.002),
        ]);
        dist.trim_left(0.01);
        assert_eq!(dist.len(), 3);
        dist.trim_right(0.01);
        assert_eq!(dist.len(), 2);
        dist.trim_intensities(0.5);
        assert_eq!(dist.len(), 1);
        assert_eq!(dist.most_abundant(), Some((101.0, 0.6)));
    }

    #[test]
    fn parallel_batch_matches_serial() {
        let generator = CoarsePatternGenerator::new(5);
        let formulas = vec![
            SumFormula::new("C6H12O6").unwrap(),
            SumFormula::new("C2H6O").unwrap(),
            SumFormula::new("CBr2").unwrap(),
        ];
        let parallel = isotope_distributions_for_formulas(&formulas, &generator, 2);
        for (formula, pattern) in formulas.iter().zip(parallel.iter()) {
            assert_eq!(pattern, &generator.isotope_distribution(formula));
        }
    }
}
