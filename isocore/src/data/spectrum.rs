use std::collections::BTreeMap;

use bincode::{Decode, Encode};
use itertools::izip;
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use serde::{Deserialize, Serialize};
use statrs::distribution::{Continuous, Normal};
use tracing::warn;

use crate::algorithm::isotope::IsotopeDistribution;
use crate::chemistry::sum_formula::calculate_mz;

/// Represents a mass spectrum with associated m/z values and intensities.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct MzSpectrum {
    pub mz: Vec<f64>,
    pub intensity: Vec<f64>,
}

impl MzSpectrum {
    /// Constructs a new `MzSpectrum`.
    ///
    /// # Arguments
    ///
    /// * `mz` - A vector of m/z values.
    /// * `intensity` - A vector of intensity values corresponding to the m/z values.
    ///
    /// # Example
    ///
    /// ```rust
    /// # use isocore::data::spectrum::MzSpectrum;
    /// let spectrum = MzSpectrum::new(vec![100.0, 200.0], vec![10.0, 20.0]);
    /// assert_eq!(spectrum.mz, vec![100.0, 200.0]);
    /// ```
    pub fn new(mz: Vec<f64>, intensity: Vec<f64>) -> Self {
        MzSpectrum { mz, intensity }
    }

    pub fn len(&self) -> usize {
        self.mz.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mz.is_empty()
    }

    /// keep only peaks inside the given m/z and intensity windows
    pub fn filter_ranged(
        &self,
        mz_min: f64,
        mz_max: f64,
        intensity_min: f64,
        intensity_max: f64,
    ) -> Self {
        let mut mz_vec: Vec<f64> = Vec::new();
        let mut intensity_vec: Vec<f64> = Vec::new();

        for (&mz, &intensity) in izip!(&self.mz, &self.intensity) {
            if mz_min <= mz && mz <= mz_max && intensity_min <= intensity && intensity <= intensity_max
            {
                mz_vec.push(mz);
                intensity_vec.push(intensity);
            }
        }
        MzSpectrum::new(mz_vec, intensity_vec)
    }

    /// re-bin the spectrum to a fixed number of decimals, summing
    /// intensities that fall into the same bin
    pub fn to_resolution(&self, resolution: i32) -> Self {
        let factor = 10f64.powi(resolution);
        let mut binned: BTreeMap<i64, f64> = BTreeMap::new();

        for (&mz, &intensity) in izip!(&self.mz, &self.intensity) {
            let key = (mz * factor).round() as i64;
            *binned.entry(key).or_insert(0.0) += intensity;
        }

        MzSpectrum {
            mz: binned.keys().map(|&key| key as f64 / factor).collect(),
            intensity: binned.values().copied().collect(),
        }
    }

    /// centroid peaks of a coarse pattern at a charge state
    pub fn from_distribution(distribution: &IsotopeDistribution, charge: i32) -> Self {
        let mz = distribution
            .entries
            .iter()
            .map(|&(mass, _)| calculate_mz(mass, charge))
            .collect();
        let intensity = distribution.entries.iter().map(|&(_, p)| p).collect();
        MzSpectrum::new(mz, intensity)
    }
}

/// render a coarse isotope pattern as a Gaussian profile spectrum
///
/// Arguments:
///
/// * `distribution` - the coarse pattern to render
/// * `charge` - charge state used to convert masses to m/z
/// * `sigma` - standard deviation of the Gaussian peak shape
/// * `amp` - amplitude of the rendered pattern
/// * `resolution` - number of decimals of the output m/z grid
///
/// Returns:
///
/// * `MzSpectrum` - profile spectrum; empty when the pattern is empty or
///   `sigma` is not a positive finite number
pub fn profile_spectrum(
    distribution: &IsotopeDistribution,
    charge: i32,
    sigma: f64,
    amp: f64,
    resolution: i32,
) -> MzSpectrum {
    if distribution.is_empty() {
        return MzSpectrum::default();
    }
    if !(sigma.is_finite() && sigma > 0.0) {
        warn!("peak shape sigma {} is degenerate, returning an empty spectrum", sigma);
        return MzSpectrum::default();
    }

    let centers: Vec<f64> = distribution
        .entries
        .iter()
        .map(|&(mass, _)| calculate_mz(mass, charge))
        .collect();
    let shapes: Vec<Normal> = centers
        .iter()
        .map(|&mu| Normal::new(mu, sigma).unwrap())
        .collect();

    let lower = centers.first().unwrap() - 0.2;
    let upper = centers.last().unwrap() + 0.2;
    let step_size = f64::min(sigma / 10.0, 1.0 / 10f64.powi(resolution));
    let size = ((upper - lower) / step_size).ceil() as usize;

    let mz_grid: Vec<f64> = (0..size).map(|i| lower + step_size * i as f64).collect();
    let intensity: Vec<f64> = mz_grid
        .iter()
        .map(|&x| {
            let mut value = 0.0;
            for (shape, &(_, abundance)) in izip!(&shapes, &distribution.entries) {
                value += abundance * shape.pdf(x);
            }
            value * step_size * amp
        })
        .collect();

    MzSpectrum::new(mz_grid, intensity).to_resolution(resolution)
}

/// render profile spectra for a batch of patterns using multiple threads
pub fn profile_spectra(
    distributions: &[IsotopeDistribution],
    charges: &[i32],
    sigma: f64,
    amp: f64,
    resolution: i32,
    num_threads: usize,
) -> Vec<MzSpectrum> {
    let thread_pool = ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .build()
        .unwrap();
    thread_pool.install(|| {
        distributions
            .par_iter()
            .zip(charges.par_iter())
            .map(|(distribution, &charge)| {
                profile_spectrum(distribution, charge, sigma, amp, resolution)
            })
            .collect()
    })
}
