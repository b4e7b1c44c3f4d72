use std::collections::HashMap;

/// isotope masses per element, sorted by increasing mass
///
/// The entries are aligned with the abundance table below, i.e. the i-th
/// mass of an element belongs to the i-th abundance. Elements with gapped
/// isotope ladders (e.g. Br with 79/81 and nothing at 80) list only the
/// occurring isotopes, gap handling happens downstream.
pub fn isotopic_weights() -> HashMap<&'static str, Vec<f64>> {
    let mut map = HashMap::new();
    map.insert("H", vec![1.00782503223, 2.01410177812]);
    map.insert("B", vec![10.01293695, 11.00930536]);
    map.insert("C", vec![12.0000000, 13.00335483507]);
    map.insert("N", vec![14.00307400443, 15.00010889888]);
    map.insert("O", vec![15.99491461957, 16.99913175650, 17.99915961286]);
    map.insert("F", vec![18.99840316273]);
    map.insert("Na", vec![22.9897692820]);
    map.insert("Mg", vec![23.985041697, 24.985836976, 25.982592968]);
    map.insert("Si", vec![27.97692653465, 28.97649466490, 29.973770136]);
    map.insert("P", vec![30.97376199842]);
    map.insert("S", vec![31.9720711744, 32.9714589098, 33.967867004]);
    map.insert("Cl", vec![34.968852682, 36.965902602]);
    map.insert("K", vec![38.963706679, 39.963998166, 40.961825257]);
    map.insert("Ca", vec![39.96259098, 41.95861783, 42.95876644, 43.95548156, 45.95369276]);
    map.insert("Fe", vec![53.93960899, 55.93493633, 56.93539284, 57.93327443]);
    map.insert("Cu", vec![62.92959772, 64.92778970]);
    map.insert("Zn", vec![63.92914201, 65.92603381, 66.92712775, 67.92484455, 69.9253192]);
    map.insert("Se", vec![73.9224764, 75.9192136, 76.9199140, 77.9173095, 79.9165218, 81.9166995]);
    map.insert("Br", vec![78.9183376, 80.9162906]);
    map.insert("I", vec![126.9044719]);
    map
}

/// natural isotope abundances per element, aligned with `isotopic_weights`
pub fn isotopic_abundance() -> HashMap<&'static str, Vec<f64>> {
    let mut map = HashMap::new();
    map.insert("H", vec![0.999885, 0.000115]);
    map.insert("B", vec![0.199, 0.801]);
    map.insert("C", vec![0.9893, 0.0107]);
    map.insert("N", vec![0.99632, 0.00368]);
    map.insert("O", vec![0.99757, 0.00038, 0.00205]);
    map.insert("F", vec![1.0]);
    map.insert("Na", vec![1.0]);
    map.insert("Mg", vec![0.7899, 0.1000, 0.1101]);
    map.insert("Si", vec![0.9223, 0.0467, 0.0310]);
    map.insert("P", vec![1.0]);
    map.insert("S", vec![0.9493, 0.0076, 0.0429]);
    map.insert("Cl", vec![0.7578, 0.2422]);
    map.insert("K", vec![0.932581, 0.000117, 0.067302]);
    map.insert("Ca", vec![0.96941, 0.00647, 0.00135, 0.02086, 0.00187]);
    map.insert("Fe", vec![0.05845, 0.91754, 0.02119, 0.00282]);
    map.insert("Cu", vec![0.6915, 0.3085]);
    map.insert("Zn", vec![0.4917, 0.2773, 0.0404, 0.1845, 0.0061]);
    map.insert("Se", vec![0.0089, 0.0937, 0.0763, 0.2377, 0.4961, 0.0873]);
    map.insert("Br", vec![0.5069, 0.4931]);
    map.insert("I", vec![1.0]);
    map
}

/// monoisotopic atomic weights, i.e. the mass of the most abundant isotope
pub fn atomic_weights_mono_isotopic() -> HashMap<&'static str, f64> {
    let mut map = HashMap::new();
    map.insert("H", 1.00782503223);
    map.insert("B", 11.00930536);
    map.insert("C", 12.0000000);
    map.insert("N", 14.00307400443);
    map.insert("O", 15.99491461957);
    map.insert("F", 18.99840316273);
    map.insert("Na", 22.9897692820);
    map.insert("Mg", 23.985041697);
    map.insert("Si", 27.97692653465);
    map.insert("P", 30.97376199842);
    map.insert("S", 31.9720711744);
    map.insert("Cl", 34.968852682);
    map.insert("K", 38.963706679);
    map.insert("Ca", 39.96259098);
    map.insert("Fe", 55.93493633);
    map.insert("Cu", 62.92959772);
    map.insert("Zn", 63.92914201);
    map.insert("Se", 79.9165218);
    map.insert("Br", 78.9183376);
    map.insert("I", 126.9044719);
    map
}

/// average atomic weights derived from the isotope tables
///
/// Computed as the abundance weighted mean of the isotope masses, so the
/// values stay consistent with whatever the two tables above say.
pub fn atomic_weights_average() -> HashMap<&'static str, f64> {
    let weights = isotopic_weights();
    let abundances = isotopic_abundance();
    weights
        .iter()
        .map(|(&element, masses)| {
            let abundance = &abundances[element];
            let average = masses
                .iter()
                .zip(abundance.iter())
                .map(|(&m, &p)| m * p)
                .sum::<f64>()
                / abundance.iter().sum::<f64>();
            (element, average)
        })
        .collect()
}

/// exact masses for isotope labeled atoms, keyed as they appear in formulas
pub fn labeled_atomic_weights() -> HashMap<&'static str, f64> {
    let mut map = HashMap::new();
    map.insert("[2]H", 2.01410177812);
    map.insert("[13]C", 13.00335483507);
    map.insert("[15]N", 15.00010889888);
    map.insert("[18]O", 17.99915961286);
    map.insert("[34]S", 33.967867004);
    map
}
