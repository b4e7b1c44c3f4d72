use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashSet};

use crate::linking::feature::{FeatureArena, FeatureIndex};

/// One candidate consensus cluster built around a fixed center feature.
///
/// A cluster is either open (collecting candidates via `add`) or finalized
/// (stable one-best-neighbor-per-map table, cached quality). `finalize`
/// closes a collection round, `initialize` opens a new one, `set_invalid`
/// retires the cluster for good once the greedy driver has consumed its
/// center.
///
/// The cluster never owns features, it stores arena indices and distances
/// only, so copies stay cheap and the arena can outlive any number of
/// clustering rounds.
#[derive(Clone, Debug)]
pub struct QtCluster {
    center: FeatureIndex,
    center_map: usize,
    /// best neighbor per input map: map index -> (distance, feature)
    neighbors: BTreeMap<usize, (f64, FeatureIndex)>,
    /// all candidates per input map, kept while the cluster is open and the
    /// center annotation is ambiguous
    tmp_neighbors: Option<BTreeMap<usize, Vec<(f64, FeatureIndex)>>>,
    annotations: BTreeSet<String>,
    max_distance: f64,
    num_maps: usize,
    quality: f64,
    changed: bool,
    valid: bool,
    use_annotations: bool,
    collect_annotations: bool,
    finalized: bool,
}

impl QtCluster {
    pub fn new(
        arena: &FeatureArena,
        center: FeatureIndex,
        max_distance: f64,
        use_annotations: bool,
    ) -> Self {
        let center_feature = arena.get(center);
        let annotations = center_feature.annotations.clone();
        // with zero or several center annotations the best supported one is
        // only decided at finalize time, so all candidates must be kept
        let collect_annotations = use_annotations && annotations.len() != 1;
        QtCluster {
            center,
            center_map: center_feature.map_index,
            neighbors: BTreeMap::new(),
            tmp_neighbors: collect_annotations.then(BTreeMap::new),
            annotations,
            max_distance,
            num_maps: arena.num_maps,
            quality: 0.0,
            changed: true,
            valid: true,
            use_annotations,
            collect_annotations,
            finalized: false,
        }
    }

    /// offer a candidate neighbor to the cluster
    ///
    /// Only the closest candidate per input map survives into the final
    /// neighbor table; candidates from the center's own map are ignored.
    /// An annotated candidate that shares no annotation with an annotated
    /// center cannot represent the same analyte and is rejected.
    pub fn add(&mut self, arena: &FeatureArena, element: FeatureIndex, distance: f64) {
        assert!(!self.finalized, "add() requires an open cluster");
        assert!(
            distance <= self.max_distance,
            "candidate distance {} above the cluster radius {}",
            distance,
            self.max_distance
        );
        debug_assert!(self.valid);

        let feature = arena.get(element);
        let map_index = feature.map_index;
        if map_index == self.center_map {
            return;
        }

        if self.use_annotations
            && !self.annotations.is_empty()
            && !feature.annotations.is_empty()
            && self.annotations.is_disjoint(&feature.annotations)
        {
            return;
        }

        if let Some(tmp) = self.tmp_neighbors.as_mut() {
            tmp.entry(map_index).or_default().push((distance, element));
        }

        let entry = self.neighbors.entry(map_index).or_insert((distance, element));
        if distance < entry.0 {
            *entry = (distance, element);
        }
        self.changed = true;
    }

    /// close the current collection round
    ///
    /// Runs the pending quality computation (annotation aware while the
    /// candidate store is still alive) and drops the candidate store.
    pub fn finalize(&mut self, arena: &FeatureArena) {
        assert!(!self.finalized, "finalize() requires an open cluster");
        if self.changed {
            self.compute_quality(arena);
            self.changed = false;
        }
        self.tmp_neighbors = None;
        self.finalized = true;
    }

    /// reopen a finalized cluster for a new round of candidate collection
    pub fn initialize(&mut self, arena: &FeatureArena) {
        debug_assert!(self.valid);
        self.finalized = false;
        self.changed = true;
        self.neighbors.clear();
        self.annotations = arena.get(self.center).annotations.clone();
        if self.collect_annotations {
            self.tmp_neighbors = Some(BTreeMap::new());
        }
    }

    /// cluster quality in [0, 1]
    ///
    /// Cached behind a dirty flag: reads after `update` erasures recompute
    /// over the surviving neighbor table, anything else is O(1). The
    /// annotation aware recomputation happens in `finalize` while the
    /// candidate store is alive. After `set_invalid` the last cached value
    /// stays readable as a sentinel.
    pub fn quality(&mut self) -> f64 {
        if self.changed && self.tmp_neighbors.is_none() {
            let num_other = self.num_maps.saturating_sub(1);
            if num_other == 0 {
                self.quality = 1.0;
            } else {
                self.quality = (self.max_distance
                    - self.internal_distance_from_neighbors() / num_other as f64)
                    / self.max_distance;
            }
            self.changed = false;
        }
        self.quality
    }

    /// drop every neighbor the driver has consumed elsewhere
    ///
    /// Returns `false` when the center itself was consumed; the cluster is
    /// then permanently invalid. Otherwise returns whether any neighbor was
    /// erased, leaving the quality to be recomputed lazily.
    pub fn update(&mut self, removed: &HashSet<FeatureIndex>) -> bool {
        assert!(self.finalized, "update() requires a finalized cluster");
        debug_assert!(self.valid);

        if removed.contains(&self.center) {
            self.set_invalid();
            return false;
        }

        let before = self.neighbors.len();
        self.neighbors
            .retain(|_, &mut (_, element)| !removed.contains(&element));
        let changed = self.neighbors.len() != before;
        if changed {
            self.changed = true;
        }
        changed
    }

    /// permanently retire the cluster, releasing its annotation set
    pub fn set_invalid(&mut self) {
        self.valid = false;
        self.annotations.clear();
        self.tmp_neighbors = None;
    }

    pub fn is_invalid(&self) -> bool {
        !self.valid
    }

    /// all members as (map index, feature) pairs, the center first
    pub fn elements(&self) -> Vec<(usize, FeatureIndex)> {
        assert!(self.finalized, "elements() requires a finalized cluster");
        let mut out = Vec::with_capacity(self.neighbors.len() + 1);
        out.push((self.center_map, self.center));
        out.extend(
            self.neighbors
                .iter()
                .map(|(&map_index, &(_, element))| (map_index, element)),
        );
        out
    }

    pub fn size(&self) -> usize {
        assert!(self.finalized, "size() requires a finalized cluster");
        self.neighbors.len() + 1
    }

    pub fn center(&self) -> FeatureIndex {
        self.center
    }

    pub fn center_map(&self) -> usize {
        self.center_map
    }

    pub fn annotations(&self) -> &BTreeSet<String> {
        &self.annotations
    }

    fn compute_quality(&mut self, arena: &FeatureArena) {
        let num_other = self.num_maps.saturating_sub(1);
        if num_other == 0 {
            // a single map leaves nothing to link against
            self.quality = 1.0;
            return;
        }
        let has_candidates = self
            .tmp_neighbors
            .as_ref()
            .map_or(false, |tmp| !tmp.is_empty());
        let internal_distance = if self.collect_annotations && has_candidates {
            self.optimize_annotations(arena)
        } else {
            self.internal_distance_from_neighbors()
        };
        self.quality =
            (self.max_distance - internal_distance / num_other as f64) / self.max_distance;
    }

    /// sum of neighbor distances; maps without a match count as maximally
    /// distant
    fn internal_distance_from_neighbors(&self) -> f64 {
        let sum: f64 = self.neighbors.values().map(|&(distance, _)| distance).sum();
        sum + self.num_maps.saturating_sub(1 + self.neighbors.len()) as f64 * self.max_distance
    }

    /// pick the best supported annotation and rebuild the neighbor table
    /// around it
    ///
    /// Builds a per-annotation table of per-map best distances from the
    /// sorted candidate lists. An unannotated candidate is recorded under
    /// the unspecific key and ends the scan of its map, every later
    /// candidate is farther away. Unspecific distances are merged into each
    /// specific annotation as per-map minima, since an unannotated feature
    /// supports any hypothesis without being double counted. The annotation
    /// with the smallest total distance (missing maps penalized at the full
    /// radius) wins; the final table then takes, per map, the closest
    /// candidate that is unannotated or shares an annotation with the
    /// winner.
    fn optimize_annotations(&mut self, arena: &FeatureArena) -> f64 {
        let mut tmp = self.tmp_neighbors.take().unwrap_or_default();

        // the empty string keys the unannotated case
        let mut seq_table: BTreeMap<String, BTreeMap<usize, f64>> = BTreeMap::new();
        for (map_index, candidates) in tmp.iter_mut() {
            candidates.sort_by(|a, b| a.0.total_cmp(&b.0));
            for &(distance, element) in candidates.iter() {
                let feature = arena.get(element);
                if feature.annotations.is_empty() {
                    seq_table
                        .entry(String::new())
                        .or_default()
                        .entry(*map_index)
                        .or_insert(distance);
                    break;
                }
                for annotation in &feature.annotations {
                    seq_table
                        .entry(annotation.clone())
                        .or_default()
                        .entry(*map_index)
                        .or_insert(distance);
                }
            }
        }

        if seq_table.len() > 1 {
            if let Some(unspecific) = seq_table.get(&String::new()).cloned() {
                for (annotation, table) in seq_table.iter_mut() {
                    if annotation.is_empty() {
                        continue;
                    }
                    for (&map_index, &distance) in &unspecific {
                        let entry = table.entry(map_index).or_insert(distance);
                        if distance < *entry {
                            *entry = distance;
                        }
                    }
                }
            }
        }

        let mut best_distance = f64::INFINITY;
        let mut best_annotation = String::new();
        for (annotation, table) in &seq_table {
            let total: f64 = table.values().sum::<f64>()
                + self.num_maps.saturating_sub(1 + table.len()) as f64 * self.max_distance;
            if total < best_distance {
                best_distance = total;
                best_annotation = annotation.clone();
            }
        }

        self.annotations.clear();
        if !best_annotation.is_empty() {
            self.annotations.insert(best_annotation);
        }

        self.neighbors.clear();
        for (map_index, candidates) in tmp.iter() {
            for &(distance, element) in candidates.iter() {
                let feature = arena.get(element);
                if feature.annotations.is_empty()
                    || !self.annotations.is_disjoint(&feature.annotations)
                {
                    self.neighbors.insert(*map_index, (distance, element));
                    break;
                }
            }
        }

        self.tmp_neighbors = Some(tmp);
        best_distance
    }
}

impl PartialEq for QtCluster {
    fn eq(&self, other: &Self) -> bool {
        self.quality.total_cmp(&other.quality) == Ordering::Equal
    }
}

impl Eq for QtCluster {}

impl PartialOrd for QtCluster {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QtCluster {
    // clusters are ranked by cached quality alone, ties stay unbroken
    fn cmp(&self, other: &Self) -> Ordering {
        self.quality.total_cmp(&other.quality)
    }
}
