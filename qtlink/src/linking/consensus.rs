use std::collections::{BTreeSet, HashSet};

use itertools::Itertools;
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use serde::{Deserialize, Serialize};

use crate::linking::cluster::QtCluster;
use crate::linking::feature::{FeatureArena, FeatureIndex, MapFeature};

#[derive(Clone, Debug)]
pub struct LinkerParams {
    /// cluster radius; candidates beyond it never enter a cluster
    pub max_distance: f64,
    /// honor peptide annotations when collecting and scoring candidates
    pub use_annotations: bool,
    /// worker threads for cluster construction and update sweeps,
    /// 0 keeps the ambient rayon pool
    pub num_threads: usize,
}

impl Default for LinkerParams {
    fn default() -> Self {
        LinkerParams {
            max_distance: 1.0,
            use_annotations: false,
            num_threads: 0,
        }
    }
}

/// One linked consensus group: the winning cluster's members, its quality
/// at selection time and the annotation set it settled on.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConsensusCluster {
    pub quality: f64,
    pub elements: Vec<(usize, FeatureIndex)>,
    pub annotations: BTreeSet<String>,
}

/// greedy quality threshold linking over a feature arena
///
/// Builds one candidate cluster per feature (independent units, done in
/// parallel), then repeatedly picks the highest quality cluster, emits it
/// as a consensus group and removes its members from every remaining
/// cluster until all features are consumed. Ties between equal qualities
/// are resolved arbitrarily.
///
/// The pairwise distance stays with the caller: `distance` returns `None`
/// for pairs outside the radius, `Some(d)` with `d <= max_distance`
/// otherwise.
pub fn link_features<D>(
    arena: &FeatureArena,
    params: &LinkerParams,
    distance: D,
) -> Vec<ConsensusCluster>
where
    D: Fn(&MapFeature, &MapFeature) -> Option<f64> + Sync,
{
    let build = || {
        let mut clusters: Vec<QtCluster> = (0..arena.len())
            .into_par_iter()
            .map(|center| {
                let mut cluster =
                    QtCluster::new(arena, center, params.max_distance, params.use_annotations);
                let center_feature = arena.get(center);
                for (element, feature) in arena.features.iter().enumerate() {
                    if element == center || feature.map_index == center_feature.map_index {
                        continue;
                    }
                    if let Some(d) = distance(center_feature, feature) {
                        if d <= params.max_distance {
                            cluster.add(arena, element, d);
                        }
                    }
                }
                cluster.finalize(arena);
                cluster
            })
            .collect();

        let mut out: Vec<ConsensusCluster> = Vec::new();
        while !clusters.is_empty() {
            // refresh is cheap, only clusters touched by the last round
            // recompute
            for cluster in clusters.iter_mut() {
                cluster.quality();
            }
            let best_index = clusters
                .iter()
                .position_max_by(|a, b| a.cmp(b))
                .unwrap();

            let quality = clusters[best_index].quality();
            let best = &clusters[best_index];
            let elements = best.elements();
            out.push(ConsensusCluster {
                quality,
                elements: elements.clone(),
                annotations: best.annotations().clone(),
            });

            // the winner's members leave every remaining neighborhood, the
            // winner itself and clusters centered on consumed features
            // become invalid
            let removed: HashSet<FeatureIndex> =
                elements.iter().map(|&(_, element)| element).collect();
            clusters.par_iter_mut().for_each(|cluster| {
                cluster.update(&removed);
            });
            clusters.retain(|cluster| !cluster.is_invalid());
        }
        out
    };

    if params.num_threads == 0 {
        build()
    } else {
        ThreadPoolBuilder::new()
            .num_threads(params.num_threads)
            .build()
            .unwrap()
            .install(build)
    }
}
