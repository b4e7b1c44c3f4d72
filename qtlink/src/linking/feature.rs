use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Lightweight handle into an externally owned feature arena.
///
/// Clusters only ever store indices, the arena outlives every clustering
/// round.
pub type FeatureIndex = usize;

/// A feature observed in one input map, with the candidate peptide
/// annotations attached to it.
///
/// Annotation scores stay with the identification pipeline; linking only
/// looks at set membership.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MapFeature {
    pub map_index: usize,
    pub rt: f64,
    pub mz: f64,
    pub annotations: BTreeSet<String>,
}

impl MapFeature {
    pub fn new(map_index: usize, rt: f64, mz: f64) -> Self {
        MapFeature {
            map_index,
            rt,
            mz,
            annotations: BTreeSet::new(),
        }
    }

    pub fn with_annotations<I, S>(map_index: usize, rt: f64, mz: f64, annotations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        MapFeature {
            map_index,
            rt,
            mz,
            annotations: annotations.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_annotated(&self) -> bool {
        !self.annotations.is_empty()
    }
}

/// All features of a linking run, owned by the caller for the whole run.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FeatureArena {
    pub features: Vec<MapFeature>,
    pub num_maps: usize,
}

impl FeatureArena {
    /// The number of maps is derived from the largest map index present.
    pub fn new(features: Vec<MapFeature>) -> Self {
        let num_maps = features
            .iter()
            .map(|feature| feature.map_index + 1)
            .max()
            .unwrap_or(0);
        FeatureArena { features, num_maps }
    }

    pub fn get(&self, index: FeatureIndex) -> &MapFeature {
        &self.features[index]
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}
