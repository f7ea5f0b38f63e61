//! Cayley embedding of several point configurations into one.
//!
//! A point `a` of configuration `k` becomes `(a, e_k)` where `e_0 = 0` and
//! `e_k` (k ≥ 1) is the `(k-1)`-th unit vector of `R^(r-1)`. Simplices of a
//! triangulation of the embedded set correspond to cells of a mixed
//! subdivision of the Minkowski sum of the configurations.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use crate::aset::{Aset, PointKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PointId(pub usize);

/// When and how high a point was placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    /// Flattening stage active when the point was placed.
    pub stage: usize,
    /// Lift assigned at placement, before any flattening reset it.
    pub lift: i64,
    /// Global placement sequence number.
    pub order: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InternalPoint {
    /// Cayley coordinates, length `d + r - 1`.
    pub coords: Vec<i64>,
    pub key: PointKey,
    /// Current lift.
    pub lift: i64,
    pub placement: Option<Placement>,
    pub seen: bool,
    /// Next point of the same configuration.
    pub next: Option<PointId>,
}

impl InternalPoint {
    pub fn config(&self) -> usize {
        self.key.config
    }

    pub fn is_placed(&self) -> bool {
        self.placement.is_some()
    }

    /// Cayley coordinates followed by the current lift.
    pub fn lifted(&self) -> Vec<i64> {
        let mut v = self.coords.clone();
        v.push(self.lift);
        v
    }
}

/// The embedded point arena with one work list per configuration.
#[derive(Debug, Clone)]
pub struct CayleyEmbedding {
    pub dim: usize,
    pub configs: usize,
    pub points: Vec<InternalPoint>,
    pub heads: Vec<Option<PointId>>,
}

impl CayleyEmbedding {
    /// Embeds every point of `aset`.
    pub fn new(aset: &Aset) -> Result<Self> {
        Self::with_keys(aset, &aset.keys())
    }

    /// Embeds the given subset of `aset`, keeping all `r` indicator slots.
    pub fn with_keys(aset: &Aset, keys: &[PointKey]) -> Result<Self> {
        let d = aset.dim();
        let r = aset.len();
        let n = d + r - 1;
        let mut points = Vec::with_capacity(keys.len());
        let mut heads: Vec<Option<PointId>> = vec![None; r];
        let mut tails: Vec<Option<PointId>> = vec![None; r];

        for &key in keys {
            if key.config >= r || key.index >= aset.config(key.config).len() {
                bail!("Unknown point {:?}", key);
            }
            let source = &aset.point(key).coords;
            let mut coords = vec![0i64; n];
            coords[..d].copy_from_slice(source);
            if key.config > 0 {
                coords[d + key.config - 1] = 1;
            }
            let id = PointId(points.len());
            points.push(InternalPoint {
                coords,
                key,
                lift: 0,
                placement: None,
                seen: false,
                next: None,
            });
            match tails[key.config] {
                Some(PointId(prev)) => points[prev].next = Some(id),
                None => heads[key.config] = Some(id),
            }
            tails[key.config] = Some(id);
        }

        for (k, head) in heads.iter().enumerate() {
            if head.is_none() {
                bail!("Configuration '{}' is empty", aset.config(k).name);
            }
        }

        Ok(Self {
            dim: n,
            configs: r,
            points,
            heads,
        })
    }

    /// Walks the work list of configuration `k`.
    pub fn config_points(&self, k: usize) -> Vec<PointId> {
        let mut out = Vec::new();
        let mut cursor = self.heads[k];
        while let Some(id) = cursor {
            out.push(id);
            cursor = self.points[id.0].next;
        }
        out
    }

    /// Round-robin over the configuration work lists.
    pub fn interleaved(&self) -> Vec<PointId> {
        let mut cursors = self.heads.clone();
        let mut out = Vec::with_capacity(self.points.len());
        while cursors.iter().any(Option::is_some) {
            for cursor in cursors.iter_mut() {
                if let Some(id) = *cursor {
                    out.push(id);
                    *cursor = self.points[id.0].next;
                }
            }
        }
        out
    }

    /// Source coordinates of an embedded point.
    pub fn unlift(&self, id: PointId) -> Vec<i64> {
        let d = self.dim + 1 - self.configs;
        self.points[id.0].coords[..d].to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Aset {
        Aset::from_coords(vec![
            vec![vec![0, 0], vec![1, 0], vec![0, 1]],
            vec![vec![2, 2], vec![-1, 3]],
            vec![vec![5, -4]],
        ])
        .unwrap()
    }

    #[test]
    fn embedding_adds_indicator_slots() {
        let emb = CayleyEmbedding::new(&sample()).unwrap();
        assert_eq!(emb.dim, 4);
        assert_eq!(emb.points[0].coords, vec![0, 0, 0, 0]);
        assert_eq!(emb.points[3].coords, vec![2, 2, 1, 0]);
        assert_eq!(emb.points[5].coords, vec![5, -4, 0, 1]);
    }

    #[test]
    fn unlift_restores_source_coordinates() {
        let aset = sample();
        let emb = CayleyEmbedding::new(&aset).unwrap();
        for (i, p) in emb.points.iter().enumerate() {
            assert_eq!(emb.unlift(PointId(i)), aset.point(p.key).coords);
        }
    }

    #[test]
    fn work_lists_and_interleaving() {
        let emb = CayleyEmbedding::new(&sample()).unwrap();
        assert_eq!(emb.config_points(1), vec![PointId(3), PointId(4)]);
        let order: Vec<usize> = emb.interleaved().into_iter().map(|p| p.0).collect();
        assert_eq!(order, vec![0, 3, 5, 1, 4, 2]);
    }

    #[test]
    fn subset_missing_a_configuration_is_rejected() {
        let aset = sample();
        let keys = vec![PointKey { config: 0, index: 0 }, PointKey { config: 1, index: 0 }];
        let err = CayleyEmbedding::with_keys(&aset, &keys).unwrap_err();
        assert!(err.to_string().contains("is empty"));
    }
}
