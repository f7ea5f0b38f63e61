use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// Identifies a source point: configuration index and position inside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PointKey {
    pub config: usize,
    pub index: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledPoint {
    pub label: String,
    pub coords: Vec<i64>,
}

/// One support: the exponent vectors of a single equation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointConfig {
    pub name: String,
    pub points: Vec<LabeledPoint>,
}

impl PointConfig {
    /// Builds a configuration with generated labels `"<name>[i]"`.
    pub fn from_coords(name: &str, coords: Vec<Vec<i64>>) -> Self {
        let points = coords
            .into_iter()
            .enumerate()
            .map(|(i, coords)| LabeledPoint {
                label: format!("{}[{}]", name, i),
                coords,
            })
            .collect();
        Self {
            name: name.to_string(),
            points,
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Componentwise minimum of the exponent vectors.
    pub fn min_corner(&self) -> Vec<i64> {
        let dim = self.points.first().map(|p| p.coords.len()).unwrap_or(0);
        (0..dim)
            .map(|j| self.points.iter().map(|p| p.coords[j]).min().unwrap_or(0))
            .collect()
    }
}

/// Ordered collection of point configurations sharing one ambient dimension.
///
/// Validated on construction and immutable afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<PointConfig>", into = "Vec<PointConfig>")]
pub struct Aset {
    configs: Vec<PointConfig>,
    dim: usize,
}

impl Aset {
    pub fn new(configs: Vec<PointConfig>) -> Result<Self> {
        if configs.is_empty() {
            bail!("A point set needs at least one configuration");
        }
        let dim = match configs[0].points.first() {
            Some(point) => point.coords.len(),
            None => bail!("Configuration '{}' is empty", configs[0].name),
        };
        if dim == 0 {
            bail!("Points must have positive dimension");
        }
        for config in &configs {
            if config.is_empty() {
                bail!("Configuration '{}' is empty", config.name);
            }
            for point in &config.points {
                if point.coords.len() != dim {
                    bail!(
                        "Point '{}' has dimension {} (expected {})",
                        point.label,
                        point.coords.len(),
                        dim
                    );
                }
            }
        }
        Ok(Self { configs, dim })
    }

    /// Convenience constructor from bare coordinate lists.
    pub fn from_coords(configs: Vec<Vec<Vec<i64>>>) -> Result<Self> {
        Self::new(
            configs
                .into_iter()
                .enumerate()
                .map(|(k, coords)| PointConfig::from_coords(&format!("A{}", k), coords))
                .collect(),
        )
    }

    /// Affine dimension `d` of the points.
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Number of configurations `r`.
    pub fn len(&self) -> usize {
        self.configs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }

    pub fn configs(&self) -> &[PointConfig] {
        &self.configs
    }

    pub fn config(&self, k: usize) -> &PointConfig {
        &self.configs[k]
    }

    pub fn point(&self, key: PointKey) -> &LabeledPoint {
        &self.configs[key.config].points[key.index]
    }

    /// Every point key in configuration-major order.
    pub fn keys(&self) -> Vec<PointKey> {
        self.configs
            .iter()
            .enumerate()
            .flat_map(|(config, c)| (0..c.len()).map(move |index| PointKey { config, index }))
            .collect()
    }

    pub fn total_points(&self) -> usize {
        self.configs.iter().map(|c| c.len()).sum()
    }
}

impl TryFrom<Vec<PointConfig>> for Aset {
    type Error = anyhow::Error;

    fn try_from(configs: Vec<PointConfig>) -> Result<Self> {
        Aset::new(configs)
    }
}

impl From<Aset> for Vec<PointConfig> {
    fn from(aset: Aset) -> Self {
        aset.configs
    }
}
