use anyhow::{bail, Result};
use log::debug;

use super::Subdivision;
use crate::cayley::PointId;
use crate::geometry::lattice::{self, IntMatrix};

impl Subdivision {
    /// Chooses `n + 1` affinely independent points as the first cell.
    ///
    /// Starting from the first point of the placement order, each step
    /// takes an integer direction orthogonal to the span of the points
    /// chosen so far and picks the remaining point with the largest (else
    /// smallest) dot product against it. The simplex vertices get lift 0.
    /// Returns the points still to be placed, in placement order.
    pub fn initial_simplex(&mut self) -> Result<Vec<PointId>> {
        if !self.cells.is_empty() {
            bail!("The initial simplex has already been chosen");
        }
        let n = self.dim;
        let Some(&first) = self.order.first() else {
            bail!("Cannot triangulate an empty point set");
        };
        let mut chosen = vec![first];

        while chosen.len() < n + 1 {
            let base = self.points[first.0].coords.clone();
            let diff = IntMatrix::from_fn(chosen.len() - 1, n, |i, j| {
                self.points[chosen[i + 1].0].coords[j] - base[j]
            });
            let directions = lattice::kernel_vectors(&diff)?;

            let mut pick = None;
            for direction in &directions {
                let reference = lattice::dot(direction, &base);
                let mut best_max: Option<(i128, PointId)> = None;
                let mut best_min: Option<(i128, PointId)> = None;
                for &id in self.order.iter().filter(|id| !chosen.contains(*id)) {
                    let value = lattice::dot(direction, &self.points[id.0].coords);
                    if best_max.map_or(true, |(v, _)| value > v) {
                        best_max = Some((value, id));
                    }
                    if best_min.map_or(true, |(v, _)| value < v) {
                        best_min = Some((value, id));
                    }
                }
                match (best_max, best_min) {
                    (Some((v, id)), _) if v > reference => pick = Some(id),
                    (_, Some((v, id))) if v < reference => pick = Some(id),
                    _ => continue,
                }
                break;
            }

            match pick {
                Some(id) => chosen.push(id),
                None => bail!(
                    "Point configuration is not full dimensional: affine span has dimension {} (need {})",
                    chosen.len() - 1,
                    n
                ),
            }
        }

        for &v in &chosen {
            self.mark_placed(v, 0);
        }
        debug!("Initial simplex {:?}", chosen);
        self.push_cell(chosen.clone())?;

        Ok(self
            .order
            .iter()
            .copied()
            .filter(|id| !chosen.contains(id))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use crate::aset::Aset;
    use crate::cayley::{CayleyEmbedding, PointId};
    use crate::subdivision::{Subdivision, SubdivisionSettings};

    fn subdivision(coords: Vec<Vec<Vec<i64>>>) -> Subdivision {
        let aset = Aset::from_coords(coords).unwrap();
        Subdivision::new(
            CayleyEmbedding::new(&aset).unwrap(),
            SubdivisionSettings::default(),
        )
    }

    #[test]
    fn initial_simplex_is_flat_and_full_dimensional() {
        let mut sub = subdivision(vec![vec![vec![0], vec![1], vec![2]]]);
        let rest = sub.initial_simplex().unwrap();
        assert_eq!(rest, vec![PointId(1)]);
        let cell = sub.cell(sub.cells()[0]);
        assert_eq!(cell.vertices, vec![PointId(0), PointId(2)]);
        assert_eq!(cell.normal, vec![0, 1]);
        assert_eq!(cell.offset, 0);
        assert_eq!(cell.volume, 2);
    }

    #[test]
    fn initial_simplex_draws_from_every_configuration() {
        let mut sub = subdivision(vec![
            vec![vec![0, 0], vec![1, 0]],
            vec![vec![0, 0], vec![0, 1]],
        ]);
        let rest = sub.initial_simplex().unwrap();
        assert!(rest.is_empty());
        let cell = sub.cell(sub.cells()[0]);
        assert_eq!(cell.type_vec, vec![2, 2]);
        assert_eq!(cell.volume, 1);
    }

    #[test]
    fn collinear_configuration_is_not_full_dimensional() {
        let mut sub = subdivision(vec![vec![vec![0, 0], vec![1, 1], vec![2, 2]]]);
        let err = sub.initial_simplex().unwrap_err();
        assert!(err.to_string().contains("not full dimensional"));
    }

    #[test]
    fn unit_cube_leaves_four_points_to_place() {
        let cube: Vec<Vec<i64>> = (0..8)
            .map(|m| vec![m & 1, (m >> 1) & 1, (m >> 2) & 1])
            .collect();
        let mut sub = subdivision(vec![cube]);
        let rest = sub.initial_simplex().unwrap();
        assert_eq!(rest.len(), 4);
        assert!(sub.cell(sub.cells()[0]).volume >= 1);
    }
}
