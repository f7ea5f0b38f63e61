use anyhow::{anyhow, bail, Result};
use log::debug;

use super::{required_above, CellId, Subdivision};
use crate::cayley::PointId;
use crate::geometry::lattice::{self, IntMatrix};

impl Subdivision {
    /// Minimal integer lift keeping `x` strictly above every cell's
    /// lifted hyperplane.
    pub fn required_lift(&self, x: PointId) -> Result<i64> {
        let coords = &self.points[x.0].coords;
        let mut best: Option<i64> = None;
        for id in self.cells() {
            let cell = &self.cells[id.0];
            let lift = required_above(&cell.normal, cell.offset, coords)?;
            best = Some(best.map_or(lift, |b| b.max(lift)));
        }
        Ok(best.unwrap_or(0))
    }

    /// Exact barycentric coordinates of `x` in the cell, as numerators over
    /// a common positive denominator.
    fn barycentric(&self, cell: CellId, x: PointId) -> Result<Vec<i128>> {
        let n = self.dim;
        let vertices = &self.cells[cell.0].vertices;
        let m = IntMatrix::from_fn(n + 1, n + 1, |i, j| {
            if i == n {
                1
            } else {
                self.points[vertices[j].0].coords[i]
            }
        });
        let mut rhs = self.points[x.0].coords.clone();
        rhs.push(1);
        let (nums, _den) = lattice::solve_exact(&m, &rhs)
            .ok_or_else(|| anyhow!("Cell {:?} is degenerate", cell))?;
        Ok(nums)
    }

    /// Places `x` at its required lift and pivots it into every outer facet
    /// it sees. Returns the new cells; empty when `x` falls inside the
    /// current hull.
    pub fn place(&mut self, x: PointId) -> Result<Vec<CellId>> {
        if self.points[x.0].is_placed() {
            bail!("Point {:?} has already been placed", self.points[x.0].key);
        }
        if self.cells.is_empty() {
            bail!("Choose the initial simplex before placing points");
        }
        let lift = self.required_lift(x)?;
        self.mark_placed(x, lift);

        let candidates: Vec<CellId> = self
            .cells()
            .into_iter()
            .filter(|c| self.cells[c.0].has_outer_facet())
            .collect();

        let mut created = Vec::new();
        for old in candidates {
            let lambda = self.barycentric(old, x)?;
            let visible: Vec<usize> = self.cells[old.0]
                .neighbors
                .iter()
                .enumerate()
                .filter(|(i, nb)| nb.is_none() && lambda[*i] < 0)
                .map(|(i, _)| i)
                .collect();
            for slot in visible {
                let mut vertices = self.cells[old.0].vertices.clone();
                vertices[slot] = x;
                let id = self.push_cell(vertices)?;
                self.link(old, id)?;
                created.push(id);
            }
        }

        for (i, &a) in created.iter().enumerate() {
            for &b in &created[i + 1..] {
                if self.is_flipped(a, b).is_some() {
                    self.link(a, b)?;
                }
            }
        }

        debug!(
            "Placed {:?} at lift {} creating {} cells",
            self.points[x.0].key,
            lift,
            created.len()
        );
        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use crate::cayley::PointId;
    use crate::subdivision::tests::build;

    #[test]
    fn interior_point_creates_no_cells() {
        let sub = build(vec![vec![vec![0], vec![1], vec![2]]], i64::MAX);
        assert_eq!(sub.len(), 1);
        assert_eq!(sub.point(PointId(1)).lift, 1);
        assert!(sub.point(PointId(1)).is_placed());
    }

    #[test]
    fn exterior_point_pivots_into_visible_facet() {
        let sub = build(vec![vec![vec![0], vec![2], vec![3]]], i64::MAX);
        // {0, 3} is the initial simplex; 2 lies inside it.
        assert_eq!(sub.len(), 1);

        let sub = build(vec![vec![vec![0], vec![1], vec![-2]]], i64::MAX);
        assert_eq!(sub.len(), 2);
        let cells = sub.cells();
        assert_eq!(sub.is_flipped(cells[0], cells[1]), Some((1, 1)));
        assert_eq!(sub.cell(cells[1]).volume, 2);
        assert_eq!(sub.mixed_volume(&[1]), 3);
    }

    #[test]
    fn new_cells_lie_on_lower_faces() {
        let sub = build(
            vec![vec![vec![0, 0], vec![3, 0], vec![0, 3], vec![-1, -1], vec![4, 4]]],
            i64::MAX,
        );
        for face in sub.faces() {
            assert_eq!(face.cells.len(), 1);
            assert_eq!(sub.face_points(&face).unwrap().len(), 3);
        }
        assert_eq!(sub.mixed_volume(&[2]), 30);
    }
}
