use std::collections::HashMap;

use anyhow::Result;
use log::debug;

use super::{lifted_normal, required_above, CellId, Face, Subdivision};
use crate::cayley::PointId;
use crate::geometry::lattice;

/// One cell of a relifted face with its normal under the new lifts.
#[derive(Debug, Clone, PartialEq)]
pub struct ReliftedCell {
    pub id: CellId,
    pub normal: Vec<i64>,
    pub offset: i64,
}

/// A face whose cells have been made strictly regular by fresh lifts.
#[derive(Debug, Clone, PartialEq)]
pub struct ReliftedFace {
    pub lifts: HashMap<PointId, i64>,
    pub cells: Vec<ReliftedCell>,
}

impl ReliftedFace {
    pub fn lift(&self, id: PointId) -> i64 {
        self.lifts.get(&id).copied().unwrap_or(0)
    }
}

impl Subdivision {
    /// Assigns new lifts to the points of a face so that each of its cells
    /// becomes a lower facet of its own.
    ///
    /// The first cell of the face keeps lift 0 on its vertices. Every other
    /// vertex, in placement order, is lifted one above the highest
    /// requirement among the face cells that are already fully lifted;
    /// points of the face that are not vertices of any cell go strictly
    /// above all cells. Returns `None` if the result does not separate the
    /// cells, which happens when the cells are not a placing triangulation
    /// in that order.
    pub fn relift(&mut self, face: &Face, points: &[PointId]) -> Result<Option<ReliftedFace>> {
        let Some(&first) = face.cells.first() else {
            return Ok(None);
        };
        for &p in points {
            self.points[p.0].seen = false;
        }

        let mut lifts: HashMap<PointId, i64> = HashMap::new();
        let mut done: Vec<ReliftedCell> = Vec::new();
        let mut pending: Vec<CellId> = face.cells.clone();

        for &v in &self.cells[first.0].vertices {
            lifts.insert(v, 0);
            self.points[v.0].seen = true;
        }
        self.collect_lifted(&mut pending, &mut done, &lifts)?;

        let vertices = self.face_vertices(face);
        let mut rest: Vec<PointId> = vertices
            .iter()
            .copied()
            .filter(|v| !self.points[v.0].seen)
            .collect();
        let extra: Vec<PointId> = points
            .iter()
            .copied()
            .filter(|p| !vertices.contains(p))
            .collect();
        rest.extend(extra);

        for p in rest {
            let coords = &self.points[p.0].coords;
            let mut lift = 0;
            for cell in &done {
                lift = lift.max(required_above(&cell.normal, cell.offset, coords)?);
            }
            lifts.insert(p, lift);
            self.points[p.0].seen = true;
            self.collect_lifted(&mut pending, &mut done, &lifts)?;
        }

        for cell in &done {
            let vertices = &self.cells[cell.id.0].vertices;
            for &p in points.iter().filter(|p| !vertices.contains(p)) {
                let mut lifted = self.points[p.0].coords.clone();
                lifted.push(lifts.get(&p).copied().unwrap_or(0));
                if lattice::dot(&cell.normal, &lifted) <= cell.offset as i128 {
                    debug!("Relift of face {:?} does not separate its cells", face.normal);
                    return Ok(None);
                }
            }
        }
        if !pending.is_empty() {
            return Ok(None);
        }

        Ok(Some(ReliftedFace { lifts, cells: done }))
    }

    /// Moves cells whose vertices all have new lifts from `pending` to `done`.
    fn collect_lifted(
        &self,
        pending: &mut Vec<CellId>,
        done: &mut Vec<ReliftedCell>,
        lifts: &HashMap<PointId, i64>,
    ) -> Result<()> {
        let mut still = Vec::with_capacity(pending.len());
        for &id in pending.iter() {
            let vertices = &self.cells[id.0].vertices;
            if !vertices.iter().all(|v| self.points[v.0].seen) {
                still.push(id);
                continue;
            }
            let lifted: Vec<Vec<i64>> = vertices
                .iter()
                .map(|v| {
                    let mut c = self.points[v.0].coords.clone();
                    c.push(lifts.get(v).copied().unwrap_or(0));
                    c
                })
                .collect();
            let (normal, offset) = lifted_normal(&lifted)?;
            done.push(ReliftedCell { id, normal, offset });
        }
        *pending = still;
        Ok(())
    }
}
