//! Incremental placing triangulation of a lifted Cayley configuration.
//!
//! Cells live in an arena addressed by [`CellId`] and are additionally
//! chained through `next` in creation order. Each cell caches its inner
//! normal `(η, γ)` (γ > 0, gcd-reduced) and the offset `c = ⟨η, v̂⟩` shared
//! by its lifted vertices; every placed point `p̂` satisfies `⟨η, p̂⟩ ≥ c`.
//!
//! Lifts are staged. When a new point would need a lift above
//! [`SubdivisionSettings::flatten_threshold`], the caller may
//! [`Subdivision::flatten`]: placed points drop to lift zero and every
//! existing cell becomes part of one flat region with normal `(0, …, 0, 1)`.

mod initial;
mod insert;
mod relift;

pub use relift::{ReliftedCell, ReliftedFace};

use std::collections::{BTreeMap, HashMap};

use anyhow::{bail, Context, Result};
use log::info;
use serde::{Deserialize, Serialize};

use crate::cayley::{CayleyEmbedding, InternalPoint, PointId};
use crate::geometry::lattice::{self, IntMatrix};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubdivisionSettings {
    /// Largest lift accepted before the current stage is flattened.
    pub flatten_threshold: i64,
}

impl Default for SubdivisionSettings {
    fn default() -> Self {
        Self {
            flatten_threshold: 32,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    pub vertices: Vec<PointId>,
    /// Neighbor across the facet opposite each vertex; `None` on the outer
    /// boundary.
    pub neighbors: Vec<Option<CellId>>,
    /// Vertex count per configuration.
    pub type_vec: Vec<usize>,
    pub normal: Vec<i64>,
    pub offset: i64,
    /// Normalized volume.
    pub volume: i64,
    pub stage: usize,
    pub next: Option<CellId>,
}

impl Cell {
    /// Type vector minus one per configuration; sums to `d`.
    pub fn mixed_type(&self) -> Vec<usize> {
        self.type_vec.iter().map(|&c| c.saturating_sub(1)).collect()
    }

    /// `true` when the cell has `t_k + 1` vertices from every configuration k.
    pub fn has_type(&self, mixed: &[usize]) -> bool {
        self.type_vec.len() == mixed.len()
            && self.type_vec.iter().zip(mixed).all(|(&c, &t)| c == t + 1)
    }

    pub fn has_outer_facet(&self) -> bool {
        self.neighbors.iter().any(Option::is_none)
    }
}

/// A lower face of the current lifting: all cells sharing one normal.
#[derive(Debug, Clone, PartialEq)]
pub struct Face {
    pub normal: Vec<i64>,
    pub offset: i64,
    pub cells: Vec<CellId>,
}

impl Face {
    /// The horizontal region left behind by flattening.
    pub fn is_flat(&self) -> bool {
        let (last, rest) = match self.normal.split_last() {
            Some(split) => split,
            None => return false,
        };
        *last == 1 && rest.iter().all(|&x| x == 0) && self.offset == 0
    }
}

/// Returns `Some((i, j))` when vertex `i` of `a` is the only one missing
/// from `b` and vertex `j` of `b` the only one missing from `a`.
pub fn is_flipped(a: &[PointId], b: &[PointId]) -> Option<(usize, usize)> {
    let only_in = |x: &[PointId], y: &[PointId]| -> Option<usize> {
        let mut missing = x.iter().enumerate().filter(|(_, v)| !y.contains(v));
        let first = missing.next()?.0;
        if missing.next().is_some() {
            return None;
        }
        Some(first)
    };
    Some((only_in(a, b)?, only_in(b, a)?))
}

/// Inner normal and offset of the hyperplane through lifted vertices.
pub fn lifted_normal(vertices: &[Vec<i64>]) -> Result<(Vec<i64>, i64)> {
    let Some((base, rest)) = vertices.split_first() else {
        bail!("A cell needs at least one vertex");
    };
    let cols = base.len();
    let diff = IntMatrix::from_fn(rest.len(), cols, |i, j| rest[i][j] - base[j]);
    let kernel = lattice::kernel_vectors(&diff)?;
    if kernel.len() != 1 {
        bail!(
            "Degenerate cell: lifted vertices span a kernel of dimension {}",
            kernel.len()
        );
    }
    let mut normal = kernel.into_iter().next().unwrap_or_default();
    let gamma = normal[cols - 1];
    if gamma == 0 {
        bail!("Vertical cell normal {:?}", normal);
    }
    if gamma < 0 {
        normal.iter_mut().for_each(|x| *x = -*x);
    }
    let offset = lattice::narrow(lattice::dot(&normal, base))?;
    Ok((normal, offset))
}

/// Smallest integer lift putting `coords` strictly above the hyperplane.
pub fn required_above(normal: &[i64], offset: i64, coords: &[i64]) -> Result<i64> {
    let n = coords.len();
    let gamma = normal[n] as i128;
    let slack = offset as i128 - lattice::dot(&normal[..n], coords);
    lattice::narrow(slack.div_euclid(gamma) + 1)
}

#[derive(Debug, Clone)]
pub struct Subdivision {
    dim: usize,
    configs: usize,
    points: Vec<InternalPoint>,
    order: Vec<PointId>,
    cells: Vec<Cell>,
    head: Option<CellId>,
    tail: Option<CellId>,
    stage: usize,
    stage_placed: usize,
    placed: usize,
    settings: SubdivisionSettings,
}

impl Subdivision {
    pub fn new(embedding: CayleyEmbedding, settings: SubdivisionSettings) -> Self {
        let order = embedding.interleaved();
        Self {
            dim: embedding.dim,
            configs: embedding.configs,
            points: embedding.points,
            order,
            cells: Vec::new(),
            head: None,
            tail: None,
            stage: 0,
            stage_placed: 0,
            placed: 0,
            settings,
        }
    }

    /// Cayley dimension `n`.
    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn configs(&self) -> usize {
        self.configs
    }

    pub fn stage(&self) -> usize {
        self.stage
    }

    pub fn settings(&self) -> &SubdivisionSettings {
        &self.settings
    }

    pub fn points(&self) -> &[InternalPoint] {
        &self.points
    }

    pub fn point(&self, id: PointId) -> &InternalPoint {
        &self.points[id.0]
    }

    pub fn cell(&self, id: CellId) -> &Cell {
        &self.cells[id.0]
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Cell ids in creation order, following the `next` chain.
    pub fn cells(&self) -> Vec<CellId> {
        let mut out = Vec::with_capacity(self.cells.len());
        let mut cursor = self.head;
        while let Some(id) = cursor {
            out.push(id);
            cursor = self.cells[id.0].next;
        }
        out
    }

    pub fn placed_points(&self) -> Vec<PointId> {
        let mut placed: Vec<(usize, PointId)> = self
            .points
            .iter()
            .enumerate()
            .filter_map(|(i, p)| p.placement.map(|pl| (pl.order, PointId(i))))
            .collect();
        placed.sort();
        placed.into_iter().map(|(_, id)| id).collect()
    }

    pub fn max_placement_lift(&self) -> i64 {
        self.points
            .iter()
            .filter_map(|p| p.placement.map(|pl| pl.lift))
            .max()
            .unwrap_or(0)
    }

    fn mark_placed(&mut self, id: PointId, lift: i64) {
        let point = &mut self.points[id.0];
        point.lift = lift;
        point.placement = Some(crate::cayley::Placement {
            stage: self.stage,
            lift,
            order: self.placed,
        });
        self.placed += 1;
        self.stage_placed += 1;
    }

    fn lifted_vertices(&self, vertices: &[PointId]) -> Vec<Vec<i64>> {
        vertices.iter().map(|v| self.points[v.0].lifted()).collect()
    }

    /// Appends a cell with freshly computed type, normal and volume.
    fn push_cell(&mut self, vertices: Vec<PointId>) -> Result<CellId> {
        let n = self.dim;
        if vertices.len() != n + 1 {
            bail!("A cell needs {} vertices, got {}", n + 1, vertices.len());
        }
        let mut type_vec = vec![0usize; self.configs];
        for v in &vertices {
            type_vec[self.points[v.0].config()] += 1;
        }
        let (normal, offset) = lifted_normal(&self.lifted_vertices(&vertices))
            .with_context(|| format!("Computing normal of cell {:?}", vertices))?;

        let base = &self.points[vertices[0].0].coords;
        let edges = IntMatrix::from_fn(n, n, |i, j| {
            self.points[vertices[i + 1].0].coords[j] - base[j]
        });
        let volume = lattice::determinant(&edges)?.abs();
        if volume == 0 {
            bail!("Cell {:?} has zero volume", vertices);
        }

        let id = CellId(self.cells.len());
        self.cells.push(Cell {
            neighbors: vec![None; vertices.len()],
            vertices,
            type_vec,
            normal,
            offset,
            volume,
            stage: self.stage,
            next: None,
        });
        match self.tail {
            Some(prev) => self.cells[prev.0].next = Some(id),
            None => self.head = Some(id),
        }
        self.tail = Some(id);
        Ok(id)
    }

    /// Records `a` and `b` as neighbors across their single differing vertex.
    pub fn link(&mut self, a: CellId, b: CellId) -> Result<()> {
        let Some((i, j)) = is_flipped(&self.cells[a.0].vertices, &self.cells[b.0].vertices) else {
            bail!("Cells {:?} and {:?} are not related by a flip", a, b);
        };
        for (cell, slot, other) in [(a, i, b), (b, j, a)] {
            match self.cells[cell.0].neighbors[slot] {
                Some(existing) if existing != other => {
                    bail!(
                        "Cell {:?} already has neighbor {:?} across slot {}",
                        cell,
                        existing,
                        slot
                    );
                }
                _ => self.cells[cell.0].neighbors[slot] = Some(other),
            }
        }
        Ok(())
    }

    pub fn is_flipped(&self, a: CellId, b: CellId) -> Option<(usize, usize)> {
        is_flipped(&self.cells[a.0].vertices, &self.cells[b.0].vertices)
    }

    /// Cells sorted by type vector (stable within a type).
    pub fn cells_by_type(&self) -> Vec<CellId> {
        let mut ids = self.cells();
        ids.sort_by(|a, b| self.cells[a.0].type_vec.cmp(&self.cells[b.0].type_vec));
        ids
    }

    /// Summed normalized volume per mixed type.
    pub fn mixed_volumes(&self) -> BTreeMap<Vec<usize>, i64> {
        let mut out = BTreeMap::new();
        for cell in &self.cells {
            *out.entry(cell.mixed_type()).or_insert(0) += cell.volume;
        }
        out
    }

    pub fn mixed_volume(&self, mixed: &[usize]) -> i64 {
        self.cells
            .iter()
            .filter(|c| c.has_type(mixed))
            .map(|c| c.volume)
            .sum()
    }

    /// `true` if placing a point at `lift` should end the current stage.
    pub fn needs_flatten(&self, lift: i64) -> bool {
        lift > self.settings.flatten_threshold && self.stage_placed > 0
    }

    /// Ends the current stage.
    pub fn flatten(&mut self) {
        let mut unit = vec![0i64; self.dim + 1];
        unit[self.dim] = 1;
        for point in self.points.iter_mut().filter(|p| p.is_placed()) {
            point.lift = 0;
        }
        for cell in self.cells.iter_mut() {
            cell.normal = unit.clone();
            cell.offset = 0;
        }
        info!(
            "Flattened stage {} ({} points placed, {} cells)",
            self.stage,
            self.stage_placed,
            self.cells.len()
        );
        self.stage += 1;
        self.stage_placed = 0;
    }

    /// Groups cells into lower faces of the current lifting.
    pub fn faces(&self) -> Vec<Face> {
        let mut index: HashMap<(Vec<i64>, i64), usize> = HashMap::new();
        let mut faces: Vec<Face> = Vec::new();
        for id in self.cells() {
            let cell = &self.cells[id.0];
            let key = (cell.normal.clone(), cell.offset);
            match index.get(&key) {
                Some(&i) => faces[i].cells.push(id),
                None => {
                    index.insert(key, faces.len());
                    faces.push(Face {
                        normal: cell.normal.clone(),
                        offset: cell.offset,
                        cells: vec![id],
                    });
                }
            }
        }
        faces
    }

    /// Placed points on the face hyperplane, in placement order.
    pub fn face_points(&self, face: &Face) -> Result<Vec<PointId>> {
        let mut out = Vec::new();
        for id in self.placed_points() {
            let value = lattice::dot(&face.normal, &self.points[id.0].lifted());
            let offset = face.offset as i128;
            if value < offset {
                bail!(
                    "Point {:?} lies below the face with normal {:?}",
                    self.points[id.0].key,
                    face.normal
                );
            }
            if value == offset {
                out.push(id);
            }
        }
        Ok(out)
    }

    /// Vertex set of a face, deduplicated, in placement order.
    pub fn face_vertices(&self, face: &Face) -> Vec<PointId> {
        let mut vertices: Vec<PointId> = face
            .cells
            .iter()
            .flat_map(|c| self.cells[c.0].vertices.iter().copied())
            .collect();
        vertices.sort_by_key(|v| self.placement_order(*v));
        vertices.dedup();
        vertices
    }

    pub(crate) fn placement_order(&self, id: PointId) -> usize {
        self.points[id.0]
            .placement
            .map(|p| p.order)
            .unwrap_or(usize::MAX)
    }
}
