//! One polyhedral-homotopy solve, from point configurations to tracked
//! endpoints.
//!
//! Points are placed one at a time into a Cayley triangulation; every new
//! cell of the requested type gets its binomial start solutions right away.
//! When a lift would exceed the flatten threshold the points placed so far
//! are solved and the solutions kept as a snapshot, and the stage is
//! flattened. At the end every lower face of the last stage is solved:
//!
//! - the flat region of earlier stages starts from the latest snapshot,
//! - a single cell starts from its binomial solutions,
//! - a run of cells sharing a normal is relifted (or, failing that, solved
//!   from a fresh subdivision of its points),
//!
//! and the face solutions are deformed to the system on all placed points.

use std::collections::HashMap;

use anyhow::{anyhow, bail, Context, Result};
use log::{debug, info, warn};
use num_complex::Complex;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::aset::{Aset, PointKey};
use crate::binomial::cell_start_solutions;
use crate::cayley::{CayleyEmbedding, PointId};
use crate::geometry::lattice;
use crate::homotopy::{random_chart, Homotopy, HomotopyPoint};
use crate::psys::PolySystem;
use crate::subdivision::{CellId, Face, Subdivision, SubdivisionSettings};
use crate::tracker::{track_path, TrackError, TrackerSettings, TweakSchedule};

/// Highest accepted `SolveRequest::tweak`.
pub const MAX_TWEAK: u8 = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolveSettings {
    pub subdivision: SubdivisionSettings,
    pub tracker: TrackerSettings,
    pub schedule: TweakSchedule,
    /// Failing paths are retried with increasing tweak up to this level.
    pub max_tweak: u8,
    /// Nesting limit for faces that need a fresh subdivision.
    pub max_depth: usize,
}

impl Default for SolveSettings {
    fn default() -> Self {
        Self {
            subdivision: SubdivisionSettings::default(),
            tracker: TrackerSettings::default(),
            schedule: TweakSchedule::default(),
            max_tweak: MAX_TWEAK,
            max_depth: 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolveRequest {
    pub aset: Aset,
    /// Equations per configuration; defaults to the type of the initial
    /// simplex.
    #[serde(default)]
    pub type_vec: Option<Vec<usize>>,
    #[serde(default)]
    pub seed: u64,
    #[serde(default)]
    pub tweak: u8,
    #[serde(default)]
    pub settings: SolveSettings,
}

impl SolveRequest {
    pub fn new(aset: Aset) -> Self {
        Self {
            aset,
            type_vec: None,
            seed: 0,
            tweak: 0,
            settings: SolveSettings::default(),
        }
    }
}

/// A path that could not be tracked even at the highest tweak.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedPath {
    /// Index of the homotopy the path belonged to, counted from 1.
    pub level: usize,
    pub error: TrackError,
    pub tweak: u8,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SolveReport {
    pub type_vec: Vec<usize>,
    pub mixed_volume: i64,
    pub cells: usize,
    pub mixed_cells: usize,
    pub stages: usize,
    pub start_solutions: usize,
    pub paths_tracked: usize,
    pub failed_paths: Vec<FailedPath>,
    /// Tweak level that succeeded, per tracked path.
    pub tweaks: Vec<u8>,
    pub max_lift: i64,
    pub relifts: usize,
    pub fresh_subdivisions: usize,
    /// Largest target residual among the returned solutions.
    pub max_residual: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolveResult {
    /// Endpoints at `t = 1` on the projective chart.
    pub solutions: Vec<HomotopyPoint>,
    /// The generic system with the final lifts as deformation exponents.
    pub system: PolySystem,
    pub report: SolveReport,
}

/// `e(a) = ⟨ν, â⟩ - c` for a lifted point on or above the hyperplane.
fn deformation(normal: &[i64], offset: i64, lifted: &[i64]) -> Result<u32> {
    let e = lattice::dot(normal, lifted) - offset as i128;
    u32::try_from(e).map_err(|_| anyhow!("Deformation exponent {} is out of range", e))
}

fn resolve_type(
    aset: &Aset,
    requested: Option<&[usize]>,
    sub: &Subdivision,
) -> Result<Vec<usize>> {
    let type_vec = match requested {
        Some(t) => t.to_vec(),
        None => sub
            .cells()
            .first()
            .map(|&c| sub.cell(c).mixed_type())
            .ok_or_else(|| anyhow!("No cell to take the default type from"))?,
    };
    if type_vec.len() != aset.len() {
        bail!(
            "Type vector has {} entries for {} configurations",
            type_vec.len(),
            aset.len()
        );
    }
    let total: usize = type_vec.iter().sum();
    if total != aset.dim() {
        bail!("Type vector sums to {} (expected {})", total, aset.dim());
    }
    Ok(type_vec)
}

/// Solve-scoped state shared by every subdivision of one solve.
pub struct SolveContext<'a> {
    aset: &'a Aset,
    system: PolySystem,
    chart: Vec<Complex<f64>>,
    type_vec: Vec<usize>,
    tweak: u8,
    settings: SolveSettings,
    level: usize,
    report: SolveReport,
}

/// Per-subdivision state: start solutions of the cells of the requested
/// type and the snapshot taken at each flattening.
#[derive(Default)]
struct Stage {
    starts: HashMap<CellId, Vec<Vec<Complex<f64>>>>,
    snapshots: Vec<Vec<HomotopyPoint>>,
}

impl Stage {
    /// Start points of the flat region: the solutions kept at the latest
    /// flattening.
    fn latest_snapshot(&self) -> Result<Vec<HomotopyPoint>> {
        match self.snapshots.last() {
            Some(snapshot) => Ok(snapshot.clone()),
            None => bail!("Flat face without a snapshot of the earlier stages"),
        }
    }
}

impl<'a> SolveContext<'a> {
    /// Draws the random system and chart from `seed`.
    pub fn new(
        aset: &'a Aset,
        type_vec: Vec<usize>,
        seed: u64,
        tweak: u8,
        settings: SolveSettings,
    ) -> Result<Self> {
        if tweak > MAX_TWEAK {
            bail!("Tweak {} is out of range (0..={})", tweak, MAX_TWEAK);
        }
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let system = PolySystem::random(aset, &type_vec, &mut rng)?;
        let chart = random_chart(aset.dim() + 1, &mut rng);
        Ok(Self {
            aset,
            system,
            chart,
            report: SolveReport {
                type_vec: type_vec.clone(),
                ..SolveReport::default()
            },
            type_vec,
            tweak,
            settings,
            level: 0,
        })
    }

    pub fn system(&self) -> &PolySystem {
        &self.system
    }

    pub fn chart(&self) -> &[Complex<f64>] {
        &self.chart
    }

    pub fn report(&self) -> &SolveReport {
        &self.report
    }

    /// Solves the system restricted to `keys` from a fresh subdivision.
    pub fn solve_points(&mut self, keys: &[PointKey]) -> Result<Vec<HomotopyPoint>> {
        self.solve_subset(keys, 0)
    }

    fn solve_subset(&mut self, keys: &[PointKey], depth: usize) -> Result<Vec<HomotopyPoint>> {
        let embedding = CayleyEmbedding::with_keys(self.aset, keys)?;
        let mut sub = Subdivision::new(embedding, self.settings.subdivision);
        let rest = sub.initial_simplex()?;
        let (solutions, _) = self.run(sub, rest, depth)?;
        Ok(solutions)
    }

    /// Places `rest` into `sub` and solves the final stage.
    fn run(
        &mut self,
        mut sub: Subdivision,
        rest: Vec<PointId>,
        depth: usize,
    ) -> Result<(Vec<HomotopyPoint>, Subdivision)> {
        let mut stage = Stage::default();
        for id in sub.cells() {
            self.record_starts(&sub, id, &mut stage, depth)?;
        }

        for x in rest {
            let lift = sub.required_lift(x)?;
            if sub.needs_flatten(lift) {
                let snapshot = self.solve_stage(&mut sub, &stage, depth)?;
                info!(
                    "Stage {} solved with {} solutions before flattening",
                    sub.stage(),
                    snapshot.len()
                );
                stage.snapshots.push(snapshot);
                sub.flatten();
            }
            for id in sub.place(x)? {
                self.record_starts(&sub, id, &mut stage, depth)?;
            }
        }

        let solutions = self.solve_stage(&mut sub, &stage, depth)?;
        Ok((solutions, sub))
    }

    fn record_starts(
        &mut self,
        sub: &Subdivision,
        id: CellId,
        stage: &mut Stage,
        depth: usize,
    ) -> Result<()> {
        let cell = sub.cell(id);
        if !cell.has_type(&self.type_vec) {
            return Ok(());
        }
        let keys: Vec<PointKey> = cell.vertices.iter().map(|&v| sub.point(v).key).collect();
        let solutions = cell_start_solutions(&self.system, &keys, &self.type_vec)
            .with_context(|| format!("Start system of cell {:?}", keys))?;
        if solutions.len() as i64 != cell.volume {
            warn!(
                "Cell {:?} of volume {} yields {} start solutions",
                id,
                cell.volume,
                solutions.len()
            );
        }
        debug!("Cell {:?}: {} start solutions", id, solutions.len());
        if depth == 0 {
            self.report.start_solutions += solutions.len();
        }
        stage.starts.insert(id, solutions);
        Ok(())
    }

    fn cell_starts(&self, stage: &Stage, id: CellId) -> Vec<HomotopyPoint> {
        stage
            .starts
            .get(&id)
            .map(|ys| {
                ys.iter()
                    .map(|y| HomotopyPoint::from_affine(y, &self.chart, 0.0))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Solutions of the system on every placed point of `sub`.
    fn solve_stage(
        &mut self,
        sub: &mut Subdivision,
        stage: &Stage,
        depth: usize,
    ) -> Result<Vec<HomotopyPoint>> {
        let placed = sub.placed_points();
        let mut out = Vec::new();
        for face in sub.faces() {
            let starts = if face.is_flat() && sub.stage() > 0 {
                stage.latest_snapshot()?
            } else {
                if !face
                    .cells
                    .iter()
                    .any(|&c| sub.cell(c).has_type(&self.type_vec))
                {
                    continue;
                }
                let points = sub.face_points(&face)?;
                if face.cells.len() == 1 && points == sub.face_vertices(&face) {
                    self.cell_starts(stage, face.cells[0])
                } else {
                    self.solve_face(sub, &face, &points, stage, depth)?
                }
            };
            if starts.is_empty() {
                continue;
            }

            let mut exponents = HashMap::with_capacity(placed.len());
            for &p in &placed {
                let point = sub.point(p);
                exponents.insert(
                    point.key,
                    deformation(&face.normal, face.offset, &point.lifted())?,
                );
            }
            out.extend(self.track_all(&exponents, starts));
        }
        Ok(out)
    }

    /// Solutions of the face system: every monomial of the face active.
    fn solve_face(
        &mut self,
        sub: &mut Subdivision,
        face: &Face,
        points: &[PointId],
        stage: &Stage,
        depth: usize,
    ) -> Result<Vec<HomotopyPoint>> {
        if let Some(relifted) = sub.relift(face, points)? {
            self.report.relifts += 1;
            let mut out = Vec::new();
            for cell in &relifted.cells {
                if !sub.cell(cell.id).has_type(&self.type_vec) {
                    continue;
                }
                let starts = self.cell_starts(stage, cell.id);
                if starts.is_empty() {
                    continue;
                }
                let mut exponents = HashMap::with_capacity(points.len());
                for &p in points {
                    let point = sub.point(p);
                    let mut lifted = point.coords.clone();
                    lifted.push(relifted.lift(p));
                    exponents.insert(point.key, deformation(&cell.normal, cell.offset, &lifted)?);
                }
                out.extend(self.track_all(&exponents, starts));
            }
            return Ok(out);
        }

        let keys: Vec<PointKey> = points.iter().map(|&p| sub.point(p).key).collect();
        self.solve_fresh(&face.normal, &keys, depth)
    }

    /// Fallback for a face that cannot be relifted: its points get a
    /// subdivision of their own one level deeper.
    fn solve_fresh(
        &mut self,
        normal: &[i64],
        keys: &[PointKey],
        depth: usize,
    ) -> Result<Vec<HomotopyPoint>> {
        if depth >= self.settings.max_depth {
            bail!(
                "Cannot relift face with normal {:?}: nesting limit {} reached",
                normal,
                self.settings.max_depth
            );
        }
        debug!(
            "Solving face {:?} ({} points) from a fresh subdivision",
            normal,
            keys.len()
        );
        self.report.fresh_subdivisions += 1;
        self.solve_subset(keys, depth + 1)
    }

    /// Tracks every start point of one homotopy; failed paths are recorded
    /// and dropped.
    fn track_all(
        &mut self,
        exponents: &HashMap<PointKey, u32>,
        starts: Vec<HomotopyPoint>,
    ) -> Vec<HomotopyPoint> {
        self.level += 1;
        let level = self.level;
        let homotopy = Homotopy::new(&self.system.deformed(exponents), self.chart.clone());
        let mut out = Vec::with_capacity(starts.len());
        for mut start in starts {
            start.t = 0.0;
            self.report.paths_tracked += 1;
            match self.track_with_retries(&homotopy, &start) {
                Ok((point, tweak)) => {
                    self.report.tweaks.push(tweak);
                    out.push(point);
                }
                Err((error, tweak)) => {
                    warn!("Path dropped at level {} (tweak {}): {}", level, tweak, error);
                    self.report.failed_paths.push(FailedPath {
                        level,
                        error,
                        tweak,
                    });
                }
            }
        }
        debug!("Level {}: {} paths finished", level, out.len());
        out
    }

    fn track_with_retries(
        &self,
        homotopy: &Homotopy,
        start: &HomotopyPoint,
    ) -> Result<(HomotopyPoint, u8), (TrackError, u8)> {
        let mut tweak = self.tweak;
        loop {
            let settings = self
                .settings
                .schedule
                .tweaked(&self.settings.tracker, tweak as usize);
            match track_path(homotopy, start, &settings) {
                Ok(outcome) => return Ok((outcome.point, tweak)),
                Err(err) if tweak < self.settings.max_tweak => {
                    debug!("Retrying path with tweak {} after: {}", tweak + 1, err);
                    tweak += 1;
                }
                Err(err) => return Err((err, tweak)),
            }
        }
    }
}

/// Computes every isolated solution of a generic system with the supports
/// of `request.aset`.
pub fn solve(request: &SolveRequest) -> Result<SolveResult> {
    let aset = &request.aset;
    let settings = request.settings.clone();
    let mut sub = Subdivision::new(CayleyEmbedding::new(aset)?, settings.subdivision);
    let rest = sub.initial_simplex()?;
    let type_vec = resolve_type(aset, request.type_vec.as_deref(), &sub)?;
    info!(
        "Solving {} configurations ({} points) in dimension {} with type {:?}",
        aset.len(),
        aset.total_points(),
        aset.dim(),
        type_vec
    );

    let mut ctx = SolveContext::new(aset, type_vec, request.seed, request.tweak, settings)?;
    let (solutions, sub) = ctx.run(sub, rest, 0)?;

    let mut lifts = HashMap::with_capacity(sub.points().len());
    for point in sub.points() {
        let lift = u32::try_from(point.lift)
            .with_context(|| format!("Lift of {:?} is negative", point.key))?;
        lifts.insert(point.key, lift);
    }
    let system = ctx.system.deformed(&lifts);

    let target = Homotopy::new(&ctx.system, ctx.chart.clone());
    let mut report = ctx.report;
    report.mixed_volume = sub.mixed_volume(&ctx.type_vec);
    report.cells = sub.len();
    report.mixed_cells = sub
        .cells()
        .iter()
        .filter(|&&c| sub.cell(c).has_type(&ctx.type_vec))
        .count();
    report.stages = sub.stage() + 1;
    report.max_lift = sub.max_placement_lift();
    report.max_residual = solutions
        .iter()
        .map(|p| target.residual(&p.affine()))
        .fold(0.0, f64::max);

    if solutions.len() as i64 != report.mixed_volume {
        warn!(
            "Found {} solutions for mixed volume {}",
            solutions.len(),
            report.mixed_volume
        );
    }
    info!(
        "Mixed volume {}: {} solutions, {} failed paths, {} stages",
        report.mixed_volume,
        solutions.len(),
        report.failed_paths.len(),
        report.stages
    );

    Ok(SolveResult {
        solutions,
        system,
        report,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::init_test_logger;
    use crate::tracker::TrackerKind;

    fn request(coords: Vec<Vec<Vec<i64>>>, type_vec: Option<Vec<usize>>) -> SolveRequest {
        SolveRequest {
            type_vec,
            seed: 42,
            ..SolveRequest::new(Aset::from_coords(coords).unwrap())
        }
    }

    fn dense_quadratic() -> Vec<Vec<i64>> {
        vec![
            vec![0, 0],
            vec![1, 0],
            vec![0, 1],
            vec![2, 0],
            vec![1, 1],
            vec![0, 2],
        ]
    }

    fn assert_solved(result: &SolveResult, expected: usize) {
        assert_eq!(result.report.mixed_volume, expected as i64);
        assert!(result.report.failed_paths.is_empty());
        assert_eq!(result.solutions.len(), expected);
        for p in &result.solutions {
            assert_eq!(p.t, 1.0);
            for v in result.system.evaluate(&p.affine()) {
                assert!(v.norm() < 1e-8, "residual {}", v.norm());
            }
        }
        for (i, a) in result.solutions.iter().enumerate() {
            for b in &result.solutions[i + 1..] {
                let gap: f64 = a
                    .affine()
                    .iter()
                    .zip(b.affine())
                    .map(|(x, y)| (x - y).norm())
                    .fold(0.0, f64::max);
                assert!(gap > 1e-6);
            }
        }
    }

    #[test]
    fn linear_equation_in_each_variable() {
        init_test_logger();
        let result = solve(&request(
            vec![vec![vec![0, 0], vec![1, 0]], vec![vec![0, 0], vec![0, 1]]],
            Some(vec![1, 1]),
        ))
        .unwrap();
        assert_solved(&result, 1);
        assert_eq!(result.report.start_solutions, 1);
    }

    #[test]
    fn univariate_quadratic_has_two_roots() {
        init_test_logger();
        let result = solve(&request(vec![vec![vec![0], vec![1], vec![2]]], Some(vec![1]))).unwrap();
        assert_solved(&result, 2);
    }

    #[test]
    fn dense_quadratic_support_used_twice() {
        init_test_logger();
        let result = solve(&request(vec![dense_quadratic()], None)).unwrap();
        assert_eq!(result.report.type_vec, vec![2]);
        assert_solved(&result, 4);
        assert_eq!(result.report.start_solutions, 4);
    }

    #[test]
    fn two_dense_quadratics_meet_in_four_points() {
        init_test_logger();
        let result = solve(&request(
            vec![dense_quadratic(), dense_quadratic()],
            Some(vec![1, 1]),
        ))
        .unwrap();
        assert_solved(&result, 4);
        assert!(result.report.mixed_cells >= 1);
        assert!(result.report.max_residual < 1e-8);
    }

    #[test]
    fn collinear_configuration_is_rejected() {
        let err = solve(&request(
            vec![vec![vec![0, 0], vec![1, 1], vec![2, 2]]],
            None,
        ))
        .unwrap_err();
        assert!(err.to_string().contains("not full dimensional"));
    }

    #[test]
    fn invalid_type_vector_is_rejected() {
        let err = solve(&request(vec![dense_quadratic()], Some(vec![1]))).unwrap_err();
        assert!(err.to_string().contains("sums to 1"));
        let err = solve(&request(vec![dense_quadratic()], Some(vec![1, 1]))).unwrap_err();
        assert!(err.to_string().contains("entries"));
    }

    #[test]
    fn out_of_range_tweak_is_rejected() {
        let mut req = request(vec![vec![vec![0], vec![1]]], None);
        req.tweak = 4;
        assert!(solve(&req).is_err());
    }

    #[test]
    fn tiny_flatten_threshold_keeps_every_solution() {
        init_test_logger();
        let mut req = request(vec![dense_quadratic(), dense_quadratic()], Some(vec![1, 1]));
        req.settings.subdivision.flatten_threshold = 1;
        let result = solve(&req).unwrap();
        assert!(result.report.stages > 1);
        assert_solved(&result, 4);
    }

    #[test]
    fn relifted_runs_keep_every_solution() {
        init_test_logger();
        let mut req = request(vec![dense_quadratic(), dense_quadratic()], Some(vec![1, 1]));
        req.settings.subdivision.flatten_threshold = 2;
        let result = solve(&req).unwrap();
        assert!(result.report.relifts > 0);
        assert_solved(&result, 4);
    }

    #[test]
    fn fresh_subdivision_solves_the_face_points() {
        init_test_logger();
        let aset = Aset::from_coords(vec![vec![vec![0], vec![1], vec![2], vec![4]]]).unwrap();
        let mut ctx = SolveContext::new(&aset, vec![1], 3, 0, SolveSettings::default()).unwrap();
        let keys: Vec<PointKey> = [0, 1, 2, 3]
            .into_iter()
            .map(|index| PointKey { config: 0, index })
            .collect();
        let solutions = ctx.solve_fresh(&[0, 1], &keys, 0).unwrap();
        assert_eq!(solutions.len(), 4);
        assert_eq!(ctx.report().fresh_subdivisions, 1);
        let target = Homotopy::new(ctx.system(), ctx.chart().to_vec());
        for p in &solutions {
            assert!(target.residual(&p.affine()) < 1e-8);
        }
    }

    #[test]
    fn fresh_subdivision_stops_at_the_nesting_limit() {
        let aset = Aset::from_coords(vec![vec![vec![0], vec![1], vec![2]]]).unwrap();
        let settings = SolveSettings {
            max_depth: 1,
            ..SolveSettings::default()
        };
        let mut ctx = SolveContext::new(&aset, vec![1], 3, 0, settings).unwrap();
        let keys: Vec<PointKey> = (0..3).map(|index| PointKey { config: 0, index }).collect();
        let err = ctx.solve_fresh(&[0, 1], &keys, 1).unwrap_err();
        assert!(err.to_string().contains("nesting limit 1"));
        assert_eq!(ctx.report().fresh_subdivisions, 0);
    }

    #[test]
    fn flat_face_needs_a_snapshot() {
        let err = Stage::default().latest_snapshot().unwrap_err();
        assert!(err.to_string().contains("snapshot"));
        let chart = [Complex::new(1.0, 0.0), Complex::new(0.0, 0.0)];
        let point = HomotopyPoint::from_affine(&[Complex::new(1.0, 0.0)], &chart, 1.0);
        let stage = Stage {
            snapshots: vec![Vec::new(), vec![point]],
            ..Stage::default()
        };
        assert_eq!(stage.latest_snapshot().unwrap().len(), 1);
    }

    fn dense_support(dim: usize, degree: i64) -> Vec<Vec<i64>> {
        let mut out: Vec<Vec<i64>> = vec![Vec::new()];
        for _ in 0..dim {
            out = out
                .into_iter()
                .flat_map(|prefix| {
                    let used: i64 = prefix.iter().sum();
                    (0..=degree - used).map(move |k| {
                        let mut next = prefix.clone();
                        next.push(k);
                        next
                    })
                })
                .collect();
        }
        out
    }

    #[test]
    fn long_paths_survive_the_retry_ladder() {
        init_test_logger();
        for seed in [5, 8] {
            let req = SolveRequest {
                type_vec: Some(vec![2, 1]),
                seed,
                ..SolveRequest::new(
                    Aset::from_coords(vec![dense_support(3, 2), dense_support(3, 3)]).unwrap(),
                )
            };
            let result = solve(&req).unwrap();
            assert_eq!(result.report.mixed_volume, 12);
            assert!(
                result.report.failed_paths.is_empty(),
                "seed {}: {:?}",
                seed,
                result.report.failed_paths
            );
            assert_eq!(result.solutions.len(), 12);
        }
    }

    #[test]
    fn same_seed_gives_same_solutions() {
        let req = request(vec![vec![vec![0], vec![1], vec![3]]], None);
        let a = solve(&req).unwrap();
        let b = solve(&req).unwrap();
        assert_eq!(a.system, b.system);
        assert_eq!(a.solutions.len(), 3);
        for (p, q) in a.solutions.iter().zip(&b.solutions) {
            assert!((p.affine()[0] - q.affine()[0]).norm() < 1e-12);
        }
    }

    #[test]
    fn euler_tracker_solves_the_univariate_case() {
        let mut req = request(vec![vec![vec![0], vec![1], vec![2], vec![3]]], None);
        req.settings.tracker.kind = TrackerKind::Euler;
        let result = solve(&req).unwrap();
        assert_solved(&result, 3);
    }

    #[test]
    fn subset_solve_restricts_the_system() {
        let aset = Aset::from_coords(vec![vec![vec![0], vec![1], vec![2], vec![4]]]).unwrap();
        let mut ctx = SolveContext::new(&aset, vec![1], 9, 0, SolveSettings::default()).unwrap();
        let keys: Vec<PointKey> = (0..3).map(|index| PointKey { config: 0, index }).collect();
        let solutions = ctx.solve_points(&keys).unwrap();
        assert_eq!(solutions.len(), 2);
        let eq = &ctx.system().equations()[0];
        for p in &solutions {
            let y = p.affine()[0];
            let value: Complex<f64> = eq.monomials[..3]
                .iter()
                .map(|m| m.coefficient * y.powu(m.exponents[0]))
                .sum();
            assert!(value.norm() < 1e-8);
        }
    }
}
