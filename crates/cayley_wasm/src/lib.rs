//! WASM bindings for the polyhedral homotopy solver.
//!
//! Requests and results cross the boundary as plain JS objects through
//! `serde-wasm-bindgen`; the shapes are the serde forms of the
//! `cayley_core` types.

use cayley_core::solutions::{real_solutions, verify, FilterSettings, Solution};
use cayley_core::{solve, HomotopyPoint, SolveReport, SolveRequest, SolveResult};
use serde::{Deserialize, Serialize};
use serde_wasm_bindgen::{from_value, to_value};
use wasm_bindgen::prelude::*;

#[derive(Debug, Deserialize)]
struct SolveInput {
    request: SolveRequest,
    #[serde(default)]
    filter: FilterSettings,
}

#[derive(Debug, Serialize)]
struct SolveOutput {
    points: Vec<HomotopyPoint>,
    solutions: Vec<Solution>,
    real_solutions: Vec<Vec<f64>>,
    report: SolveReport,
}

fn summarize(result: &SolveResult, filter: &FilterSettings) -> SolveOutput {
    let solutions = verify(&result.system, &result.solutions, filter);
    SolveOutput {
        points: result.solutions.clone(),
        real_solutions: real_solutions(&solutions),
        solutions,
        report: result.report.clone(),
    }
}

fn run_solve(request: &SolveRequest) -> Result<SolveResult, String> {
    solve(request).map_err(|e| format!("Solve failed: {:#}", e))
}

fn serialize<T: Serialize>(value: &T) -> Result<JsValue, JsValue> {
    to_value(value).map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
}

fn parse_filter(filter_val: JsValue) -> Result<FilterSettings, JsValue> {
    if filter_val.is_undefined() || filter_val.is_null() {
        return Ok(FilterSettings::default());
    }
    from_value(filter_val).map_err(|e| JsValue::from_str(&format!("Invalid filter settings: {}", e)))
}

/// Solves `{ request, filter? }` in one call and returns the tracked
/// endpoints, the verified solutions, the real ones and the solve report.
#[wasm_bindgen]
pub fn solve_system(input_val: JsValue) -> Result<JsValue, JsValue> {
    console_error_panic_hook::set_once();
    let input: SolveInput = from_value(input_val)
        .map_err(|e| JsValue::from_str(&format!("Invalid solve request: {}", e)))?;
    let result = run_solve(&input.request).map_err(|e| JsValue::from_str(&e))?;
    serialize(&summarize(&result, &input.filter))
}

/// Keeps the raw solve result so the host can re-filter it without
/// tracking again.
#[wasm_bindgen]
pub struct WasmSolver {
    request: SolveRequest,
    result: Option<SolveResult>,
}

impl WasmSolver {
    fn from_request(request: SolveRequest) -> Self {
        Self {
            request,
            result: None,
        }
    }

    fn run(&mut self) -> Result<&SolveReport, String> {
        let result = run_solve(&self.request)?;
        Ok(&self.result.insert(result).report)
    }

    fn solved(&self) -> Result<&SolveResult, String> {
        self.result
            .as_ref()
            .ok_or_else(|| "Solver has not run yet".to_string())
    }

    fn filtered(&self, filter: &FilterSettings) -> Result<SolveOutput, String> {
        Ok(summarize(self.solved()?, filter))
    }
}

#[wasm_bindgen]
impl WasmSolver {
    #[wasm_bindgen(constructor)]
    pub fn new(request_val: JsValue) -> Result<WasmSolver, JsValue> {
        console_error_panic_hook::set_once();
        let request: SolveRequest = from_value(request_val)
            .map_err(|e| JsValue::from_str(&format!("Invalid solve request: {}", e)))?;
        Ok(Self::from_request(request))
    }

    pub fn is_solved(&self) -> bool {
        self.result.is_some()
    }

    /// Runs the solve and returns its report.
    pub fn solve(&mut self) -> Result<JsValue, JsValue> {
        let report = self.run().map_err(|e| JsValue::from_str(&e))?;
        serialize(report)
    }

    pub fn get_points(&self) -> Result<JsValue, JsValue> {
        let result = self.solved().map_err(|e| JsValue::from_str(&e))?;
        serialize(&result.solutions)
    }

    pub fn get_solutions(&self, filter_val: JsValue) -> Result<JsValue, JsValue> {
        let filter = parse_filter(filter_val)?;
        let output = self.filtered(&filter).map_err(|e| JsValue::from_str(&e))?;
        serialize(&output.solutions)
    }

    pub fn get_real_solutions(&self, filter_val: JsValue) -> Result<JsValue, JsValue> {
        let filter = parse_filter(filter_val)?;
        let output = self.filtered(&filter).map_err(|e| JsValue::from_str(&e))?;
        serialize(&output.real_solutions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cayley_core::Aset;
    use num_complex::Complex;

    fn quadratic_request() -> SolveRequest {
        let aset = Aset::from_coords(vec![vec![vec![0], vec![1], vec![2]]]).expect("aset");
        SolveRequest {
            seed: 11,
            ..SolveRequest::new(aset)
        }
    }

    #[test]
    fn solver_reports_before_and_after_running() {
        let mut solver = WasmSolver::from_request(quadratic_request());
        assert!(!solver.is_solved());
        let message = solver.filtered(&FilterSettings::default()).err().unwrap_or_default();
        assert!(message.contains("has not run"));

        let report = solver.run().expect("solve").clone();
        assert!(solver.is_solved());
        assert_eq!(report.mixed_volume, 2);

        let output = solver.filtered(&FilterSettings::default()).expect("filter");
        assert_eq!(output.points.len(), 2);
        assert_eq!(output.solutions.len(), 2);
        assert!(output.solutions.iter().all(|s| s.residual < 1e-8));
    }

    #[test]
    fn refiltering_does_not_track_again() {
        let mut solver = WasmSolver::from_request(quadratic_request());
        solver.run().expect("solve");
        let strict = FilterSettings {
            duplicate_tolerance: 1e6,
            ..FilterSettings::default()
        };
        // Every solution is within 1e6 of the first one.
        let output = solver.filtered(&strict).expect("filter");
        assert_eq!(output.solutions.len(), 1);
        assert_eq!(output.points.len(), 2);
    }

    #[test]
    fn real_roots_pass_the_filter() {
        let mut solver = WasmSolver::from_request(quadratic_request());
        solver.run().expect("solve");
        let mut result = solver.solved().expect("result").clone();
        let chart = vec![Complex::new(1.0, 0.0), Complex::new(0.0, 0.0)];
        result.solutions = vec![HomotopyPoint::from_affine(&[Complex::new(0.5, 0.0)], &chart, 1.0)];
        let loose = FilterSettings {
            residual_tolerance: f64::INFINITY,
            ..FilterSettings::default()
        };
        let output = summarize(&result, &loose);
        assert_eq!(output.real_solutions, vec![vec![0.5]]);
    }

    #[test]
    fn invalid_requests_surface_the_core_error() {
        let aset = Aset::from_coords(vec![vec![vec![0, 0], vec![1, 1], vec![2, 2]]]).expect("aset");
        let message = run_solve(&SolveRequest::new(aset)).err().unwrap_or_default();
        assert!(message.starts_with("Solve failed"));
    }
}
