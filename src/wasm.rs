//! WASM bindings for Netcalc Core.
//!
//! Exposes build-and-solve on JSON projects to a browser-hosted editor.
//!
//! ## Usage (JavaScript)
//!
//! ```javascript
//! import init, { WasmProject } from 'netcalc_core';
//!
//! await init();
//!
//! const project = new WasmProject(projectJson);
//! const report = JSON.parse(project.calculate('main'));
//! const updated = project.to_json();
//! ```

use wasm_bindgen::prelude::*;

use crate::diagram::{DiagramId, Project};
use crate::error::CalcError;
use crate::netlist::BuildOptions;
use crate::solver::{self, SolverConfig};

/// Initialize panic hook for better error messages in browser console.
#[wasm_bindgen(start)]
pub fn init_panic_hook() {
    console_error_panic_hook::set_once();
}

impl From<CalcError> for JsValue {
    fn from(err: CalcError) -> Self {
        JsValue::from_str(&err.to_string())
    }
}

/// A project held on the WASM side between calls from the editor.
#[wasm_bindgen]
pub struct WasmProject {
    project: Project,
    config: SolverConfig,
}

#[wasm_bindgen]
impl WasmProject {
    /// Parse a project from its JSON form.
    #[wasm_bindgen(constructor)]
    pub fn new(project_json: &str) -> Result<WasmProject, JsValue> {
        let project = Project::from_json(project_json)?;
        Ok(WasmProject {
            project,
            config: SolverConfig::new(),
        })
    }

    /// Override the Newton-Raphson iteration cap and tolerance.
    #[wasm_bindgen]
    pub fn set_solver(&mut self, max_iterations: usize, tolerance: f64) -> Result<(), JsValue> {
        self.config = solver_settings(max_iterations, tolerance)?;
        Ok(())
    }

    /// Solve a diagram, merge the results into it and return the solution
    /// as JSON.
    ///
    /// A failed solve returns an error and leaves the project untouched.
    #[wasm_bindgen]
    pub fn calculate(&mut self, diagram_id: &str) -> Result<String, JsValue> {
        let id = DiagramId::new(diagram_id);
        let calculation =
            solver::calculate(&self.project, &id, &BuildOptions::new(), &self.config)?;

        if let Some(diagram) = self.project.diagram_mut(&id) {
            diagram.apply(&calculation.solution);
        }
        Ok(serde_json::to_string(&calculation.solution).map_err(CalcError::from)?)
    }

    /// Connection ports of a diagram as `{"left": [...], "right": [...]}`.
    #[wasm_bindgen]
    pub fn connection_ports(&self, diagram_id: &str) -> Result<String, JsValue> {
        let id = DiagramId::new(diagram_id);
        let ports = self
            .project
            .connection_ports(&id)
            .ok_or_else(|| CalcError::diagram_not_found(diagram_id))?;
        Ok(serde_json::to_string(&ports).map_err(CalcError::from)?)
    }

    /// Refresh the cached port lists of every reference node. Returns how
    /// many changed.
    #[wasm_bindgen]
    pub fn sync_reference_ports(&mut self) -> usize {
        self.project.sync_reference_ports()
    }

    /// Serialize the project, including any applied results.
    #[wasm_bindgen]
    pub fn to_json(&self) -> Result<String, JsValue> {
        Ok(self.project.to_json()?)
    }
}

/// Validate editor-supplied solver settings.
fn solver_settings(max_iterations: usize, tolerance: f64) -> Result<SolverConfig, CalcError> {
    if tolerance.is_nan() || tolerance <= 0.0 || max_iterations == 0 {
        return Err(CalcError::WasmError {
            message: format!(
                "invalid solver settings: max_iterations={max_iterations}, \
                 tolerance={tolerance}"
            ),
        });
    }
    Ok(SolverConfig::new()
        .with_max_iterations(max_iterations)
        .with_tolerance(tolerance))
}

/// Solve one diagram of a JSON project and return the updated project JSON.
#[wasm_bindgen]
pub fn calculate_json(project_json: &str, diagram_id: &str) -> Result<String, JsValue> {
    let mut project = WasmProject::new(project_json)?;
    project.calculate(diagram_id)?;
    project.to_json()
}

/// Get the library version.
#[wasm_bindgen]
pub fn version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_solver_settings() {
        let config = solver_settings(20, 1e-6).unwrap();
        assert_eq!(config.max_iterations, 20);
        assert_eq!(config.tolerance, 1e-6);

        assert!(solver_settings(20, 0.0).is_err());
        assert!(solver_settings(20, -1.0).is_err());
        assert!(solver_settings(20, f64::NAN).is_err());
        assert!(matches!(
            solver_settings(0, 1e-6),
            Err(CalcError::WasmError { .. })
        ));
    }
}
