//! Human-readable status report.
//!
//! [`StatusSnapshot`] is a structured batch of axis readbacks plus the
//! derived material/energy/reflection summary, collected once per report by
//! [`Lodcm::status`](crate::lodcm::Lodcm::status). Rendering tolerates any
//! individual readback being unavailable: missing values degrade to an
//! `Unknown` placeholder instead of failing the whole report. The snapshot
//! also serializes to JSON for machine consumers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::calc::{Material, Reflection};
use crate::error::LodcmResult;
use crate::hardware::AxisReadback;

/// Placeholder rendered for unavailable values.
const UNKNOWN: &str = "Unknown";

/// Structured snapshot of the whole device at one point in time.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StatusSnapshot {
    /// When the snapshot was collected.
    pub timestamp: DateTime<Utc>,
    /// Hutch tag for the header ("XPP" / "XCS").
    pub hutch: String,
    /// Device instance name.
    pub name: String,
    /// Agreed crystal material, if determinate.
    pub material: Option<Material>,
    /// Derived photon energy in keV, if determinate.
    pub energy_kev: Option<f64>,
    /// Agreed reflection, if determinate.
    pub reflection: Option<Reflection>,
    /// Per-role axis readbacks; `None` where the poll failed.
    pub motors: HashMap<String, Option<AxisReadback>>,
}

impl StatusSnapshot {
    fn readback(&self, role: &str) -> Option<&AxisReadback> {
        self.motors.get(role).and_then(|rb| rb.as_ref())
    }

    fn units(&self, role: &str) -> String {
        self.readback(role)
            .map_or_else(|| UNKNOWN.to_string(), |rb| rb.units.clone())
    }

    /// `user (dial)` cell for one axis, or a placeholder.
    fn cell(&self, role: &str) -> String {
        match self.readback(role) {
            Some(rb) => format!("{} ({})", ff(rb.value), ff(rb.dial_value)),
            None => UNKNOWN.to_string(),
        }
    }

    /// Render the fixed-width status table.
    pub fn render(&self) -> String {
        let configuration = self
            .material
            .map_or(UNKNOWN, |m| m.long_name());
        let reflection = self
            .reflection
            .map_or_else(|| UNKNOWN.to_string(), |r| r.to_string());
        let energy = self
            .energy_kev
            .map_or_else(|| UNKNOWN.to_string(), ff);

        let mut out = String::new();
        out.push_str(&format!("{} LODCM Motor Status Positions\n", self.hutch));
        out.push_str(&format!(
            "Current Configuration: {configuration} ({reflection})\n"
        ));
        out.push_str(&format!("Photon Energy: {energy} [keV]\n"));
        out.push_str(&"-".repeat(65));
        out.push('\n');
        out.push_str(&form(" ", "Crystal Tower 1", "Crystal Tower 2"));

        let tower_rows = [
            ("z", "z1", "z2"),
            ("x", "x1", "x2"),
            ("th", "th1", "th2"),
            ("chi", "ch1", "ch2"),
            ("y", "y1", "y2"),
            ("hn", "h1n_m", "h2n"),
            ("hp", "h1p", ""),
            ("diode", "", "diode2"),
        ];
        for (label, left_role, right_role) in tower_rows {
            let units_role = if left_role.is_empty() {
                right_role
            } else {
                left_role
            };
            let left = if left_role.is_empty() {
                String::new()
            } else {
                self.cell(left_role)
            };
            let right = if right_role.is_empty() {
                String::new()
            } else {
                self.cell(right_role)
            };
            out.push_str(&form(
                &format!("{label} [{}]", self.units(units_role)),
                &left,
                &right,
            ));
        }

        out.push_str(&"-".repeat(65));
        out.push('\n');
        out.push_str(&form(" ", "Diagnostic Tower", " "));
        let diag_rows = [
            ("diag r", "dr"),
            ("diag h", "dh"),
            ("diag v", "dv"),
            ("filter", "df"),
            ("diode", "dd"),
            ("navitar", "yag_zoom"),
        ];
        for (label, role) in diag_rows {
            out.push_str(&form(
                &format!("{label} [{}]", self.units(role)),
                &self.cell(role),
                "",
            ));
        }
        out
    }

    /// Serialize the snapshot as pretty-printed JSON.
    pub fn to_json(&self) -> LodcmResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|err| crate::error::LodcmError::Configuration(err.to_string()))
    }
}

fn form(left: &str, center: &str, right: &str) -> String {
    format!("{left:<15}{center:>25}{right:>25}\n")
}

fn ff(value: f64) -> String {
    format!("{value:.4}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn readback(value: f64, units: &str) -> AxisReadback {
        AxisReadback {
            value,
            setpoint: value,
            dial_value: value - 1.0,
            units: units.to_string(),
        }
    }

    fn snapshot() -> StatusSnapshot {
        let mut motors = HashMap::new();
        for role in crate::config::REQUIRED_MOTOR_ROLES {
            motors.insert(role.to_string(), Some(readback(5.0, "mm")));
        }
        StatusSnapshot {
            timestamp: Utc::now(),
            hutch: "XPP".to_string(),
            name: "lodcm".to_string(),
            material: Some(Material::Silicon),
            energy_kev: Some(9.9998),
            reflection: Some(Reflection(1, 1, 1)),
            motors,
        }
    }

    #[test]
    fn test_render_header() {
        let report = snapshot().render();
        assert!(report.starts_with("XPP LODCM Motor Status Positions"));
        assert!(report.contains("Current Configuration: Silicon ((1, 1, 1))"));
        assert!(report.contains("Photon Energy: 9.9998 [keV]"));
    }

    #[test]
    fn test_render_contains_all_sections() {
        let report = snapshot().render();
        assert!(report.contains("Crystal Tower 1"));
        assert!(report.contains("Crystal Tower 2"));
        assert!(report.contains("Diagnostic Tower"));
        assert!(report.contains("5.0000 (4.0000)"));
    }

    #[test]
    fn test_render_tolerates_missing_readbacks() {
        let mut snap = snapshot();
        snap.motors.insert("th1".to_string(), None);
        snap.material = None;
        snap.energy_kev = None;
        snap.reflection = None;
        let report = snap.render();
        assert!(report.contains("Current Configuration: Unknown (Unknown)"));
        assert!(report.contains("Photon Energy: Unknown [keV]"));
        assert!(report.contains("th [Unknown]"));
    }

    #[test]
    fn test_json_round_trip() {
        let snap = snapshot();
        let json = snap.to_json().unwrap();
        let back: StatusSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back.material, snap.material);
        assert_eq!(back.reflection, snap.reflection);
    }
}
