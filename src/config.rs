//! Device configuration for the LODCM.
//!
//! The original deployment kept the axis-role catalog in a process-wide
//! mutable table. Here it is an explicit, immutable [`LodcmConfig`] value that
//! is handed to the device constructor. A built-in default carries the
//! canonical XPP catalog; site overrides load from TOML through the `config`
//! crate.

use std::collections::HashMap;
use std::path::Path;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::error::{LodcmError, LodcmResult};

/// Axis roles every LODCM deployment must provide a hardware address for.
pub const REQUIRED_MOTOR_ROLES: &[&str] = &[
    // Crystal tower 1
    "z1", "x1", "y1", "th1", "ch1", "h1n_m", "h1p",
    // Crystal tower 2
    "z2", "x2", "y2", "th2", "ch2", "h2n", "diode2",
    // Diagnostic tower
    "dh", "dv", "dr", "df", "dd", "yag_zoom",
];

/// Hutch the device is installed in. Selects the foil material set.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Hutch {
    /// X-ray Pump Probe hutch.
    Xpp,
    /// X-ray Correlation Spectroscopy hutch.
    Xcs,
}

impl Hutch {
    /// Filter-foil materials installed in this hutch's foil wheel.
    pub fn foil_materials(self) -> &'static [&'static str] {
        match self {
            Hutch::Xpp => &["Mo", "Zr", "Zn", "Cu", "Ni", "Fe", "Ti"],
            Hutch::Xcs => &["Mo", "Zr", "Ge", "Cu", "Ni", "Fe", "Ti"],
        }
    }

    /// Short display tag used in the status report header.
    pub fn tag(self) -> &'static str {
        match self {
            Hutch::Xpp => "XPP",
            Hutch::Xcs => "XCS",
        }
    }
}

/// Hardware address and description for one motor role.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MotorConfig {
    /// Hardware address of the motor record (e.g. `XPP:MON:MMS:04`).
    pub prefix: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
}

impl MotorConfig {
    fn new(prefix: &str, description: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            description: description.to_string(),
        }
    }
}

/// Immutable configuration for one LODCM instance.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LodcmConfig {
    /// Base hardware prefix for the device's own records.
    pub prefix: String,
    /// Device instance name.
    pub name: String,
    /// Name of the no-bounce, straight-through beamline.
    #[serde(default = "default_main_line")]
    pub main_line: String,
    /// Name of the double-bounce, monochromatic beamline.
    #[serde(default = "default_mono_line")]
    pub mono_line: String,
    /// Hutch this device serves.
    pub hutch: Hutch,
    /// Motor-role catalog: role name to hardware address.
    #[serde(default)]
    pub motors: HashMap<String, MotorConfig>,
}

fn default_main_line() -> String {
    "MAIN".to_string()
}

fn default_mono_line() -> String {
    "MONO".to_string()
}

/// The canonical XPP motor catalog.
static DEFAULT_MOTORS: Lazy<HashMap<String, MotorConfig>> = Lazy::new(|| {
    let entries = [
        // Crystal tower 1
        ("z1", "XPP:MON:MMS:04", "LOM Xtal1 Z"),
        ("x1", "XPP:MON:MMS:05", "LOM Xtal1 X"),
        ("y1", "XPP:MON:MMS:06", "LOM Xtal1 Y"),
        ("th1", "XPP:MON:MMS:07", "LOM Xtal1 Theta"),
        ("ch1", "XPP:MON:MMS:08", "LOM Xtal1 Chi"),
        ("h1n_m", "XPP:MON:MMS:09", "LOM Xtal1 Hn"),
        ("h1p", "XPP:MON:MMS:20", "LOM Xtal1 Hp"),
        ("th1f", "XPP:MON:PIC:01", ""),
        ("ch1f", "XPP:MON:PIC:02", ""),
        // Crystal tower 2
        ("z2", "XPP:MON:MMS:10", "LOM Xtal2 Z"),
        ("x2", "XPP:MON:MMS:11", "LOM Xtal2 X"),
        ("y2", "XPP:MON:MMS:12", "LOM Xtal2 Y"),
        ("th2", "XPP:MON:MMS:13", "LOM Xtal2 Theta"),
        ("ch2", "XPP:MON:MMS:14", "LOM Xtal2 Chi"),
        ("h2n", "XPP:MON:MMS:15", "LOM Xtal2 Hn"),
        ("diode2", "XPP:MON:MMS:21", "LOM Xtal2 PIPS"),
        ("th2f", "XPP:MON:PIC:03", ""),
        ("ch2f", "XPP:MON:PIC:04", ""),
        // Diagnostic tower
        ("dh", "XPP:MON:MMS:16", "LOM Dia H"),
        ("dv", "XPP:MON:MMS:17", "LOM Dia V"),
        ("dr", "XPP:MON:MMS:19", "LOM Dia Theta"),
        ("df", "XPP:MON:MMS:27", "LOM Dia Filter Wheel"),
        ("dd", "XPP:MON:MMS:18", "LOM Dia PIPS"),
        ("yag_zoom", "XPP:MON:CLZ:01", "LOM Zoom"),
    ];
    entries
        .iter()
        .map(|(role, prefix, desc)| (role.to_string(), MotorConfig::new(prefix, desc)))
        .collect()
});

impl Default for LodcmConfig {
    fn default() -> Self {
        Self {
            prefix: "XPP:LODCM".to_string(),
            name: "lodcm".to_string(),
            main_line: default_main_line(),
            mono_line: default_mono_line(),
            hutch: Hutch::Xpp,
            motors: DEFAULT_MOTORS.clone(),
        }
    }
}

impl LodcmConfig {
    /// Load a configuration from a TOML file.
    ///
    /// Roles absent from the file fall back to the built-in catalog, so a
    /// site override only needs to list the motors it actually remaps.
    pub fn from_file(path: &Path) -> LodcmResult<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path))
            .build()?;
        let mut cfg: LodcmConfig = settings.try_deserialize()?;
        for (role, motor) in DEFAULT_MOTORS.iter() {
            cfg.motors
                .entry(role.clone())
                .or_insert_with(|| motor.clone());
        }
        cfg.validate()?;
        Ok(cfg)
    }

    /// Check that every required axis role has a hardware address.
    pub fn validate(&self) -> LodcmResult<()> {
        let missing: Vec<&str> = REQUIRED_MOTOR_ROLES
            .iter()
            .filter(|role| !self.motors.contains_key(**role))
            .copied()
            .collect();
        if !missing.is_empty() {
            return Err(LodcmError::Configuration(format!(
                "motor catalog is missing required roles: {}",
                missing.join(", ")
            )));
        }
        if self.main_line == self.mono_line {
            return Err(LodcmError::Configuration(
                "main_line and mono_line must name distinct branches".to_string(),
            ));
        }
        Ok(())
    }

    /// Hardware address for a motor role.
    pub fn motor_prefix(&self, role: &str) -> LodcmResult<&str> {
        self.motors
            .get(role)
            .map(|m| m.prefix.as_str())
            .ok_or_else(|| {
                LodcmError::Configuration(format!("no motor configured for role '{role}'"))
            })
    }
}
