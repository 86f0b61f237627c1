//! Crystal geometry and photon-energy calculations.
//!
//! Stateless conversions between Bragg angle, wavelength, and photon energy
//! for the two crystal materials the monochromator carries. All angles are in
//! degrees, wavelengths in Angstrom, energies in eV unless noted otherwise.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{LodcmError, LodcmResult};

/// hc in eV*Angstrom. E[eV] = HC_EV_ANGSTROM / lambda[A].
pub const HC_EV_ANGSTROM: f64 = 12_398.419_84;

/// Silicon lattice constant in Angstrom.
const SI_LATTICE_A: f64 = 5.431_020_5;

/// Diamond lattice constant in Angstrom.
const DIAMOND_LATTICE_A: f64 = 3.566_8;

/// Vertical beam offset between the main and mono lines, in mm.
const BEAM_OFFSET_MM: f64 = 600.0;

/// Crystal material engaged in a tower.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Material {
    /// Diamond ("C").
    Diamond,
    /// Silicon ("Si").
    Silicon,
}

impl Material {
    /// State label this material appears as on the state positioners.
    pub fn label(self) -> &'static str {
        match self {
            Material::Diamond => "C",
            Material::Silicon => "Si",
        }
    }

    /// Long name for display ("Diamond" / "Silicon").
    pub fn long_name(self) -> &'static str {
        match self {
            Material::Diamond => "Diamond",
            Material::Silicon => "Silicon",
        }
    }

    /// Cubic lattice constant in Angstrom.
    fn lattice_constant(self) -> f64 {
        match self {
            Material::Diamond => DIAMOND_LATTICE_A,
            Material::Silicon => SI_LATTICE_A,
        }
    }
}

impl fmt::Display for Material {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Material {
    type Err = LodcmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "C" => Ok(Material::Diamond),
            "Si" => Ok(Material::Silicon),
            other => Err(LodcmError::Configuration(format!(
                "unknown crystal material '{other}'"
            ))),
        }
    }
}

/// Miller-index triple identifying the diffracting lattice plane.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Reflection(pub i32, pub i32, pub i32);

impl Reflection {
    /// True when all three indices are zero. No such lattice plane exists.
    pub fn is_degenerate(&self) -> bool {
        self.0 == 0 && self.1 == 0 && self.2 == 0
    }

    /// Compact display form, e.g. `(1, 1, 1)` renders as `"111"`.
    pub fn compact(&self) -> String {
        format!("{}{}{}", self.0, self.1, self.2)
    }

    /// Components as a tuple.
    pub fn as_tuple(&self) -> (i32, i32, i32) {
        (self.0, self.1, self.2)
    }

    fn index_norm(&self) -> f64 {
        let (h, k, l) = (self.0 as f64, self.1 as f64, self.2 as f64);
        (h * h + k * k + l * l).sqrt()
    }
}

impl fmt::Display for Reflection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.0, self.1, self.2)
    }
}

impl From<(i32, i32, i32)> for Reflection {
    fn from((h, k, l): (i32, i32, i32)) -> Self {
        Reflection(h, k, l)
    }
}

/// Lattice-plane spacing in Angstrom for a cubic crystal.
///
/// d = a / sqrt(h^2 + k^2 + l^2)
pub fn d_spacing(material: Material, reflection: Reflection) -> LodcmResult<f64> {
    if reflection.is_degenerate() {
        return Err(LodcmError::InvalidGeometry(format!(
            "degenerate reflection {reflection}"
        )));
    }
    Ok(material.lattice_constant() / reflection.index_norm())
}

/// Bragg's law: lambda = 2 d sin(theta).
///
/// `d_spacing` must be positive; the angle must diffract forward
/// (0 < theta < 180 degrees exclusive of the degenerate endpoints).
pub fn bragg_angle_to_wavelength(angle_deg: f64, d_spacing: f64) -> LodcmResult<f64> {
    if d_spacing <= 0.0 {
        return Err(LodcmError::InvalidGeometry(format!(
            "d-spacing must be positive, got {d_spacing}"
        )));
    }
    let wavelength = 2.0 * d_spacing * angle_deg.to_radians().sin();
    if wavelength <= 0.0 {
        return Err(LodcmError::InvalidGeometry(format!(
            "Bragg angle {angle_deg} deg produces non-physical wavelength"
        )));
    }
    Ok(wavelength)
}

/// Photon energy in eV for a wavelength in Angstrom.
pub fn wavelength_to_energy(wavelength: f64) -> LodcmResult<f64> {
    if wavelength <= 0.0 {
        return Err(LodcmError::InvalidGeometry(format!(
            "wavelength must be positive, got {wavelength}"
        )));
    }
    Ok(HC_EV_ANGSTROM / wavelength)
}

/// Wavelength in Angstrom for a photon energy in eV.
pub fn energy_to_wavelength(energy_ev: f64) -> LodcmResult<f64> {
    if energy_ev <= 0.0 {
        return Err(LodcmError::InvalidGeometry(format!(
            "energy must be positive, got {energy_ev}"
        )));
    }
    Ok(HC_EV_ANGSTROM / energy_ev)
}

/// Photon energy in eV for a crystal at the given Bragg angle.
pub fn angle_to_energy(
    angle_deg: f64,
    material: Material,
    reflection: Reflection,
) -> LodcmResult<f64> {
    let d = d_spacing(material, reflection)?;
    let wavelength = bragg_angle_to_wavelength(angle_deg, d)?;
    wavelength_to_energy(wavelength)
}

/// Inverse Bragg calculation: motor angle and table z-offset for an energy.
///
/// Returns `(theta_deg, z_offset_mm)`. The z offset places the second
/// crystal so the doubly-bounced beam exits parallel to the incoming beam at
/// the fixed large-offset height: z = offset / tan(2 theta).
pub fn energy_to_geometry(
    energy_ev: f64,
    material: Material,
    reflection: Reflection,
) -> LodcmResult<(f64, f64)> {
    let d = d_spacing(material, reflection)?;
    let wavelength = energy_to_wavelength(energy_ev)?;
    let sin_theta = wavelength / (2.0 * d);
    if sin_theta >= 1.0 {
        return Err(LodcmError::InvalidGeometry(format!(
            "energy {energy_ev} eV is below the {material}{} backscatter limit",
            reflection.compact()
        )));
    }
    let theta = sin_theta.asin();
    let z_offset = BEAM_OFFSET_MM / (2.0 * theta).tan();
    Ok((theta.to_degrees(), z_offset))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SI_111: Reflection = Reflection(1, 1, 1);
    const C_220: Reflection = Reflection(2, 2, 0);

    #[test]
    fn test_si_111_d_spacing() {
        let d = d_spacing(Material::Silicon, SI_111).unwrap();
        // Canonical Si(111) spacing, 3.1356 A.
        assert!((d - 3.1356).abs() < 1e-3, "got {d}");
    }

    #[test]
    fn test_degenerate_reflection_rejected() {
        let err = d_spacing(Material::Silicon, Reflection(0, 0, 0)).unwrap_err();
        assert!(matches!(err, LodcmError::InvalidGeometry(_)));
    }

    #[test]
    fn test_si_111_energy_at_known_angle() {
        // Si(111) at theta = 11.4027 deg diffracts ~10 keV.
        let e = angle_to_energy(11.4027, Material::Silicon, SI_111).unwrap();
        assert!((e - 10_000.0).abs() < 10.0, "got {e}");
    }

    #[test]
    fn test_angle_energy_round_trip() {
        for theta in [5.0, 11.4, 23.0, 45.0, 78.5] {
            let e = angle_to_energy(theta, Material::Diamond, C_220).unwrap();
            let (theta_back, _z) = energy_to_geometry(e, Material::Diamond, C_220).unwrap();
            assert!(
                (theta - theta_back).abs() < 1e-6,
                "theta {theta} round-tripped to {theta_back}"
            );
        }
    }

    #[test]
    fn test_energy_below_backscatter_limit() {
        // Si(111) cannot reach 100 eV.
        let err = energy_to_geometry(100.0, Material::Silicon, SI_111).unwrap_err();
        assert!(matches!(err, LodcmError::InvalidGeometry(_)));
    }

    #[test]
    fn test_non_positive_inputs_rejected() {
        assert!(wavelength_to_energy(0.0).is_err());
        assert!(energy_to_wavelength(-5.0).is_err());
        assert!(bragg_angle_to_wavelength(12.0, 0.0).is_err());
        assert!(bragg_angle_to_wavelength(-3.0, 3.1356).is_err());
    }

    #[test]
    fn test_z_offset_shrinks_with_angle() {
        let (_, z_low) = energy_to_geometry(20_000.0, Material::Silicon, SI_111).unwrap();
        let (_, z_high) = energy_to_geometry(8_000.0, Material::Silicon, SI_111).unwrap();
        // Higher energy means shallower angle means longer translation.
        assert!(z_low > z_high);
    }

    #[test]
    fn test_reflection_rendering() {
        assert_eq!(Reflection(1, 1, 1).compact(), "111");
        assert_eq!(Reflection(2, 2, 0).to_string(), "(2, 2, 0)");
        assert_eq!(Reflection::from((3, 1, 1)).as_tuple(), (3, 1, 1));
    }

    #[test]
    fn test_material_labels() {
        assert_eq!(Material::Diamond.label(), "C");
        assert_eq!("Si".parse::<Material>().unwrap(), Material::Silicon);
        assert!("Ge".parse::<Material>().is_err());
    }
}
