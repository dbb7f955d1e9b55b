use crate::error::ConfigError;
use crate::math::{Mat, T, TV};
use serde::{Deserialize, Serialize};

/// Lower bound on `J = det(F)` wherever a logarithm or square root of it is taken, and the
/// smallest determinant G2P lets a deformation gradient keep.
pub const DETERMINANT_FLOOR: T = 1e-2;

const SVD_MAX_ITERATIONS: usize = 64;

/// Trait that describes a constitutive model. Note that the default implementations for both the
/// first Piola-Kirchhoff stress and the Kirchhoff stress use each other, so you must override at
/// least one of them (otherwise they will recurse infinitely).
///
/// MLS-MPM only needs the Kirchhoff stress `τ = P Fᵀ`.
pub trait ConstitutiveModel: Send + Sync {
    fn piola_kirchhoff(&self, f: &Mat, plastic_volume_ratio: T) -> Mat {
        let tau = self.kirchhoff_stress(f, plastic_volume_ratio);
        match f.transpose().try_inverse() {
            Some(f_inv_trans) => tau * f_inv_trans,
            None => Mat::zeros(),
        }
    }

    fn kirchhoff_stress(&self, f: &Mat, plastic_volume_ratio: T) -> Mat {
        self.piola_kirchhoff(f, plastic_volume_ratio) * f.transpose()
    }

    /// Projects a trial deformation gradient back onto the elastic region, returning the new
    /// deformation gradient and plastic volume ratio. Purely elastic models return their input.
    fn project_plasticity(&self, f: Mat, plastic_volume_ratio: T) -> (Mat, T) {
        (f, plastic_volume_ratio)
    }
}

/// Singular value decomposition `F = U Σ Vᵀ` where `U` and `V` are proper rotations. An inverted
/// `F` shows up as a negative second singular value.
///
/// Returns `None` for non-finite input or if the iteration fails to converge.
pub fn signed_svd(f: &Mat) -> Option<(Mat, TV, Mat)> {
    if !f.iter().all(|x| x.is_finite()) {
        return None;
    }

    let svd = Mat::try_svd(*f, true, true, T::EPSILON, SVD_MAX_ITERATIONS)?;
    let mut u = svd.u?;
    let mut v_t = svd.v_t?;
    let mut sigma = svd.singular_values;

    if u.determinant() < 0. {
        u[(0, 1)] = -u[(0, 1)];
        u[(1, 1)] = -u[(1, 1)];
        sigma[1] = -sigma[1];
    }
    if v_t.determinant() < 0. {
        v_t[(1, 0)] = -v_t[(1, 0)];
        v_t[(1, 1)] = -v_t[(1, 1)];
        sigma[1] = -sigma[1];
    }

    Some((u, sigma, v_t))
}

/// Young's modulus and Poisson's ratio of an isotropic elastic material.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IsotropicParameters {
    pub youngs_modulus: T,
    pub poissons_ratio: T,
}

impl IsotropicParameters {
    pub fn new(youngs_modulus: T, poissons_ratio: T) -> Self {
        Self {
            youngs_modulus,
            poissons_ratio,
        }
    }

    /// The Lamé parameters `(mu, lambda)`.
    pub fn lame_parameters(&self) -> (T, T) {
        let mu = self.youngs_modulus / (2. * (1. + self.poissons_ratio));
        let lambda = self.youngs_modulus * self.poissons_ratio
            / ((1. + self.poissons_ratio) * (1. - 2. * self.poissons_ratio));
        (mu, lambda)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !(self.youngs_modulus > 0.) || !self.youngs_modulus.is_finite() {
            return Err(ConfigError::Material(format!(
                "Young's modulus must be positive, got {}",
                self.youngs_modulus
            )));
        }
        if !(self.poissons_ratio > -1. && self.poissons_ratio < 0.5) {
            return Err(ConfigError::Material(format!(
                "Poisson's ratio must lie in (-1, 0.5), got {}",
                self.poissons_ratio
            )));
        }
        Ok(())
    }
}

impl Default for IsotropicParameters {
    fn default() -> Self {
        Self::new(9500., 0.2)
    }
}

/// `τ = 2μ(F - R)Fᵀ + λ(J - 1)J I`, with `R` the rotation of the polar decomposition of `F`.
#[allow(non_snake_case)]
fn fixed_corotated_kirchhoff(F: &Mat, mu: T, lambda: T) -> Mat {
    let J = F.determinant();
    let R = match signed_svd(F) {
        Some((u, _, v_t)) => u * v_t,
        None => Mat::identity(),
    };

    2. * mu * (F - R) * F.transpose() + Mat::from_diagonal_element(lambda * (J - 1.) * J)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NeoHookean(pub IsotropicParameters);

impl ConstitutiveModel for NeoHookean {
    fn piola_kirchhoff(&self, f: &Mat, _plastic_volume_ratio: T) -> Mat {
        #![allow(non_snake_case)]
        let F = f;
        let J = F.determinant().max(DETERMINANT_FLOOR);
        let (mu, lambda) = self.0.lame_parameters();

        let F_inv_trans = match F.try_inverse() {
            Some(inv) => inv.transpose(),
            None => return Mat::zeros(),
        };

        mu * (F - F_inv_trans) + lambda * J.ln() * F_inv_trans
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FixedCorotated(pub IsotropicParameters);

impl ConstitutiveModel for FixedCorotated {
    fn kirchhoff_stress(&self, f: &Mat, _plastic_volume_ratio: T) -> Mat {
        let (mu, lambda) = self.0.lame_parameters();
        fixed_corotated_kirchhoff(f, mu, lambda)
    }
}

/// Fixed-corotated elasticity whose Lamé parameters harden exponentially as the material is
/// compacted (`Jp < 1`), with singular values of `F` clamped to
/// `[1 - critical_compression, 1 + critical_stretch]`. The clamped-away volume change is moved into
/// `Jp`, which is what lets the body crumble and pile up instead of bouncing back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Snow {
    pub elasticity: IsotropicParameters,
    pub hardening: T,
    pub critical_compression: T,
    pub critical_stretch: T,
}

impl Snow {
    pub fn hardening_factor(&self, plastic_volume_ratio: T) -> T {
        (self.hardening * (1. - plastic_volume_ratio)).exp()
    }
}

impl Default for Snow {
    fn default() -> Self {
        Snow {
            elasticity: IsotropicParameters::default(),
            hardening: 10.,
            critical_compression: 2.5e-2,
            critical_stretch: 4.5e-3,
        }
    }
}

impl ConstitutiveModel for Snow {
    fn kirchhoff_stress(&self, f: &Mat, plastic_volume_ratio: T) -> Mat {
        let (mu, lambda) = self.elasticity.lame_parameters();
        let h = self.hardening_factor(plastic_volume_ratio);
        fixed_corotated_kirchhoff(f, h * mu, h * lambda)
    }

    fn project_plasticity(&self, f: Mat, plastic_volume_ratio: T) -> (Mat, T) {
        let (u, sigma, v_t) = match signed_svd(&f) {
            Some(svd) => svd,
            None => return (f, plastic_volume_ratio),
        };

        let clamped = sigma.map(|s| {
            s.max(1. - self.critical_compression)
                .min(1. + self.critical_stretch)
        });

        let trial_j = sigma.x * sigma.y;
        let elastic_j = clamped.x * clamped.y;
        let plastic_volume_ratio = if trial_j > 0. {
            plastic_volume_ratio * trial_j / elastic_j
        } else {
            plastic_volume_ratio
        };

        (
            u * Mat::from_diagonal(&clamped) * v_t,
            plastic_volume_ratio,
        )
    }
}

/// A weakly compressible fluid: pressure from an equation of state in `J`, and no memory of
/// shear, so `F` is reset to the isotropic `√J I` after every step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NewtonianFluid {
    pub bulk_modulus: T,
}

impl NewtonianFluid {
    pub fn new(bulk_modulus: T) -> Self {
        NewtonianFluid { bulk_modulus }
    }
}

impl Default for NewtonianFluid {
    fn default() -> Self {
        Self::new(1000.)
    }
}

impl ConstitutiveModel for NewtonianFluid {
    fn kirchhoff_stress(&self, f: &Mat, _plastic_volume_ratio: T) -> Mat {
        #![allow(non_snake_case)]
        let J = f.determinant();
        Mat::from_diagonal_element(self.bulk_modulus * J * (J - 1.))
    }

    fn project_plasticity(&self, f: Mat, plastic_volume_ratio: T) -> (Mat, T) {
        let j = f.determinant().max(DETERMINANT_FLOOR);
        (Mat::from_diagonal_element(j.sqrt()), plastic_volume_ratio)
    }
}

/// The material every particle in the simulation is made of.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum Material {
    Snow(Snow),
    NeoHookean(NeoHookean),
    FixedCorotated(FixedCorotated),
    Fluid(NewtonianFluid),
}

impl Default for Material {
    fn default() -> Self {
        Material::Snow(Snow::default())
    }
}

impl Material {
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            Material::Snow(snow) => {
                snow.elasticity.validate()?;
                if !(snow.hardening >= 0.) {
                    return Err(ConfigError::Material(format!(
                        "hardening must be non-negative, got {}",
                        snow.hardening
                    )));
                }
                if !(snow.critical_compression >= 0. && snow.critical_compression < 1.) {
                    return Err(ConfigError::Material(format!(
                        "critical compression must lie in [0, 1), got {}",
                        snow.critical_compression
                    )));
                }
                if !(snow.critical_stretch >= 0.) {
                    return Err(ConfigError::Material(format!(
                        "critical stretch must be non-negative, got {}",
                        snow.critical_stretch
                    )));
                }
                Ok(())
            }
            Material::NeoHookean(NeoHookean(params))
            | Material::FixedCorotated(FixedCorotated(params)) => params.validate(),
            Material::Fluid(fluid) => {
                if fluid.bulk_modulus > 0. && fluid.bulk_modulus.is_finite() {
                    Ok(())
                } else {
                    Err(ConfigError::Material(format!(
                        "bulk modulus must be positive, got {}",
                        fluid.bulk_modulus
                    )))
                }
            }
        }
    }

    fn model(&self) -> &dyn ConstitutiveModel {
        match self {
            Material::Snow(m) => m,
            Material::NeoHookean(m) => m,
            Material::FixedCorotated(m) => m,
            Material::Fluid(m) => m,
        }
    }
}

impl ConstitutiveModel for Material {
    fn piola_kirchhoff(&self, f: &Mat, plastic_volume_ratio: T) -> Mat {
        self.model().piola_kirchhoff(f, plastic_volume_ratio)
    }

    fn kirchhoff_stress(&self, f: &Mat, plastic_volume_ratio: T) -> Mat {
        self.model().kirchhoff_stress(f, plastic_volume_ratio)
    }

    fn project_plasticity(&self, f: Mat, plastic_volume_ratio: T) -> (Mat, T) {
        self.model().project_plasticity(f, plastic_volume_ratio)
    }
}
