use super::diagnostics::StepDiagnostics;
use super::grid::{Deposit, GridContents, GridData, MpmGrid, ScatterBuffers};
use super::models::{signed_svd, ConstitutiveModel, Material, DETERMINANT_FLOOR};
use super::parameters::PlasticityBounds;
use super::particles::MpmParticles;
use crate::math::{outer, Mat, DIM, T, TV};
use crate::util::{RangeExt, VecExt};
use rayon::prelude::*;
use std::ops::Range;

/// Singular values of a repaired deformation gradient are at least this, so its determinant is
/// at least `DETERMINANT_FLOOR`.
const SINGULAR_VALUE_FLOOR: T = 0.1;

/// Inverse of the MLS moment matrix for the quadratic kernel, `D⁻¹ = 4 / h²`.
pub fn inverse_moment(data: &GridData) -> T {
    4. * data.one_over_h * data.one_over_h
}

/// Bounds G2P applies to every particle after the gather.
#[derive(Debug, Clone)]
pub struct ParticleLimits {
    pub max_velocity: T,
    pub plasticity: PlasticityBounds,
    /// Positions are clamped into this. It lies inside the wall bands and keeps the stencil
    /// inside the grid.
    pub domain: Range<TV>,
}

/// Scatters particle mass and momentum onto the grid, including the MLS stress impulse
/// `-dt V0 D⁻¹ τ`. The grid must have been cleared first.
pub fn particle_to_grid(
    particles: &MpmParticles,
    grid: &mut MpmGrid,
    scatter: &mut ScatterBuffers,
    material: &Material,
    delta_time: T,
) {
    #![allow(non_snake_case)]
    debug_assert_eq!(grid.contents, GridContents::Momentum);

    let data = &grid.data;
    let D_inv = inverse_moment(data);

    scatter.scatter(
        particles.len(),
        &mut grid.mass,
        &mut grid.velocity,
        |p, target: &mut dyn Deposit| {
            let mass = particles.mass[p];
            let tau = material.kirchhoff_stress(
                &particles.deformation_gradient[p],
                particles.plastic_volume_ratio[p],
            );
            let stress = -delta_time * particles.initial_volume[p] * D_inv * tau;
            let affine = stress + mass * particles.affine_matrix[p];
            let momentum = mass * particles.velocity[p];

            for (node, weight, dpos) in data.stencil(&particles.position[p]).nodes(data.h) {
                debug_assert!(data.coord_in_grid(node));
                target.deposit(
                    data.coord_to_index(node),
                    weight * mass,
                    weight * (momentum + affine * dpos),
                );
            }
        },
    );
}

/// Gathers velocity and the affine matrix `C` back from the grid, then moves the particles and
/// updates their deformation gradients. Returns how many particles had to be repaired.
pub fn grid_to_particle(
    particles: &mut MpmParticles,
    grid: &MpmGrid,
    material: &Material,
    limits: &ParticleLimits,
    delta_time: T,
) -> StepDiagnostics {
    #![allow(non_snake_case)]
    debug_assert_eq!(grid.contents, GridContents::Velocity);

    let data = &grid.data;
    let D_inv = inverse_moment(data);

    (
        &mut particles.position,
        &mut particles.velocity,
        &mut particles.affine_matrix,
        &mut particles.deformation_gradient,
        &mut particles.plastic_volume_ratio,
    )
        .into_par_iter()
        .map(|(x, v, C, F, Jp)| {
            let mut diagnostics = StepDiagnostics::default();

            let mut new_v = TV::zeros();
            let mut new_C = Mat::zeros();
            for (node, weight, dpos) in data.stencil(x).nodes(data.h) {
                let v_i = grid.velocity[data.coord_to_index(node)];
                new_v += weight * v_i;
                new_C += weight * outer(&v_i, &dpos);
            }
            new_C *= D_inv;

            if !new_v.is_finite() || !new_C.iter().all(|c| c.is_finite()) {
                new_v = TV::zeros();
                new_C = Mat::zeros();
                diagnostics.velocity_clamps += 1;
            } else {
                let speed = new_v.norm();
                if speed > limits.max_velocity {
                    new_v *= limits.max_velocity / speed;
                    diagnostics.velocity_clamps += 1;
                }
            }

            // A particle pushed against a wall keeps only its tangential velocity.
            let moved = *x + delta_time * new_v;
            *x = limits.domain.clamp_point(&moved);
            for axis in 0..DIM {
                if x[axis] != moved[axis] {
                    new_v[axis] = 0.;
                }
            }
            *v = new_v;
            *C = new_C;

            let F_trial = (Mat::identity() + delta_time * new_C) * *F;
            let (F_projected, Jp_projected) = material.project_plasticity(F_trial, *Jp);

            *F = match repair_deformation_gradient(&F_projected) {
                Some(repaired) => {
                    diagnostics.deformation_clamps += 1;
                    repaired
                }
                None => F_projected,
            };
            *Jp = limits.plasticity.clamp(Jp_projected);

            diagnostics
        })
        .reduce(StepDiagnostics::default, StepDiagnostics::merge)
}

/// Returns a replacement for `f` if its determinant is non-finite or below `DETERMINANT_FLOOR`:
/// the singular values are made positive and floored. Falls back to the identity if the SVD
/// fails.
pub fn repair_deformation_gradient(f: &Mat) -> Option<Mat> {
    let det = f.determinant();
    if det.is_finite() && det >= DETERMINANT_FLOOR {
        return None;
    }

    let repaired = match signed_svd(f) {
        Some((u, sigma, v_t)) => {
            let sigma = sigma.map(|s| s.abs().max(SINGULAR_VALUE_FLOOR));
            u * Mat::from_diagonal(&sigma) * v_t
        }
        None => Mat::identity(),
    };
    Some(repaired)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mpm::grid::{BoundaryCondition, ScatterMode};
    use crate::mpm::MpmParameters;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    struct Setup {
        particles: MpmParticles,
        grid: MpmGrid,
        scatter: ScatterBuffers,
        params: MpmParameters,
    }

    /// Particles with random velocities and deformations, well away from the walls.
    fn setup(num_particles: usize, mode: ScatterMode) -> Setup {
        let params = MpmParameters {
            scatter: mode,
            ..Default::default()
        };
        let mut rng = StdRng::seed_from_u64(11);
        let mut particles = MpmParticles::default();
        let group = particles.begin_group("test".into(), [1.; 4]);
        for _ in 0..num_particles {
            let x = TV::new(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0));
            let v = TV::new(rng.gen_range(-2.0..2.0), rng.gen_range(-2.0..2.0));
            particles.add_particle(params.particle_mass(), params.particle_volume(), x, v, group);
            let p = particles.len() - 1;
            particles.deformation_gradient[p] =
                Mat::new(1.01, rng.gen_range(-0.01..0.01), 0., 0.99);
            particles.affine_matrix[p] = Mat::new(0.3, -0.2, 0.1, 0.4);
        }
        particles.end_group(group);

        let grid = MpmGrid::new(&params);
        let scatter = ScatterBuffers::new(
            params.scatter,
            params.partitions,
            particles.len(),
            grid.data.num_cells,
        );
        Setup {
            particles,
            grid,
            scatter,
            params,
        }
    }

    fn particle_limits(params: &MpmParameters, grid: &MpmGrid) -> ParticleLimits {
        ParticleLimits {
            max_velocity: params.max_velocity,
            plasticity: params.plasticity.clone(),
            domain: grid.data.inside_walls(params.boundary_thickness),
        }
    }

    #[test]
    fn test_p2g_conserves_mass_and_momentum() {
        for &mode in &[ScatterMode::Partitioned, ScatterMode::Atomic] {
            let mut s = setup(500, mode);
            let dt = s.params.substep_dt();
            particle_to_grid(&s.particles, &mut s.grid, &mut s.scatter, &s.params.material, dt);

            let mass = s.particles.total_mass();
            assert!((s.grid.total_mass() - mass).abs() < 1e-12 * mass.max(1.));
            let momentum = s.particles.total_momentum();
            assert!(
                (s.grid.total_momentum() - momentum).norm() < 1e-10,
                "{:?} != {:?}",
                s.grid.total_momentum(),
                momentum
            );
        }
    }

    #[test]
    fn test_step_conserves_momentum() {
        let mut s = setup(500, ScatterMode::Partitioned);
        let dt = s.params.substep_dt();
        let gravity = TV::new(0., -9.8);

        let before = s.particles.total_momentum();
        particle_to_grid(&s.particles, &mut s.grid, &mut s.scatter, &s.params.material, dt);
        s.grid
            .update_velocities(gravity, dt, BoundaryCondition::Slip, s.params.boundary_thickness);
        let limits = particle_limits(&s.params, &s.grid);
        let diagnostics =
            grid_to_particle(&mut s.particles, &s.grid, &s.params.material, &limits, dt);

        assert!(diagnostics.is_clean());
        let expected = before + gravity * dt * s.particles.total_mass();
        assert!((s.particles.total_momentum() - expected).norm() < 1e-10);
    }

    #[test]
    fn test_single_particle_stencil() {
        let mut s = setup(0, ScatterMode::Partitioned);
        let group = s.particles.begin_group("single".into(), [1.; 4]);
        s.particles
            .add_particle(1., 0.01, TV::new(0.3, -0.2), TV::new(1., 0.), group);
        s.particles.end_group(group);
        let mut scatter = ScatterBuffers::new(ScatterMode::Partitioned, 4, 1, s.grid.data.num_cells);

        particle_to_grid(&s.particles, &mut s.grid, &mut scatter, &s.params.material, 1e-3);

        let stencil = s.grid.data.stencil(&TV::new(0.3, -0.2));
        let touched: Vec<usize> = (0..s.grid.data.num_cells)
            .filter(|&i| s.grid.mass[i] != 0.)
            .collect();
        assert!(touched.len() <= 9);
        for i in touched {
            let coord = s.grid.data.index_to_coord(i);
            assert!(coord.x >= stencil.base.x && coord.x < stencil.base.x + 3);
            assert!(coord.y >= stencil.base.y && coord.y < stencil.base.y + 3);
        }
        assert!((s.grid.total_mass() - 1.).abs() < 1e-12);
    }

    #[test]
    fn test_uniform_velocity_is_transported() {
        let mut s = setup(200, ScatterMode::Partitioned);
        let v = TV::new(0.5, -0.25);
        s.particles.velocity.iter_mut().for_each(|p| *p = v);
        s.particles.affine_matrix.iter_mut().for_each(|c| *c = Mat::zeros());
        s.particles
            .deformation_gradient
            .iter_mut()
            .for_each(|f| *f = Mat::identity());
        let start = s.particles.position.clone();
        let dt = 1e-3;

        particle_to_grid(&s.particles, &mut s.grid, &mut s.scatter, &s.params.material, dt);
        s.grid
            .update_velocities(TV::zeros(), dt, BoundaryCondition::Slip, 3);
        let limits = particle_limits(&s.params, &s.grid);
        grid_to_particle(&mut s.particles, &s.grid, &s.params.material, &limits, dt);

        for (p, x0) in start.iter().enumerate() {
            assert!((s.particles.velocity[p] - v).norm() < 1e-9);
            assert!((s.particles.position[p] - (x0 + dt * v)).norm() < 1e-12);
            assert!(s.particles.affine_matrix[p].norm() < 1e-7);
        }
    }

    #[test]
    fn test_velocity_limit() {
        let mut s = setup(50, ScatterMode::Partitioned);
        s.particles.velocity.iter_mut().for_each(|v| *v = TV::new(500., 0.));
        s.particles.affine_matrix.iter_mut().for_each(|c| *c = Mat::zeros());
        let dt = 1e-4;

        particle_to_grid(&s.particles, &mut s.grid, &mut s.scatter, &s.params.material, dt);
        s.grid
            .update_velocities(TV::zeros(), dt, BoundaryCondition::Slip, 3);
        let limits = particle_limits(&s.params, &s.grid);
        let diagnostics =
            grid_to_particle(&mut s.particles, &s.grid, &s.params.material, &limits, dt);

        assert!(diagnostics.velocity_clamps > 0);
        for v in &s.particles.velocity {
            assert!(v.norm() <= s.params.max_velocity * (1. + 1e-12));
        }
    }

    #[test]
    fn test_particles_stop_at_the_walls() {
        let mut s = setup(0, ScatterMode::Partitioned);
        let group = s.particles.begin_group("wall".into(), [1.; 4]);
        let floor = s.grid.data.inside_walls(s.params.boundary_thickness).start.y;
        let mass = s.params.particle_mass();
        let volume = s.params.particle_volume();
        for i in 0..20 {
            let x = TV::new(-1. + 0.1 * i as T, floor + 0.01);
            s.particles.add_particle(mass, volume, x, TV::new(1., -30.), group);
        }
        s.particles.end_group(group);
        let mut scatter = ScatterBuffers::new(ScatterMode::Partitioned, 4, 20, s.grid.data.num_cells);
        let dt = 1e-2;

        // Zero thickness so the grid lets the particles through and only G2P holds them back.
        particle_to_grid(&s.particles, &mut s.grid, &mut scatter, &s.params.material, dt);
        s.grid
            .update_velocities(TV::zeros(), dt, BoundaryCondition::Slip, 0);
        let limits = particle_limits(&s.params, &s.grid);
        grid_to_particle(&mut s.particles, &s.grid, &s.params.material, &limits, dt);

        for (x, v) in s.particles.position.iter().zip(&s.particles.velocity) {
            assert!(limits.domain.contains_point(x), "{:?} left {:?}", x, limits.domain);
            assert_eq!(x.y, floor);
            assert_eq!(v.y, 0.);
            assert!(v.x > 0.);
        }
    }

    #[test]
    fn test_repair_deformation_gradient() {
        assert_eq!(repair_deformation_gradient(&Mat::identity()), None);

        let inverted = Mat::new(-1., 0., 0., 1.);
        let repaired = repair_deformation_gradient(&inverted).unwrap();
        assert!(repaired.determinant() >= DETERMINANT_FLOOR - 1e-12);

        let collapsed = Mat::new(1., 0., 0., 1e-6);
        let repaired = repair_deformation_gradient(&collapsed).unwrap();
        assert!((repaired - Mat::new(1., 0., 0., SINGULAR_VALUE_FLOOR)).norm() < 1e-9);

        let nan = Mat::new(T::NAN, 0., 0., 1.);
        assert_eq!(repair_deformation_gradient(&nan), Some(Mat::identity()));
    }
}
