//! Jacobian-free Newton-Krylov (§4.7): an inexact Newton iteration, where
//! each linear solve is a right-preconditioned GMRES run whose only access
//! to the Jacobian is through finite-difference directional derivatives of
//! the residual. Used by `vertical_dynamics` to solve the implicit stage's
//! per-column system; non-convergence is reported as a recoverable
//! `DynCoreError::Solver` so the time integrator can retry at a smaller
//! step (§5, §7).

use ndarray::Array1;
use serde::{Serialize, Deserialize};

use crate::error::{DynCoreError, Result};

/// Tunables for the Newton and Krylov loops (§4.7).
#[derive(Clone, Copy, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JfnkConfig {
    pub max_newton_iters: usize,
    pub newton_tolerance: f64,
    pub max_gmres_iters: usize,
    pub gmres_restart: usize,
    pub gmres_tolerance: f64,
    /// Relative step used for the finite-difference Jacobian-vector
    /// product, scaled by `||q|| / ||v||` the way Knoll & Keyes (2004)
    /// recommend.
    pub fd_epsilon: f64,
}

impl Default for JfnkConfig {
    fn default() -> Self {
        Self {
            max_newton_iters: 20,
            newton_tolerance: 1e-10,
            max_gmres_iters: 60,
            gmres_restart: 20,
            gmres_tolerance: 1e-8,
            fd_epsilon: 1e-7,
        }
    }
}

/// Result of a converged or failed Newton-Krylov solve, for diagnostics.
pub struct JfnkReport {
    pub newton_iterations: usize,
    pub final_residual_norm: f64,
}

/// Solve `residual(q) = 0` for `q`, starting from `q0`, using an inexact
/// Newton iteration whose linear step comes from `gmres_solve`. `precond`
/// applies an approximate inverse Jacobian action, used on the right of
/// the Krylov system (the identity is a valid, if slow-converging, choice).
pub fn solve(
    q0: &Array1<f64>,
    residual: impl Fn(&Array1<f64>) -> Array1<f64>,
    precond: impl Fn(&Array1<f64>) -> Array1<f64>,
    config: &JfnkConfig,
) -> Result<(Array1<f64>, JfnkReport)> {
    let mut q = q0.clone();
    let mut r = residual(&q);
    let mut r_norm = norm(&r);
    let r0_norm = r_norm.max(1e-300);

    for iter in 0..config.max_newton_iters {
        if r_norm / r0_norm < config.newton_tolerance || r_norm < config.newton_tolerance {
            return Ok((q, JfnkReport { newton_iterations: iter, final_residual_norm: r_norm }))
        }

        let jvp = |v: &Array1<f64>| jacobian_vector_product(&residual, &q, &r, v, config.fd_epsilon);
        let neg_r = r.mapv(|x| -x);
        let dq = gmres_solve(&jvp, &precond, &neg_r, config)?;

        q = &q + &dq;
        r = residual(&q);
        r_norm = norm(&r);
    }

    Err(DynCoreError::solver(format!(
        "JFNK failed to converge in {} Newton iterations (||r|| / ||r0|| = {:e})",
        config.max_newton_iters, r_norm / r0_norm)))
}

fn norm(v: &Array1<f64>) -> f64 {
    v.dot(v).sqrt()
}

/// `J(q) v ~= (R(q + eps v) - R(q)) / eps`, with `eps` scaled by the
/// relative magnitudes of `q` and `v` to keep the finite difference well
/// conditioned regardless of the state's units (Knoll & Keyes 2004, eq. 14).
fn jacobian_vector_product(
    residual: &impl Fn(&Array1<f64>) -> Array1<f64>,
    q: &Array1<f64>,
    r_q: &Array1<f64>,
    v: &Array1<f64>,
    fd_epsilon: f64,
) -> Array1<f64> {
    let v_norm = norm(v);
    if v_norm < 1e-300 {
        return Array1::zeros(q.len())
    }
    let q_norm = norm(q).max(1.0);
    let eps = fd_epsilon * q_norm / v_norm;
    let perturbed = residual(&(q + &(v * eps)));
    (&perturbed - r_q) / eps
}

/// Right-preconditioned GMRES(m): solve `A x = b` where `A` is given only
/// through its action `matvec`, restarting every `gmres_restart` Krylov
/// vectors (§4.7).
fn gmres_solve(
    matvec: &impl Fn(&Array1<f64>) -> Array1<f64>,
    precond: &impl Fn(&Array1<f64>) -> Array1<f64>,
    b: &Array1<f64>,
    config: &JfnkConfig,
) -> Result<Array1<f64>> {
    let n = b.len();
    let b_norm = norm(b).max(1e-300);
    let mut x = Array1::<f64>::zeros(n);
    let m = config.gmres_restart.min(config.max_gmres_iters).max(1);

    let mut total_iters = 0;
    loop {
        let r = b - &matvec(&x);
        let beta = norm(&r);
        if beta / b_norm < config.gmres_tolerance {
            return Ok(x)
        }

        let mut v = vec![r / beta];
        let mut h = vec![vec![0.0; m]; m + 1];
        let mut g = vec![0.0; m + 1];
        g[0] = beta;
        let mut cs = vec![0.0; m];
        let mut sn = vec![0.0; m];
        let mut k_used = 0;

        for k in 0..m {
            if total_iters >= config.max_gmres_iters {
                break
            }
            total_iters += 1;
            k_used = k + 1;

            // Right preconditioning: Krylov space built on A M^-1.
            let z = precond(&v[k]);
            let mut w = matvec(&z);

            for i in 0..=k {
                h[i][k] = w.dot(&v[i]);
                w = &w - &(&v[i] * h[i][k]);
            }
            h[k + 1][k] = norm(&w);
            if h[k + 1][k] > 1e-300 {
                v.push(&w / h[k + 1][k]);
            } else {
                v.push(Array1::zeros(n));
            }

            for i in 0..k {
                let (c, s) = (cs[i], sn[i]);
                let h_ik = h[i][k];
                let h_i1k = h[i + 1][k];
                h[i][k] = c * h_ik + s * h_i1k;
                h[i + 1][k] = -s * h_ik + c * h_i1k;
            }

            let (c, s) = givens_rotation(h[k][k], h[k + 1][k]);
            cs[k] = c;
            sn[k] = s;
            h[k][k] = c * h[k][k] + s * h[k + 1][k];
            h[k + 1][k] = 0.0;

            g[k + 1] = -sn[k] * g[k];
            g[k] = cs[k] * g[k];

            if g[k + 1].abs() / b_norm < config.gmres_tolerance {
                k_used = k + 1;
                break
            }
        }

        let y = back_substitute(&h, &g, k_used);
        let mut z_sum = Array1::<f64>::zeros(n);
        for i in 0..k_used {
            z_sum = &z_sum + &(&v[i] * y[i]);
        }
        x = &x + &precond(&z_sum);

        if total_iters >= config.max_gmres_iters {
            let residual_norm = norm(&(b - &matvec(&x))) / b_norm;
            if residual_norm < config.gmres_tolerance.sqrt() {
                return Ok(x)
            }
            return Err(DynCoreError::solver(format!(
                "GMRES failed to converge in {} iterations (relative residual {:e})",
                config.max_gmres_iters, residual_norm)))
        }
    }
}

fn givens_rotation(a: f64, b: f64) -> (f64, f64) {
    if b == 0.0 {
        (1.0, 0.0)
    } else if b.abs() > a.abs() {
        let t = a / b;
        let s = 1.0 / (1.0 + t * t).sqrt();
        (t * s, s)
    } else {
        let t = b / a;
        let c = 1.0 / (1.0 + t * t).sqrt();
        (c, t * c)
    }
}

fn back_substitute(h: &[Vec<f64>], g: &[f64], k: usize) -> Vec<f64> {
    let mut y = vec![0.0; k];
    for i in (0..k).rev() {
        let mut sum = g[i];
        for j in (i + 1)..k {
            sum -= h[i][j] * y[j];
        }
        y[i] = sum / h[i][i];
    }
    y
}

#[cfg(test)]
mod test {
    use super::*;

    fn identity_precond(v: &Array1<f64>) -> Array1<f64> {
        v.clone()
    }

    #[test]
    fn solves_linear_system_via_gmres() {
        // R(q) = A q - b, with A = diag(2, 4, 8), so J = A exactly.
        let a = [2.0, 4.0, 8.0];
        let b = Array1::from_vec(vec![4.0, 8.0, 16.0]);
        let residual = |q: &Array1<f64>| Array1::from_vec(
            (0..3).map(|i| a[i] * q[i] - b[i]).collect());

        let q0 = Array1::zeros(3);
        let config = JfnkConfig::default();
        let (q, report) = solve(&q0, residual, identity_precond, &config).unwrap();

        assert!(report.final_residual_norm < config.newton_tolerance * 10.0);
        for &v in q.iter() {
            assert!((v - 2.0).abs() < 1e-6);
        }
    }

    #[test]
    fn solves_mildly_nonlinear_system() {
        // R(q) = q + 0.1 q^3 - b.
        let b = Array1::from_vec(vec![3.0, -2.0]);
        let residual = |q: &Array1<f64>| {
            let mut out = q.clone();
            for i in 0..q.len() {
                out[i] = q[i] + 0.1 * q[i].powi(3) - b[i];
            }
            out
        };
        let q0 = Array1::zeros(2);
        let config = JfnkConfig::default();
        let (q, _report) = solve(&q0, residual, identity_precond, &config).unwrap();
        let r = residual(&q);
        assert!(norm(&r) < 1e-6);
    }

    #[test]
    fn reports_recoverable_error_on_non_convergence() {
        let config = JfnkConfig { max_newton_iters: 1, newton_tolerance: 1e-14, ..JfnkConfig::default() };
        // A residual whose Jacobian is singular (constant output) can never
        // be driven to zero from a nonzero start.
        let residual = |_q: &Array1<f64>| Array1::from_vec(vec![1.0, 1.0]);
        let q0 = Array1::from_vec(vec![5.0, 5.0]);
        let err = solve(&q0, residual, identity_precond, &config).unwrap_err();
        assert!(err.is_recoverable());
    }
}
