//! Quadrature and polynomial kernels (§4.1). Pure functions: GLL points and
//! weights on an arbitrary interval, barycentric-Lagrange interpolation and
//! derivative coefficients at an arbitrary evaluation point, and the
//! flux-correction (right Radau) function used by the flux-correction
//! column derivative operator.

use crate::error::{DynCoreError, Result};

/// Largest supported polynomial order for the closed-form GLL tables.
pub const MAX_ORDER: usize = 8;

/**
 * Gauss-Lobatto-Legendre points on the reference interval [-1, 1] for
 * polynomial order `p` (`p + 1` points, p in 2..=8). The interior points are
 * roots of P'_p (the derivative of the Legendre polynomial of degree p);
 * they are obtained here by Newton's method seeded from the Chebyshev-
 * Gauss-Lobatto points, which is the standard numerically stable recipe
 * since no closed form exists for p > 4.
 */
pub fn gll_reference_points(p: usize) -> Result<Vec<f64>> {
    if !(2..=MAX_ORDER).contains(&p) {
        return Err(DynCoreError::configuration(format!(
            "GLL order {} is not supported (must be in 2..={})", p, MAX_ORDER)))
    }
    let n = p + 1;
    let mut x = vec![0.0; n];
    x[0] = -1.0;
    x[n - 1] = 1.0;

    for i in 1..n - 1 {
        // Chebyshev-Gauss-Lobatto seed.
        let mut xi = -(std::f64::consts::PI * i as f64 / p as f64).cos();

        for _ in 0..100 {
            let (leg, dleg, ddleg) = legendre_p_and_derivatives(p, xi);
            // Newton's method on P'_p(x) = 0, using P'' from the recursion.
            let _ = leg;
            let step = dleg / ddleg;
            xi -= step;
            if step.abs() < 1e-15 {
                break
            }
        }
        x[i] = xi;
    }
    x.sort_by(|a, b| a.partial_cmp(b).unwrap());
    Ok(x)
}

/// Legendre polynomial P_p(x) together with its first and second
/// derivatives, via the standard three-term recursion.
fn legendre_p_and_derivatives(p: usize, x: f64) -> (f64, f64, f64) {
    let (mut p0, mut p1) = (1.0, x);
    let (mut d0, mut d1) = (0.0, 1.0);

    for k in 1..p {
        let kf = k as f64;
        let p2 = ((2.0 * kf + 1.0) * x * p1 - kf * p0) / (kf + 1.0);
        let d2 = ((2.0 * kf + 1.0) * (p1 + x * d1) - kf * d0) / (kf + 1.0);
        p0 = p1;
        p1 = p2;
        d0 = d1;
        d1 = d2;
    }
    // P''_p from (1 - x^2) P'' - 2x P' + p(p+1) P = 0.
    let dd1 = if (1.0 - x * x).abs() < 1e-14 {
        0.0
    } else {
        (2.0 * x * d1 - (p * (p + 1)) as f64 * p1) / (1.0 - x * x)
    };
    (p1, d1, dd1)
}

/**
 * GLL weights on [-1, 1] paired with `gll_reference_points`, via the
 * standard closed formula w_i = 2 / (p (p+1) P_p(x_i)^2).
 */
pub fn gll_reference_weights(p: usize, points: &[f64]) -> Vec<f64> {
    points.iter().map(|&x| {
        let (leg, ..) = legendre_p_and_derivatives(p, x);
        2.0 / (p as f64 * (p + 1) as f64 * leg * leg)
    }).collect()
}

/**
 * GLL points and weights mapped onto an arbitrary interval [a, b]. Satisfies
 * sum(weights) == b - a to machine precision.
 */
pub fn gll_points_and_weights(p: usize, a: f64, b: f64) -> Result<(Vec<f64>, Vec<f64>)> {
    let ref_points = gll_reference_points(p)?;
    let ref_weights = gll_reference_weights(p, &ref_points);
    let scale = (b - a) / 2.0;
    let points = ref_points.iter().map(|&x| a + scale * (x + 1.0)).collect();
    let weights = ref_weights.iter().map(|&w| w * scale).collect();
    Ok((points, weights))
}

/**
 * Lagrange interpolation coefficients L_i(x*), i = 0..n, for the basis
 * defined by `nodes` (n points, need not be GLL), evaluated at an arbitrary
 * point `x_star`, via the numerically stable barycentric form. Satisfies
 * sum(L_i(x*)) == 1 for any x*.
 */
pub fn lagrange_weights(nodes: &[f64], x_star: f64) -> Vec<f64> {
    let n = nodes.len();
    let bary = barycentric_weights(nodes);

    // Exact hit: return the one-hot basis row rather than dividing by zero.
    if let Some(k) = nodes.iter().position(|&xj| (xj - x_star).abs() < 1e-13) {
        let mut l = vec![0.0; n];
        l[k] = 1.0;
        return l
    }

    let terms: Vec<f64> = (0..n).map(|j| bary[j] / (x_star - nodes[j])).collect();
    let denom: f64 = terms.iter().sum();
    terms.iter().map(|t| t / denom).collect()
}

/**
 * Derivative coefficients L'_i(x*) of the same Lagrange basis, via the
 * barycentric derivative formula. Satisfies sum(L'_i(x*)) == 0 for any x*.
 */
pub fn lagrange_derivative_weights(nodes: &[f64], x_star: f64) -> Vec<f64> {
    let n = nodes.len();
    let bary = barycentric_weights(nodes);

    if let Some(k) = nodes.iter().position(|&xj| (xj - x_star).abs() < 1e-13) {
        // Differentiate the barycentric form at a node (standard formula).
        let mut d = vec![0.0; n];
        for j in 0..n {
            if j != k {
                d[k] -= bary[j] / bary[k] / (nodes[k] - nodes[j]);
                d[j] = (bary[j] / bary[k]) / (nodes[k] - nodes[j]);
            }
        }
        return d
    }

    let l = lagrange_weights(nodes, x_star);
    let s: f64 = (0..n).map(|j| bary[j] / (x_star - nodes[j])).sum();
    (0..n).map(|i| {
        l[i] * (1.0 / (x_star - nodes[i]) - (bary[i] / (x_star - nodes[i]).powi(2)) / s)
    }).collect()
}

fn barycentric_weights(nodes: &[f64]) -> Vec<f64> {
    let n = nodes.len();
    (0..n).map(|j| {
        let prod: f64 = (0..n).filter(|&k| k != j).map(|k| nodes[j] - nodes[k]).product();
        1.0 / prod
    }).collect()
}

/**
 * Flux-correction function (parameter type = 2, right Radau family of
 * order p+1), and its derivative, evaluated at a reference coordinate
 * `xi` in [-1, 1]. Used by the flux-correction column derivative operator
 * to blend the discontinuous local derivative with edge-extrapolated flux
 * differences (§4.2).
 */
pub fn radau_right_correction_derivative(p: usize, xi: f64) -> f64 {
    // g_R(xi) = (-1)^p / 2 * (P_p(xi) - P_{p+1}(xi)); its derivative is
    // built from the Legendre derivative recursion directly.
    let sign = if p % 2 == 0 { 1.0 } else { -1.0 };
    let (_, dp, _) = legendre_p_and_derivatives(p, xi);
    let (_, dp1, _) = legendre_p_and_derivatives(p + 1, xi);
    sign * 0.5 * (dp - dp1)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn weights_sum_to_interval_length() {
        for p in 2..=MAX_ORDER {
            let (_, w) = gll_points_and_weights(p, -3.0, 5.0).unwrap();
            assert!((w.iter().sum::<f64>() - 8.0).abs() < 1e-12, "order {}", p);
        }
    }

    #[test]
    fn endpoints_are_included() {
        let (x, _) = gll_points_and_weights(4, 0.0, 1.0).unwrap();
        assert!((x[0] - 0.0).abs() < 1e-13);
        assert!((x.last().unwrap() - 1.0).abs() < 1e-13);
    }

    #[test]
    fn lagrange_weights_partition_unity() {
        let nodes = vec![0.0, 0.3, 0.6, 1.0];
        for &x in &[0.1, 0.5, 0.9, -0.2, 1.3] {
            let l = lagrange_weights(&nodes, x);
            assert!((l.iter().sum::<f64>() - 1.0).abs() < 1e-10);
        }
    }

    #[test]
    fn lagrange_derivative_sums_to_zero() {
        let nodes = vec![0.0, 0.25, 0.6, 1.0];
        for &x in &[0.1, 0.5, 0.9] {
            let d = lagrange_derivative_weights(&nodes, x);
            assert!(d.iter().sum::<f64>().abs() < 1e-10);
        }
    }

    #[test]
    fn lagrange_reproduces_linear_function() {
        let nodes = vec![0.0, 0.4, 0.7, 1.0];
        let f = |x: f64| 2.0 * x + 1.0;
        for &x in &[0.2, 0.55, 0.95] {
            let l = lagrange_weights(&nodes, x);
            let interp: f64 = l.iter().zip(&nodes).map(|(&li, &xi)| li * f(xi)).sum();
            assert!((interp - f(x)).abs() < 1e-10);
        }
    }
}
