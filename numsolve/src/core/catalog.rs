//! Static catalog of numerical methods per problem category.

/// Category used when the classifier gives no usable hint.
pub const DEFAULT_CATEGORY: &str = "root_finding";

const CATALOG: &[(&str, &[&str])] = &[
    (
        "root_finding",
        &[
            "Bisection",
            "Regula Falsi",
            "Secant",
            "Newton-Raphson",
            "Brentq",
            "Fixed-point",
            "Muller",
        ],
    ),
    (
        "linear_system",
        &[
            "Gaussian Elimination",
            "LU",
            "Cholesky",
            "Jacobi",
            "Gauss-Seidel",
            "SOR",
            "Conjugate Gradient",
            "GMRES",
        ],
    ),
    (
        "integration",
        &[
            "Trapezoid",
            "Simpson",
            "Romberg",
            "Adaptive Quadrature",
            "Gaussian Quadrature",
            "Monte Carlo",
        ],
    ),
    ("differentiation", &["Forward Diff", "Central Diff", "Richardson"]),
    ("ode_ivp", &["Euler", "RK4", "RK45", "Implicit Euler", "BDF"]),
    ("ode_bvp", &["Shooting", "Finite Difference", "Collocation"]),
    (
        "pde",
        &[
            "Finite Difference",
            "Finite Element",
            "Spectral Method",
            "Finite Volume",
        ],
    ),
    (
        "optimization_unconstrained",
        &[
            "Gradient Descent",
            "Newton",
            "BFGS",
            "Conjugate Gradient",
            "Nelder-Mead",
        ],
    ),
    (
        "optimization_constrained",
        &["Lagrange", "SQP", "Interior Point", "Augmented Lagrangian"],
    ),
    (
        "approximation",
        &[
            "Polynomial Interpolation",
            "Spline",
            "Chebyshev",
            "Least Squares",
        ],
    ),
    ("eigen", &["Power Method", "Inverse Power", "QR", "Lanczos", "Arnoldi"]),
    ("stochastic", &["Monte Carlo", "MCMC", "Importance Sampling"]),
];

/// Methods listed for `category`, if the category is known.
pub fn methods_for(category: &str) -> Option<&'static [&'static str]> {
    CATALOG
        .iter()
        .find(|(name, _)| *name == category)
        .map(|(_, methods)| *methods)
}

/// Up to `limit` catalog methods for `category`, defaulting to root finding.
pub fn candidate_methods(category: Option<&str>, limit: usize) -> Vec<String> {
    category
        .and_then(methods_for)
        .or_else(|| methods_for(DEFAULT_CATEGORY))
        .unwrap_or_default()
        .iter()
        .take(limit)
        .map(|m| m.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_category_lists_its_methods() {
        assert_eq!(
            candidate_methods(Some("ode_ivp"), 6),
            vec!["Euler", "RK4", "RK45", "Implicit Euler", "BDF"]
        );
    }

    #[test]
    fn unknown_or_missing_category_falls_back_to_root_finding() {
        let expected = candidate_methods(Some(DEFAULT_CATEGORY), 6);
        assert_eq!(expected.first().map(String::as_str), Some("Bisection"));
        assert_eq!(candidate_methods(Some("other"), 6), expected);
        assert_eq!(candidate_methods(None, 6), expected);
    }

    #[test]
    fn limit_caps_the_list() {
        assert_eq!(candidate_methods(Some("root_finding"), 6).len(), 6);
        assert_eq!(candidate_methods(Some("linear_system"), 2), vec!["Gaussian Elimination", "LU"]);
    }
}
