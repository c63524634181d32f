#[derive(Clone)]
pub struct TestConstraint {
    pub expr: String,
    pub value: fn(&[f64]) -> f64,
    pub gradient: fn(&[f64]) -> Vec<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expectation {
    /// Converges to `x`; multipliers are compared when given
    Converged {
        x: Vec<f64>,
        lamda_equality: Option<Vec<f64>>,
        lamda_inequality: Option<Vec<f64>>,
    },
    /// Runs out of iterations with `x` as the last iterate
    MaxIterations { x: Vec<f64> },
}

#[derive(Clone)]
pub struct TestCase {
    pub name: String,
    pub objective_expr: String,
    pub objective_fn: fn(&[f64]) -> f64,
    pub gradient_fn: fn(&[f64]) -> Vec<f64>,
    pub equality: Vec<TestConstraint>,
    pub inequality: Vec<TestConstraint>,
    pub x0: Vec<f64>,
    pub max_iter: usize,
    pub epsilon: f64,
    pub expected: Expectation,
    /// Relative tolerance of the comparison (None to use the global default)
    pub comparison_tol: Option<f64>,
    /// Iteration count, when both convergence criteria agree on it
    pub iterations: Option<usize>,
}

fn constraint(
    expr: &str,
    value: fn(&[f64]) -> f64,
    gradient: fn(&[f64]) -> Vec<f64>,
) -> TestConstraint {
    TestConstraint {
        expr: expr.to_string(),
        value,
        gradient,
    }
}

fn paper_objective(x: &[f64]) -> f64 {
    (x[0] - 2.0).powi(2) + (x[1] - 1.0).powi(2)
}

fn paper_gradient(x: &[f64]) -> Vec<f64> {
    vec![2.0 * (x[0] - 2.0), 2.0 * (x[1] - 1.0)]
}

fn paper_line() -> TestConstraint {
    constraint("x[0] - 2 x[1] + 1", |x| x[0] - 2.0 * x[1] + 1.0, |_| {
        vec![1.0, -2.0]
    })
}

fn paper_ellipse() -> TestConstraint {
    constraint(
        "-x[0]^2 / 4 - x[1]^2 + 1",
        |x| -(x[0] * x[0]) / 4.0 - x[1] * x[1] + 1.0,
        |x| vec![-0.5 * x[0], -2.0 * x[1]],
    )
}

/// The cases from ANL-80-64 and the unit-circle Lagrange example, all of which
/// converge within ten iterations.
pub fn paper_cases() -> Vec<TestCase> {
    vec![
        // ANL-80-64 test 1, page 25
        TestCase {
            name: "ANL-80-64 test 1".to_string(),
            objective_expr: "(x[0] - 2)^2 + (x[1] - 1)^2".to_string(),
            objective_fn: paper_objective,
            gradient_fn: paper_gradient,
            equality: vec![paper_line()],
            inequality: vec![paper_ellipse()],
            x0: vec![2.0, 2.0],
            max_iter: 10,
            epsilon: 1e-8,
            expected: Expectation::Converged {
                x: vec![8.228756e-1, 9.114378e-1],
                lamda_equality: Some(vec![-1.594491]),
                lamda_inequality: Some(vec![1.846591]),
            },
            comparison_tol: None,
            iterations: Some(5),
        },
        // ANL-80-64 test 2, page 28
        TestCase {
            name: "ANL-80-64 test 2".to_string(),
            objective_expr: "(x[0] - 2)^2 + (x[1] - 1)^2".to_string(),
            objective_fn: paper_objective,
            gradient_fn: paper_gradient,
            equality: vec![],
            inequality: vec![paper_line(), paper_ellipse()],
            x0: vec![2.0, 2.0],
            max_iter: 10,
            epsilon: 1e-8,
            expected: Expectation::Converged {
                x: vec![1.6649685472365443, 0.55404867491788852],
                lamda_equality: Some(vec![]),
                lamda_inequality: Some(vec![0.0, 0.80489557193146243]),
            },
            comparison_tol: None,
            iterations: Some(7),
        },
        // Example 1a of the Wikipedia article on Lagrange multipliers. Started
        // from (1, 1) the iteration settles on the stationary point in the
        // positive quadrant.
        TestCase {
            name: "Lagrange unit circle".to_string(),
            objective_expr: "x[0] + x[1]".to_string(),
            objective_fn: |x| x[0] + x[1],
            gradient_fn: |_| vec![1.0, 1.0],
            equality: vec![constraint(
                "x[0]^2 + x[1]^2 - 1",
                |x| x[0] * x[0] + x[1] * x[1] - 1.0,
                |x| vec![2.0 * x[0], 2.0 * x[1]],
            )],
            inequality: vec![],
            x0: vec![1.0, 1.0],
            max_iter: 10,
            epsilon: 2e-8,
            expected: Expectation::Converged {
                x: vec![0.5 * 2f64.sqrt(), 0.5 * 2f64.sqrt()],
                lamda_equality: Some(vec![0.5f64.sqrt()]),
                lamda_inequality: Some(vec![]),
            },
            comparison_tol: None,
            iterations: Some(4),
        },
    ]
}

/// A variant of ANL-80-64 test 1 that needs more than five iterations.
pub fn infeasible_in_budget_case() -> TestCase {
    TestCase {
        name: "ANL-80-64 test 1, x[0] + x[1] == 3".to_string(),
        objective_expr: "(x[0] - 2)^2 + (x[1] - 1)^2".to_string(),
        objective_fn: paper_objective,
        gradient_fn: paper_gradient,
        equality: vec![constraint("x[0] + x[1] - 3", |x| x[0] + x[1] - 3.0, |_| {
            vec![1.0, 1.0]
        })],
        inequality: vec![paper_ellipse()],
        x0: vec![2.0, 2.0],
        max_iter: 5,
        epsilon: 1e-8,
        expected: Expectation::MaxIterations {
            x: vec![2.3999994310874733, 0.6],
        },
        comparison_tol: None,
        iterations: Some(5),
    }
}

/// Hock-Schittkowski problems and small textbook cases.
pub fn hs_cases() -> Vec<TestCase> {
    vec![
        TestCase {
            name: "HS6".to_string(),
            objective_expr: "(1 - x[0])^2".to_string(),
            objective_fn: |x| (1.0 - x[0]).powi(2),
            gradient_fn: |x| vec![-2.0 * (1.0 - x[0]), 0.0],
            equality: vec![constraint(
                "10 (x[1] - x[0]^2)",
                |x| 10.0 * (x[1] - x[0] * x[0]),
                |x| vec![-20.0 * x[0], 10.0],
            )],
            inequality: vec![],
            x0: vec![-1.2, 1.0],
            max_iter: 50,
            epsilon: 1e-8,
            expected: Expectation::Converged {
                x: vec![1.0, 1.0],
                lamda_equality: None,
                lamda_inequality: None,
            },
            comparison_tol: Some(1e-5),
            iterations: None,
        },
        TestCase {
            name: "HS28".to_string(),
            objective_expr: "(x[0] + x[1])^2 + (x[1] + x[2])^2".to_string(),
            objective_fn: |x| (x[0] + x[1]).powi(2) + (x[1] + x[2]).powi(2),
            gradient_fn: |x| {
                vec![
                    2.0 * (x[0] + x[1]),
                    2.0 * (x[0] + x[1]) + 2.0 * (x[1] + x[2]),
                    2.0 * (x[1] + x[2]),
                ]
            },
            equality: vec![constraint(
                "x[0] + 2 x[1] + 3 x[2] - 1",
                |x| x[0] + 2.0 * x[1] + 3.0 * x[2] - 1.0,
                |_| vec![1.0, 2.0, 3.0],
            )],
            inequality: vec![],
            x0: vec![-4.0, 1.0, 1.0],
            max_iter: 50,
            epsilon: 1e-8,
            expected: Expectation::Converged {
                x: vec![0.5, -0.5, 0.5],
                lamda_equality: None,
                lamda_inequality: None,
            },
            comparison_tol: None,
            iterations: Some(3),
        },
        TestCase {
            name: "HS35".to_string(),
            objective_expr: concat!(
                "9 - 8 x[0] - 6 x[1] - 4 x[2] + 2 x[0]^2 + 2 x[1]^2 + x[2]^2",
                " + 2 x[0] x[1] + 2 x[0] x[2]"
            )
            .to_string(),
            objective_fn: |x| {
                9.0 - 8.0 * x[0] - 6.0 * x[1] - 4.0 * x[2]
                    + 2.0 * x[0] * x[0]
                    + 2.0 * x[1] * x[1]
                    + x[2] * x[2]
                    + 2.0 * x[0] * x[1]
                    + 2.0 * x[0] * x[2]
            },
            gradient_fn: |x| {
                vec![
                    -8.0 + 4.0 * x[0] + 2.0 * x[1] + 2.0 * x[2],
                    -6.0 + 4.0 * x[1] + 2.0 * x[0],
                    -4.0 + 2.0 * x[2] + 2.0 * x[0],
                ]
            },
            equality: vec![],
            inequality: vec![
                constraint("3 - x[0] - x[1] - 2 x[2]", |x| 3.0 - x[0] - x[1] - 2.0 * x[2], |_| {
                    vec![-1.0, -1.0, -2.0]
                }),
                constraint("x[0]", |x| x[0], |_| vec![1.0, 0.0, 0.0]),
                constraint("x[1]", |x| x[1], |_| vec![0.0, 1.0, 0.0]),
                constraint("x[2]", |x| x[2], |_| vec![0.0, 0.0, 1.0]),
            ],
            x0: vec![0.5, 0.5, 0.5],
            max_iter: 50,
            epsilon: 1e-8,
            expected: Expectation::Converged {
                x: vec![4.0 / 3.0, 7.0 / 9.0, 4.0 / 9.0],
                lamda_equality: Some(vec![]),
                lamda_inequality: Some(vec![2.0 / 9.0, 0.0, 0.0, 0.0]),
            },
            comparison_tol: None,
            iterations: Some(5),
        },
        TestCase {
            name: "Rosenbrock in a disk".to_string(),
            objective_expr: "100 (x[1] - x[0]^2)^2 + (1 - x[0])^2".to_string(),
            objective_fn: |x| 100.0 * (x[1] - x[0] * x[0]).powi(2) + (1.0 - x[0]).powi(2),
            gradient_fn: |x| {
                vec![
                    -400.0 * x[0] * (x[1] - x[0] * x[0]) - 2.0 * (1.0 - x[0]),
                    200.0 * (x[1] - x[0] * x[0]),
                ]
            },
            equality: vec![],
            inequality: vec![constraint(
                "2 - x[0]^2 - x[1]^2",
                |x| 2.0 - x[0] * x[0] - x[1] * x[1],
                |x| vec![-2.0 * x[0], -2.0 * x[1]],
            )],
            x0: vec![-1.2, 1.0],
            max_iter: 100,
            epsilon: 1e-8,
            expected: Expectation::Converged {
                x: vec![1.0, 1.0],
                lamda_equality: None,
                lamda_inequality: None,
            },
            comparison_tol: Some(1e-5),
            iterations: None,
        },
        TestCase {
            name: "HS21".to_string(),
            objective_expr: "0.01 x[0]^2 + x[1]^2 - 100".to_string(),
            objective_fn: |x| 0.01 * x[0] * x[0] + x[1] * x[1] - 100.0,
            gradient_fn: |x| vec![0.02 * x[0], 2.0 * x[1]],
            equality: vec![],
            inequality: vec![
                constraint("10 x[0] - x[1] - 10", |x| 10.0 * x[0] - x[1] - 10.0, |_| {
                    vec![10.0, -1.0]
                }),
                constraint("x[0] - 2", |x| x[0] - 2.0, |_| vec![1.0, 0.0]),
                constraint("50 - x[0]", |x| 50.0 - x[0], |_| vec![-1.0, 0.0]),
                constraint("x[1] + 50", |x| x[1] + 50.0, |_| vec![0.0, 1.0]),
                constraint("50 - x[1]", |x| 50.0 - x[1], |_| vec![0.0, -1.0]),
            ],
            x0: vec![-1.0, -1.0],
            max_iter: 50,
            epsilon: 1e-8,
            expected: Expectation::Converged {
                x: vec![2.0, 0.0],
                lamda_equality: Some(vec![]),
                lamda_inequality: Some(vec![0.0, 0.04, 0.0, 0.0, 0.0]),
            },
            comparison_tol: None,
            iterations: Some(3),
        },
        TestCase {
            name: "HS76".to_string(),
            objective_expr: concat!(
                "x[0]^2 + 0.5 x[1]^2 + x[2]^2 + 0.5 x[3]^2 - x[0] x[2] + x[2] x[3]",
                " - x[0] - 3 x[1] + x[2] - x[3]"
            )
            .to_string(),
            objective_fn: |x| {
                x[0] * x[0] + 0.5 * x[1] * x[1] + x[2] * x[2] + 0.5 * x[3] * x[3] - x[0] * x[2]
                    + x[2] * x[3]
                    - x[0]
                    - 3.0 * x[1]
                    + x[2]
                    - x[3]
            },
            gradient_fn: |x| {
                vec![
                    2.0 * x[0] - x[2] - 1.0,
                    x[1] - 3.0,
                    2.0 * x[2] - x[0] + x[3] + 1.0,
                    x[3] + x[2] - 1.0,
                ]
            },
            equality: vec![],
            inequality: vec![
                constraint(
                    "5 - x[0] - 2 x[1] - x[2] - x[3]",
                    |x| 5.0 - x[0] - 2.0 * x[1] - x[2] - x[3],
                    |_| vec![-1.0, -2.0, -1.0, -1.0],
                ),
                constraint(
                    "4 - 3 x[0] - x[1] - 2 x[2] + x[3]",
                    |x| 4.0 - 3.0 * x[0] - x[1] - 2.0 * x[2] + x[3],
                    |_| vec![-3.0, -1.0, -2.0, 1.0],
                ),
                constraint(
                    "x[1] + 4 x[2] - 1.5",
                    |x| x[1] + 4.0 * x[2] - 1.5,
                    |_| vec![0.0, 1.0, 4.0, 0.0],
                ),
                constraint("x[0]", |x| x[0], |_| vec![1.0, 0.0, 0.0, 0.0]),
                constraint("x[1]", |x| x[1], |_| vec![0.0, 1.0, 0.0, 0.0]),
                constraint("x[2]", |x| x[2], |_| vec![0.0, 0.0, 1.0, 0.0]),
                constraint("x[3]", |x| x[3], |_| vec![0.0, 0.0, 0.0, 1.0]),
            ],
            x0: vec![0.5, 0.5, 0.5, 0.5],
            max_iter: 50,
            epsilon: 1e-8,
            expected: Expectation::Converged {
                x: vec![3.0 / 11.0, 23.0 / 11.0, 0.0, 6.0 / 11.0],
                lamda_equality: Some(vec![]),
                lamda_inequality: Some(vec![5.0 / 11.0, 0.0, 0.0, 0.0, 0.0, 19.0 / 11.0, 0.0]),
            },
            // stops about 1e-5 short of the vertex
            comparison_tol: Some(1e-4),
            iterations: Some(5),
        },
        TestCase {
            name: "Unconstrained quadratic".to_string(),
            objective_expr: "0.5 ((x[0] - 1)^2 + (x[1] + 2)^2 + (x[2] - 0.5)^2)".to_string(),
            objective_fn: |x| {
                0.5 * ((x[0] - 1.0).powi(2) + (x[1] + 2.0).powi(2) + (x[2] - 0.5).powi(2))
            },
            gradient_fn: |x| vec![x[0] - 1.0, x[1] + 2.0, x[2] - 0.5],
            equality: vec![],
            inequality: vec![],
            x0: vec![0.0, 0.0, 0.0],
            max_iter: 10,
            epsilon: 1e-8,
            expected: Expectation::Converged {
                x: vec![1.0, -2.0, 0.5],
                lamda_equality: Some(vec![]),
                lamda_inequality: Some(vec![]),
            },
            comparison_tol: None,
            iterations: Some(1),
        },
        TestCase {
            name: "One variable".to_string(),
            objective_expr: "(x[0] - 3)^2".to_string(),
            objective_fn: |x| (x[0] - 3.0).powi(2),
            gradient_fn: |x| vec![2.0 * (x[0] - 3.0)],
            equality: vec![],
            inequality: vec![],
            x0: vec![0.0],
            max_iter: 10,
            epsilon: 1e-8,
            expected: Expectation::Converged {
                x: vec![3.0],
                lamda_equality: Some(vec![]),
                lamda_inequality: Some(vec![]),
            },
            comparison_tol: None,
            iterations: Some(1),
        },
    ]
}

/// Every case that is expected to converge.
pub fn create_test_cases() -> Vec<TestCase> {
    let mut cases = paper_cases();
    cases.extend(hs_cases());
    cases
}
