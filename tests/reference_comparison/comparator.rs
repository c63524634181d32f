use vmcon::{VmconError, VmconSolution};
use vmcon_test_problems::{Expectation, TestCase};

#[derive(Debug, Clone)]
pub struct ComparisonReport {
    pub name: String,
    pub problem: Vec<String>,
    pub x_vmcon: Vec<f64>,
    pub x_reference: Vec<f64>,
    pub x_diff: f64,
    pub lamda_diff: Option<f64>,
    pub max_cv: f64,
    pub iterations: usize,
    pub expected_iterations: Option<usize>,
    pub outcome: String,
    pub outcome_match: bool,
    pub passed: bool,
}

impl ComparisonReport {
    pub fn print(&self) {
        println!("--------------------------------------------------");
        println!("Test Case: {}", self.name);
        for line in &self.problem {
            println!("  {}", line);
        }
        println!("Status: {}", if self.passed { "PASSED" } else { "FAILED" });
        println!("  Outcome:      {} (expected: {})", self.outcome, self.outcome_match);
        match self.expected_iterations {
            Some(expected) => {
                println!("  Iterations:   {} (expected: {})", self.iterations, expected)
            }
            None => println!("  Iterations:   {}", self.iterations),
        }
        println!("  Max CV:       {:.8e}", self.max_cv);
        println!("  X Difference: {:.8e}", self.x_diff);
        if let Some(d) = self.lamda_diff {
            println!("  Multiplier Difference: {:.8e}", d);
        }
        if !self.passed {
            println!("  VMCON X:     {:?}", self.x_vmcon);
            println!("  Reference X: {:?}", self.x_reference);
        }
        println!("--------------------------------------------------");
    }
}

/// Objective and constraints as readable lines.
fn describe(test_case: &TestCase) -> Vec<String> {
    let mut lines = vec![format!("minimize    {}", test_case.objective_expr)];
    let constraints = test_case
        .equality
        .iter()
        .map(|c| format!("{} == 0", c.expr))
        .chain(test_case.inequality.iter().map(|c| format!("{} >= 0", c.expr)));
    for (k, constraint) in constraints.enumerate() {
        let label = if k == 0 { "subject to" } else { "" };
        lines.push(format!("{:<11} {}", label, constraint));
    }
    lines
}

/// Largest difference relative to `max(1, |reference|)`.
fn relative_diff(actual: &[f64], reference: &[f64]) -> f64 {
    if actual.len() != reference.len() {
        return f64::INFINITY;
    }
    actual
        .iter()
        .zip(reference)
        .map(|(a, b)| (a - b).abs() / b.abs().max(1.0))
        .fold(0.0, f64::max)
}

pub fn compare_results(
    test_case: &TestCase,
    result: &Result<VmconSolution, VmconError>,
    max_cv: f64,
    tol: f64,
) -> ComparisonReport {
    let (x_vmcon, iterations, outcome) = match result {
        Ok(solution) => (
            solution.x.clone(),
            solution.diagnostics.iterations,
            "converged".to_string(),
        ),
        Err(err) => match err.last_iterate() {
            Some(last) => (last.x.clone(), last.diagnostics.iterations, err.to_string()),
            None => (Vec::new(), 0, err.to_string()),
        },
    };

    let (x_reference, outcome_match, lamda_diff) = match &test_case.expected {
        Expectation::Converged {
            x,
            lamda_equality,
            lamda_inequality,
        } => {
            let lamda_diff = match result {
                Ok(solution) => {
                    let mut diff: Option<f64> = None;
                    if let Some(reference) = lamda_equality {
                        let d = relative_diff(&solution.lamda_equality, reference);
                        diff = Some(diff.map_or(d, |v| v.max(d)));
                    }
                    if let Some(reference) = lamda_inequality {
                        let d = relative_diff(&solution.lamda_inequality, reference);
                        diff = Some(diff.map_or(d, |v| v.max(d)));
                    }
                    diff
                }
                Err(_) => None,
            };
            (x.clone(), result.is_ok(), lamda_diff)
        }
        Expectation::MaxIterations { x } => (
            x.clone(),
            matches!(result, Err(VmconError::MaxIterationsReached { .. })),
            None,
        ),
    };

    let x_diff = relative_diff(&x_vmcon, &x_reference);

    // Decision criteria:
    // 1. Outcome must be the expected one
    // 2. x and the reported multipliers within tol
    // 3. Iteration count, when one is recorded
    let values_match = x_diff < tol && lamda_diff.map_or(true, |d| d < tol);
    let iterations_match = test_case.iterations.map_or(true, |k| k == iterations);
    let passed = outcome_match && values_match && iterations_match;

    ComparisonReport {
        name: test_case.name.clone(),
        problem: describe(test_case),
        x_vmcon,
        x_reference,
        x_diff,
        lamda_diff,
        max_cv,
        iterations,
        expected_iterations: test_case.iterations,
        outcome,
        outcome_match,
        passed,
    }
}
