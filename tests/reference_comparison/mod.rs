pub mod comparator;

pub use self::comparator::{ComparisonReport, compare_results};
use vmcon::{ClosureProblem, Criterion, VmconOptions, solve_with_options};
pub use vmcon_test_problems::TestCase;

pub fn build_problem(test_case: &TestCase) -> ClosureProblem<'static> {
    let mut problem = ClosureProblem::new(test_case.objective_fn, test_case.gradient_fn);
    for c in &test_case.equality {
        problem = problem.with_equality(c.value, c.gradient);
    }
    for c in &test_case.inequality {
        problem = problem.with_inequality(c.value, c.gradient);
    }
    problem
}

pub fn run_comparison_test(
    test_case: &TestCase,
    criterion: Criterion,
    tol: f64,
) -> ComparisonReport {
    let problem = build_problem(test_case);
    let options = VmconOptions::default()
        .with_max_iter(test_case.max_iter)
        .with_epsilon(test_case.epsilon)
        .with_criterion(criterion);

    let result = solve_with_options(&problem, &test_case.x0, &options);

    // Max constraint violation at whatever point was reached
    let x = match &result {
        Ok(solution) => solution.x.clone(),
        Err(err) => err
            .last_iterate()
            .map(|last| last.x.clone())
            .unwrap_or_else(|| test_case.x0.clone()),
    };
    let mut max_cv: f64 = 0.0;
    for c in &test_case.equality {
        max_cv = max_cv.max((c.value)(&x).abs());
    }
    for c in &test_case.inequality {
        max_cv = max_cv.max(0.0f64.max(-(c.value)(&x)));
    }

    compare_results(test_case, &result, max_cv, tol)
}
