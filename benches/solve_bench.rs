use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use vmcon::{ClosureProblem, VmconOptions, solve_with_options};
use vmcon_test_problems::{TestCase, create_test_cases};

fn build_problem(test_case: &TestCase) -> ClosureProblem<'static> {
    let mut problem = ClosureProblem::new(test_case.objective_fn, test_case.gradient_fn);
    for c in &test_case.equality {
        problem = problem.with_equality(c.value, c.gradient);
    }
    for c in &test_case.inequality {
        problem = problem.with_inequality(c.value, c.gradient);
    }
    problem
}

fn run_all_cases(cases: &[(TestCase, ClosureProblem<'static>)]) {
    for (test_case, problem) in cases {
        let options = VmconOptions::default()
            .with_max_iter(test_case.max_iter)
            .with_epsilon(test_case.epsilon);
        let _ = black_box(solve_with_options(problem, &test_case.x0, &options));
    }
}

fn bench_all_cases_combined(c: &mut Criterion) {
    let cases: Vec<_> = create_test_cases()
        .into_iter()
        .map(|test_case| {
            let problem = build_problem(&test_case);
            (test_case, problem)
        })
        .collect();

    c.bench_function("all_reference_cases_combined", |b| {
        b.iter(|| run_all_cases(&cases))
    });
}

fn bench_each_case(c: &mut Criterion) {
    let mut group = c.benchmark_group("reference_cases");
    for test_case in create_test_cases() {
        let problem = build_problem(&test_case);
        let options = VmconOptions::default()
            .with_max_iter(test_case.max_iter)
            .with_epsilon(test_case.epsilon);
        group.bench_function(test_case.name.as_str(), |b| {
            b.iter(|| black_box(solve_with_options(&problem, &test_case.x0, &options)))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_all_cases_combined, bench_each_case);
criterion_main!(benches);
