use anyhow::Result;
use broker::checks::{run_checks, CheckFailure, CheckResult, CheckStep, Verdict, CHECKS};
use broker_core::config::{DispatcherConfig, SelectionStrategyKind};
use futures::future::BoxFuture;
use futures::FutureExt;

fn pass(_: DispatcherConfig) -> BoxFuture<'static, CheckResult> {
    async { Ok(()) }.boxed()
}

fn fail(_: DispatcherConfig) -> BoxFuture<'static, CheckResult> {
    async { Err(CheckFailure::new("deliberate failure")) }.boxed()
}

fn panics(_: DispatcherConfig) -> BoxFuture<'static, CheckResult> {
    async { panic!("check blew up") }.boxed()
}

const fn step(name: &'static str, ordinal: u32, required: bool, run: broker::checks::CheckFn) -> CheckStep {
    CheckStep {
        name,
        ordinal,
        required,
        description: "",
        run,
    }
}

static REQUIRED_FAILURES: &[CheckStep] = &[
    step("optional", 1, false, fail),
    step("later", 4, true, fail),
    step("earlier", 2, true, fail),
    step("fine", 3, true, pass),
];

static OPTIONAL_FAILURES: &[CheckStep] = &[
    step("required", 1, true, pass),
    step("late_optional", 6, false, fail),
    step("early_optional", 5, false, fail),
];

static PANICKING: &[CheckStep] = &[step("boom", 1, true, panics), step("fine", 2, true, pass)];

static ALL_PASS: &[CheckStep] = &[step("a", 1, true, pass), step("b", 2, false, pass)];

#[tokio::test]
async fn test_builtin_checks_pass_with_every_strategy() -> Result<()> {
    for kind in [
        SelectionStrategyKind::RoundRobin,
        SelectionStrategyKind::Random,
        SelectionStrategyKind::LeastUsed,
        SelectionStrategyKind::Specialist,
    ] {
        let report = run_checks(CHECKS, &DispatcherConfig::with_strategy(kind)).await;
        for outcome in report.outcomes() {
            assert!(
                outcome.passed(),
                "{} failed with {:?}: {:?}",
                outcome.step.name,
                kind,
                outcome.result
            );
        }
        assert_eq!(report.verdict(), Verdict::Passed);
        assert_eq!(report.exit_code(), 0);
    }
    Ok(())
}

#[tokio::test]
async fn test_builtin_table_is_ordered_and_starts_with_required_step() {
    assert!(CHECKS.windows(2).all(|pair| pair[0].ordinal <= pair[1].ordinal));
    assert!(CHECKS[0].required);
    assert!(CHECKS.iter().any(|step| !step.required));
}

#[tokio::test]
async fn test_lowest_required_failure_is_reported() {
    let report = run_checks(REQUIRED_FAILURES, &DispatcherConfig::default()).await;

    assert_eq!(report.verdict(), Verdict::RequiredFailed { ordinal: 2 });
    assert_eq!(report.required_failure().unwrap().step.name, "earlier");
    assert_eq!(report.exit_code(), 1);
    assert_eq!(report.passed(), 1);
}

#[tokio::test]
async fn test_optional_failure_does_not_fail_the_run() {
    let report = run_checks(OPTIONAL_FAILURES, &DispatcherConfig::default()).await;

    assert_eq!(report.verdict(), Verdict::OptionalFailed { ordinal: 5 });
    assert_eq!(report.optional_failure().unwrap().step.name, "early_optional");
    assert!(report.required_failure().is_none());
    assert_eq!(report.exit_code(), 0);
}

#[tokio::test]
async fn test_panicking_check_counts_as_failure() {
    let report = run_checks(PANICKING, &DispatcherConfig::default()).await;

    let failure = report.required_failure().unwrap();
    assert_eq!(failure.step.name, "boom");
    assert!(failure.result.is_err());
    assert_eq!(report.exit_code(), 1);
}

#[tokio::test]
async fn test_all_passing_table() {
    let report = run_checks(ALL_PASS, &DispatcherConfig::default()).await;
    assert_eq!(report.verdict(), Verdict::Passed);
    assert_eq!(report.passed(), 2);
}
