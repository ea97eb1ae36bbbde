//! Testcase runner.
//!
//! Grades one testcase against the admin context:
//!
//! 1. execute the input on top of the admin namespace; the names it binds
//!    become the method's keyword arguments
//! 2. execute the expected-output text and read `expected_output`
//! 3. execute the (denylist-filtered) candidate code
//! 4. instantiate `CLASS_NAME`
//! 5. call `METHOD_NAME` with the keyword arguments
//! 6. reject a `None` result
//! 7. compare structurally against the expected value
//!
//! The first failing step becomes the outcome's error. The runner never
//! fails itself; every failure is reported through the returned outcome.

use agon_common::{RunnerMode, Testcase, TestcaseOutcome};

use crate::comparator::compare;
use crate::error::GradingError;
use crate::sandbox::SnippetExecutor;
use crate::sandbox::denylist::strip_denied_lines;
use crate::template::AdminContext;

/// Variable the expected-output text must bind
pub const EXPECTED_OUTPUT_VAR: &str = "expected_output";

const INIT_SECTION: &str = "[init]";
const CALL_SECTION: &str = "[call]";

/// Grade one testcase.
pub async fn run_testcase<E>(
    executor: &mut E,
    ctx: &AdminContext,
    candidate_code: &str,
    testcase: &Testcase,
    mode: RunnerMode,
    denylist: &[String],
) -> TestcaseOutcome
where
    E: SnippetExecutor + ?Sized,
{
    run_testcase_detailed(executor, ctx, candidate_code, testcase, mode, denylist)
        .await
        .0
}

/// Grade one testcase, also handing back the typed error behind the
/// outcome's `error` text.
pub async fn run_testcase_detailed<E>(
    executor: &mut E,
    ctx: &AdminContext,
    candidate_code: &str,
    testcase: &Testcase,
    mode: RunnerMode,
    denylist: &[String],
) -> (TestcaseOutcome, Option<GradingError>)
where
    E: SnippetExecutor + ?Sized,
{
    match grade(executor, ctx, candidate_code, testcase, mode, denylist).await {
        Ok(graded) => {
            tracing::debug!(
                testcase_id = %testcase.testcase_id,
                is_pass = graded.is_pass,
                "Testcase compared"
            );
            let outcome =
                TestcaseOutcome::compared(testcase, graded.output, graded.expected, graded.is_pass);
            (outcome, None)
        }
        Err(failure) => {
            tracing::debug!(
                testcase_id = %testcase.testcase_id,
                error = %failure.error,
                "Testcase failed"
            );
            let mut outcome =
                TestcaseOutcome::failed(testcase, failure.error.to_string(), failure.expected);
            if let Some(output) = failure.output {
                outcome = outcome.with_output(output);
            }
            (outcome, Some(failure.error))
        }
    }
}

struct Graded {
    output: String,
    expected: String,
    is_pass: bool,
}

/// A pipeline step failed
struct Failure {
    error: GradingError,
    /// Candidate output, when the pipeline got that far
    output: Option<String>,
    /// Expected value text, when it was built
    expected: Option<String>,
}

impl Failure {
    fn with_expected(error: GradingError, expected: &str) -> Self {
        Self {
            error,
            output: None,
            expected: Some(expected.to_string()),
        }
    }
}

impl From<GradingError> for Failure {
    fn from(error: GradingError) -> Self {
        Self {
            error,
            output: None,
            expected: None,
        }
    }
}

async fn grade<E>(
    executor: &mut E,
    ctx: &AdminContext,
    candidate_code: &str,
    testcase: &Testcase,
    mode: RunnerMode,
    denylist: &[String],
) -> Result<Graded, Failure>
where
    E: SnippetExecutor + ?Sized,
{
    let base = Some(ctx.namespace);

    let (init_source, call_source) = match mode {
        RunnerMode::Plain => (None, testcase.input.clone()),
        RunnerMode::WithConstructorArgs => split_constructor_sections(&testcase.input),
    };

    let call_args = executor.execute(&call_source, base).await?;
    let init_args = match init_source {
        Some(source) => Some(executor.execute(&source, base).await?.id),
        None => None,
    };

    let expected_ns = executor
        .execute(&expected_source(&testcase.expected_output), base)
        .await?;
    let expected = expected_ns.get(EXPECTED_OUTPUT_VAR).cloned().ok_or_else(|| {
        GradingError::Execution(format!(
            "NameError: name '{EXPECTED_OUTPUT_VAR}' is not defined"
        ))
    })?;
    let expected_text = expected.to_text();

    let cleaned = strip_denied_lines(candidate_code, denylist);
    let candidate = executor
        .execute(&cleaned, base)
        .await
        .map_err(|e| Failure::with_expected(e, &expected_text))?;

    let object = executor
        .instantiate(candidate.id, &ctx.class_name, init_args)
        .await
        .map_err(|e| Failure::with_expected(e, &expected_text))?;

    let actual = executor
        .invoke(object, &ctx.method_name, call_args.id)
        .await
        .map_err(|e| Failure::with_expected(e, &expected_text))?;

    if actual.is_none() {
        return Err(Failure::with_expected(GradingError::NullOutput, &expected_text));
    }

    let output = actual.to_text();
    match compare(&actual, &expected) {
        Ok(is_pass) => Ok(Graded {
            output,
            expected: expected_text,
            is_pass,
        }),
        Err(e) => Err(Failure {
            error: e.into(),
            output: Some(output),
            expected: Some(expected_text),
        }),
    }
}

/// Split a constructor-mode input into its `[init]` and `[call]` sections.
///
/// Header lines are matched after trimming. Text before any header belongs
/// to `[call]`. The init section is `None` when no `[init]` header appears.
pub fn split_constructor_sections(input: &str) -> (Option<String>, String) {
    let mut init: Option<Vec<&str>> = None;
    let mut call = Vec::new();
    let mut in_init = false;

    for line in input.lines() {
        match line.trim() {
            INIT_SECTION => {
                in_init = true;
                init.get_or_insert_with(Vec::new);
            }
            CALL_SECTION => in_init = false,
            _ if in_init => init.get_or_insert_with(Vec::new).push(line),
            _ => call.push(line),
        }
    }

    (init.map(|lines| lines.join("\n")), call.join("\n"))
}

/// Source that binds `expected_output`. Text with no line assigning the
/// variable is taken as a bare expression.
pub fn expected_source(text: &str) -> String {
    if text.lines().any(assigns_expected) {
        text.to_string()
    } else {
        format!("{EXPECTED_OUTPUT_VAR} = (\n{text}\n)")
    }
}

/// `expected_output = ...` or `expected_output: T = ...` at the start of a line
fn assigns_expected(line: &str) -> bool {
    let Some(rest) = line.trim_start().strip_prefix(EXPECTED_OUTPUT_VAR) else {
        return false;
    };
    let rest = rest.trim_start();
    match rest.strip_prefix('=') {
        Some(value) => !value.starts_with('='),
        None => rest.starts_with(':'),
    }
}
