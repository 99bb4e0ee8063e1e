// src/core/validation.rs — Running a built image and judging the result

use super::types::{ControllerConfig, ScriptProfile, ValidationStrictness};
use crate::executor::{BuildExecutor, ExecutorError, Invocation, RunReport};

const INTERPRETERS: &[&str] = &["python", "python3", "node", "bash", "sh"];
const SCRIPT_EXTENSIONS: &[&str] = &[".py", ".js", ".mjs", ".ts", ".sh", ".bash"];

/// Verdict for one built image.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationOutcome {
    pub passed: bool,
    /// Everything the runs printed, with one header per run.
    pub log: String,
}

/// Split a command line with POSIX-shell quoting: single quotes are literal,
/// double quotes allow backslash escapes, unquoted backslash escapes the
/// next char. An unterminated quote runs to the end of the input.
pub fn split_shell_words(line: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\'' => {
                in_word = true;
                for q in chars.by_ref() {
                    if q == '\'' {
                        break;
                    }
                    current.push(q);
                }
            }
            '"' => {
                in_word = true;
                while let Some(q) = chars.next() {
                    match q {
                        '"' => break,
                        '\\' => match chars.peek() {
                            Some(&next @ ('"' | '\\' | '$' | '`')) => {
                                current.push(next);
                                chars.next();
                            }
                            _ => current.push('\\'),
                        },
                        other => current.push(other),
                    }
                }
            }
            '\\' => {
                in_word = true;
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            c if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            other => {
                in_word = true;
                current.push(other);
            }
        }
    }
    if in_word {
        words.push(current);
    }
    words
}

/// Turn an example command line into container arguments by dropping a
/// leading interpreter and the script itself.
pub fn example_arguments(example: &str, script_name: Option<&str>) -> Vec<String> {
    let mut words = split_shell_words(example.trim());

    if words
        .first()
        .is_some_and(|w| INTERPRETERS.contains(&w.as_str()))
    {
        words.remove(0);
    }

    if let Some(first) = words.first() {
        let bare = first.trim_start_matches("./");
        let is_script = script_name.is_some_and(|n| bare == n)
            || SCRIPT_EXTENSIONS.iter().any(|ext| bare.ends_with(ext));
        if is_script {
            words.remove(0);
        }
    }
    words
}

fn record(log: &mut String, invocation: &Invocation, report: &RunReport) {
    let status = match (report.timed_out, report.exit_code) {
        (true, _) => "timed out".to_string(),
        (false, Some(code)) => format!("exit {}", code),
        (false, None) => "killed".to_string(),
    };
    log.push_str(&format!("$ run {} ({})\n", invocation, status));
    log.push_str(&report.output);
    if !report.output.ends_with('\n') {
        log.push('\n');
    }
}

/// Run the image according to the configured strictness.
pub async fn validate_image(
    executor: &dyn BuildExecutor,
    image: &str,
    profile: &ScriptProfile,
    config: &ControllerConfig,
) -> Result<ValidationOutcome, ExecutorError> {
    let script_name = profile.script_name();
    let example = profile
        .example_usage
        .as_deref()
        .map(|e| example_arguments(e, script_name.as_deref()))
        .filter(|args| !args.is_empty())
        .map(Invocation::Args);

    let mut log = String::new();
    let timeout = config.validation_timeout;

    match config.strictness {
        ValidationStrictness::Advisory => {
            if let Some(invocation) = &example {
                let report = executor.run(image, invocation, timeout).await?;
                record(&mut log, invocation, &report);
                if report.passed() {
                    return Ok(ValidationOutcome { passed: true, log });
                }
                tracing::debug!("Example run failed, falling back to default invocation");
            }
            let report = executor.run(image, &Invocation::Default, timeout).await?;
            record(&mut log, &Invocation::Default, &report);
            Ok(ValidationOutcome {
                passed: report.passed(),
                log,
            })
        }
        ValidationStrictness::Strict => {
            let invocation = example.unwrap_or(Invocation::Default);
            let report = executor.run(image, &invocation, timeout).await?;
            record(&mut log, &invocation, &report);
            let mut passed = report.passed();
            if passed {
                if let Some(expected) = &config.expected_output {
                    if !report.output.contains(expected.as_str()) {
                        log.push_str(&format!("expected output not found: {:?}\n", expected));
                        passed = false;
                    }
                }
            }
            Ok(ValidationOutcome { passed, log })
        }
    }
}
