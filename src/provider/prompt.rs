// src/provider/prompt.rs — Prompt construction and Dockerfile extraction

use super::GenerationRequest;
use crate::core::types::{Language, ScriptProfile};
use crate::util::tail_str;

/// Log bytes quoted for the most recent failure.
const LATEST_EXCERPT_BYTES: usize = 2000;
/// Log bytes quoted for each older failure.
const OLDER_EXCERPT_BYTES: usize = 400;

const INSTRUCTIONS: &[&str] = &[
    "FROM",
    "RUN",
    "COPY",
    "ADD",
    "WORKDIR",
    "EXPOSE",
    "ENV",
    "CMD",
    "ENTRYPOINT",
    "VOLUME",
    "USER",
    "LABEL",
    "ARG",
    "HEALTHCHECK",
    "SHELL",
    "STOPSIGNAL",
    "ONBUILD",
];

pub fn system_prompt() -> &'static str {
    "You are a senior Docker engineer. You write small, secure, production-ready \
Dockerfiles for single scripts.

Rules:
- Output ONLY the Dockerfile. No prose, no explanations.
- Start with FROM. Pin a specific base image tag, never `latest`.
- The build context contains only the script and a .dockerignore. Do not COPY files \
that are not there (no requirements.txt or package.json unless you create them in RUN).
- Install third-party dependencies explicitly with the language's package manager, \
without caches.
- Set a WORKDIR and run as a non-root user.
- Use an exec-form ENTRYPOINT that starts the script so `docker run image arg1 arg2` \
passes arguments to it.
- When fixing a failed attempt, change what the error points at and keep what worked."
}

fn language_guidance(language: Language) -> &'static str {
    match language {
        Language::Python => {
            "- Prefer python slim images.\n\
             - Set PYTHONUNBUFFERED=1 and PYTHONDONTWRITEBYTECODE=1.\n\
             - Use `pip install --no-cache-dir` for dependencies."
        }
        Language::JavaScript => {
            "- Prefer node alpine images.\n\
             - With no dependencies, copy the script and run it with node directly.\n\
             - With dependencies, `npm install --omit=dev` them by name; there is no package.json."
        }
        Language::Bash => {
            "- The image must contain bash: use debian or ubuntu, or `apk add --no-cache bash` on alpine.\n\
             - Use ENTRYPOINT [\"bash\", \"<script>\"].\n\
             - Install only the tools the script calls (curl, jq, ...)."
        }
        Language::Unknown => "",
    }
}

fn describe_profile(profile: &ScriptProfile) -> String {
    let script = profile.script_name().unwrap_or_default();
    let deps = if profile.dependencies.is_empty() {
        "none detected".to_string()
    } else {
        profile.dependencies.join(", ")
    };

    let mut out = String::new();
    out.push_str(&format!("Script: {}\n", script));
    out.push_str(&format!("Language: {}\n", profile.language));
    out.push_str(&format!(
        "Runtime version: {}\n",
        profile.runtime_version.as_deref().unwrap_or("latest stable")
    ));
    if let Some(image) = &profile.base_image {
        out.push_str(&format!("Suggested base image: {}\n", image));
    }
    out.push_str(&format!("Dependencies: {}\n", deps));
    out.push_str(&format!("Entry point: {}\n", profile.entry_invocation));
    if let Some(example) = &profile.example_usage {
        out.push_str(&format!("Example usage: {}\n", example));
    }
    out
}

/// The user message for a first generation or a refinement.
pub fn user_prompt(request: &GenerationRequest) -> String {
    let profile = &request.profile;
    let mut prompt = format!(
        "Write a Dockerfile for this {} script.\n\n{}",
        profile.language,
        describe_profile(profile)
    );

    let guidance = language_guidance(profile.language);
    if !guidance.is_empty() {
        prompt.push_str("\nLanguage notes:\n");
        prompt.push_str(guidance);
        prompt.push('\n');
    }

    if !request.is_refinement() {
        return prompt;
    }

    prompt.push_str(&format!(
        "\n{} previous attempt(s) failed. Fix the problems below.\n",
        request.history.len()
    ));

    let last = request.history.len() - 1;
    for (i, attempt) in request.history.iter().enumerate() {
        let limit = if i == last {
            LATEST_EXCERPT_BYTES
        } else {
            OLDER_EXCERPT_BYTES
        };
        prompt.push_str(&format!(
            "\n--- Attempt {} ({}) ---\n{}\n",
            attempt.index + 1,
            attempt.outcome,
            tail_str(attempt.log_excerpt.trim(), limit)
        ));
    }

    if let Some(latest) = request.latest_dockerfile() {
        prompt.push_str(&format!(
            "\nDockerfile from attempt {}:\n```dockerfile\n{}\n```\n",
            latest.index + 1,
            latest.dockerfile.trim_end()
        ));
    }

    prompt.push_str("\nReturn the complete corrected Dockerfile only.\n");
    prompt
}

/// Body of the first fenced block, preferring a `dockerfile`-tagged one.
fn fenced_block(response: &str) -> Option<&str> {
    let lower = response.to_ascii_lowercase();
    let start = match lower.find("```dockerfile") {
        Some(i) => i,
        None => lower.find("```")?,
    };
    let after_fence = &response[start + 3..];
    // Skip the info string (e.g. "dockerfile") up to the end of its line.
    let body_start = after_fence.find('\n').map(|i| i + 1).unwrap_or(after_fence.len());
    let body = &after_fence[body_start..];
    let end = body.find("```").unwrap_or(body.len());
    Some(&body[..end])
}

fn is_instruction(line: &str) -> bool {
    let word = line.split_whitespace().next().unwrap_or("");
    INSTRUCTIONS.iter().any(|i| word.eq_ignore_ascii_case(i))
}

/// Pull a Dockerfile out of a model response. Everything before the first
/// FROM is dropped, and so is trailing prose after the last instruction.
pub fn extract_dockerfile(response: &str) -> Result<String, String> {
    let text = fenced_block(response).unwrap_or(response);

    let lines: Vec<&str> = text.lines().collect();
    let from = lines
        .iter()
        .position(|l| {
            l.trim_start()
                .get(..5)
                .is_some_and(|p| p.eq_ignore_ascii_case("FROM "))
        })
        .ok_or_else(|| "response contains no FROM instruction".to_string())?;

    let mut kept: Vec<&str> = Vec::new();
    let mut continued = false;
    for line in &lines[from..] {
        let trimmed = line.trim();
        let keep = continued
            || trimmed.is_empty()
            || trimmed.starts_with('#')
            || is_instruction(trimmed);
        if !keep {
            break;
        }
        continued = trimmed.ends_with('\\');
        kept.push(line.trim_end());
    }

    let dockerfile = kept.join("\n").trim().to_string();
    Ok(format!("{}\n", dockerfile))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{Attempt, AttemptOutcome};
    use pretty_assertions::assert_eq;

    fn python_profile() -> ScriptProfile {
        let mut p = ScriptProfile::new("/tmp/app.py", Language::Python)
            .with_dependencies(vec!["requests".into()])
            .with_example_usage("python app.py --url https://example.com");
        p.runtime_version = Some("3.11".into());
        p.base_image = Some("python:3.11-slim".into());
        p
    }

    fn failed(index: u32, dockerfile: &str, outcome: AttemptOutcome, log: &str) -> Attempt {
        Attempt {
            index,
            dockerfile: dockerfile.into(),
            generation_cost: 0.01,
            outcome,
            log_excerpt: log.into(),
            cumulative_cost: 0.01 * (index + 1) as f64,
        }
    }

    // ─── Prompts ────────────────────────────────────────────────

    #[test]
    fn test_initial_prompt_describes_profile() {
        let req = GenerationRequest::new(python_profile(), vec![]);
        let prompt = user_prompt(&req);
        assert!(prompt.contains("Script: app.py"));
        assert!(prompt.contains("Dependencies: requests"));
        assert!(prompt.contains("Suggested base image: python:3.11-slim"));
        assert!(prompt.contains("Example usage: python app.py --url"));
        assert!(prompt.contains("PYTHONUNBUFFERED"));
        assert!(!prompt.contains("previous attempt"));
    }

    #[test]
    fn test_refinement_prompt_includes_history() {
        let history = vec![
            failed(0, "FROM python:3.11-slim\nRUN pip install reqests\n", AttemptOutcome::BuildFailed, "No matching distribution found for reqests"),
            failed(1, "", AttemptOutcome::GenerationFailed, "response contains no FROM instruction"),
        ];
        let req = GenerationRequest::new(python_profile(), history);
        let prompt = user_prompt(&req);
        assert!(prompt.contains("2 previous attempt(s) failed"));
        assert!(prompt.contains("Attempt 1 (build-failed)"));
        assert!(prompt.contains("No matching distribution"));
        assert!(prompt.contains("Attempt 2 (generation-failed)"));
        assert!(prompt.contains("Dockerfile from attempt 1:"));
        assert!(prompt.contains("RUN pip install reqests"));
    }

    #[test]
    fn test_refinement_prompt_bounds_older_logs() {
        let long_log = format!("{}END", "x".repeat(5000));
        let history = vec![
            failed(0, "FROM a", AttemptOutcome::BuildFailed, &long_log),
            failed(1, "FROM b", AttemptOutcome::BuildFailed, "short"),
        ];
        let prompt = user_prompt(&GenerationRequest::new(python_profile(), history));
        assert!(prompt.contains("END"));
        assert!(prompt.len() < 5000);
    }

    // ─── Extraction ─────────────────────────────────────────────

    #[test]
    fn test_extract_from_dockerfile_fence() {
        let response = "Here you go:\n```dockerfile\nFROM python:3.11-slim\nWORKDIR /app\nCOPY app.py .\nENTRYPOINT [\"python\", \"app.py\"]\n```\nThis image runs the script.";
        assert_eq!(
            extract_dockerfile(response).unwrap(),
            "FROM python:3.11-slim\nWORKDIR /app\nCOPY app.py .\nENTRYPOINT [\"python\", \"app.py\"]\n"
        );
    }

    #[test]
    fn test_extract_from_generic_fence() {
        let response = "```\nFROM node:18-alpine\nCOPY index.js .\n```";
        assert_eq!(
            extract_dockerfile(response).unwrap(),
            "FROM node:18-alpine\nCOPY index.js .\n"
        );
    }

    #[test]
    fn test_extract_plain_text_stops_at_prose() {
        let response = "Sure.\nFROM ubuntu:22.04\n# tools\nRUN apt-get update && \\\n    apt-get install -y curl\nENTRYPOINT [\"bash\", \"run.sh\"]\nThis Dockerfile installs curl.";
        assert_eq!(
            extract_dockerfile(response).unwrap(),
            "FROM ubuntu:22.04\n# tools\nRUN apt-get update && \\\n    apt-get install -y curl\nENTRYPOINT [\"bash\", \"run.sh\"]\n"
        );
    }

    #[test]
    fn test_extract_rejects_missing_from() {
        let err = extract_dockerfile("I cannot help with that.").unwrap_err();
        assert!(err.contains("no FROM"));
    }
}
