//! Grading instructions sent with every evaluation.
//!
//! Bump `PROMPT_VERSION` whenever prompt content changes so telemetry can
//! tell which wording produced a given score.

/// Prompt version. Bump on any content change.
pub const PROMPT_VERSION: &str = "1.0.0";

/// Role and output discipline for the grading model.
pub const SYSTEM_PROMPT: &str = "\
You are an automated teaching assistant evaluating \
a student's Jupyter notebook for a university ML/DS course.
Return STRICT JSON only. No markdown, no explanations, no extra text.
";

const USER_PROMPT_HEADER: &str = r#"Evaluate the student's Jupyter notebook as a single submission (one overall evaluation), regardless of how many blocks, sections, or tasks it contains.

You MUST return exactly one JSON object with the following structure:

{
  "id": "run_demo",
  "filename": "<string>",
  "score_total": <integer 0-100>,
  "rubric": {
    "correctness": <integer 0-10>,
    "completeness": <integer 0-10>,
    "analysis_quality": <integer 0-10>,
    "structure": <integer 0-10>
  },
  "issues": [
    "<short machine-readable issue or leave empty>",
    "... (optional)"
  ],
  "feedback": [
    "<short actionable feedback>",
    "... (3-10 items total)"
  ]
}

Scoring rules (CRITICAL):
- Each rubric criterion MUST be an integer from 0 to 10.
- Maximum total rubric score is 40.
- "score_total" MUST be computed as:
  round((correctness + completeness + analysis_quality + structure) / 40 * 100)
- "score_total" MUST be an integer from 0 to 100.

Content rules:
- Base your evaluation strictly on the provided notebook content (markdown, code, and textual outputs).
- If outputs are missing or the notebook appears not executed, reduce correctness and analysis_quality.
- If key steps are missing, reduce completeness.
- Structure reflects clarity, organization, and readability.

Issues rules:
- Issues must be short, machine-readable tags, e.g.:
  "missing: data_description"
  "error: runtime_exception"
  "output: not_executed"
  "quality: weak_analysis"
- Do NOT invent test names or timeouts unless explicitly visible in outputs.

Feedback rules:
- Provide 3-10 concise, actionable items in English.
- Do not rewrite the solution.
"#;

const USER_PROMPT_FOOTER: &str = "
Return STRICT JSON only.
If you cannot comply, return an empty JSON object {}.
";

/// Render the per-submission prompt around the notebook context.
pub fn render_user_prompt(filename: &str, blocks_text: &str) -> String {
    format!(
        "{USER_PROMPT_HEADER}\nNotebook filename: {filename}\n\nNotebook content:\n{blocks_text}\n{USER_PROMPT_FOOTER}"
    )
}
