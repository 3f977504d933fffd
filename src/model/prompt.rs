//! Prompt templates for the judge and the behavior summarizer, plus helpers
//! for pulling JSON out of free-form model output.

/// A system prompt and the single user message that goes with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

// ---------------------------------------------------------------------------
// Judge
// ---------------------------------------------------------------------------

fn criterion(dimension: &str) -> String {
    match dimension {
        "quality" => "Is the final result correct, specific and complete?".to_string(),
        "collaboration" => {
            "Did agents build on each other's contributions and reference earlier work?"
                .to_string()
        }
        "efficiency" => {
            "Was the result reached without unnecessary back-and-forth?".to_string()
        }
        other => format!("How well does the conversation do on {other}?"),
    }
}

/// Ask a judge model to score a finished conversation on `dimensions`, 0-10 each.
pub fn judge_prompt(conversation: &str, task_type: &str, dimensions: &[&str]) -> Prompt {
    let system = "You are a strict but fair evaluator of multi-agent conversations. \
                  Use the full 0-10 range and answer with JSON only."
        .to_string();

    let criteria = dimensions
        .iter()
        .enumerate()
        .map(|(i, d)| format!("{}. **{d} (0-10)**: {}", i + 1, criterion(d)))
        .collect::<Vec<_>>()
        .join("\n\n");
    let fields = dimensions
        .iter()
        .map(|d| format!("  \"{d}\": <score 0-10>"))
        .collect::<Vec<_>>()
        .join(",\n");

    let user = format!(
        "You are evaluating a multi-agent collaboration on a {task_type} task.\n\n\
         {conversation}\n\n\
         Evaluate this conversation on the following criteria:\n\n\
         {criteria}\n\n\
         Provide your evaluation as a JSON object with exactly this structure:\n\
         {{\n{fields}\n}}\n\n\
         Return ONLY the JSON object, no other text."
    );
    Prompt { system, user }
}

// ---------------------------------------------------------------------------
// Behavior extraction
// ---------------------------------------------------------------------------

/// Ask a summarizer to mine top episodes for per-role, per-category behaviors.
///
/// `episodes` pairs each transcript with its reward total.
pub fn behavior_extraction_prompt(
    episodes: &[(f64, String)],
    roles: &[String],
    task_type: &str,
    categories: &[&str],
) -> Prompt {
    let system = "You analyze successful multi-agent conversations and extract \
                  specific, reproducible behavioral patterns. Answer with JSON only."
        .to_string();

    let mut episodes_text = String::new();
    for (i, (reward, transcript)) in episodes.iter().enumerate() {
        episodes_text.push_str(&format!(
            "--- Episode {} (Reward: {reward:.2}) ---\n{transcript}\n\n",
            i + 1
        ));
    }

    let example_role = roles.first().map(String::as_str).unwrap_or("role");
    let example_categories = categories
        .iter()
        .map(|c| format!("    \"{c}\": [\"Specific behavior 1\", \"Specific behavior 2\"]"))
        .collect::<Vec<_>>()
        .join(",\n");

    let user = format!(
        "Here are the top-performing {task_type} episodes:\n\n\
         {episodes_text}\
         Identify what made these episodes successful. Extract specific, actionable \
         behavioral patterns for each agent role.\n\n\
         Agent Roles: {roles}\n\
         Categories: {cats}\n\n\
         Return a JSON object with this structure:\n\
         {{\n  \"{example_role}\": {{\n{example_categories}\n  }},\n  ...\n}}\n\n\
         Guidelines:\n\
         - Be specific and actionable, not vague\n\
         - Focus on how agents built on each other\n\
         - Include 3-5 behaviors per category\n\n\
         Return ONLY the JSON object, no other text.",
        roles = roles.join(", "),
        cats = categories.join(", "),
    );
    Prompt { system, user }
}

// ---------------------------------------------------------------------------
// Response helpers
// ---------------------------------------------------------------------------

/// Strip optional markdown code fences (```json ... ``` or ``` ... ```).
pub fn strip_code_fences(s: &str) -> &str {
    let trimmed = s.trim();
    let stripped = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    let stripped = stripped.strip_suffix("```").unwrap_or(stripped);
    stripped.trim()
}

/// The outermost `{ ... }` span, tolerating prose around it.
pub fn extract_json_object(s: &str) -> Option<&str> {
    let s = strip_code_fences(s);
    let start = s.find('{')?;
    let end = s.rfind('}')?;
    (end > start).then(|| &s[start..=end])
}
