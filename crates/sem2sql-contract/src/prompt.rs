//! Prompt rendering. Output is deterministic given the request and the
//! accumulated remediation notes.

use std::fmt::Write as _;

use crate::models::QueryRequest;

/// Instruction prompt for one generation attempt.
pub fn generation_prompt(request: &QueryRequest, remediation_notes: &[String]) -> String {
    let dialect = request.dialect();
    let mut prompt = String::with_capacity(1024);

    let _ = writeln!(
        prompt,
        "You are an expert SQL generator. Convert the request below into one {dialect} SQL query."
    );
    let _ = writeln!(prompt);
    let _ = writeln!(prompt, "Target dialect: {dialect}");
    let _ = writeln!(prompt, "{dialect} syntax guide:");
    let _ = writeln!(prompt, "{}", dialect.guide().render());
    let _ = writeln!(prompt);
    let _ = writeln!(prompt, "Rules:");
    let _ = writeln!(
        prompt,
        "1. Produce exactly one SELECT statement. Never emit INSERT, UPDATE, DELETE, DROP, CREATE or any other statement kind."
    );
    if request.has_schema() {
        let _ = writeln!(
            prompt,
            "2. Use only the table and column names that appear in the schema below."
        );
    } else {
        let _ = writeln!(
            prompt,
            "2. No schema is available; invent plausible generic table and column names."
        );
    }
    let _ = writeln!(prompt, "3. Keep parentheses and quotes balanced.");
    let _ = writeln!(
        prompt,
        "4. Answer with a JSON object: {{\"sql\": \"<statement>\", \"is_valid\": true, \"validation_notes\": \"\"}}. No explanation outside the JSON."
    );

    if request.has_schema() {
        let _ = writeln!(prompt);
        let _ = writeln!(prompt, "Schema:");
        let _ = writeln!(prompt, "{}", request.table_schema().trim());
    }

    let _ = writeln!(prompt);
    let _ = writeln!(prompt, "Request: {}", request.natural_language_query().trim());

    if !remediation_notes.is_empty() {
        let _ = writeln!(prompt);
        let _ = writeln!(
            prompt,
            "Previous answers were rejected. Fix every problem listed:"
        );
        for note in remediation_notes {
            let _ = writeln!(prompt, "- {note}");
        }
    }
    prompt
}

/// YES/NO review of an accepted-looking candidate.
pub fn deep_check_prompt(request: &QueryRequest, sql: &str) -> String {
    format!(
        "Is the following SQL idiomatically correct for the {dialect} dialect, given the request \"{query}\"?\n\
         Answer strictly YES or NO.\n\nSQL:\n{sql}\n",
        dialect = request.dialect(),
        query = request.natural_language_query().trim(),
    )
}
