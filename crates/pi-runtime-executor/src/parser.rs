//! Shared structured-output contract (§4.9 step 5): extracts `SUMMARY`, `CLAIM`,
//! `EVIDENCE`, `CONFIDENCE`, `RESULT`, `NEXT_STEP` from an LLM's raw text output.
//!
//! Keys are matched case-insensitively, one per line, with the rest of the
//! line as the value. A fenced or bare JSON object anywhere in the output is
//! also parsed and merged in, with line-based fields taking precedence on
//! conflict (the JSON block is a fallback for models that prefer to emit
//! structured JSON over labelled lines).

use pi_runtime_core::RuntimeError;

/// The parsed result of a task's LLM output.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StructuredOutput {
    pub summary: Option<String>,
    pub claim: Option<String>,
    pub evidence: Option<String>,
    pub confidence: Option<String>,
    pub result: Option<String>,
    pub next_step: Option<String>,
}

const FIELDS: &[(&str, fn(&mut StructuredOutput) -> &mut Option<String>)] = &[
    ("summary", |o| &mut o.summary),
    ("claim", |o| &mut o.claim),
    ("evidence", |o| &mut o.evidence),
    ("confidence", |o| &mut o.confidence),
    ("result", |o| &mut o.result),
    ("next_step", |o| &mut o.next_step),
];

/// Parses `raw` per the contract and fails with [`RuntimeError::schema_violation`]
/// if `SUMMARY` or `RESULT` is missing.
pub fn parse(raw: &str) -> Result<StructuredOutput, RuntimeError> {
    let mut output = StructuredOutput::default();

    if let Some(json) = extract_json_object(raw) {
        merge_json(&mut output, &json);
    }

    for line in raw.lines() {
        let Some((key, value)) = split_line(line) else {
            continue;
        };
        if let Some((_, accessor)) = FIELDS.iter().find(|(name, _)| *name == key.as_str()) {
            *accessor(&mut output) = Some(value.trim().to_string());
        }
    }

    let mut missing = Vec::new();
    if output.summary.is_none() {
        missing.push("SUMMARY");
    }
    if output.result.is_none() {
        missing.push("RESULT");
    }
    if !missing.is_empty() {
        return Err(RuntimeError::schema_violation(&missing));
    }

    Ok(output)
}

fn split_line(line: &str) -> Option<(String, &str)> {
    let (key, rest) = line.split_once(':')?;
    let key = key.trim();
    if key.is_empty() || key.contains(char::is_whitespace) {
        return None;
    }
    Some((key.to_ascii_lowercase(), rest))
}

fn extract_json_object(raw: &str) -> Option<serde_json::Value> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&raw[start..=end]).ok()
}

fn merge_json(output: &mut StructuredOutput, value: &serde_json::Value) {
    let Some(obj) = value.as_object() else {
        return;
    };
    for (name, accessor) in FIELDS {
        let key_upper = name.to_ascii_uppercase();
        let found = obj
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name) || k.eq_ignore_ascii_case(&key_upper));
        if let Some((_, v)) = found {
            if let Some(s) = v.as_str() {
                *accessor(output) = Some(s.to_string());
            } else {
                *accessor(output) = Some(v.to_string());
            }
        }
    }
}

/// Rewrites a prompt with a trailing reminder of the required output format,
/// used for the single retry allowed on `schema_violation` (§4.9 step 5).
pub fn with_format_reminder(prompt: &str) -> String {
    format!(
        "{prompt}\n\n\
Your previous response was missing required fields. Respond with one field per \
line: SUMMARY: <text>, CLAIM: <text>, EVIDENCE: <text>, CONFIDENCE: <text>, \
RESULT: <text>, NEXT_STEP: <text>. SUMMARY and RESULT are required."
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_labelled_lines_case_insensitively() {
        let raw = "summary: did the thing\nRESULT: done\nCONFIDENCE: high";
        let output = parse(raw).unwrap();
        assert_eq!(output.summary.as_deref(), Some("did the thing"));
        assert_eq!(output.result.as_deref(), Some("done"));
        assert_eq!(output.confidence.as_deref(), Some("high"));
    }

    #[test]
    fn missing_summary_is_schema_violation() {
        let raw = "RESULT: done";
        let err = parse(raw).unwrap_err();
        assert_eq!(err.kind().as_str(), "schema_violation");
    }

    #[test]
    fn missing_result_is_schema_violation() {
        let raw = "SUMMARY: did the thing";
        let err = parse(raw).unwrap_err();
        assert_eq!(err.kind().as_str(), "schema_violation");
    }

    #[test]
    fn json_block_is_parsed_and_merged() {
        let raw = r#"here is the result: {"summary": "ok", "result": "done"}"#;
        let output = parse(raw).unwrap();
        assert_eq!(output.summary.as_deref(), Some("ok"));
        assert_eq!(output.result.as_deref(), Some("done"));
    }

    #[test]
    fn labelled_lines_take_precedence_over_json() {
        let raw = "{\"summary\": \"from json\"}\nSUMMARY: from line\nRESULT: done";
        let output = parse(raw).unwrap();
        assert_eq!(output.summary.as_deref(), Some("from line"));
    }

    #[test]
    fn format_reminder_is_appended() {
        let prompt = with_format_reminder("do the task");
        assert!(prompt.starts_with("do the task"));
        assert!(prompt.contains("SUMMARY"));
    }
}
