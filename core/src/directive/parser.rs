use lazy_static::lazy_static;
use regex::Regex;

use crate::task::types::{CompletionRequest, DelegationRequest};

use super::types::ToolCall;

/// Turn budget assigned when a `new_task` directive omits `maxTurns`.
pub const DEFAULT_MAX_TURNS: u32 = 10;

lazy_static! {
    static ref INLINE_NEW_TASK: Regex = Regex::new(r"new_task\s*\{([^}]*)\}").unwrap();
    static ref INLINE_COMPLETION: Regex =
        Regex::new(r"attempt_completion\s*\{([^}]*)\}").unwrap();
    static ref TAG_NEW_TASK: Regex = Regex::new(r"(?s)<new_task>(.*?)</new_task>").unwrap();
    static ref TAG_COMPLETION: Regex =
        Regex::new(r"(?s)<attempt_completion>(.*?)</attempt_completion>").unwrap();
}

/// Extraction seam for orchestration directives, so the regex grammar can be
/// replaced by a structured worker protocol without touching the orchestrator.
pub trait DirectiveParser: Send + Sync {
    /// Scans `text` for directives, in encounter order per surface. Malformed
    /// matches are skipped, never fatal to the scan.
    fn parse_output(&self, text: &str) -> Vec<ToolCall>;

    /// Cheap presence pre-check so ordinary output chunks skip the full scan.
    fn has_directives(&self, text: &str) -> bool;
}

/// The fixed two-surface grammar:
///
/// ```text
/// new_task {mode: <string>, instruction: <string>, tools: <comma-list>?, maxTurns: <int>?}
/// <new_task><mode>..</mode><instruction>..</instruction>...</new_task>
/// attempt_completion {result: <string>, summary: <string>?}
/// <attempt_completion><result>..</result>...</attempt_completion>
/// ```
///
/// The inline key:value form is inherently ambiguous: an unquoted comma in
/// free text splits a value. The grammar is kept as-is for compatibility with
/// existing workers.
#[derive(Default)]
pub struct RegexDirectiveParser;

impl RegexDirectiveParser {
    pub fn new() -> Self {
        Self
    }
}

impl DirectiveParser for RegexDirectiveParser {
    fn parse_output(&self, text: &str) -> Vec<ToolCall> {
        let mut calls = Vec::new();

        // The two surfaces are scanned independently; matches are concatenated
        // in encounter order within each surface.
        scan_inline(text, &mut calls);
        scan_tags(text, &mut calls);

        calls
    }

    fn has_directives(&self, text: &str) -> bool {
        text.contains("new_task") || text.contains("attempt_completion")
    }
}

fn scan_inline(text: &str, calls: &mut Vec<ToolCall>) {
    for cap in INLINE_NEW_TASK.captures_iter(text) {
        let body = &cap[1];
        match new_task_from_fields(&parse_inline_fields(body)) {
            Ok(request) => calls.push(ToolCall::NewTask(request)),
            Err(reason) => {
                tracing::warn!(error.kind = "directive.parse_failed", surface = "inline", directive = "new_task", reason = %reason, body = %body);
            }
        }
    }
    for cap in INLINE_COMPLETION.captures_iter(text) {
        let body = &cap[1];
        match completion_from_fields(&parse_inline_fields(body)) {
            Ok(request) => calls.push(ToolCall::AttemptCompletion(request)),
            Err(reason) => {
                tracing::warn!(error.kind = "directive.parse_failed", surface = "inline", directive = "attempt_completion", reason = %reason, body = %body);
            }
        }
    }
}

fn scan_tags(text: &str, calls: &mut Vec<ToolCall>) {
    for cap in TAG_NEW_TASK.captures_iter(text) {
        let body = &cap[1];
        match new_task_from_fields(&parse_tag_fields(body)) {
            Ok(request) => calls.push(ToolCall::NewTask(request)),
            Err(reason) => {
                tracing::warn!(error.kind = "directive.parse_failed", surface = "tag", directive = "new_task", reason = %reason);
            }
        }
    }
    for cap in TAG_COMPLETION.captures_iter(text) {
        let body = &cap[1];
        match completion_from_fields(&parse_tag_fields(body)) {
            Ok(request) => calls.push(ToolCall::AttemptCompletion(request)),
            Err(reason) => {
                tracing::warn!(error.kind = "directive.parse_failed", surface = "tag", directive = "attempt_completion", reason = %reason);
            }
        }
    }
}

/// Splits an inline body on commas into `key: value` pairs. A segment without
/// a colon continues the previous value (so `tools: a,b` keeps both entries).
fn parse_inline_fields(body: &str) -> Vec<(String, String)> {
    let mut fields: Vec<(String, String)> = Vec::new();
    for segment in body.split(',') {
        match segment.split_once(':') {
            Some((key, value)) => {
                fields.push((key.trim().to_string(), value.trim().to_string()));
            }
            None => {
                if let Some(last) = fields.last_mut() {
                    last.1.push(',');
                    last.1.push_str(segment.trim());
                }
            }
        }
    }
    for (_, value) in fields.iter_mut() {
        *value = unquote(value).to_string();
    }
    fields
}

fn parse_tag_fields(body: &str) -> Vec<(String, String)> {
    lazy_static! {
        static ref TAG_FIELD: Regex = Regex::new(r"(?s)<(\w+)>(.*?)</(\w+)>").unwrap();
    }
    TAG_FIELD
        .captures_iter(body)
        .filter(|cap| cap[1] == cap[3])
        .map(|cap| (cap[1].to_string(), cap[2].trim().to_string()))
        .collect()
}

fn unquote(value: &str) -> &str {
    let v = value.trim();
    if v.len() >= 2 && v.starts_with('"') && v.ends_with('"') {
        &v[1..v.len() - 1]
    } else {
        v
    }
}

fn lookup<'a>(fields: &'a [(String, String)], key: &str) -> Option<&'a str> {
    fields
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

fn new_task_from_fields(fields: &[(String, String)]) -> Result<DelegationRequest, String> {
    let mode = lookup(fields, "mode")
        .filter(|m| !m.is_empty())
        .ok_or("missing mode")?;
    let instruction = lookup(fields, "instruction")
        .filter(|i| !i.is_empty())
        .ok_or("missing instruction")?;

    let tools = lookup(fields, "tools")
        .map(|t| {
            t.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default();

    let max_turns = match lookup(fields, "maxTurns") {
        Some(raw) => Some(
            raw.parse::<u32>()
                .map_err(|_| format!("invalid maxTurns: {raw}"))?,
        ),
        None => Some(DEFAULT_MAX_TURNS),
    };

    Ok(DelegationRequest {
        mode: mode.to_string(),
        instruction: instruction.to_string(),
        tools,
        max_turns,
    })
}

fn completion_from_fields(fields: &[(String, String)]) -> Result<CompletionRequest, String> {
    let result = lookup(fields, "result")
        .filter(|r| !r.is_empty())
        .ok_or("missing result")?;
    Ok(CompletionRequest {
        result: result.to_string(),
        summary: lookup(fields, "summary").map(|s| s.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse(text: &str) -> Vec<ToolCall> {
        RegexDirectiveParser::new().parse_output(text)
    }

    #[test]
    fn parses_minimal_inline_new_task() {
        let calls = parse(r#"new_task {mode: coder, instruction: "write tests"}"#);
        assert_eq!(
            calls,
            vec![ToolCall::NewTask(DelegationRequest {
                mode: "coder".into(),
                instruction: "write tests".into(),
                tools: vec![],
                max_turns: Some(DEFAULT_MAX_TURNS),
            })]
        );
    }

    #[test]
    fn parses_inline_with_tools_and_max_turns() {
        let calls = parse("new_task {mode: tester, instruction: run suite, tools: bash,cargo, maxTurns: 4}");
        assert_eq!(
            calls,
            vec![ToolCall::NewTask(DelegationRequest {
                mode: "tester".into(),
                instruction: "run suite".into(),
                tools: vec!["bash".into(), "cargo".into()],
                max_turns: Some(4),
            })]
        );
    }

    #[test]
    fn parses_tag_form() {
        let text = "before <new_task><mode>reviewer</mode><instruction>check the diff</instruction><tools>git</tools><maxTurns>2</maxTurns></new_task> after";
        let calls = parse(text);
        assert_eq!(
            calls,
            vec![ToolCall::NewTask(DelegationRequest {
                mode: "reviewer".into(),
                instruction: "check the diff".into(),
                tools: vec!["git".into()],
                max_turns: Some(2),
            })]
        );
    }

    #[test]
    fn parses_attempt_completion_both_surfaces() {
        let calls = parse(concat!(
            "attempt_completion {result: all green, summary: done}\n",
            "<attempt_completion><result>ok</result></attempt_completion>",
        ));
        assert_eq!(
            calls,
            vec![
                ToolCall::AttemptCompletion(CompletionRequest {
                    result: "all green".into(),
                    summary: Some("done".into()),
                }),
                ToolCall::AttemptCompletion(CompletionRequest {
                    result: "ok".into(),
                    summary: None,
                }),
            ]
        );
    }

    #[test]
    fn multiple_inline_directives_keep_encounter_order() {
        let calls = parse(concat!(
            "new_task {mode: a, instruction: one}\n",
            "some narration\n",
            "new_task {mode: b, instruction: two}",
        ));
        let modes: Vec<_> = calls
            .iter()
            .map(|c| match c {
                ToolCall::NewTask(req) => req.mode.as_str(),
                _ => panic!("expected new_task"),
            })
            .collect();
        assert_eq!(modes, vec!["a", "b"]);
    }

    #[test]
    fn malformed_match_is_skipped_not_fatal() {
        // First directive misses the instruction, second is valid.
        let calls = parse(concat!(
            "new_task {mode: coder}\n",
            "new_task {mode: tester, instruction: ok, maxTurns: nope}\n",
            "new_task {mode: tester, instruction: run}",
        ));
        assert_eq!(calls.len(), 1);
        assert!(matches!(&calls[0], ToolCall::NewTask(req) if req.instruction == "run"));
    }

    #[test]
    fn directive_free_text_yields_nothing() {
        let parser = RegexDirectiveParser::new();
        let text = "I inspected the failing test and the fix looks straightforward.";
        assert!(parser.parse_output(text).is_empty());
        assert!(!parser.has_directives(text));
    }

    #[test]
    fn presence_precheck_detects_both_directives() {
        let parser = RegexDirectiveParser::new();
        assert!(parser.has_directives("new_task {mode: x, instruction: y}"));
        assert!(parser.has_directives("<attempt_completion><result>r</result></attempt_completion>"));
    }
}
