//! ReAct 输出解析
//!
//! 1. 先忽略大小写查找 `Final Answer:`，找到则其后全部内容为最终答案
//! 2. 否则提取第一行 `Thought:` 与 `Action:`（小写字母开头的标识符）
//! 3. `Action Input:` 之后用括号深度计数截取完整 JSON 对象（识别字符串与转义），
//!    失败时退回单层 `{...}` 正则，再失败则参数为空

use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map, Value};

use crate::react::ReasoningStep;

static FINAL_ANSWER_RE: OnceLock<Regex> = OnceLock::new();
static THOUGHT_RE: OnceLock<Regex> = OnceLock::new();
static ACTION_RE: OnceLock<Regex> = OnceLock::new();
static ACTION_INPUT_RE: OnceLock<Regex> = OnceLock::new();
static FLAT_OBJECT_RE: OnceLock<Regex> = OnceLock::new();

fn final_answer_re() -> &'static Regex {
    FINAL_ANSWER_RE.get_or_init(|| Regex::new(r"(?is)final answer:\s*(.*)").unwrap())
}

fn thought_re() -> &'static Regex {
    THOUGHT_RE.get_or_init(|| Regex::new(r"(?i:thought):[ \t]*([^\r\n]*)").unwrap())
}

fn action_re() -> &'static Regex {
    ACTION_RE.get_or_init(|| Regex::new(r"(?i:action):[ \t]*([a-z][A-Za-z0-9_\-]*)").unwrap())
}

fn action_input_re() -> &'static Regex {
    ACTION_INPUT_RE.get_or_init(|| Regex::new(r"(?i)action input:").unwrap())
}

fn flat_object_re() -> &'static Regex {
    FLAT_OBJECT_RE.get_or_init(|| Regex::new(r"\{[^{}]*\}").unwrap())
}

/// 把一次 LLM 输出解析为 ReasoningStep
pub fn parse_react_output(output: &str) -> ReasoningStep {
    if let Some(caps) = final_answer_re().captures(output) {
        let marker_start = caps.get(0).map(|m| m.start()).unwrap_or(0);
        let answer = caps.get(1).map(|m| m.as_str().trim()).unwrap_or("");
        return ReasoningStep::final_answer(extract_thought(&output[..marker_start]), answer);
    }

    let action = action_re()
        .captures(output)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string());
    ReasoningStep::action(extract_thought(output), action, extract_action_input(output))
}

fn extract_thought(text: &str) -> String {
    thought_re()
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default()
}

/// 提取 `Action Input:` 后的参数对象；找不到或不是合法 JSON 对象时返回空
pub fn extract_action_input(output: &str) -> Map<String, Value> {
    let Some(marker) = action_input_re().find(output) else {
        return Map::new();
    };
    let rest = &output[marker.end()..];

    let balanced = rest.find('{').and_then(|start| match_braces(&rest[start..]));
    let candidate = balanced.or_else(|| flat_object_re().find(rest).map(|m| m.as_str()));

    candidate
        .and_then(|json| serde_json::from_str::<Map<String, Value>>(json).ok())
        .unwrap_or_default()
}

/// text 以 `{` 开头；返回深度回到 0 时的完整对象切片。
/// 只在字符串外计数；字符串内 `\` 转义下一个字符，且不会切换字符串状态。
pub fn match_braces(text: &str) -> Option<&str> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(&text[..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn final_answer_wins_and_is_case_insensitive() {
        let out = "Thought: I know it\nAction: echo\nFINAL ANSWER: 42\nis the answer";
        let step = parse_react_output(out);
        assert!(step.is_final_answer);
        assert_eq!(step.final_answer.as_deref(), Some("42\nis the answer"));
        assert_eq!(step.thought, "I know it");
        assert!(step.action.is_none());
    }

    #[test]
    fn thought_action_and_nested_input() {
        let out = "Thought: need a tool\nAction: lookup_v2\nAction Input: {\"a\":{\"b\":1},\"c\":\"}\"}\ntrailing";
        let step = parse_react_output(out);
        assert!(!step.is_final_answer);
        assert_eq!(step.thought, "need a tool");
        assert_eq!(step.action.as_deref(), Some("lookup_v2"));
        assert_eq!(
            Value::Object(step.action_input),
            json!({"a": {"b": 1}, "c": "}"})
        );
    }

    #[test]
    fn brace_matcher_handles_strings_and_escapes() {
        assert_eq!(
            match_braces(r#"{"a":{"b":1},"c":"}"} tail"#),
            Some(r#"{"a":{"b":1},"c":"}"}"#)
        );
        assert_eq!(
            match_braces(r#"{"q":"say \"}\" now"} x"#),
            Some(r#"{"q":"say \"}\" now"}"#)
        );
        assert_eq!(match_braces(r#"{"open": {"x": 1}"#), None);
    }

    #[test]
    fn unbalanced_input_falls_back_to_flat_object() {
        let out = "Action: echo\nAction Input: {\"x\": 1, \"y\": {\"z\": 2}";
        let input = extract_action_input(out);
        assert_eq!(Value::Object(input), json!({"z": 2}));
    }

    #[test]
    fn missing_or_invalid_input_is_empty() {
        assert!(extract_action_input("Action: echo").is_empty());
        assert!(extract_action_input("Action: echo\nAction Input: none").is_empty());
        assert!(extract_action_input("Action Input: {not json}").is_empty());
    }

    #[test]
    fn action_must_be_lowercase_led() {
        let step = parse_react_output("Thought: hmm\nAction: Echo\n");
        assert!(step.action.is_none());
        let step = parse_react_output("thought: lower\naction: echo\n");
        assert_eq!(step.action.as_deref(), Some("echo"));
        assert_eq!(step.thought, "lower");
    }

    #[test]
    fn plain_text_yields_no_action() {
        let step = parse_react_output("I am not following the format.");
        assert!(!step.is_final_answer);
        assert!(step.action.is_none());
        assert!(step.thought.is_empty());
    }
}
