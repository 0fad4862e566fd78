//! Prompt 拼装：固定指令 + 人格系统提示 + 工具目录 + 对话历史 + 本轮问题 + 循环内记录

/// 没有人格时使用的默认身份
pub const DEFAULT_IDENTITY: &str = "You are a helpful assistant.";

const PREAMBLE: &str = "Answer the question by reasoning step by step. You may use the tools listed below.\n\
Use exactly this format:\n\
\n\
Thought: what you are thinking about\n\
Action: the tool name to use\n\
Action Input: a JSON object with the tool arguments\n\
\n\
After each action you will receive an Observation. Repeat Thought/Action/Action Input as needed.\n\
When you know the answer, reply with:\n\
\n\
Thought: I now know the final answer\n\
Final Answer: the answer for the user";

/// 组成 prompt 的各部分
pub struct PromptParts<'a> {
    pub system_prompt: &'a str,
    pub tool_catalogue: &'a str,
    pub history: &'a str,
    pub question: &'a str,
    /// 循环内先前的模型输出与 Observation，按时间顺序
    pub transcript: &'a [String],
}

pub fn build_prompt(parts: &PromptParts<'_>) -> String {
    let mut prompt = String::new();
    prompt.push_str(parts.system_prompt.trim());
    prompt.push_str("\n\n");
    prompt.push_str(PREAMBLE);
    prompt.push_str("\n\nAvailable tools:\n");
    prompt.push_str(parts.tool_catalogue);
    if !parts.history.trim().is_empty() {
        prompt.push_str("\n\nConversation so far:\n");
        prompt.push_str(parts.history.trim());
    }
    prompt.push_str("\n\nQuestion: ");
    prompt.push_str(parts.question.trim());
    prompt.push_str("\n\n");
    for entry in parts.transcript {
        prompt.push_str(entry);
        prompt.push('\n');
    }
    prompt.push_str("Thought:");
    prompt
}

/// 模型有时会自己编造 Observation，截断到第一个 Observation 之前
pub fn strip_fabricated_observation(output: &str) -> &str {
    match output.find("\nObservation:") {
        Some(idx) => output[..idx].trim_end(),
        None => output.trim_end(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::question_of;

    #[test]
    fn prompt_contains_all_sections_in_order() {
        let transcript = vec!["Thought: a\nAction: echo".to_string(), "Observation: hi".to_string()];
        let prompt = build_prompt(&PromptParts {
            system_prompt: "You are Coder.",
            tool_catalogue: "- echo: Echo text back unchanged.",
            history: "User: earlier",
            question: "what now?",
            transcript: &transcript,
        });
        let idx = |s: &str| prompt.find(s).unwrap();
        assert!(idx("You are Coder.") < idx("Available tools:"));
        assert!(idx("- echo:") < idx("Conversation so far:"));
        assert!(idx("User: earlier") < idx("Question: what now?"));
        assert!(idx("Question: what now?") < idx("Observation: hi"));
        assert!(prompt.ends_with("Thought:"));
        assert_eq!(question_of(&prompt), "what now?");
    }

    #[test]
    fn empty_history_is_omitted() {
        let prompt = build_prompt(&PromptParts {
            system_prompt: DEFAULT_IDENTITY,
            tool_catalogue: "(no tools available)",
            history: "  ",
            question: "q",
            transcript: &[],
        });
        assert!(!prompt.contains("Conversation so far"));
    }

    #[test]
    fn fabricated_observation_is_cut() {
        let out = "Thought: x\nAction: echo\nAction Input: {}\nObservation: made up\nThought: more";
        assert_eq!(strip_fabricated_observation(out), "Thought: x\nAction: echo\nAction Input: {}");
    }
}
