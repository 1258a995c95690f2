//! 提示词模板
//!
//! 模板使用 minijinja 语法，变量做纯文本替换，不做任何转义。

use minijinja::{Environment, context};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::config::PromptConfig;
use crate::error::Result;

const ANSWER_TEMPLATE: &str = "answer";
const TITLE_TEMPLATE: &str = "title";

/// 会话标题最大长度（字符）
pub const MAX_TITLE_CHARS: usize = 64;

/// 无法得到有效标题时使用的名称
pub const FALLBACK_TITLE: &str = "New chat";

static TITLE_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?im)^\s*chat[ _-]?name\s*:").expect("valid title marker regex"));

/// 已编译的提示词模板
pub struct PromptTemplates {
    env: Environment<'static>,
}

impl PromptTemplates {
    /// 编译模板，语法错误在启动时暴露
    pub fn new(config: &PromptConfig) -> Result<Self> {
        let mut env = Environment::new();
        env.add_template_owned(ANSWER_TEMPLATE, config.answer_template.clone())?;
        env.add_template_owned(TITLE_TEMPLATE, config.title_template.clone())?;
        Ok(Self { env })
    }

    /// 回答提示词
    pub fn render_answer(&self, context: &str, question: &str, chat_name: &str) -> Result<String> {
        let template = self.env.get_template(ANSWER_TEMPLATE)?;
        Ok(template.render(context! {
            context => context,
            question => question,
            chat_name => chat_name,
        })?)
    }

    /// 会话标题提示词
    pub fn render_title(&self, question: &str) -> Result<String> {
        let template = self.env.get_template(TITLE_TEMPLATE)?;
        Ok(template.render(context! { question => question })?)
    }
}

impl std::fmt::Debug for PromptTemplates {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PromptTemplates").finish_non_exhaustive()
    }
}

/// 整理模型生成的标题
///
/// 取行首 `Chat Name:` 标记之后的内容（若有），再取第一行非空文本，
/// 去掉首尾空白和引号，截断到 [`MAX_TITLE_CHARS`]。
pub fn clean_title(raw: &str) -> String {
    let text = match TITLE_MARKER.find(raw) {
        Some(marker) => &raw[marker.end()..],
        None => raw,
    };

    let line = text
        .lines()
        .map(|l| l.trim_matches(|c: char| c.is_whitespace() || "\"'`*«»“”".contains(c)))
        .find(|l| !l.is_empty())
        .unwrap_or("");

    let title: String = line.chars().take(MAX_TITLE_CHARS).collect();
    let title = title.trim_end();
    if title.is_empty() {
        FALLBACK_TITLE.to_string()
    } else {
        title.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_render_answer_substitutes_verbatim() {
        let templates = PromptTemplates::new(&PromptConfig {
            answer_template: "[{{ chat_name }}] {{ context }} | {{ question }}".into(),
            title_template: "{{ question }}".into(),
        })
        .unwrap();

        let prompt = templates
            .render_answer("<b>ctx</b>", "why & how?", "Rust")
            .unwrap();
        assert_eq!(prompt, "[Rust] <b>ctx</b> | why & how?");
    }

    #[test]
    fn test_default_templates_mention_inputs() {
        let templates = PromptTemplates::new(&PromptConfig::default()).unwrap();

        let answer = templates.render_answer("CTX", "QUESTION", "NAME").unwrap();
        assert!(answer.contains("CTX"));
        assert!(answer.contains("QUESTION"));
        assert!(answer.contains("NAME"));

        let title = templates.render_title("QUESTION").unwrap();
        assert!(title.contains("QUESTION"));
    }

    #[test]
    fn test_invalid_template_is_rejected() {
        let result = PromptTemplates::new(&PromptConfig {
            answer_template: "{{ unclosed".into(),
            ..PromptConfig::default()
        });
        assert!(result.is_err());
    }

    #[rstest]
    #[case("Chat Name: Rust lifetimes\n", "Rust lifetimes")]
    #[case(" \"Borrow checker basics\" ", "Borrow checker basics")]
    #[case("\n\nAsync runtimes\nextra line", "Async runtimes")]
    #[case("chat-name: \"Tokio tasks\"", "Tokio tasks")]
    #[case("Sure!\nChat Name: Pinning futures", "Pinning futures")]
    #[case("Parsing chatname: fields", "Parsing chatname: fields")]
    #[case("Chat-name helpers", "Chat-name helpers")]
    #[case("", "New chat")]
    #[case("Chat Name:   \n", "New chat")]
    fn test_clean_title(#[case] raw: &str, #[case] expected: &str) {
        assert_eq!(clean_title(raw), expected);
    }

    #[test]
    fn test_clean_title_caps_length() {
        let title = clean_title(&"word ".repeat(40));
        assert!(title.chars().count() <= MAX_TITLE_CHARS);
        assert!(title.starts_with("word word"));
    }
}
