//! Prompt 构建服务
//!
//! 负责构建出题用的系统提示词和带 PDF 附件的用户消息

use crate::llm::ChatMessage;
use crate::quiz::{Difficulty, Language, OPTION_COUNT};

use super::quiz_service::GenerationPlan;

/// 用户消息文本
const USER_PROMPT: &str =
    "Create a multiple choice test based on this document. Make sure to extract the key concepts.";

/// Prompt 服务
#[derive(Debug, Clone, Copy, Default)]
pub struct PromptService;

impl PromptService {
    /// 创建新的 Prompt 服务
    pub fn new() -> Self {
        Self
    }

    /// 构建出题消息：系统指令 + 用户文本与 PDF 附件
    pub fn build_quiz_messages(&self, plan: &GenerationPlan) -> Vec<ChatMessage> {
        vec![
            ChatMessage::system(self.system_prompt(
                plan.question_count,
                plan.difficulty,
                plan.language,
            )),
            ChatMessage::user_with_file(USER_PROMPT, plan.file.clone()),
        ]
    }

    /// 系统提示词
    ///
    /// 写明确切题数、输出语言、难度风格、选项数量与长度要求以及输出格式。
    pub fn system_prompt(
        &self,
        question_count: u32,
        difficulty: Difficulty,
        language: Language,
    ) -> String {
        let language_name = language.display_name();

        let sections = [
            format!(
                "You are a teacher. Your job is to take a document and create a multiple choice test with exactly {} questions based on the content of the document. Focus on the most important concepts from the document.",
                question_count
            ),
            format!(
                "Difficulty: {}. {}",
                difficulty.as_str(),
                difficulty.style_guidance()
            ),
            format!(
                "Language: write every question and every option in {lang}. All of your output must be in {lang}, even if the document is written in a different language.",
                lang = language_name
            ),
            format!(
                "Each question must have exactly {} options and only one of them may be correct. All options of a question should be roughly equal in length. The answer is the letter of the correct option: A for the first option, B for the second, C for the third and D for the fourth.",
                OPTION_COUNT
            ),
            r#"Output format: respond with a JSON array only, without any surrounding text or Markdown. Each element must be an object of the form {"question": string, "options": [string, string, string, string], "answer": "A" | "B" | "C" | "D"}."#.to_string(),
        ];

        sections.join("\n\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{ContentPart, FileAttachment};

    fn plan() -> GenerationPlan {
        GenerationPlan {
            request_id: "abcd1234".to_string(),
            file: FileAttachment {
                name: "biology.pdf".to_string(),
                mime_type: "application/pdf".to_string(),
                data: "JVBERi0=".to_string(),
            },
            file_bytes: 5,
            difficulty: Difficulty::Hard,
            language: Language::Spanish,
            question_count: 23,
        }
    }

    #[test]
    fn test_system_prompt_contents() {
        let prompt = PromptService::new().system_prompt(23, Difficulty::Hard, Language::Spanish);
        assert!(prompt.contains("exactly 23 questions"));
        assert!(prompt.contains("every option in Spanish"));
        assert!(prompt.contains("even if the document is written in a different language"));
        assert!(prompt.contains("exactly 4 options"));
        assert!(prompt.contains("roughly equal in length"));
        assert!(prompt.contains(Difficulty::Hard.style_guidance()));
    }

    #[test]
    fn test_easy_prompt_asks_for_recall() {
        let prompt = PromptService::new().system_prompt(5, Difficulty::Easy, Language::English);
        assert!(prompt.contains("recall"));
        assert!(prompt.contains("in English"));
    }

    #[test]
    fn test_build_quiz_messages() {
        let messages = PromptService::new().build_quiz_messages(&plan());
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, "system");
        assert_eq!(messages[1].role, "user");
        assert!(matches!(&messages[1].parts[1], ContentPart::File(f) if f.name == "biology.pdf"));
    }
}
