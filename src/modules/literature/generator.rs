use std::fmt::Write as _;

use tracing::info;

use crate::llm::{ChatMessage, GenerationError, LlmClient, LlmRequest, MessageRole};

pub const MAX_EXCERPT_CHARS: usize = 2000;
pub const MAX_TOKENS: u32 = 1500;
pub const TEMPERATURE: f32 = 0.7;

/// Language the review is written in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputLanguage {
    #[default]
    Turkish,
    English,
}

impl OutputLanguage {
    /// `"turkish"` (any case) selects Turkish; every other value selects English.
    pub fn from_form_value(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("turkish") {
            OutputLanguage::Turkish
        } else {
            OutputLanguage::English
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            OutputLanguage::Turkish => "Turkish",
            OutputLanguage::English => "English",
        }
    }
}

/// Text pulled from one uploaded PDF.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedText {
    pub filename: String,
    pub text: String,
}

/// Everything one review needs; lives only for the request that built it.
#[derive(Debug, Clone)]
pub struct ReviewRequest {
    pub research_topic: String,
    pub documents: Vec<ExtractedText>,
    pub output_language: OutputLanguage,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewPrompt {
    pub system: String,
    pub user: String,
}

/// First `MAX_EXCERPT_CHARS` characters of `text`, with `...` when cut.
fn excerpt(text: &str) -> String {
    match text.char_indices().nth(MAX_EXCERPT_CHARS) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

pub fn build_prompt<S: AsRef<str>>(
    topic: &str,
    documents: &[S],
    language: OutputLanguage,
) -> ReviewPrompt {
    let language = language.display_name();

    let system = format!(
        r#"You are an expert researcher in academic literature reviews. Your task is to write a thorough "Literature Review" section based on the given research topic and academic papers.

RULES:
1. LITERATURE REVIEW ONLY: do not write an introduction or a conclusion.
2. ONE PARAGRAPH PER PAPER: write a separate paragraph for each paper.
3. CITE ONLY THAT PAPER: each paragraph cites only the paper it discusses.
4. APA 7 IN-TEXT CITATIONS: cite as (Author, Year).
5. ACCURATE REFERENCES: cite only the supplied papers; never invent references.
6. FLAWLESS GRAMMAR: write fluent, correct, professional {language}.
7. ACADEMIC REGISTER: formal, scientific and professional language.
8. CRITICAL ANALYSIS: analyse each paper's findings and note its strengths and weaknesses.

PARAGRAPH STRUCTURE:
- Explain the paper's main findings, methodology and results
- Evaluate its strengths and weaknesses
- Relate it to the research topic
- Place the (Author, Year) citation inside or at the end of the paragraph

Write the entire review in {language}."#
    );

    let mut papers = String::new();
    for (idx, document) in documents.iter().enumerate() {
        let _ = write!(papers, "\n\nPAPER {}:\n{}", idx + 1, excerpt(document.as_ref()));
    }

    let user = format!(
        r#"RESEARCH TOPIC: {topic}

AVAILABLE PAPERS:{papers}

Based on the research topic and papers above, write ONLY the "Literature Review" section in {language}. Do not write an introduction or a conclusion.

WRITING REQUIREMENTS:
1. A separate paragraph for each paper
2. Each paragraph cites only its own paper
3. APA 7 in-text citations in (Author, Year) form
4. Cite only the supplied papers
5. Fluent and correct {language}
6. Critical analysis of each paper's findings
7. Professional, scientific tone
8. Coherent transitions between paragraphs

LITERATURE REVIEW:"#
    );

    ReviewPrompt { system, user }
}

/// Builds the review prompt and sends it to the configured chat-completion model.
#[derive(Clone)]
pub struct ReviewGenerator {
    llm: LlmClient,
}

impl ReviewGenerator {
    pub fn new(llm: LlmClient) -> Self {
        Self { llm }
    }

    pub async fn generate(&self, request: ReviewRequest) -> Result<String, GenerationError> {
        let texts: Vec<&str> = request
            .documents
            .iter()
            .map(|doc| doc.text.as_str())
            .collect();
        self.generate_literature_review(
            &request.research_topic,
            &texts,
            request.output_language,
            request.api_key,
        )
        .await
    }

    /// One paragraph per document; `api_key` overrides the configured default key.
    pub async fn generate_literature_review<S: AsRef<str>>(
        &self,
        topic: &str,
        document_texts: &[S],
        language: OutputLanguage,
        api_key: Option<String>,
    ) -> Result<String, GenerationError> {
        let prompt = build_prompt(topic, document_texts, language);
        let request = LlmRequest::new(
            self.llm.default_model(),
            vec![
                ChatMessage::new(MessageRole::System, prompt.system),
                ChatMessage::new(MessageRole::User, prompt.user),
            ],
        )
        .with_max_tokens(MAX_TOKENS)
        .with_temperature(TEMPERATURE)
        .with_api_key(api_key);

        let response = self.llm.execute(request).await?;
        info!(
            model = %response.model,
            documents = document_texts.len(),
            prompt_tokens = response.token_usage.prompt_tokens,
            response_tokens = response.token_usage.response_tokens,
            "literature review generated"
        );

        Ok(response.text)
    }
}
