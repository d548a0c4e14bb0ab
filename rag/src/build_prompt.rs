use serde::Serialize;

use crate::vector_index::Hit;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

pub const FALLBACK_INSTRUCTION: &str = "If you cannot find an answer from the documents, tell the user to go through the original document they uploaded.";

const SYSTEM_PROMPT: &str = "You are an expert Q&A system that is trusted around the world. \
Always answer the query using the provided context information, and not prior knowledge.";

/// Instructions appended to every user question.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct QueryTemplate {
    /// Language directive, e.g. "German". `None` leaves the model's default.
    pub language: Option<String>,
    /// Ask the model to surface every number tied to the question.
    pub emphasize_numbers: bool,
}

impl QueryTemplate {
    /// Plain search: no language directive, no numeric emphasis.
    pub fn standalone() -> Self {
        Self::default()
    }

    /// The interactive search box.
    pub fn interactive(language: Option<String>) -> Self {
        Self {
            language,
            emphasize_numbers: true,
        }
    }

    pub fn augment(&self, question: &str) -> String {
        let mut out = format!(
            "{} Make the answer as detailed and as comprehensive as required. \
Make sure to use the documents as context to answer the question. {}",
            question.trim(),
            FALLBACK_INSTRUCTION
        );
        if self.emphasize_numbers {
            out.push_str(
                " Clearly mention all the numeric data related to the user query and the context \
associated with it. Mentioning numbers, if required, is very important to the user. \
Be as detailed as possible and include all relevant information about the question.",
            );
        }
        push_language(&mut out, self.language.as_deref());
        out
    }
}

/// Overview question asked once per document to suggest what to look at.
pub fn recommended_fields_question(language: Option<&str>) -> String {
    let mut out = String::from(
        "Now that you have a good look at the document, as a data analyst who needs to provide \
enough insight and data to your manager so they can make the correct data-driven decisions on \
all factors, what information and fields would be the most useful to you? Make a list of all \
such fields and give your reasons on why it would be useful in order for you to assist in \
making data driven decisions and always have insights into how the program is processing and \
drive it to success.",
    );
    push_language(&mut out, language);
    out
}

fn push_language(out: &mut String, language: Option<&str>) {
    if let Some(lang) = language.map(str::trim).filter(|l| !l.is_empty()) {
        out.push_str(&format!(" Respond in {}.", lang));
    }
}

pub fn build_prompt_with_context(query: &str, hits: &[Hit]) -> (Vec<Message>, String) {
    let context = format_context_from_hits(hits);

    let user_content = format!(
        "Context information is below.\n---------------------\n{}\n---------------------\n\
Given the context information and not prior knowledge, answer the query.\nQuery: {}\nAnswer: ",
        context, query
    );

    (vec![Message::system(SYSTEM_PROMPT), Message::user(user_content)], context)
}

pub fn format_context_from_hits(hits: &[Hit]) -> String {
    if hits.is_empty() {
        return "(no context found)".to_string();
    }
    hits.iter()
        .enumerate()
        .map(|(i, hit)| {
            format!(
                "[{}] {} (page {}, chunk {})\n{}",
                i + 1,
                hit.chunk.source,
                hit.chunk.page,
                hit.chunk.index,
                hit.chunk.text
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}
