#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use rag::{ChatModel, Config, Embedder, Message, Pipeline, RagError, Result};

pub const DIMS: usize = 256;

pub fn config_with(overrides: &[(&str, &str)]) -> Config {
    let mut vars: HashMap<String, String> = [
        ("OPENAI_API_KEY", "sk-test"),
        ("AZURE_OPENAI_API_KEY", "azure-test"),
        ("AZURE_OPENAI_ENDPOINT", "https://example.openai.azure.com/"),
    ]
    .iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();
    for (k, v) in overrides {
        vars.insert(k.to_string(), v.to_string());
    }
    Config::from_lookup(|key| vars.get(key).cloned()).expect("test config should load")
}

/// Writes a PDF with one page per entry; each line of an entry becomes a text line.
pub fn write_pdf(path: &Path, pages: &[&str]) {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => font_id,
        },
    });

    let mut kids: Vec<Object> = Vec::new();
    for page_text in pages {
        // One text object per line so extracted text keeps the line breaks.
        let mut operations = Vec::new();
        for (i, line) in page_text.lines().enumerate() {
            let y = 760 - 16 * i as i64;
            operations.push(Operation::new("BT", vec![]));
            operations.push(Operation::new("Tf", vec!["F1".into(), 12.into()]));
            operations.push(Operation::new("Td", vec![72.into(), y.into()]));
            operations.push(Operation::new("Tj", vec![Object::string_literal(line)]));
            operations.push(Operation::new("ET", vec![]));
        }
        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(
            dictionary! {},
            content.encode().expect("content should encode"),
        ));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    let pages_dict = dictionary! {
        "Type" => "Pages",
        "Kids" => kids,
        "Count" => count,
        "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages_dict));
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.save(path).expect("pdf should save");
}

/// Bag-of-words embedder: tokens hashed into a fixed number of buckets.
#[derive(Clone, Default)]
pub struct HashEmbedder {
    pub batches: Arc<Mutex<Vec<usize>>>,
    pub fail: bool,
}

impl HashEmbedder {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batches.lock().expect("lock").clone()
    }
}

pub fn bag_of_words(text: &str) -> Vec<f32> {
    let mut v = vec![0.0f32; DIMS];
    for token in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 2)
    {
        let bucket = token
            .to_lowercase()
            .bytes()
            .fold(7usize, |h, b| h.wrapping_mul(31).wrapping_add(b as usize))
            % DIMS;
        v[bucket] += 1.0;
    }
    v
}

impl Embedder for HashEmbedder {
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if self.fail {
            return Err(RagError::Embedding("service unreachable".to_string()));
        }
        self.batches.lock().expect("lock").push(texts.len());
        Ok(texts.iter().map(|t| bag_of_words(t)).collect())
    }
}

/// Replies with the context it was given, so answers contain retrieved facts verbatim.
#[derive(Clone, Default)]
pub struct EchoChat {
    pub prompts: Arc<Mutex<Vec<Vec<Message>>>>,
    pub reply: Option<String>,
    pub fail: bool,
}

impl EchoChat {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: Some(reply.to_string()),
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn last_user_prompt(&self) -> String {
        self.prompts
            .lock()
            .expect("lock")
            .last()
            .and_then(|messages| messages.iter().find(|m| m.role == "user"))
            .map(|m| m.content.clone())
            .unwrap_or_default()
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().expect("lock").len()
    }
}

impl ChatModel for EchoChat {
    fn complete(&self, messages: &[Message]) -> Result<String> {
        self.prompts.lock().expect("lock").push(messages.to_vec());
        if self.fail {
            return Err(RagError::Generation("quota exceeded".to_string()));
        }
        if let Some(reply) = &self.reply {
            return Ok(reply.clone());
        }
        let user = messages
            .iter()
            .find(|m| m.role == "user")
            .map(|m| m.content.as_str())
            .unwrap_or_default();
        let context = user
            .split("---------------------")
            .nth(1)
            .unwrap_or_default()
            .trim();
        Ok(format!("According to the document: {}", context))
    }
}

pub fn pipeline(cfg: Config, embedder: &HashEmbedder, chat: &EchoChat) -> Pipeline {
    Pipeline::new(cfg, Box::new(embedder.clone()), Box::new(chat.clone()))
}
