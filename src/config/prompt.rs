use serde::Deserialize;
use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use log::info;

pub const RAG_ANSWER: &str = "rag_answer";
pub const CHAT_WITH_HISTORY: &str = "chat_with_history";

const DEFAULT_RAG_ANSWER: &str = "<s> [INST] You are an assistant for question-answering tasks. \
Use the following pieces of retrieved context to answer the question. \
If you don't know the answer, just say that you don't know. \
Use three sentences maximum and keep the answer concise. [/INST] </s>
[INST] Question: {question}
Context: {context}
Answer: [/INST]";

const DEFAULT_CHAT_WITH_HISTORY: &str = "{history}\nUser: {message}";

#[derive(Debug)]
pub enum PromptError {
    TemplateNotFound(String),
    MissingPlaceholder {
        template: String,
        placeholder: String,
    },
    IoError(std::io::Error),
    JsonError(serde_json::Error),
}

impl fmt::Display for PromptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PromptError::TemplateNotFound(key) => write!(f, "Prompt template '{}' not found", key),
            PromptError::MissingPlaceholder { template, placeholder } =>
                write!(f, "Prompt template '{}' lacks placeholder '{}'", template, placeholder),
            PromptError::IoError(e) => write!(f, "Prompt file IO error: {}", e),
            PromptError::JsonError(e) => write!(f, "Prompt JSON parsing error: {}", e),
        }
    }
}

impl Error for PromptError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            PromptError::IoError(e) => Some(e),
            PromptError::JsonError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for PromptError {
    fn from(err: std::io::Error) -> Self {
        PromptError::IoError(err)
    }
}

impl From<serde_json::Error> for PromptError {
    fn from(err: serde_json::Error) -> Self {
        PromptError::JsonError(err)
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct PromptConfig {
    #[serde(default)]
    pub response_templates: HashMap<String, String>,
}

impl Default for PromptConfig {
    fn default() -> Self {
        let mut response_templates = HashMap::new();
        response_templates.insert(RAG_ANSWER.to_string(), DEFAULT_RAG_ANSWER.to_string());
        response_templates.insert(
            CHAT_WITH_HISTORY.to_string(),
            DEFAULT_CHAT_WITH_HISTORY.to_string()
        );
        Self { response_templates }
    }
}

impl PromptConfig {
    fn validate(&self) -> Result<(), PromptError> {
        let required = [
            (RAG_ANSWER, ["{question}", "{context}"]),
            (CHAT_WITH_HISTORY, ["{history}", "{message}"]),
        ];
        for (key, placeholders) in required {
            let template = get_response_template(self, key)?;
            for placeholder in placeholders {
                if !template.contains(placeholder) {
                    return Err(PromptError::MissingPlaceholder {
                        template: key.to_string(),
                        placeholder: placeholder.to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Built-in templates, overridden key by key from the JSON file at `path`.
pub fn load_prompts<P: AsRef<Path>>(path: Option<P>) -> Result<Arc<PromptConfig>, PromptError> {
    let mut config = PromptConfig::default();

    if let Some(path) = path {
        let file_content = fs::read_to_string(path.as_ref())?;
        let overrides: PromptConfig = serde_json::from_str(&file_content)?;
        info!(
            "Loaded {} prompt template override(s) from {}",
            overrides.response_templates.len(),
            path.as_ref().display()
        );
        config.response_templates.extend(overrides.response_templates);
    }

    config.validate()?;
    Ok(Arc::new(config))
}

fn get_response_template<'a>(config: &'a PromptConfig, key: &str) -> Result<&'a str, PromptError> {
    config.response_templates
        .get(key)
        .map(|s| s.as_str())
        .ok_or_else(|| PromptError::TemplateNotFound(format!("response_templates:{}", key)))
}

pub fn get_rag_answer_prompt(
    config: &PromptConfig,
    question: &str,
    context: &str
) -> Result<String, PromptError> {
    let template = get_response_template(config, RAG_ANSWER)?;
    Ok(template.replace("{context}", context).replace("{question}", question))
}

pub fn get_history_prompt(
    config: &PromptConfig,
    history: &str,
    message: &str
) -> Result<String, PromptError> {
    let template = get_response_template(config, CHAT_WITH_HISTORY)?;
    Ok(template.replace("{history}", history).replace("{message}", message))
}
