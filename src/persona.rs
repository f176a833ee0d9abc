// src/persona.rs
// Content profile of the chat front-end: texts, quick-reply menu, system prompt.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::info;

pub const CONTEXT_SLOT: &str = "{context}";

#[derive(Error, Debug)]
pub enum PersonaError {
    #[error("Failed to read persona file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse persona file: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid persona: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuickReply {
    pub label: String,
    pub question: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Persona {
    pub page_title: String,
    pub page_icon: String,
    pub heading: String,
    pub welcome: String,
    pub menu: Vec<QuickReply>,
    #[serde(default = "default_menu_columns")]
    pub menu_columns: usize,
    pub input_placeholder: String,
    /// Must contain `{context}`.
    pub system_prompt: String,
    pub indexing_message: String,
    pub missing_documents_message: String,
}

fn default_menu_columns() -> usize {
    3
}

impl Persona {
    /// Built-in KSLV-II encyclopedia profile.
    pub fn nuri() -> Self {
        let menu = [
            ("누리호 뜻과 목표", "누리호 이름의 뜻과 개발 목표 알려줘"),
            ("1차 발사", "1차 발사 때 무슨 일 있었어?"),
            ("2차 발사", "2차 발사 과정 설명해줘"),
            ("3차 발사 성공", "3차 발사 성공했지? 과정이 어땠어?"),
            ("4차 발사 성공", "4차 발사는 언제 했고 성공했어?"),
            ("4차 위성 교신", "4차 때 올린 위성들 교신 잘 돼?"),
        ]
        .into_iter()
        .map(|(label, question)| QuickReply {
            label: label.to_string(),
            question: question.to_string(),
        })
        .collect();

        Self {
            page_title: "누리호 백과사전".to_string(),
            page_icon: "🚀".to_string(),
            heading: "누리호(KSLV-II) 백과사전 챗봇".to_string(),
            welcome: "안녕하세요! 저는 **누리호 1차부터 4차 발사, 탑재위성 교신 결과까지 전부 알고 있는 전문 챗봇**입니다!  \n자유롭게 물어보시거나 아래 주제를 골라주세요!".to_string(),
            menu,
            menu_columns: default_menu_columns(),
            input_placeholder: "누리호에 대해 궁금한 거 다 물어보세요!".to_string(),
            system_prompt: "너는 대한민국 누리호 전문가야. 주어진 문서만 보고 정확하고 따뜻하게 한국어로 답해.\n관련 문서: {context}".to_string(),
            indexing_message: "누리호 자료를 열심히 읽고 있어요... 잠시만 기다려주세요 🚀".to_string(),
            missing_documents_message: "data 폴더에 PDF 파일이 없어요! 확인해주세요!".to_string(),
        }
    }

    /// Loads a YAML profile and validates it.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, PersonaError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| PersonaError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let persona = Self::from_yaml(&raw)?;
        info!(path = %path.display(), menu = persona.menu.len(), "Loaded persona");
        Ok(persona)
    }

    pub fn from_yaml(raw: &str) -> Result<Self, PersonaError> {
        let persona: Persona = serde_yaml::from_str(raw)?;
        persona.validate()?;
        Ok(persona)
    }

    pub fn validate(&self) -> Result<(), PersonaError> {
        if !self.system_prompt.contains(CONTEXT_SLOT) {
            return Err(PersonaError::Invalid(format!(
                "system_prompt must contain {}",
                CONTEXT_SLOT
            )));
        }
        if self.menu_columns == 0 {
            return Err(PersonaError::Invalid("menu_columns must be > 0".into()));
        }
        for (i, item) in self.menu.iter().enumerate() {
            if item.label.trim().is_empty() || item.question.trim().is_empty() {
                return Err(PersonaError::Invalid(format!("menu entry {} is empty", i)));
            }
        }
        Ok(())
    }

    pub fn quick_reply(&self, index: usize) -> Option<&QuickReply> {
        self.menu.get(index)
    }

    pub fn render_system_prompt(&self, context: &str) -> String {
        self.system_prompt.replace(CONTEXT_SLOT, context)
    }
}

impl Default for Persona {
    fn default() -> Self {
        Self::nuri()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_persona_is_valid() {
        let persona = Persona::nuri();
        assert!(persona.validate().is_ok());
        assert_eq!(persona.menu.len(), 6);
        assert_eq!(persona.menu_columns, 3);
        assert_eq!(
            persona.quick_reply(1).map(|q| q.question.as_str()),
            Some("1차 발사 때 무슨 일 있었어?")
        );
        assert!(persona.quick_reply(6).is_none());
    }

    #[test]
    fn test_render_system_prompt() {
        let persona = Persona::nuri();
        let prompt = persona.render_system_prompt("나로우주센터");
        assert!(prompt.ends_with("관련 문서: 나로우주센터"));
        assert!(!prompt.contains(CONTEXT_SLOT));
    }

    #[test]
    fn test_yaml_profile_without_context_slot_is_rejected() {
        let yaml = r#"
page_title: T
page_icon: "🛰"
heading: H
welcome: W
menu:
  - label: a
    question: b
input_placeholder: P
system_prompt: "no slot here"
indexing_message: I
missing_documents_message: M
"#;
        assert!(matches!(
            Persona::from_yaml(yaml),
            Err(PersonaError::Invalid(_))
        ));

        let fixed = yaml.replace("no slot here", "docs: {context}");
        let persona = Persona::from_yaml(&fixed).unwrap();
        assert_eq!(persona.menu_columns, 3);
        assert_eq!(persona.menu[0].question, "b");
    }
}
