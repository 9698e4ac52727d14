//! Input document model.
//!
//! Structural parsing normally happens upstream; [`Document::from_markdown`]
//! is a small heading splitter so plain markdown files can be analyzed too.

use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{DocsightError, Result};

static HEADING_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(#{1,6})[ \t]+(.+?)[ \t#]*$").unwrap());

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(default)]
    pub id: Option<String>,
    pub title: String,
    pub text: String,
    #[serde(default)]
    pub sections: Vec<Section>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub level: u8,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub children: Vec<Section>,
}

impl Document {
    /// Every section, depth first, parents before their children.
    pub fn flatten_sections(&self) -> Vec<&Section> {
        fn walk<'a>(sections: &'a [Section], out: &mut Vec<&'a Section>) {
            for s in sections {
                out.push(s);
                walk(&s.children, out);
            }
        }
        let mut out = Vec::new();
        walk(&self.sections, &mut out);
        out
    }

    /// Load a `.json` document as-is, anything else through the markdown splitter.
    pub fn from_path(path: &Path, title: Option<&str>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        if path.extension().is_some_and(|e| e.eq_ignore_ascii_case("json")) {
            let mut doc: Document = serde_json::from_str(&content)?;
            if let Some(t) = title {
                doc.title = t.to_string();
            }
            return Ok(doc);
        }
        let fallback_title = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "Untitled".to_string());
        let mut doc = Self::from_markdown(&content, title.unwrap_or(&fallback_title));
        doc.id = Some(path.display().to_string());
        Ok(doc)
    }

    /// Split markdown into a section tree by `#` headings.
    ///
    /// Headings inside fenced code blocks are ignored. Text before the first
    /// heading becomes an "Introduction" section. A single leading level-1
    /// heading names the document when no title is given.
    pub fn from_markdown(text: &str, title: &str) -> Self {
        let mut roots: Vec<Section> = Vec::new();
        let mut stack: Vec<Section> = Vec::new();
        let mut preamble = String::new();
        let mut in_fence = false;

        for line in text.lines() {
            if line.trim_start().starts_with("```") {
                in_fence = !in_fence;
            }
            let heading = if in_fence {
                None
            } else {
                HEADING_RE.captures(line)
            };
            match heading {
                Some(caps) => {
                    let level = caps[1].len() as u8;
                    close_sections(&mut stack, &mut roots, level);
                    stack.push(Section {
                        id: String::new(),
                        title: caps[2].trim().to_string(),
                        level,
                        content: String::new(),
                        children: Vec::new(),
                    });
                }
                None => {
                    let target = match stack.last_mut() {
                        Some(section) => &mut section.content,
                        None => &mut preamble,
                    };
                    target.push_str(line);
                    target.push('\n');
                }
            }
        }
        close_sections(&mut stack, &mut roots, 0);

        if !preamble.trim().is_empty() {
            let mut intro = Section {
                id: String::new(),
                title: "Introduction".to_string(),
                level: 1,
                content: preamble,
                children: Vec::new(),
            };
            finish_section(&mut intro);
            roots.insert(0, intro);
        }

        let title = if title.trim().is_empty() {
            roots
                .iter()
                .find(|s| s.level == 1)
                .map(|s| s.title.clone())
                .unwrap_or_else(|| "Untitled".to_string())
        } else {
            title.to_string()
        };

        Self {
            id: None,
            title,
            text: text.to_string(),
            sections: roots,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.text.trim().is_empty() {
            return Err(DocsightError::Validation {
                message: format!("document '{}' has no text to analyze", self.title),
            });
        }
        Ok(())
    }
}

/// Pop every open section at `level` or deeper onto its parent (or the roots).
fn close_sections(stack: &mut Vec<Section>, roots: &mut Vec<Section>, level: u8) {
    while stack.last().is_some_and(|s| s.level >= level) {
        let Some(mut done) = stack.pop() else { break };
        finish_section(&mut done);
        match stack.last_mut() {
            Some(parent) => parent.children.push(done),
            None => roots.push(done),
        }
    }
}

fn finish_section(section: &mut Section) {
    section.content = section.content.trim().to_string();
    let hash = blake3::hash(format!("{}\n{}", section.title, section.content).as_bytes());
    section.id = format!("{}-{}", slugify(&section.title), &hash.to_hex()[..8]);
}

fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    for ch in text.chars() {
        if ch.is_alphanumeric() {
            slug.extend(ch.to_lowercase());
        } else if !slug.ends_with('-') && !slug.is_empty() {
            slug.push('-');
        }
    }
    let slug = slug.trim_end_matches('-').to_string();
    if slug.is_empty() {
        "section".to_string()
    } else {
        slug
    }
}
