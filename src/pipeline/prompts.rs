//! User-prompt builders for each pipeline task. System prompts live in the
//! task table.

use crate::schemas::{Entity, SignalScores};

/// Cut `text` to at most `max_chars` characters on a char boundary.
pub fn clip(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

pub fn tldr(title: &str, body: &str) -> String {
    format!("Document title: {title}\n\nDocument:\n{body}")
}

pub fn executive_summary(title: &str, body: &str) -> String {
    format!(
        "Write an executive summary of the document below.\n\nDocument title: {title}\n\nDocument:\n{body}"
    )
}

pub fn entities(body: &str) -> String {
    format!("Extract the named entities from this document.\n\nDocument:\n{body}")
}

pub fn signals(title: &str, body: &str) -> String {
    format!("Score this document.\n\nDocument title: {title}\n\nDocument:\n{body}")
}

pub fn relationships(body: &str, entities: &[Entity]) -> String {
    let names = entities
        .iter()
        .map(|e| format!("- {} ({})", e.name, e.entity_type))
        .collect::<Vec<_>>()
        .join("\n");
    format!("Entities:\n{names}\n\nDocument:\n{body}")
}

pub fn section(doc_title: &str, section_title: &str, content: &str) -> String {
    format!("Document: {doc_title}\nSection: {section_title}\n\n{content}")
}

pub fn recommendations(
    title: &str,
    signals: &SignalScores,
    entity_count: usize,
    relationship_count: usize,
    section_count: usize,
) -> String {
    let signals = serde_json::to_string(signals).unwrap_or_default();
    format!(
        "Document title: {title}\nSignals (0-100): {signals}\nEntities: {entity_count}\n\
         Relationships: {relationship_count}\nSections: {section_count}\n\n\
         Recommend the most useful visualizations for this analysis."
    )
}

pub fn mind_map(title: &str, tldr: &str, entities: &[Entity], section_titles: &[&str]) -> String {
    let names = entities
        .iter()
        .take(25)
        .map(|e| e.name.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "Document title: {title}\nSummary: {tldr}\nKey entities: {names}\nSections: {}",
        section_titles.join(" | ")
    )
}
