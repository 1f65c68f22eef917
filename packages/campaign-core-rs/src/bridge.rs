//! Merges edits back into the section list and re-renders the canonical
//! document so the segmenter can re-parse it. The canonical form uses the
//! bold marker notation.

use napi_derive::napi;

use crate::CoreResult;
use crate::blocks::{self, THREAD_SPLIT_TOKEN, TWEET_SPLIT_TOKEN};
use crate::registry::{SectionKind, kind_for_title};
use crate::segmenter::Section;

#[napi(object)]
#[derive(Clone, Debug)]
pub struct SectionEditOutcome {
    pub sections: Vec<Section>,
    pub document: String,
}

/// Renders the canonical document: every section as a bold title marker
/// followed by its content, blank-line separated.
pub fn render_document(sections: &[Section]) -> String {
    sections
        .iter()
        .map(|section| format!("**{}**\n\n{}", section.title, section.content))
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn apply_section_edit(
    sections: &[Section],
    title: &str,
    new_content: &str,
) -> CoreResult<SectionEditOutcome> {
    let mut updated = sections.to_vec();
    let target = updated
        .iter_mut()
        .find(|section| section.title == title)
        .ok_or_else(|| format!("Unknown section title: {title}"))?;
    target.content = new_content.trim().to_string();

    let document = render_document(&updated);
    Ok(SectionEditOutcome {
        sections: updated,
        document,
    })
}

pub fn apply_sub_item_edit(
    sections: &[Section],
    title: &str,
    index: usize,
    new_value: &str,
) -> CoreResult<SectionEditOutcome> {
    let section = sections
        .iter()
        .find(|section| section.title == title)
        .ok_or_else(|| format!("Unknown section title: {title}"))?;

    let (mut parts, delimiter) = match kind_for_title(title) {
        Some(SectionKind::Thread) => (blocks::thread_parts(&section.content), TWEET_SPLIT_TOKEN),
        Some(SectionKind::Ladder) => (blocks::ladder_parts(&section.content), THREAD_SPLIT_TOKEN),
        Some(SectionKind::Hooks) => {
            return Err(format!("Section {title} does not support indexed edits"));
        }
        None => return Err(format!("Unknown section title: {title}")),
    };

    if index >= parts.len() {
        return Err(format!(
            "Part index {index} out of bounds for section {title} ({} parts)",
            parts.len()
        ));
    }

    parts[index] = new_value.trim().to_string();
    let joined = parts.join(&format!("\n\n{delimiter}\n\n"));
    apply_section_edit(sections, title, &joined)
}
