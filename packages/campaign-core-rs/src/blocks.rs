//! Extracts typed sub-records from a section's raw content. Three
//! strategies, selected by section kind: structured hook blocks, thread
//! parts, and ladder parts. All are pure projections of the content string;
//! malformed input degrades to the layered fallbacks instead of failing.

use napi_derive::napi;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::registry::{PRIMARY_TITLE, canonical_title};

pub const POST_ID_TOKEN: &str = "POST_ID:";
pub const TWEET_SPLIT_TOKEN: &str = "[TWEET_SPLIT]";
pub const THREAD_SPLIT_TOKEN: &str = "[THREAD_SPLIT]";

/// Id the generator assigns to the primary post block.
pub const PRIMARY_POST_ID: &str = "main-post";

const HOOK_TEXT_TOKEN: &str = "HOOK_TEXT:";
const IMAGE_PROMPT_TOKEN: &str = "IMAGE_PROMPT:";
const EXPORT_TOKEN: &str = "EXPORT:";
const FIELD_TOKENS: [&str; 3] = [HOOK_TEXT_TOKEN, IMAGE_PROMPT_TOKEN, EXPORT_TOKEN];

const COPY_BUTTON_FLAG: &str = "copy_button=true";
const DOWNLOAD_IMAGE_FLAG: &str = "download_image=true";

/// Parts shorter than this are treated as delimiter noise and dropped.
const MIN_PART_CHARS: usize = 6;

static STEP_LABEL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:comment\s+\d+|strategy\s+#?\d+|finale\b|\d+[.):])")
        .expect("valid step label pattern")
});

#[napi(object)]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HookBlock {
    pub id: String,
    pub text: String,
    #[napi(js_name = "imagePrompt")]
    pub image_prompt: String,
    #[napi(js_name = "copyButton")]
    pub copy_button: bool,
    #[napi(js_name = "downloadImage")]
    pub download_image: bool,
    #[napi(js_name = "isPrimary")]
    pub is_primary: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LadderRole {
    Context,
    Strategy,
    Finale,
}

impl LadderRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            LadderRole::Context => "context",
            LadderRole::Strategy => "strategy",
            LadderRole::Finale => "finale",
        }
    }
}

pub fn hook_blocks(content: &str, section_title: &str) -> Vec<HookBlock> {
    let structured = structured_hook_blocks(content);
    if !structured.is_empty() {
        return structured;
    }
    line_hook_blocks(content, canonical_title(section_title) == PRIMARY_TITLE)
}

fn structured_hook_blocks(content: &str) -> Vec<HookBlock> {
    let mut blocks = Vec::new();

    for part in content.split(POST_ID_TOKEN) {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }

        let id = part
            .lines()
            .next()
            .map(str::trim)
            .unwrap_or_default()
            .to_string();
        if id.is_empty() {
            continue;
        }

        let Some(text) = field_after(part, HOOK_TEXT_TOKEN).filter(|text| !text.is_empty()) else {
            continue;
        };

        let image_prompt = field_after(part, IMAGE_PROMPT_TOKEN).unwrap_or_default();
        let (copy_button, download_image) = match field_after(part, EXPORT_TOKEN) {
            Some(segment) => (
                segment.contains(COPY_BUTTON_FLAG),
                segment.contains(DOWNLOAD_IMAGE_FLAG),
            ),
            None => (true, true),
        };

        let is_primary = id == PRIMARY_POST_ID;
        blocks.push(HookBlock {
            id,
            text,
            image_prompt,
            copy_button,
            download_image,
            is_primary,
        });
    }

    blocks
}

fn line_hook_blocks(content: &str, primary_section: bool) -> Vec<HookBlock> {
    let mut blocks = Vec::new();

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let primary = primary_section && blocks.is_empty();
        let id = if primary {
            PRIMARY_POST_ID.to_string()
        } else {
            format!("hook-{}", blocks.len() + 1)
        };

        blocks.push(HookBlock {
            id,
            text: line.to_string(),
            image_prompt: synthesized_image_prompt(line),
            copy_button: true,
            download_image: true,
            is_primary: primary,
        });
    }

    blocks
}

fn field_after(part: &str, token: &str) -> Option<String> {
    let start = part.find(token)? + token.len();
    let tail = &part[start..];

    let mut end = tail.len();
    for marker in FIELD_TOKENS {
        if let Some(found) = tail.find(marker) {
            end = end.min(found);
        }
    }

    Some(tail[..end].trim().to_string())
}

fn synthesized_image_prompt(line: &str) -> String {
    let excerpt: String = line.chars().take(90).collect();
    format!("Bold typographic social graphic featuring the text: \"{excerpt}\"")
}

pub fn thread_parts(content: &str) -> Vec<String> {
    content
        .split(TWEET_SPLIT_TOKEN)
        .map(str::trim)
        .filter(|part| part.chars().count() >= MIN_PART_CHARS)
        .map(str::to_string)
        .collect()
}

pub fn ladder_parts(content: &str) -> Vec<String> {
    let raw: Vec<String> = if content.contains(THREAD_SPLIT_TOKEN) {
        content
            .split(THREAD_SPLIT_TOKEN)
            .map(str::to_string)
            .collect()
    } else {
        split_on_step_labels(content)
    };

    raw.iter()
        .map(|part| part.trim())
        .filter(|part| part.chars().count() >= MIN_PART_CHARS)
        .map(str::to_string)
        .collect()
}

/// Role of a ladder part, derived from its position only. A single-part
/// ladder counts as context.
pub fn ladder_role(index: usize, count: usize) -> LadderRole {
    if index == 0 {
        LadderRole::Context
    } else if index + 1 == count {
        LadderRole::Finale
    } else {
        LadderRole::Strategy
    }
}

fn split_on_step_labels(content: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();

    for line in content.lines() {
        if !current.trim().is_empty() && STEP_LABEL_RE.is_match(line.trim_start()) {
            parts.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push('\n');
        }
        current.push_str(line);
    }

    if !current.trim().is_empty() {
        parts.push(current);
    }

    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structured_blocks_parse_in_order_with_matching_ids() {
        let content = "POST_ID: main-post\nHOOK_TEXT: The big claim.\nIMAGE_PROMPT: sunrise over a laptop\nEXPORT: copy_button=true download_image=true\n\nPOST_ID: hook-2\nHOOK_TEXT: A spicier angle.\nIMAGE_PROMPT: neon sign\nEXPORT: copy_button=true download_image=false\n";
        let blocks = hook_blocks(content, "VIRAL HOOKS");

        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].id, "main-post");
        assert!(blocks[0].is_primary);
        assert_eq!(blocks[0].text, "The big claim.");
        assert_eq!(blocks[0].image_prompt, "sunrise over a laptop");
        assert!(blocks[0].copy_button);
        assert!(blocks[0].download_image);

        assert_eq!(blocks[1].id, "hook-2");
        assert!(!blocks[1].is_primary);
        assert!(blocks[1].copy_button);
        assert!(!blocks[1].download_image);
    }

    #[test]
    fn export_flags_default_to_true_when_segment_is_missing() {
        let content = "POST_ID: hook-1\nHOOK_TEXT: No export segment here.\n";
        let blocks = hook_blocks(content, "VIRAL HOOKS");

        assert_eq!(blocks.len(), 1);
        assert!(blocks[0].copy_button);
        assert!(blocks[0].download_image);
        assert_eq!(blocks[0].image_prompt, "");
    }

    #[test]
    fn blocks_without_hook_text_are_skipped() {
        let content = "POST_ID: hook-1\nIMAGE_PROMPT: orphan prompt\n\nPOST_ID: hook-2\nHOOK_TEXT: Kept.\n";
        let blocks = hook_blocks(content, "VIRAL HOOKS");

        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].id, "hook-2");
    }

    #[test]
    fn line_fallback_marks_first_main_post_line_as_primary() {
        let content = "The opening post line.\n\nSecond variant line.\nThird variant line.\n";
        let blocks = hook_blocks(content, "MAIN POST");

        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[0].id, PRIMARY_POST_ID);
        assert!(blocks[0].is_primary);
        assert_eq!(blocks[1].id, "hook-2");
        assert!(!blocks[1].is_primary);
        assert_eq!(blocks[2].id, "hook-3");
        assert!(blocks[0].image_prompt.contains("The opening post line."));
    }

    #[test]
    fn line_fallback_outside_main_post_uses_sequential_ids() {
        let content = "First hook.\nSecond hook.\n";
        let blocks = hook_blocks(content, "VIRAL HOOKS");

        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].id, "hook-1");
        assert!(!blocks[0].is_primary);
        assert_eq!(blocks[1].id, "hook-2");
    }

    #[test]
    fn extraction_is_deterministic() {
        let content = "POST_ID: hook-1\nHOOK_TEXT: Stable.\n";
        assert_eq!(
            hook_blocks(content, "VIRAL HOOKS"),
            hook_blocks(content, "VIRAL HOOKS")
        );
    }

    #[test]
    fn thread_split_drops_parts_below_minimum_length() {
        let content =
            "First tweet here\n\n[TWEET_SPLIT]\n\nSecond tweet here\n\n[TWEET_SPLIT]\n\nHi";
        let parts = thread_parts(content);

        assert_eq!(parts, vec!["First tweet here", "Second tweet here"]);
    }

    #[test]
    fn ladder_prefers_the_explicit_token() {
        let content = "Open with empathy\n\n[THREAD_SPLIT]\n\nComment 2: build trust\n\n[THREAD_SPLIT]\n\nFinale: reveal the offer";
        let parts = ladder_parts(content);

        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "Open with empathy");
        assert_eq!(parts[2], "Finale: reveal the offer");
    }

    #[test]
    fn ladder_splits_on_step_label_lines() {
        let content = "Most founders get cold outreach wrong.\nComment 1: lead with their problem\nComment 2: share a quick win\nFinale: invite them to the offer";
        let parts = ladder_parts(content);

        assert_eq!(parts.len(), 4);
        assert_eq!(parts[0], "Most founders get cold outreach wrong.");
        assert_eq!(parts[1], "Comment 1: lead with their problem");
        assert_eq!(parts[2], "Comment 2: share a quick win");
        assert_eq!(parts[3], "Finale: invite them to the offer");
    }

    #[test]
    fn ladder_splits_on_bare_numbered_lines() {
        let content = "Context framing first.\n1. open the door\n2. slide in value";
        let parts = ladder_parts(content);

        assert_eq!(parts.len(), 3);
        assert_eq!(parts[1], "1. open the door");
    }

    #[test]
    fn ladder_without_labels_stays_one_part() {
        let content = "Une approche sans marqueurs explicites.\nDeuxieme ligne.";
        let parts = ladder_parts(content);

        assert_eq!(parts.len(), 1);
    }

    #[test]
    fn ladder_roles_derive_from_position() {
        assert_eq!(ladder_role(0, 4), LadderRole::Context);
        assert_eq!(ladder_role(1, 4), LadderRole::Strategy);
        assert_eq!(ladder_role(2, 4), LadderRole::Strategy);
        assert_eq!(ladder_role(3, 4), LadderRole::Finale);
        assert_eq!(ladder_role(0, 1), LadderRole::Context);
    }
}
