//! Slices a freeform generated document into titled sections by scanning
//! for registry markers in two notations: heading lines (optionally
//! decorated with a numbered emoji) and bold-wrapped titles.

use napi_derive::napi;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::registry::{MARKER_REGISTRY, PRIMARY_TITLE, canonical_title};

#[napi(object)]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Section {
    pub title: String,
    pub content: String,
}

struct MarkerPatterns {
    heading: Regex,
    bold: Regex,
}

static MARKER_PATTERNS: Lazy<Vec<MarkerPatterns>> = Lazy::new(|| {
    MARKER_REGISTRY
        .iter()
        .map(|spec| {
            let escaped = regex::escape(spec.title);
            let heading = format!(
                "(?im)^[ \t]*#{{1,6}}[ \t]*(?:[0-9]\u{FE0F}?\u{20E3}[ \t]*)?{escaped}"
            );
            let bold = format!("(?i)\\*\\*[ \t]*{escaped}[ \t]*\\*\\*");
            MarkerPatterns {
                heading: Regex::new(&heading).expect("valid heading marker pattern"),
                bold: Regex::new(&bold).expect("valid bold marker pattern"),
            }
        })
        .collect()
});

struct MarkerMatch {
    start: usize,
    content_start: usize,
}

pub fn segment(document: &str) -> Vec<Section> {
    if document.trim().is_empty() {
        return Vec::new();
    }

    let mut sections: Vec<Section> = Vec::new();
    for (index, spec) in MARKER_REGISTRY.iter().enumerate() {
        let canonical = canonical_title(spec.title);
        if sections.iter().any(|section| section.title == canonical) {
            continue;
        }

        let Some(found) = first_marker(document, index) else {
            continue;
        };

        let content_end =
            next_marker_start(document, found.content_start, index).unwrap_or(document.len());
        let content = document[found.content_start..content_end].trim().to_string();
        sections.push(Section {
            title: canonical,
            content,
        });
    }

    if sections.is_empty() {
        return vec![Section {
            title: PRIMARY_TITLE.to_string(),
            content: document.trim().to_string(),
        }];
    }

    sections
}

fn first_marker(document: &str, registry_index: usize) -> Option<MarkerMatch> {
    let patterns = &MARKER_PATTERNS[registry_index];
    let mut earliest: Option<MarkerMatch> = None;

    for regex in [&patterns.heading, &patterns.bold] {
        if let Some(found) = regex.find(document) {
            let candidate = MarkerMatch {
                start: found.start(),
                content_start: found.end(),
            };
            if earliest
                .as_ref()
                .map_or(true, |current| candidate.start < current.start)
            {
                earliest = Some(candidate);
            }
        }
    }

    earliest
}

fn next_marker_start(document: &str, from: usize, current_index: usize) -> Option<usize> {
    let tail = &document[from..];
    let mut earliest: Option<usize> = None;

    for (index, patterns) in MARKER_PATTERNS.iter().enumerate() {
        if index == current_index {
            continue;
        }
        for regex in [&patterns.heading, &patterns.bold] {
            if let Some(found) = regex.find(tail) {
                let offset = from + found.start();
                if earliest.map_or(true, |current| offset < current) {
                    earliest = Some(offset);
                }
            }
        }
    }

    earliest
}
