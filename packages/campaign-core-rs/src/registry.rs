//! Fixed registry of recognized section markers. Static configuration, no
//! mutation operations.

/// Extraction strategy attached to a canonical section title.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SectionKind {
    Hooks,
    Thread,
    Ladder,
}

#[derive(Clone, Copy, Debug)]
pub struct MarkerSpec {
    pub title: &'static str,
    pub kind: SectionKind,
}

/// Canonical title emitted when a document carries no recognizable marker.
pub const PRIMARY_TITLE: &str = "MAIN POST";

/// Any matched marker title containing this fragment merges into
/// [`PRIMARY_TITLE`].
const MERGE_ALIAS_FRAGMENT: &str = "MAIN POST";

/// Registry order is render order, independent of where markers appear in
/// the raw document.
pub const MARKER_REGISTRY: [MarkerSpec; 5] = [
    MarkerSpec {
        title: "MAIN POST OPTIONS",
        kind: SectionKind::Hooks,
    },
    MarkerSpec {
        title: "MAIN POST",
        kind: SectionKind::Hooks,
    },
    MarkerSpec {
        title: "VIRAL HOOKS",
        kind: SectionKind::Hooks,
    },
    MarkerSpec {
        title: "THREAD SCRIPT",
        kind: SectionKind::Thread,
    },
    MarkerSpec {
        title: "COMMENT LADDER",
        kind: SectionKind::Ladder,
    },
];

pub fn canonical_title(marker_title: &str) -> String {
    if marker_title
        .to_ascii_uppercase()
        .contains(MERGE_ALIAS_FRAGMENT)
    {
        PRIMARY_TITLE.to_string()
    } else {
        marker_title.to_ascii_uppercase()
    }
}

pub fn kind_for_title(title: &str) -> Option<SectionKind> {
    let canonical = canonical_title(title);
    MARKER_REGISTRY
        .iter()
        .find(|spec| canonical_title(spec.title) == canonical)
        .map(|spec| spec.kind)
}
