//! Campaign Studio core: recovers typed, editable sections from a freeform
//! generated document, serializes edits back into the same canonical form,
//! and owns the session state the UI renders from.

use napi::Error as NapiError;
use napi::bindgen_prelude::Result as NapiResult;
use napi_derive::napi;

pub mod blocks;
pub mod bridge;
pub mod registry;
pub mod segmenter;
pub mod session;
pub mod store;

pub use blocks::{HookBlock, LadderRole};
pub use bridge::SectionEditOutcome;
pub use registry::SectionKind;
pub use segmenter::Section;
pub use session::{
    BrandPersona, CampaignBrief, CampaignSessionManager, Notification, NotificationPublisher,
    SessionConfig, SessionSnapshot,
};
pub use store::{FileSnapshotStore, MemorySnapshotStore, SnapshotStore};

pub type CoreResult<T> = std::result::Result<T, String>;

#[napi(object)]
#[derive(Clone, Debug)]
pub struct LadderStep {
    pub text: String,
    pub role: String,
}

#[napi(js_name = "segmentDocument")]
pub fn segment_document(document: String) -> Vec<Section> {
    segmenter::segment(&document)
}

#[napi(js_name = "extractHookBlocks")]
pub fn extract_hook_blocks(content: String, section_title: String) -> Vec<HookBlock> {
    blocks::hook_blocks(&content, &section_title)
}

#[napi(js_name = "extractThreadParts")]
pub fn extract_thread_parts(content: String) -> Vec<String> {
    blocks::thread_parts(&content)
}

#[napi(js_name = "extractLadderParts")]
pub fn extract_ladder_parts(content: String) -> Vec<LadderStep> {
    let parts = blocks::ladder_parts(&content);
    let count = parts.len();
    parts
        .into_iter()
        .enumerate()
        .map(|(index, text)| LadderStep {
            text,
            role: blocks::ladder_role(index, count).as_str().to_string(),
        })
        .collect()
}

#[napi(js_name = "serializeSections")]
pub fn serialize_sections(sections: Vec<Section>) -> String {
    bridge::render_document(&sections)
}

#[napi(js_name = "applySectionEdit")]
pub fn apply_section_edit(
    sections: Vec<Section>,
    title: String,
    new_content: String,
) -> NapiResult<SectionEditOutcome> {
    bridge::apply_section_edit(&sections, &title, &new_content).map_err(napi_error)
}

#[napi(js_name = "applySubItemEdit")]
pub fn apply_sub_item_edit(
    sections: Vec<Section>,
    title: String,
    index: u32,
    new_value: String,
) -> NapiResult<SectionEditOutcome> {
    bridge::apply_sub_item_edit(&sections, &title, index as usize, &new_value).map_err(napi_error)
}

fn napi_error(message: String) -> NapiError {
    NapiError::from_reason(message)
}
