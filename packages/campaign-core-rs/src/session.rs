//! Session state manager. Owns the generated document and its derived
//! section list; everything the UI renders reads through this manager, and
//! every edit routes back through the serialize bridge so the canonical
//! document and the derived views never diverge.

use napi::Error as NapiError;
use napi::bindgen_prelude::Result as NapiResult;
use napi_derive::napi;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

use crate::blocks::{self, HookBlock};
use crate::bridge;
use crate::segmenter::{Section, segment};
use crate::store::{FileSnapshotStore, SnapshotStore};
use crate::{CoreResult, LadderStep};

/// Bumped on incompatible snapshot layout changes so stale records from an
/// older build never collide with the current schema.
const SCHEMA_VERSION: u32 = 2;

const DEFAULT_KEY_PREFIX: &str = "campaign-studio";
const DEFAULT_DEBOUNCE_MS: i64 = 1200;

const RECORD_BRIEF: &str = "brief";
const RECORD_PERSONA: &str = "persona";
const RECORD_DOCUMENT: &str = "document";
const RECORD_STYLES: &str = "styles";
const RECORD_NAMES: [&str; 4] = [RECORD_BRIEF, RECORD_PERSONA, RECORD_DOCUMENT, RECORD_STYLES];

#[napi(object)]
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CampaignBrief {
    pub topic: String,
    pub audience: String,
    pub offer: String,
    pub tone: String,
    pub language: String,
}

#[napi(object)]
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct BrandPersona {
    pub name: String,
    pub style: String,
}

#[napi(object)]
#[derive(Clone, Debug)]
pub struct Notification {
    pub sequence: u32,
    pub level: String,
    pub code: String,
    pub message: String,
    pub timestamp: i64,
}

#[napi(object)]
#[derive(Clone, Debug)]
pub struct StyleChoice {
    #[napi(js_name = "hookId")]
    pub hook_id: String,
    #[napi(js_name = "styleIndex")]
    pub style_index: u32,
}

#[napi(object)]
#[derive(Clone, Default)]
pub struct SessionConfig {
    #[napi(js_name = "keyPrefix")]
    pub key_prefix: Option<String>,
    #[napi(js_name = "debounceMs")]
    pub debounce_ms: Option<i64>,
}

#[napi(object)]
#[derive(Clone, Debug)]
pub struct SessionSnapshot {
    pub brief: CampaignBrief,
    pub persona: BrandPersona,
    pub document: String,
    pub sections: Vec<Section>,
    #[napi(js_name = "activeSection")]
    pub active_section: Option<String>,
    #[napi(js_name = "styleChoices")]
    pub style_choices: Vec<StyleChoice>,
    pub loading: bool,
    #[napi(js_name = "pendingExport")]
    pub pending_export: Option<String>,
}

/// One-shot events surfaced to the UI. The default publisher feeds the
/// manager's drain queue; tests inject their own sink.
pub trait NotificationPublisher: Send + Sync {
    fn publish(&self, notification: Notification);
}

struct QueuePublisher {
    queue: Arc<Mutex<Vec<Notification>>>,
}

impl NotificationPublisher for QueuePublisher {
    fn publish(&self, notification: Notification) {
        if let Ok(mut queue) = self.queue.lock() {
            queue.push(notification);
        }
    }
}

#[derive(Clone)]
struct ResolvedSessionConfig {
    key_prefix: String,
    debounce_ms: i64,
}

impl ResolvedSessionConfig {
    fn from_options(options: Option<SessionConfig>) -> Self {
        let options = options.unwrap_or_default();
        Self {
            key_prefix: options
                .key_prefix
                .filter(|prefix| !prefix.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_KEY_PREFIX.to_string()),
            debounce_ms: options.debounce_ms.unwrap_or(DEFAULT_DEBOUNCE_MS).max(0),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct DocumentRecord {
    document: String,
}

#[derive(Serialize, Deserialize)]
struct StylesRecord {
    styles: HashMap<String, u32>,
}

struct SessionCore {
    brief: CampaignBrief,
    persona: BrandPersona,
    document: String,
    sections: Vec<Section>,
    active_section: Option<String>,
    style_choices: HashMap<String, u32>,
    loading: bool,
    latest_ticket: u32,
    pending_export: Option<String>,
    next_sequence: u32,
    dirty_at: Option<i64>,
}

impl SessionCore {
    fn fresh() -> Self {
        Self {
            brief: CampaignBrief::default(),
            persona: BrandPersona::default(),
            document: String::new(),
            sections: Vec::new(),
            active_section: None,
            style_choices: HashMap::new(),
            loading: false,
            latest_ticket: 0,
            pending_export: None,
            next_sequence: 1,
            dirty_at: None,
        }
    }
}

struct SessionInner {
    state: Mutex<SessionCore>,
    store: Box<dyn SnapshotStore>,
    publisher: Box<dyn NotificationPublisher>,
    queue: Arc<Mutex<Vec<Notification>>>,
    config: ResolvedSessionConfig,
}

#[napi]
pub struct CampaignSessionManager {
    inner: Arc<SessionInner>,
}

#[napi]
impl CampaignSessionManager {
    #[napi(constructor)]
    pub fn new(root_dir: String, config: Option<SessionConfig>) -> NapiResult<Self> {
        let store = FileSnapshotStore::new(&root_dir).map_err(|error| napi_error(&error))?;
        Ok(Self::with_store(Box::new(store), config))
    }

    #[napi(js_name = "setBrief")]
    pub fn set_brief(&self, brief: CampaignBrief) -> NapiResult<()> {
        let mut state = self.lock_state()?;
        state.brief = brief;
        touch(&mut state);
        Ok(())
    }

    #[napi(js_name = "setPersona")]
    pub fn set_persona(&self, persona: BrandPersona) -> NapiResult<()> {
        let mut state = self.lock_state()?;
        state.persona = persona;
        touch(&mut state);
        Ok(())
    }

    #[napi(js_name = "setActiveSection")]
    pub fn set_active_section(&self, title: Option<String>) -> NapiResult<()> {
        let mut state = self.lock_state()?;
        state.active_section = title;
        Ok(())
    }

    #[napi(js_name = "setStyleChoice")]
    pub fn set_style_choice(&self, hook_id: String, style_index: u32) -> NapiResult<()> {
        let mut state = self.lock_state()?;
        state.style_choices.insert(hook_id, style_index);
        touch(&mut state);
        Ok(())
    }

    #[napi(js_name = "clearStyleChoices")]
    pub fn clear_style_choices(&self) -> NapiResult<()> {
        let mut state = self.lock_state()?;
        state.style_choices.clear();
        touch(&mut state);
        Ok(())
    }

    /// Validates the brief and flips the loading gate. Returns the ticket
    /// the caller must present when the service call settles.
    #[napi(js_name = "beginGeneration")]
    pub fn begin_generation(&self) -> NapiResult<u32> {
        let mut state = self.lock_state()?;
        let missing = missing_brief_fields(&state.brief);
        if !missing.is_empty() {
            let message = format!("Missing campaign fields: {}", missing.join(", "));
            self.notify(&mut state, "error", "validation", &message);
            return Err(napi_error(&message));
        }

        state.latest_ticket += 1;
        state.loading = true;
        debug!("generation ticket {} issued", state.latest_ticket);
        Ok(state.latest_ticket)
    }

    /// Applies a finished generation. Tickets older than the most recently
    /// issued one are dropped so an overlapping request can never overwrite
    /// a newer result.
    #[napi(js_name = "completeGeneration")]
    pub fn complete_generation(&self, ticket: u32, document: String) -> NapiResult<()> {
        let mut state = self.lock_state()?;
        if ticket != state.latest_ticket {
            warn!(
                "dropping stale generation completion: ticket {ticket}, latest {}",
                state.latest_ticket
            );
            return Ok(());
        }

        state.document = document.trim().to_string();
        state.sections = segment(&state.document);
        state.loading = false;
        touch(&mut state);
        let message = format!("Generated {} sections", state.sections.len());
        self.notify(&mut state, "info", "generated", &message);
        Ok(())
    }

    #[napi(js_name = "failGeneration")]
    pub fn fail_generation(&self, ticket: u32, message: String) -> NapiResult<()> {
        let mut state = self.lock_state()?;
        if ticket != state.latest_ticket {
            warn!(
                "dropping stale generation failure: ticket {ticket}, latest {}",
                state.latest_ticket
            );
            return Ok(());
        }

        state.loading = false;
        self.notify(&mut state, "error", "generation_failed", &message);
        Ok(())
    }

    #[napi(js_name = "editSection")]
    pub fn edit_section(&self, title: String, content: String) -> NapiResult<()> {
        let mut state = self.lock_state()?;
        let outcome = bridge::apply_section_edit(&state.sections, &title, &content)
            .map_err(|error| napi_error(&error))?;
        state.sections = outcome.sections;
        state.document = outcome.document;
        touch(&mut state);
        Ok(())
    }

    #[napi(js_name = "editSubItem")]
    pub fn edit_sub_item(&self, title: String, index: u32, value: String) -> NapiResult<()> {
        let mut state = self.lock_state()?;
        let outcome = bridge::apply_sub_item_edit(&state.sections, &title, index as usize, &value)
            .map_err(|error| napi_error(&error))?;
        state.sections = outcome.sections;
        state.document = outcome.document;
        touch(&mut state);
        Ok(())
    }

    #[napi(js_name = "hookBlocks")]
    pub fn hook_blocks(&self, title: String) -> NapiResult<Vec<HookBlock>> {
        let state = self.lock_state()?;
        let section = find_section(&state.sections, &title)?;
        Ok(blocks::hook_blocks(&section.content, &title))
    }

    #[napi(js_name = "threadParts")]
    pub fn thread_parts(&self, title: String) -> NapiResult<Vec<String>> {
        let state = self.lock_state()?;
        let section = find_section(&state.sections, &title)?;
        Ok(blocks::thread_parts(&section.content))
    }

    #[napi(js_name = "ladderSteps")]
    pub fn ladder_steps(&self, title: String) -> NapiResult<Vec<LadderStep>> {
        let state = self.lock_state()?;
        let section = find_section(&state.sections, &title)?;
        let parts = blocks::ladder_parts(&section.content);
        let count = parts.len();
        Ok(parts
            .into_iter()
            .enumerate()
            .map(|(index, text)| LadderStep {
                text,
                role: blocks::ladder_role(index, count).as_str().to_string(),
            })
            .collect())
    }

    /// Marks an export in flight and returns the artifact name derived from
    /// the hook id.
    #[napi(js_name = "beginExport")]
    pub fn begin_export(&self, hook_id: String) -> NapiResult<String> {
        let mut state = self.lock_state()?;
        let file_name = export_file_name(hook_id.clone());
        state.pending_export = Some(hook_id);
        Ok(file_name)
    }

    #[napi(js_name = "completeExport")]
    pub fn complete_export(&self, hook_id: String, ok: bool) -> NapiResult<()> {
        let mut state = self.lock_state()?;
        state.pending_export = None;
        if ok {
            let message = format!("Saved {}", export_file_name(hook_id.clone()));
            self.notify(&mut state, "info", "export_done", &message);
        } else {
            warn!("image export failed for {hook_id}");
            let message = format!("Could not export {hook_id}");
            self.notify(&mut state, "error", "export_failed", &message);
        }
        Ok(())
    }

    #[napi(js_name = "recordCopy")]
    pub fn record_copy(&self, hook_id: String, ok: bool) -> NapiResult<()> {
        let mut state = self.lock_state()?;
        if ok {
            let message = format!("Copied {hook_id} to clipboard");
            self.notify(&mut state, "info", "copied", &message);
        } else {
            let message = format!("Could not copy {hook_id}");
            self.notify(&mut state, "error", "copy_failed", &message);
        }
        Ok(())
    }

    #[napi(js_name = "drainNotifications")]
    pub fn drain_notifications(
        &self,
        after: Option<u32>,
        limit: Option<u32>,
    ) -> NapiResult<Vec<Notification>> {
        let mut queue = self
            .inner
            .queue
            .lock()
            .map_err(|_| napi_error("Notification queue lock poisoned"))?;

        let after_cursor = after.unwrap_or(0);
        let max_items = limit.map(|value| value as usize).unwrap_or(usize::MAX);
        let mut drained = Vec::new();
        let mut remaining = Vec::with_capacity(queue.len());

        for notification in queue.drain(..) {
            if notification.sequence <= after_cursor {
                continue;
            }
            if drained.len() < max_items {
                drained.push(notification);
            } else {
                remaining.push(notification);
            }
        }

        *queue = remaining;
        Ok(drained)
    }

    #[napi(js_name = "getSnapshot")]
    pub fn get_snapshot(&self) -> NapiResult<SessionSnapshot> {
        let state = self.lock_state()?;
        let mut style_choices: Vec<StyleChoice> = state
            .style_choices
            .iter()
            .map(|(hook_id, style_index)| StyleChoice {
                hook_id: hook_id.clone(),
                style_index: *style_index,
            })
            .collect();
        style_choices.sort_by(|a, b| a.hook_id.cmp(&b.hook_id));

        Ok(SessionSnapshot {
            brief: state.brief.clone(),
            persona: state.persona.clone(),
            document: state.document.clone(),
            sections: state.sections.clone(),
            active_section: state.active_section.clone(),
            style_choices,
            loading: state.loading,
            pending_export: state.pending_export.clone(),
        })
    }

    /// Writes the dirty snapshot once the debounce window has elapsed.
    /// Every mutation restarts the window, so only the last write in a
    /// burst of edits lands. Returns whether a write happened.
    #[napi(js_name = "persistDue")]
    pub fn persist_due(&self, now: i64) -> NapiResult<bool> {
        let mut state = self.lock_state()?;
        match state.dirty_at {
            Some(dirty_at) if now - dirty_at >= self.inner.config.debounce_ms => {
                self.write_records(&state).map_err(|error| napi_error(&error))?;
                state.dirty_at = None;
                debug!("session snapshot persisted");
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    #[napi]
    pub fn flush(&self) -> NapiResult<()> {
        let mut state = self.lock_state()?;
        self.write_records(&state).map_err(|error| napi_error(&error))?;
        state.dirty_at = None;
        Ok(())
    }

    /// Clears the whole session and removes every persisted record.
    #[napi]
    pub fn reset(&self) -> NapiResult<()> {
        let mut state = self.lock_state()?;
        *state = SessionCore::fresh();

        for name in RECORD_NAMES {
            let key = record_key(&self.inner.config.key_prefix, name);
            if let Err(error) = self.inner.store.remove(&key) {
                warn!("failed to remove snapshot record {key}: {error}");
            }
        }

        if let Ok(mut queue) = self.inner.queue.lock() {
            queue.clear();
        }
        Ok(())
    }
}

impl CampaignSessionManager {
    /// Builds a manager over an injected store, restoring any saved state.
    /// Notifications go to the internal drain queue.
    pub fn with_store(store: Box<dyn SnapshotStore>, config: Option<SessionConfig>) -> Self {
        let queue = Arc::new(Mutex::new(Vec::new()));
        let publisher = Box::new(QueuePublisher {
            queue: queue.clone(),
        });
        Self::with_parts(store, publisher, queue, config)
    }

    /// Like [`Self::with_store`] but publishes through the given sink
    /// instead of the drain queue.
    pub fn with_publisher(
        store: Box<dyn SnapshotStore>,
        publisher: Box<dyn NotificationPublisher>,
        config: Option<SessionConfig>,
    ) -> Self {
        Self::with_parts(store, publisher, Arc::new(Mutex::new(Vec::new())), config)
    }

    fn with_parts(
        store: Box<dyn SnapshotStore>,
        publisher: Box<dyn NotificationPublisher>,
        queue: Arc<Mutex<Vec<Notification>>>,
        config: Option<SessionConfig>,
    ) -> Self {
        let config = ResolvedSessionConfig::from_options(config);
        let core = restore_core(store.as_ref(), &config.key_prefix);
        Self {
            inner: Arc::new(SessionInner {
                state: Mutex::new(core),
                store,
                publisher,
                queue,
                config,
            }),
        }
    }

    fn lock_state(&self) -> NapiResult<MutexGuard<'_, SessionCore>> {
        self.inner
            .state
            .lock()
            .map_err(|_| napi_error("Session state lock poisoned"))
    }

    fn notify(&self, state: &mut SessionCore, level: &str, code: &str, message: &str) {
        let notification = Notification {
            sequence: state.next_sequence,
            level: level.to_string(),
            code: code.to_string(),
            message: message.to_string(),
            timestamp: now_ms(),
        };
        state.next_sequence += 1;
        self.inner.publisher.publish(notification);
    }

    fn write_records(&self, state: &SessionCore) -> CoreResult<()> {
        let prefix = &self.inner.config.key_prefix;
        let store = self.inner.store.as_ref();

        store.set(&record_key(prefix, RECORD_BRIEF), &to_json(&state.brief)?)?;
        store.set(&record_key(prefix, RECORD_PERSONA), &to_json(&state.persona)?)?;
        store.set(
            &record_key(prefix, RECORD_DOCUMENT),
            &to_json(&DocumentRecord {
                document: state.document.clone(),
            })?,
        )?;
        store.set(
            &record_key(prefix, RECORD_STYLES),
            &to_json(&StylesRecord {
                styles: state.style_choices.clone(),
            })?,
        )?;
        Ok(())
    }
}

/// Deterministic artifact name for a rendered hook visual.
#[napi(js_name = "exportFileName")]
pub fn export_file_name(hook_id: String) -> String {
    let mut slug: String = hook_id
        .trim()
        .chars()
        .map(|character| {
            if character.is_ascii_alphanumeric() {
                character.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect();
    slug = slug.trim_matches('-').to_string();
    if slug.is_empty() {
        slug = "asset".to_string();
    }
    format!("{slug}.png")
}

fn restore_core(store: &dyn SnapshotStore, prefix: &str) -> SessionCore {
    let mut core = SessionCore::fresh();
    core.brief =
        read_record::<CampaignBrief>(store, &record_key(prefix, RECORD_BRIEF)).unwrap_or_default();
    core.persona = read_record::<BrandPersona>(store, &record_key(prefix, RECORD_PERSONA))
        .unwrap_or_default();
    core.document = read_record::<DocumentRecord>(store, &record_key(prefix, RECORD_DOCUMENT))
        .map(|record| record.document)
        .unwrap_or_default();
    core.style_choices = read_record::<StylesRecord>(store, &record_key(prefix, RECORD_STYLES))
        .map(|record| record.styles)
        .unwrap_or_default();
    core.sections = segment(&core.document);
    core
}

fn read_record<T: DeserializeOwned>(store: &dyn SnapshotStore, key: &str) -> Option<T> {
    let raw = match store.get(key) {
        Ok(Some(raw)) => raw,
        Ok(None) => return None,
        Err(error) => {
            warn!("snapshot read failed for {key}: {error}");
            return None;
        }
    };

    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(error) => {
            warn!("discarding malformed snapshot record {key}: {error}");
            None
        }
    }
}

fn find_section<'a>(sections: &'a [Section], title: &str) -> NapiResult<&'a Section> {
    sections
        .iter()
        .find(|section| section.title == title)
        .ok_or_else(|| napi_error(&format!("Unknown section title: {title}")))
}

fn missing_brief_fields(brief: &CampaignBrief) -> Vec<&'static str> {
    let mut missing = Vec::new();
    if brief.topic.trim().is_empty() {
        missing.push("topic");
    }
    if brief.audience.trim().is_empty() {
        missing.push("audience");
    }
    if brief.offer.trim().is_empty() {
        missing.push("offer");
    }
    missing
}

fn record_key(prefix: &str, name: &str) -> String {
    format!("{prefix}.{name}.v{SCHEMA_VERSION}")
}

fn touch(state: &mut SessionCore) {
    state.dirty_at = Some(now_ms());
}

fn to_json<T: Serialize>(value: &T) -> CoreResult<String> {
    serde_json::to_string(value).map_err(|error| error.to_string())
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_millis() as i64)
        .unwrap_or(0)
}

fn napi_error(message: &str) -> NapiError {
    NapiError::from_reason(message.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemorySnapshotStore;

    const SAMPLE_DOCUMENT: &str = "### MAIN POST\nThe post body.\n\n**VIRAL HOOKS**\nPOST_ID: hook-1\nHOOK_TEXT: First hook.\n\n**THREAD SCRIPT**\nFirst tweet here\n\n[TWEET_SPLIT]\n\nSecond tweet here\n\n**COMMENT LADDER**\nContext framing line.\nComment 1: warm opener\nFinale: the offer reveal";

    fn memory_manager() -> (CampaignSessionManager, MemorySnapshotStore) {
        let store = MemorySnapshotStore::new();
        let manager = CampaignSessionManager::with_store(Box::new(store.clone()), None);
        (manager, store)
    }

    fn filled_brief() -> CampaignBrief {
        CampaignBrief {
            topic: "indie saas".to_string(),
            audience: "bootstrapped founders".to_string(),
            offer: "launch checklist".to_string(),
            tone: "direct".to_string(),
            language: "en".to_string(),
        }
    }

    fn generate(manager: &CampaignSessionManager) {
        manager.set_brief(filled_brief()).unwrap();
        let ticket = manager.begin_generation().unwrap();
        manager
            .complete_generation(ticket, SAMPLE_DOCUMENT.to_string())
            .unwrap();
    }

    #[test]
    fn begin_generation_requires_campaign_fields() {
        let (manager, _store) = memory_manager();

        let result = manager.begin_generation();
        assert!(result.is_err());

        let snapshot = manager.get_snapshot().unwrap();
        assert!(!snapshot.loading);

        let notifications = manager.drain_notifications(None, None).unwrap();
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].code, "validation");
        assert_eq!(notifications[0].level, "error");
    }

    #[test]
    fn generation_round_trip_parses_sections() {
        let (manager, _store) = memory_manager();
        manager.set_brief(filled_brief()).unwrap();

        let ticket = manager.begin_generation().unwrap();
        assert!(manager.get_snapshot().unwrap().loading);

        manager
            .complete_generation(ticket, SAMPLE_DOCUMENT.to_string())
            .unwrap();

        let snapshot = manager.get_snapshot().unwrap();
        assert!(!snapshot.loading);
        assert_eq!(snapshot.sections.len(), 4);
        assert_eq!(snapshot.sections[0].title, "MAIN POST");
        assert_eq!(snapshot.sections[3].title, "COMMENT LADDER");
    }

    #[test]
    fn stale_generation_completions_are_dropped() {
        let (manager, _store) = memory_manager();
        manager.set_brief(filled_brief()).unwrap();

        let first = manager.begin_generation().unwrap();
        let second = manager.begin_generation().unwrap();
        assert!(second > first);

        manager
            .complete_generation(first, "stale result".to_string())
            .unwrap();
        let snapshot = manager.get_snapshot().unwrap();
        assert!(snapshot.loading);
        assert_eq!(snapshot.document, "");

        manager
            .complete_generation(second, SAMPLE_DOCUMENT.to_string())
            .unwrap();
        let snapshot = manager.get_snapshot().unwrap();
        assert!(!snapshot.loading);
        assert_eq!(snapshot.sections.len(), 4);
    }

    #[test]
    fn generation_failure_clears_loading_without_touching_state() {
        let (manager, _store) = memory_manager();
        generate(&manager);
        let before = manager.get_snapshot().unwrap();

        let ticket = manager.begin_generation().unwrap();
        manager
            .fail_generation(ticket, "service unavailable".to_string())
            .unwrap();

        let after = manager.get_snapshot().unwrap();
        assert!(!after.loading);
        assert_eq!(after.document, before.document);
        assert_eq!(after.sections, before.sections);

        let notifications = manager.drain_notifications(None, None).unwrap();
        assert!(notifications
            .iter()
            .any(|notification| notification.code == "generation_failed"));
    }

    #[test]
    fn section_edits_keep_document_and_sections_consistent() {
        let (manager, _store) = memory_manager();
        generate(&manager);

        manager
            .edit_section("MAIN POST".to_string(), "A rewritten post.".to_string())
            .unwrap();

        let snapshot = manager.get_snapshot().unwrap();
        assert_eq!(snapshot.sections[0].content, "A rewritten post.");
        assert_eq!(segment(&snapshot.document), snapshot.sections);
    }

    #[test]
    fn sub_item_edit_out_of_range_is_an_error() {
        let (manager, _store) = memory_manager();
        generate(&manager);

        let result = manager.edit_sub_item(
            "THREAD SCRIPT".to_string(),
            9,
            "does not exist".to_string(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn projections_read_through_section_content() {
        let (manager, _store) = memory_manager();
        generate(&manager);

        let hooks = manager.hook_blocks("VIRAL HOOKS".to_string()).unwrap();
        assert_eq!(hooks.len(), 1);
        assert_eq!(hooks[0].id, "hook-1");

        let tweets = manager.thread_parts("THREAD SCRIPT".to_string()).unwrap();
        assert_eq!(tweets, vec!["First tweet here", "Second tweet here"]);

        let steps = manager.ladder_steps("COMMENT LADDER".to_string()).unwrap();
        assert_eq!(steps.len(), 3);
        assert_eq!(steps[0].role, "context");
        assert_eq!(steps[2].role, "finale");
    }

    #[test]
    fn style_choices_survive_regeneration() {
        let (manager, _store) = memory_manager();
        generate(&manager);

        manager.set_style_choice("hook-1".to_string(), 3).unwrap();
        let ticket = manager.begin_generation().unwrap();
        manager
            .complete_generation(ticket, SAMPLE_DOCUMENT.to_string())
            .unwrap();

        let snapshot = manager.get_snapshot().unwrap();
        assert_eq!(snapshot.style_choices.len(), 1);
        assert_eq!(snapshot.style_choices[0].hook_id, "hook-1");
        assert_eq!(snapshot.style_choices[0].style_index, 3);
    }

    #[test]
    fn flush_and_restore_round_trip() {
        let store = MemorySnapshotStore::new();
        let manager = CampaignSessionManager::with_store(Box::new(store.clone()), None);
        manager.set_brief(filled_brief()).unwrap();
        manager
            .set_persona(BrandPersona {
                name: "Maya".to_string(),
                style: "playful".to_string(),
            })
            .unwrap();
        let ticket = manager.begin_generation().unwrap();
        manager
            .complete_generation(ticket, SAMPLE_DOCUMENT.to_string())
            .unwrap();
        manager.set_style_choice("hook-1".to_string(), 2).unwrap();
        manager.flush().unwrap();

        let restored = CampaignSessionManager::with_store(Box::new(store.clone()), None);
        let snapshot = restored.get_snapshot().unwrap();
        assert_eq!(snapshot.brief.topic, "indie saas");
        assert_eq!(snapshot.persona.name, "Maya");
        assert_eq!(snapshot.sections.len(), 4);
        assert_eq!(snapshot.style_choices[0].style_index, 2);
    }

    #[test]
    fn malformed_records_restore_as_defaults() {
        let store = MemorySnapshotStore::new();
        store
            .set("campaign-studio.brief.v2", "{not json at all")
            .unwrap();
        store
            .set(
                "campaign-studio.document.v2",
                "{\"document\":\"**MAIN POST**\\n\\nRestored body\"}",
            )
            .unwrap();

        let manager = CampaignSessionManager::with_store(Box::new(store), None);
        let snapshot = manager.get_snapshot().unwrap();

        assert_eq!(snapshot.brief.topic, "");
        assert_eq!(snapshot.sections.len(), 1);
        assert_eq!(snapshot.sections[0].content, "Restored body");
    }

    #[test]
    fn debounce_fires_once_after_the_quiet_period() {
        let (manager, store) = memory_manager();
        manager.set_brief(filled_brief()).unwrap();

        assert!(!manager.persist_due(now_ms()).unwrap());
        assert_eq!(store.get("campaign-studio.brief.v2").unwrap(), None);

        assert!(manager
            .persist_due(now_ms() + DEFAULT_DEBOUNCE_MS + 60_000)
            .unwrap());
        assert!(store.get("campaign-studio.brief.v2").unwrap().is_some());

        assert!(!manager
            .persist_due(now_ms() + DEFAULT_DEBOUNCE_MS + 120_000)
            .unwrap());
    }

    #[test]
    fn reset_clears_state_and_stored_records() {
        let (manager, store) = memory_manager();
        generate(&manager);
        manager.flush().unwrap();
        assert!(store.get("campaign-studio.document.v2").unwrap().is_some());

        manager.reset().unwrap();

        let snapshot = manager.get_snapshot().unwrap();
        assert_eq!(snapshot.document, "");
        assert!(snapshot.sections.is_empty());
        assert_eq!(snapshot.brief.topic, "");
        for name in RECORD_NAMES {
            let key = record_key(DEFAULT_KEY_PREFIX, name);
            assert_eq!(store.get(&key).unwrap(), None);
        }
    }

    #[test]
    fn export_lifecycle_clears_marker_and_notifies_once() {
        let (manager, _store) = memory_manager();

        let file_name = manager.begin_export("main-post".to_string()).unwrap();
        assert_eq!(file_name, "main-post.png");
        assert_eq!(
            manager.get_snapshot().unwrap().pending_export.as_deref(),
            Some("main-post")
        );

        manager
            .complete_export("main-post".to_string(), true)
            .unwrap();
        assert_eq!(manager.get_snapshot().unwrap().pending_export, None);

        let notifications = manager.drain_notifications(None, None).unwrap();
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].code, "export_done");

        assert!(manager.drain_notifications(None, None).unwrap().is_empty());
    }

    #[test]
    fn notification_drain_respects_cursor_and_limit() {
        let (manager, _store) = memory_manager();
        manager.record_copy("hook-1".to_string(), true).unwrap();
        manager.record_copy("hook-2".to_string(), false).unwrap();
        manager.record_copy("hook-3".to_string(), true).unwrap();

        let first = manager.drain_notifications(None, Some(1)).unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].sequence, 1);

        let rest = manager
            .drain_notifications(Some(first[0].sequence), None)
            .unwrap();
        assert_eq!(rest.len(), 2);
        assert!(rest.iter().all(|notification| notification.sequence > 1));
    }

    #[test]
    fn injected_publisher_receives_notifications() {
        struct RecordingPublisher {
            seen: Arc<Mutex<Vec<Notification>>>,
        }

        impl NotificationPublisher for RecordingPublisher {
            fn publish(&self, notification: Notification) {
                self.seen.lock().unwrap().push(notification);
            }
        }

        let seen = Arc::new(Mutex::new(Vec::new()));
        let manager = CampaignSessionManager::with_publisher(
            Box::new(MemorySnapshotStore::new()),
            Box::new(RecordingPublisher { seen: seen.clone() }),
            None,
        );

        manager.record_copy("hook-1".to_string(), true).unwrap();
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].code, "copied");
    }

    #[test]
    fn export_file_names_are_deterministic_slugs() {
        assert_eq!(export_file_name("main-post".to_string()), "main-post.png");
        assert_eq!(export_file_name("Hook 2!".to_string()), "hook-2.png");
        assert_eq!(export_file_name("???".to_string()), "asset.png");
    }
}
