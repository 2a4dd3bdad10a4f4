use std::path::Path;

use anyhow::{bail, Context, Result};
use serde_json::json;
use studio_contracts::events::{EventKind, EventWriter};
use studio_contracts::history::{
    HistoryEntry, HistoryItem, HistoryPage, HistoryStore, HistoryView, IconSize,
};
use studio_contracts::mode::{Mode, ModeAffordances, ModeBuffers};
use studio_contracts::request::{AnalyzeRequest, GenerateRequest, StudioRequest};
use studio_contracts::stream::StreamEvent;
use studio_contracts::transcript::ThinkingSplit;

use crate::api::{error_chain_text, DeleteOutcome, StudioApi};
use crate::config::StudioConfig;
use crate::journal::{Journal, LogLine, LogSink};
use crate::params::{GenerationParams, LoraSelection};
use crate::session::{
    run_session, CancelToken, GenerationSession, SessionControl, SessionKind, SessionOutcome,
    SessionState,
};
use crate::slots::{file_name_of, to_server_path, InputSlots, Slot};

pub const FOREIGN_ITEM_STATUS: &str = "Foreign item: reference only.";

/// Asks the user to confirm destructive actions and shows blocking alerts.
pub trait Prompter {
    fn confirm(&mut self, message: &str) -> bool;
    fn alert(&mut self, message: &str);
}

/// Client-side state of one studio console: the active mode and its
/// buffers, inputs, parameters, the visible result, and cached history.
pub struct StudioApp<A: StudioApi> {
    pub(crate) api: A,
    config: StudioConfig,
    prompter: Box<dyn Prompter>,
    journal: Journal,
    mode: Mode,
    buffers: ModeBuffers,
    prompt: String,
    current_image: Option<String>,
    slots: InputSlots,
    slot_sizes: [Option<(u32, u32)>; 2],
    params: GenerationParams,
    loras: LoraSelection,
    result_text: ThinkingSplit,
    history: HistoryStore,
    history_page: HistoryPage,
    busy: bool,
    cancel: CancelToken,
    last_state: SessionState,
    status: String,
}

impl<A: StudioApi> StudioApp<A> {
    pub fn new(api: A, config: StudioConfig, prompter: Box<dyn Prompter>) -> Self {
        let loras = LoraSelection::new(config.lora_folder.clone());
        Self {
            api,
            config,
            prompter,
            journal: Journal::new(),
            mode: Mode::TextToImage,
            buffers: ModeBuffers::new(),
            prompt: String::new(),
            current_image: None,
            slots: InputSlots::new(),
            slot_sizes: [None, None],
            params: GenerationParams::default(),
            loras,
            result_text: ThinkingSplit::default(),
            history: HistoryStore::new(),
            history_page: HistoryPage::default(),
            busy: false,
            cancel: CancelToken::new(),
            last_state: SessionState::Idle,
            status: "Ready".to_string(),
        }
    }

    pub fn with_event_writer(mut self, writer: EventWriter) -> Self {
        self.journal.set_event_writer(Some(writer));
        self
    }

    pub fn with_log_sink(mut self, sink: LogSink) -> Self {
        self.journal.set_sink(Some(sink));
        self
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn affordances(&self) -> &'static ModeAffordances {
        self.mode.affordances()
    }

    pub fn buffers(&self) -> &ModeBuffers {
        &self.buffers
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn current_image(&self) -> Option<&str> {
        self.current_image.as_deref()
    }

    pub fn slots(&self) -> &InputSlots {
        &self.slots
    }

    pub fn params(&self) -> &GenerationParams {
        &self.params
    }

    pub fn loras(&self) -> &LoraSelection {
        &self.loras
    }

    pub fn result_text(&self) -> &ThinkingSplit {
        &self.result_text
    }

    pub fn history_page(&self) -> &HistoryPage {
        &self.history_page
    }

    pub fn history_view(&self) -> HistoryView {
        self.history.view()
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    pub fn last_state(&self) -> SessionState {
        self.last_state
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn console(&self) -> &[LogLine] {
        self.journal.lines()
    }

    /// Shared with other threads that may want to stop a running session.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn set_prompt(&mut self, prompt: &str) {
        self.prompt = prompt.to_string();
    }

    // ---- modes ----

    pub fn switch_mode(&mut self, target: Mode) {
        let outgoing = self.mode;
        self.buffers
            .save(outgoing, &self.prompt, self.current_image.as_deref());
        self.mode = target;
        let restored = self.buffers.get(target).clone();
        self.prompt = restored.prompt;
        self.current_image = restored.image;
        self.status = format!("Mode: {}", target.tag().to_ascii_uppercase());

        self.journal.emit(
            EventKind::ModeSwitched,
            json!({ "from": outgoing.tag(), "to": target.tag() }),
        );
        self.history.reset_page();
        self.refresh_history();
    }

    pub fn is_valid(&self) -> bool {
        if self.mode.needs_source_image() {
            self.slots.any()
        } else {
            !self.prompt.trim().is_empty()
        }
    }

    pub fn generate_enabled(&self) -> bool {
        !self.busy && self.is_valid()
    }

    /// Why generation is currently refused, if it is.
    pub fn invalid_hint(&self) -> Option<&'static str> {
        if self.is_valid() {
            None
        } else {
            Some(self.affordances().invalid_hint)
        }
    }

    // ---- inputs ----

    pub fn upload(&mut self, slot: Slot, local_path: &Path) -> bool {
        if !self.affordances().upload_panel {
            self.journal.error(format!(
                "{} mode takes no input images",
                self.mode.tag().to_ascii_uppercase()
            ));
            return false;
        }
        let server_path = match self.api.upload_image(local_path) {
            Ok(path) => path,
            Err(err) => {
                self.journal
                    .error(format!("Upload failed: {}", error_chain_text(&err, 300)));
                return false;
            }
        };
        self.slots.set(slot, server_path);
        self.slot_sizes[slot_index(slot)] = match image::image_dimensions(local_path) {
            Ok(size) => Some(size),
            Err(err) => {
                self.journal
                    .info(format!("Could not read image size: {err}"));
                None
            }
        };
        let name = local_path
            .file_name()
            .and_then(|value| value.to_str())
            .unwrap_or_default();
        self.journal.success(format!("Uploaded: {name}"));
        true
    }

    pub fn remove_image(&mut self, slot: Slot) {
        self.slots.delete(slot);
        match slot {
            Slot::First => self.slot_sizes = [self.slot_sizes[1].take(), None],
            Slot::Second => self.slot_sizes[1] = None,
        }
        self.journal.info(format!("Removed image {slot}"));
    }

    pub fn swap_images(&mut self) {
        self.slots.swap();
        self.slot_sizes.swap(0, 1);
        self.journal.info("Images swapped.");
    }

    // ---- parameters ----

    pub fn set_param(&mut self, name: &str, value: &str) -> bool {
        let affordances = self.affordances();
        let allowed = match name {
            "width" | "height" | "steps" | "guidance" | "seed" | "randomize" => {
                affordances.image_params
            }
            "strength" | "mix" | "mix_ratio" => affordances.blend_params,
            _ => true,
        };
        if !allowed {
            self.journal.error(format!(
                "{name} is not used in {} mode",
                self.mode.tag().to_ascii_uppercase()
            ));
            return false;
        }
        match self.params.set(name, value) {
            Ok(()) => {
                self.journal.info(format!("{name} = {}", value.trim()));
                true
            }
            Err(err) => {
                self.journal.error(format!("{err:#}"));
                false
            }
        }
    }

    pub fn set_ratio(&mut self, ratio_w: u32, ratio_h: u32) -> bool {
        if !self.affordances().image_params {
            self.journal.error("Aspect ratio is not used in I2T mode");
            return false;
        }
        match self.params.set_ratio(ratio_w, ratio_h) {
            Ok(()) => {
                self.journal.info(format!(
                    "Ratio {ratio_w}:{ratio_h} -> {}x{}",
                    self.params.width, self.params.height
                ));
                true
            }
            Err(err) => {
                self.journal.error(format!("{err:#}"));
                false
            }
        }
    }

    /// Matches the aspect ratio of the image in slot 1.
    pub fn set_original_ratio(&mut self) -> bool {
        if !self.affordances().original_ratio {
            self.journal.error("Original Ratio needs an input image mode");
            return false;
        }
        if self.slots.get(Slot::First).is_none() {
            self.journal.error("No image loaded for Original Ratio");
            return false;
        }
        let Some((width, height)) = self.slot_sizes[0] else {
            self.journal
                .error("Size of image 1 is unknown; upload it from disk to use Original Ratio");
            return false;
        };
        self.set_ratio(width, height)
    }

    pub fn set_lora_folder(&mut self, folder: &str) {
        self.loras.folder = folder.trim().to_string();
        self.loras.set_available(Vec::new());
        self.journal.info(format!("LoRA folder: {}", self.loras.folder));
    }

    pub fn scan_loras(&mut self) -> bool {
        match self.api.scan_loras(&self.loras.folder) {
            Ok(files) => {
                self.journal.info(format!(
                    "Found {} LoRA file(s) in {}",
                    files.len(),
                    self.loras.folder
                ));
                self.loras.set_available(files);
                true
            }
            Err(err) => {
                self.journal
                    .error(format!("LoRA scan failed: {}", error_chain_text(&err, 300)));
                false
            }
        }
    }

    pub fn add_lora_slot(&mut self) -> usize {
        let count = self.loras.add_slot();
        self.journal.info(format!("LoRA slot {count} added"));
        count
    }

    pub fn set_lora(&mut self, index: usize, filename: &str, strength: Option<f64>) -> bool {
        if !self.affordances().lora_section {
            self.journal.error("LoRA is not used in I2T mode");
            return false;
        }
        match self.loras.set(index, filename, strength) {
            Ok(()) => true,
            Err(err) => {
                self.journal.error(format!("{err:#}"));
                false
            }
        }
    }

    pub fn remove_lora(&mut self, index: usize) -> bool {
        match self.loras.remove_slot(index) {
            Ok(()) => true,
            Err(err) => {
                self.journal.error(format!("{err:#}"));
                false
            }
        }
    }

    // ---- sessions ----

    pub fn build_request(&self) -> Result<StudioRequest> {
        let primary = self.slots.primary().map(str::to_string);
        let secondary = self.slots.secondary().map(str::to_string);
        let params = &self.params;
        match SessionKind::for_mode(self.mode) {
            SessionKind::Analyze => {
                let image_path = primary.context("Please upload an image")?;
                Ok(StudioRequest::Analyze(AnalyzeRequest {
                    image_path,
                    image_path_2: secondary,
                    prompt: self.prompt.clone(),
                    top_k: params.top_k,
                    temperature: params.temperature,
                    strength: params.strength,
                    mix_ratio: params.mix_ratio,
                }))
            }
            SessionKind::Generate => {
                let (init_image, init_image_2) = if self.mode.needs_source_image() {
                    if primary.is_none() {
                        bail!("Please upload an image");
                    }
                    (primary, secondary)
                } else {
                    (None, None)
                };
                Ok(StudioRequest::Generate(GenerateRequest {
                    mode: self.mode,
                    prompt: self.prompt.clone(),
                    width: params.width,
                    height: params.height,
                    steps: params.steps,
                    guidance: params.guidance,
                    seed: params.seed,
                    randomize: params.randomize,
                    init_image,
                    init_image_2,
                    loras: self.loras.adapters(),
                    top_k: f64::from(params.top_k),
                    temperature: params.temperature,
                    strength: params.strength,
                    mix_ratio: params.mix_ratio,
                }))
            }
        }
    }

    /// Runs one generate/analyze session for the active mode.
    ///
    /// Returns `None` when the start is refused (busy, invalid input).
    /// `observer` sees every event after the app state was updated.
    pub fn generate<F>(&mut self, mut observer: F) -> Option<SessionOutcome>
    where
        F: FnMut(&StreamEvent, &GenerationSession) -> SessionControl,
    {
        if self.busy {
            self.journal.error("A session is already running");
            return None;
        }
        if let Some(hint) = self.invalid_hint() {
            self.journal.error(hint);
            return None;
        }
        let request = match self.build_request() {
            Ok(request) => request,
            Err(err) => {
                self.journal.error(format!("{err:#}"));
                return None;
            }
        };

        self.journal.clear();
        self.busy = true;
        self.cancel.reset();
        self.last_state = SessionState::Running;
        self.status = "Processing...".to_string();
        let kind = SessionKind::for_mode(self.mode);
        if kind == SessionKind::Analyze {
            self.result_text = ThinkingSplit::default();
        }
        self.journal.emit(
            EventKind::SessionStarted,
            json!({
                "mode": self.mode.tag(),
                "kind": session_kind_tag(kind),
                "prompt": request.prompt(),
            }),
        );

        let cancel = self.cancel.clone();
        let mut live = LiveView {
            journal: &mut self.journal,
            status: &mut self.status,
            current_image: &mut self.current_image,
            result_text: &mut self.result_text,
            saw_terminal: false,
        };
        let outcome = run_session(&self.api, &request, &cancel, |event, session| {
            live.observe(event, session);
            observer(event, session)
        });
        let saw_terminal = live.saw_terminal;
        self.busy = false;

        self.finish_session(&outcome, saw_terminal);
        Some(outcome)
    }

    fn finish_session(&mut self, outcome: &SessionOutcome, saw_terminal: bool) {
        self.last_state = outcome.state;
        for note in &outcome.notes {
            self.journal.error(note.clone());
        }
        let message = outcome.message.clone().unwrap_or_default();
        match outcome.state {
            SessionState::Completed => {
                if let Some(image) = outcome.last_image.as_ref() {
                    self.buffers.set_image(outcome.mode, Some(image.clone()));
                }
                if outcome.kind == SessionKind::Analyze {
                    self.result_text = outcome.split.clone();
                }
                self.refresh_history();
            }
            SessionState::Failed => {
                if !saw_terminal {
                    self.journal.error(format!("Connection Error: {message}"));
                }
                self.status = "Error".to_string();
            }
            SessionState::Aborted => {
                if !saw_terminal {
                    self.journal.info(format!("Stopped: {message}"));
                }
                self.status = "Aborted".to_string();
            }
            SessionState::Idle | SessionState::Running => {}
        }
        self.journal.emit(
            EventKind::SessionFinished,
            json!({
                "mode": outcome.mode.tag(),
                "kind": session_kind_tag(outcome.kind),
                "state": outcome.state.as_str(),
                "message": outcome.message,
                "image": outcome.last_image,
            }),
        );
    }

    /// Sends the out-of-band stop request after confirmation.
    pub fn request_stop(&mut self) -> bool {
        if !self.prompter.confirm("Abort current process?") {
            return false;
        }
        self.cancel.cancel();
        match self.api.stop() {
            Ok(()) => {
                self.journal.info("Stop requested.");
                true
            }
            Err(err) => {
                self.journal
                    .error(format!("Stop failed: {}", error_chain_text(&err, 300)));
                false
            }
        }
    }

    // ---- history ----

    pub fn refresh_history(&mut self) {
        match self.api.history() {
            Ok(listing) => {
                for skipped in listing.skipped {
                    self.journal.error(skipped);
                }
                self.history.replace_items(listing.items);
            }
            Err(err) => {
                self.journal.error(format!(
                    "History load failed: {}",
                    error_chain_text(&err, 300)
                ));
            }
        }
        self.render_history();
    }

    fn render_history(&mut self) {
        self.history_page = self.history.render(self.mode);
    }

    pub fn change_page(&mut self, delta: i64) -> bool {
        if !self.history.change_page(delta) {
            return false;
        }
        self.render_history();
        true
    }

    pub fn set_icon_size(&mut self, icon_size: IconSize) {
        self.history.set_icon_size(icon_size);
        self.render_history();
    }

    pub fn toggle_show_all(&mut self) -> bool {
        let show_all = !self.history.view().show_all;
        self.history.set_show_all(show_all);
        self.render_history();
        show_all
    }

    pub fn find_history_item(&self, filename: &str) -> Option<&HistoryItem> {
        self.history.find(filename)
    }

    /// Entry `index` (1-based) of the visible page.
    pub fn history_entry(&self, index: usize) -> Option<HistoryEntry> {
        index
            .checked_sub(1)
            .and_then(|idx| self.history_page.entries.get(idx))
            .cloned()
    }

    pub fn delete_history_item(&mut self, filename: &str) -> bool {
        let filename = filename.trim();
        if filename.is_empty() {
            self.journal.error("Nothing to delete");
            return false;
        }
        if let Some(item) = self.history.find(filename) {
            if item.mode() != Some(self.mode) {
                self.status = FOREIGN_ITEM_STATUS.to_string();
                self.journal.error(FOREIGN_ITEM_STATUS);
                return false;
            }
        }
        if !self
            .prompter
            .confirm(&format!("Delete {filename}? This cannot be undone."))
        {
            self.journal.info("Delete cancelled.");
            return false;
        }
        let rejection = match self.api.delete_history(filename) {
            Ok(DeleteOutcome::Deleted) => None,
            Ok(DeleteOutcome::Rejected(message)) => Some(message),
            Err(err) => Some(error_chain_text(&err, 300)),
        };
        match rejection {
            None => {
                self.journal.success(format!("Deleted: {filename}"));
                self.journal
                    .emit(EventKind::HistoryDeleted, json!({ "filename": filename }));
                self.refresh_history();
                true
            }
            Some(message) => {
                let text = format!("Error deleting: {message}");
                self.prompter.alert(&text);
                self.journal.error(text);
                false
            }
        }
    }

    /// Copies the recorded settings of an own-mode item back into the
    /// controls.
    pub fn restore_history_item(&mut self, entry: &HistoryEntry) -> bool {
        let item = &entry.item;
        if !item.has_params() {
            self.status = format!("No settings recorded for {}", item.filename);
            self.journal.error(self.status.clone());
            return false;
        }
        if !entry.restorable {
            self.status = FOREIGN_ITEM_STATUS.to_string();
            self.journal.info(FOREIGN_ITEM_STATUS);
            return false;
        }

        if let Some(prompt) = item.prompt() {
            self.prompt = prompt.to_string();
        }
        let positive = |value: Option<f64>| {
            value
                .filter(|value| value.is_finite() && *value >= 1.0)
                .map(|value| value.round() as u32)
        };
        if let Some(width) = positive(item.param_f64("width")) {
            self.params.width = width;
        }
        if let Some(height) = positive(item.param_f64("height")) {
            self.params.height = height;
        }
        if let Some(steps) = positive(item.param_f64("steps")) {
            self.params.steps = steps;
        }
        if let Some(guidance) = item
            .param_f64("guidance")
            .or_else(|| item.param_f64("guidance_scale"))
        {
            self.params.guidance = guidance;
        }
        if let Some(seed) = item.param_f64("seed").filter(|value| value.is_finite()) {
            self.params.seed = seed.round() as i64;
            self.params.randomize = false;
        }
        if let Some(top_k) = positive(item.param_f64("top_k")) {
            self.params.top_k = top_k;
        }
        if let Some(temperature) = item.param_f64("temperature") {
            self.params.temperature = temperature;
        }

        let (source_1, source_2) = item.source_images();
        let sources = [(Slot::First, source_1), (Slot::Second, source_2)];
        for (slot, source) in sources {
            let Some(source) = source else {
                continue;
            };
            match to_server_path(source, &self.config.server_root) {
                Ok(path) => {
                    self.slots.set(slot, path);
                    self.slot_sizes[slot_index(slot)] = None;
                }
                Err(err) => self.journal.error(format!("{err:#}")),
            }
        }

        if self.mode.is_analysis() {
            self.result_text = item.output_text();
        }
        self.buffers.set_prompt(self.mode, self.prompt.clone());
        self.current_image = Some(item.image.clone());
        let message = format!("Restored settings from: {}", item.filename);
        self.status = message.clone();
        self.journal.success(message);
        true
    }

    pub fn load_to_slot(&mut self, entry: &HistoryEntry, slot: Slot) -> bool {
        if !entry.loadable || !self.mode.needs_source_image() {
            self.journal
                .error("Images can only be loaded into slots in I2I or I2T mode");
            return false;
        }
        match to_server_path(&entry.item.image, &self.config.server_root) {
            Ok(path) => {
                self.slots.set(slot, path);
                self.slot_sizes[slot_index(slot)] = None;
                self.journal.info(format!(
                    "Loaded {} into slot {slot}",
                    entry.item.filename
                ));
                true
            }
            Err(err) => {
                let text = format!("{err:#}");
                self.prompter.alert(&text);
                self.journal.error(text);
                false
            }
        }
    }

    /// Loads both recorded source images of an item into the slots.
    pub fn load_sources(&mut self, entry: &HistoryEntry) -> bool {
        if !entry.loadable || !self.mode.needs_source_image() {
            self.journal
                .error("Images can only be loaded into slots in I2I or I2T mode");
            return false;
        }
        let (source_1, source_2) = entry.item.source_images();
        if source_1.is_none() && source_2.is_none() {
            let text = format!("No source images recorded for {}", entry.item.filename);
            self.prompter.alert(&text);
            self.journal.error(text);
            return false;
        }
        let mut loaded = 0;
        for (slot, source) in [(Slot::First, source_1), (Slot::Second, source_2)] {
            let Some(source) = source else {
                continue;
            };
            match to_server_path(source, &self.config.server_root) {
                Ok(path) => {
                    self.slots.set(slot, path);
                    self.slot_sizes[slot_index(slot)] = None;
                    loaded += 1;
                }
                Err(err) => {
                    let text = format!("{err:#}");
                    self.prompter.alert(&text);
                    self.journal.error(text);
                }
            }
        }
        if loaded > 0 {
            self.journal.info(format!(
                "Loaded {loaded} source image(s) from {}",
                entry.item.filename
            ));
        }
        loaded > 0
    }

    // ---- cross-mode helpers ----

    /// Puts the shown image into slot 1 of `target` and switches to it.
    pub fn send_result_to(&mut self, target: Mode) -> bool {
        if !target.needs_source_image() {
            self.journal.error("Results can only be sent to I2I or I2T");
            return false;
        }
        let Some(image) = self.current_image.clone() else {
            self.journal.error("No result image to send");
            return false;
        };
        match to_server_path(&image, &self.config.server_root) {
            Ok(path) => {
                self.slots.set(Slot::First, path);
                self.slot_sizes[0] = None;
            }
            Err(err) => {
                let text = format!("{err:#}");
                self.prompter.alert(&text);
                self.journal.error(text);
                return false;
            }
        }
        self.journal.info(format!(
            "Sent {} to {}",
            file_name_of(&image),
            target.tag().to_ascii_uppercase()
        ));
        self.switch_mode(target);
        true
    }

    pub fn send_answer_to(&mut self, target: Mode) -> bool {
        let text = self.result_text.answer.clone();
        self.send_text_to(target, text, "answer")
    }

    pub fn send_thinking_to(&mut self, target: Mode) -> bool {
        let text = self.result_text.thinking.clone();
        self.send_text_to(target, text, "thinking")
    }

    fn send_text_to(&mut self, target: Mode, text: String, label: &str) -> bool {
        if text.trim().is_empty() {
            self.journal.error(format!("No {label} text to send"));
            return false;
        }
        if target == self.mode {
            self.prompt = text;
            return true;
        }
        self.buffers.set_prompt(target, text);
        self.switch_mode(target);
        true
    }

    /// Asks the server process to exit.
    pub fn shutdown(&mut self) -> bool {
        if !self
            .prompter
            .confirm("Shut down the studio server? Running jobs are lost.")
        {
            return false;
        }
        match self.api.exit() {
            Ok(()) => self.journal.success("Server shutdown requested."),
            Err(err) => self.journal.info(format!(
                "Server closed the connection: {}",
                error_chain_text(&err, 200)
            )),
        }
        self.status = "Server stopped".to_string();
        true
    }

    pub fn status_report(&self) -> Vec<String> {
        let affordances = self.affordances();
        let mut lines = vec![
            format!(
                "mode: {} ({})",
                self.mode.tag(),
                affordances.generate_label
            ),
            format!("status: {} [{}]", self.status, self.last_state),
            format!(
                "prompt: {}",
                if self.prompt.is_empty() {
                    affordances.prompt_placeholder
                } else {
                    self.prompt.as_str()
                }
            ),
            format!(
                "image: {}",
                self.current_image.as_deref().unwrap_or("(none)")
            ),
        ];
        if affordances.upload_panel {
            let shown = if affordances.second_slot { 2 } else { 1 };
            for slot in [Slot::First, Slot::Second].into_iter().take(shown) {
                lines.push(format!(
                    "slot {slot}: {}",
                    self.slots.get(slot).unwrap_or("(empty)")
                ));
            }
        }
        lines.push(format!("params: {}", self.params.summary()));
        if affordances.lora_section {
            let adapters = self.loras.adapters();
            let names: Vec<String> = adapters
                .iter()
                .map(|adapter| format!("{}@{}", adapter.filename, adapter.strength))
                .collect();
            lines.push(format!(
                "loras ({}): {}",
                self.loras.folder,
                if names.is_empty() {
                    "(none)".to_string()
                } else {
                    names.join(", ")
                }
            ));
        }
        if affordances.text_result {
            lines.push(format!("thinking: {}", self.result_text.thinking));
            lines.push(format!("answer: {}", self.result_text.answer));
        }
        match self.invalid_hint() {
            Some(hint) => lines.push(format!("generate: disabled ({hint})")),
            None if self.busy => lines.push("generate: running".to_string()),
            None => lines.push(format!("generate: ready ({})", affordances.generate_label)),
        }
        lines
    }
}

/// The slices of app state a running session updates live.
struct LiveView<'a> {
    journal: &'a mut Journal,
    status: &'a mut String,
    current_image: &'a mut Option<String>,
    result_text: &'a mut ThinkingSplit,
    saw_terminal: bool,
}

impl LiveView<'_> {
    fn observe(&mut self, event: &StreamEvent, session: &GenerationSession) {
        let analysis = session.kind() == SessionKind::Analyze;
        match event {
            StreamEvent::Log(text) => {
                self.journal.info(text.clone());
                if !analysis {
                    *self.status = text.clone();
                }
            }
            StreamEvent::ImageReady(path) => {
                *self.current_image = Some(path.clone());
            }
            StreamEvent::TextDelta(_) => {
                *self.result_text = session.split().clone();
            }
            StreamEvent::Done(text) => {
                self.saw_terminal = true;
                self.journal.success(text.clone());
                *self.status = if analysis {
                    "Analysis Complete".to_string()
                } else {
                    "Complete".to_string()
                };
            }
            StreamEvent::Error(text) => {
                self.saw_terminal = true;
                self.journal.error(text.clone());
                *self.status = "Error".to_string();
            }
        }
        if !matches!(event, StreamEvent::Log(_)) {
            self.journal.emit(
                EventKind::SessionEvent,
                json!({ "event": event.kind(), "payload": event.payload() }),
            );
        }
    }
}

fn slot_index(slot: Slot) -> usize {
    match slot {
        Slot::First => 0,
        Slot::Second => 1,
    }
}

fn session_kind_tag(kind: SessionKind) -> &'static str {
    match kind {
        SessionKind::Generate => "generate",
        SessionKind::Analyze => "analyze",
    }
}
