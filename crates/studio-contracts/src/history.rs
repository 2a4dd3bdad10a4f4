use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::mode::Mode;
use crate::transcript::ThinkingSplit;

/// One past result as served by `GET /api/history`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryItem {
    pub filename: String,
    pub timestamp: f64,
    pub image: String,
    #[serde(default)]
    pub params: Option<Map<String, Value>>,
    #[serde(default)]
    pub output: Option<Value>,
}

impl HistoryItem {
    /// Recorded mode, read from `params.mode` only.
    pub fn mode(&self) -> Option<Mode> {
        self.param_str("mode").and_then(Mode::from_tag)
    }

    pub fn mode_label(&self) -> String {
        self.param_str("mode")
            .filter(|value| !value.trim().is_empty())
            .unwrap_or("unk")
            .to_ascii_uppercase()
    }

    pub fn has_params(&self) -> bool {
        self.params.as_ref().is_some_and(|params| !params.is_empty())
    }

    pub fn param(&self, key: &str) -> Option<&Value> {
        self.params.as_ref().and_then(|params| params.get(key))
    }

    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.param(key).and_then(Value::as_str)
    }

    /// Numeric parameter; numbers serialized as strings are accepted too.
    pub fn param_f64(&self, key: &str) -> Option<f64> {
        match self.param(key)? {
            Value::Number(number) => number.as_f64(),
            Value::String(text) => text.trim().parse::<f64>().ok(),
            _ => None,
        }
    }

    pub fn prompt(&self) -> Option<&str> {
        self.param_str("prompt").filter(|value| !value.is_empty())
    }

    pub fn source_images(&self) -> (Option<&str>, Option<&str>) {
        let non_empty = |key: &str| self.param_str(key).filter(|value| !value.is_empty());
        (non_empty("source_image_1"), non_empty("source_image_2"))
    }

    /// Thinking and answer text recorded by an analysis run. Newer records
    /// nest them under `text_content`.
    pub fn output_text(&self) -> ThinkingSplit {
        let Some(output) = self.output.as_ref() else {
            return ThinkingSplit::default();
        };
        let source = output
            .get("text_content")
            .filter(|value| value.is_object())
            .unwrap_or(output);
        let text = |key: &str| {
            source
                .get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        ThinkingSplit {
            thinking: text("thinking_process"),
            answer: text("final_answer"),
        }
    }

    /// `YY-MM-DD HH:MM:SS` in local time.
    pub fn display_time(&self) -> String {
        let secs = self.timestamp.trunc() as i64;
        let nanos = (self.timestamp.fract() * 1e9) as u32;
        DateTime::from_timestamp(secs, nanos)
            .map(|value| {
                value
                    .with_timezone(&Local)
                    .format("%y-%m-%d %H:%M:%S")
                    .to_string()
            })
            .unwrap_or_else(|| "??-??-?? ??:??:??".to_string())
    }
}

/// Decodes `{history: [...]}`. Malformed entries are skipped and reported
/// instead of failing the whole list.
pub fn parse_history_payload(payload: &Value) -> (Vec<HistoryItem>, Vec<String>) {
    let mut items = Vec::new();
    let mut skipped = Vec::new();
    let Some(rows) = payload.get("history").and_then(Value::as_array) else {
        return (items, skipped);
    };
    for (idx, row) in rows.iter().enumerate() {
        match serde_json::from_value::<HistoryItem>(row.clone()) {
            Ok(item) => items.push(item),
            Err(err) => skipped.push(format!("history item {idx} skipped: {err}")),
        }
    }
    (items, skipped)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IconSize {
    #[default]
    Large,
    Small,
}

impl IconSize {
    pub fn pixels(self) -> u32 {
        match self {
            IconSize::Large => 128,
            IconSize::Small => 64,
        }
    }

    pub fn page_size(self) -> usize {
        match self {
            IconSize::Large => 10,
            IconSize::Small => 20,
        }
    }

    pub fn toggled(self) -> IconSize {
        match self {
            IconSize::Large => IconSize::Small,
            IconSize::Small => IconSize::Large,
        }
    }

    pub fn from_pixels(pixels: u32) -> Option<IconSize> {
        match pixels {
            128 => Some(IconSize::Large),
            64 => Some(IconSize::Small),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HistoryView {
    pub page: usize,
    pub icon_size: IconSize,
    pub show_all: bool,
}

impl HistoryView {
    pub fn page_size(&self) -> usize {
        self.icon_size.page_size()
    }
}

/// A history item prepared for display, with its capabilities decided once.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub item: HistoryItem,
    pub mode: Option<Mode>,
    /// Own-mode items only; foreign items are reference material.
    pub restorable: bool,
    pub deletable: bool,
    /// Image can be loaded into an input slot.
    pub loadable: bool,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct HistoryPage {
    pub entries: Vec<HistoryEntry>,
    pub page: usize,
    pub total_pages: usize,
    pub total_items: usize,
}

impl HistoryPage {
    pub fn has_prev(&self) -> bool {
        self.page > 0
    }

    pub fn has_next(&self) -> bool {
        self.total_pages > 0 && self.page + 1 < self.total_pages
    }

    pub fn label(&self) -> String {
        if self.total_items == 0 {
            return "No history found.".to_string();
        }
        format!(
            "Page {} / {} ({} total)",
            self.page + 1,
            self.total_pages,
            self.total_items
        )
    }
}

/// Client-side cache of the remote history plus the paging state.
#[derive(Debug, Clone, Default)]
pub struct HistoryStore {
    items: Vec<HistoryItem>,
    view: HistoryView,
    filtered_count: usize,
}

impl HistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn view(&self) -> HistoryView {
        self.view
    }

    pub fn items(&self) -> &[HistoryItem] {
        &self.items
    }

    pub fn replace_items(&mut self, mut items: Vec<HistoryItem>) {
        items.sort_by(|a, b| b.timestamp.total_cmp(&a.timestamp));
        self.items = items;
    }

    pub fn reset_page(&mut self) {
        self.view.page = 0;
    }

    pub fn set_icon_size(&mut self, icon_size: IconSize) {
        self.view.icon_size = icon_size;
        self.view.page = 0;
    }

    pub fn set_show_all(&mut self, show_all: bool) {
        self.view.show_all = show_all;
        self.view.page = 0;
    }

    pub fn total_pages(&self) -> usize {
        self.filtered_count.div_ceil(self.view.page_size())
    }

    /// Moves by `delta` pages; returns false (and changes nothing) when the
    /// target page does not exist.
    pub fn change_page(&mut self, delta: i64) -> bool {
        let target = self.view.page as i64 + delta;
        if target < 0 || target >= self.total_pages() as i64 {
            return false;
        }
        self.view.page = target as usize;
        true
    }

    pub fn filtered(&self, active: Mode) -> Vec<&HistoryItem> {
        self.items
            .iter()
            .filter(|item| item.has_params())
            .filter(|item| self.view.show_all || item.mode() == Some(active))
            .collect()
    }

    pub fn render(&mut self, active: Mode) -> HistoryPage {
        let visible: Vec<HistoryItem> = self.filtered(active).into_iter().cloned().collect();
        self.filtered_count = visible.len();

        let total_pages = self.total_pages();
        if total_pages == 0 {
            self.view.page = 0;
        } else if self.view.page >= total_pages {
            self.view.page = total_pages - 1;
        }

        let page_size = self.view.page_size();
        let entries = visible
            .into_iter()
            .skip(self.view.page * page_size)
            .take(page_size)
            .map(|item| {
                let mode = item.mode();
                let own = mode == Some(active);
                HistoryEntry {
                    mode,
                    restorable: own,
                    deletable: own,
                    loadable: active.needs_source_image(),
                    item,
                }
            })
            .collect();

        HistoryPage {
            entries,
            page: self.view.page,
            total_pages,
            total_items: self.filtered_count,
        }
    }

    pub fn find(&self, filename: &str) -> Option<&HistoryItem> {
        self.items.iter().find(|item| item.filename == filename)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::{parse_history_payload, HistoryItem, HistoryStore, IconSize};
    use crate::mode::Mode;

    fn item(name: &str, ts: f64, mode: &str) -> HistoryItem {
        HistoryItem {
            filename: name.to_string(),
            timestamp: ts,
            image: format!("/outputs/{name}"),
            params: json!({ "mode": mode, "prompt": format!("prompt {name}") })
                .as_object()
                .cloned(),
            output: None,
        }
    }

    fn mixed_items() -> Vec<HistoryItem> {
        let mut items = Vec::new();
        for idx in 0..9 {
            let mode = ["t2i", "i2i", "i2t"][idx % 3];
            items.push(item(&format!("{mode}_{idx}.png"), idx as f64 * 10.0, mode));
        }
        items
    }

    #[test]
    fn filters_by_active_mode_newest_first() {
        let mut store = HistoryStore::new();
        store.replace_items(mixed_items());
        let page = store.render(Mode::ImageToImage);

        let names: Vec<&str> = page
            .entries
            .iter()
            .map(|entry| entry.item.filename.as_str())
            .collect();
        assert_eq!(names, vec!["i2i_7.png", "i2i_4.png", "i2i_1.png"]);
        assert!(page.entries.iter().all(|entry| entry.restorable));
        assert!(page.entries.iter().all(|entry| entry.loadable));
    }

    #[test]
    fn show_all_marks_foreign_items_read_only() {
        let mut store = HistoryStore::new();
        store.replace_items(mixed_items());
        store.set_show_all(true);
        let page = store.render(Mode::TextToImage);

        assert_eq!(page.total_items, 9);
        assert_eq!(page.entries[0].item.filename, "i2t_8.png");
        for entry in &page.entries {
            let own = entry.mode == Some(Mode::TextToImage);
            assert_eq!(entry.restorable, own);
            assert_eq!(entry.deletable, own);
            assert!(!entry.loadable);
        }
    }

    #[test]
    fn items_without_params_are_hidden() {
        let mut bare = item("bare.png", 99.0, "t2i");
        bare.params = None;
        let mut empty = item("empty.png", 98.0, "t2i");
        empty.params = Some(serde_json::Map::new());
        let mut store = HistoryStore::new();
        store.replace_items(vec![bare, empty, item("ok.png", 1.0, "t2i")]);
        store.set_show_all(true);
        let page = store.render(Mode::TextToImage);
        assert_eq!(page.total_items, 1);
        assert_eq!(page.entries[0].item.filename, "ok.png");
    }

    #[test]
    fn pagination_bounds_are_no_ops() {
        let mut store = HistoryStore::new();
        let items: Vec<HistoryItem> = (0..23)
            .map(|idx| item(&format!("t2i_{idx}.png"), idx as f64, "t2i"))
            .collect();
        store.replace_items(items);

        let page = store.render(Mode::TextToImage);
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.entries.len(), 10);
        assert!(!store.change_page(-1));
        assert_eq!(store.view().page, 0);

        assert!(store.change_page(1));
        assert!(store.change_page(1));
        let last = store.render(Mode::TextToImage);
        assert_eq!(last.page, 2);
        assert_eq!(last.entries.len(), 3);
        assert!(!last.has_next());
        assert!(!store.change_page(1));
        assert_eq!(store.view().page, 2);
    }

    #[test]
    fn icon_size_changes_page_size_and_resets_page() {
        let mut store = HistoryStore::new();
        let items: Vec<HistoryItem> = (0..23)
            .map(|idx| item(&format!("t2i_{idx}.png"), idx as f64, "t2i"))
            .collect();
        store.replace_items(items);
        store.render(Mode::TextToImage);
        assert!(store.change_page(2));

        store.set_icon_size(IconSize::Small);
        let page = store.render(Mode::TextToImage);
        assert_eq!(page.page, 0);
        assert_eq!(page.total_pages, 2);
        assert_eq!(page.entries.len(), 20);
    }

    #[test]
    fn page_is_clamped_when_list_shrinks() {
        let mut store = HistoryStore::new();
        let items: Vec<HistoryItem> = (0..25)
            .map(|idx| item(&format!("t2i_{idx}.png"), idx as f64, "t2i"))
            .collect();
        store.replace_items(items.clone());
        store.render(Mode::TextToImage);
        assert!(store.change_page(2));

        store.replace_items(items.into_iter().take(5).collect());
        let page = store.render(Mode::TextToImage);
        assert_eq!(page.page, 0);
        assert_eq!(page.total_pages, 1);

        store.replace_items(Vec::new());
        let empty = store.render(Mode::TextToImage);
        assert_eq!(empty.page, 0);
        assert_eq!(empty.total_pages, 0);
        assert_eq!(empty.label(), "No history found.");
    }

    #[test]
    fn malformed_rows_are_skipped() {
        let payload = json!({
            "history": [
                { "filename": "a.png", "timestamp": 1.5, "image": "/outputs/a.png",
                  "params": { "mode": "t2i" } },
                { "filename": "broken" },
                { "filename": "b.png", "timestamp": 2, "image": "/outputs/b.png",
                  "params": { "mode": "i2t" },
                  "output": { "text_content": { "thinking_process": "t", "final_answer": "a" } } }
            ]
        });
        let (items, skipped) = parse_history_payload(&payload);
        assert_eq!(items.len(), 2);
        assert_eq!(skipped.len(), 1);
        let split = items[1].output_text();
        assert_eq!(split.thinking, "t");
        assert_eq!(split.answer, "a");

        let (none, _) = parse_history_payload(&Value::Null);
        assert!(none.is_empty());
    }

    #[test]
    fn mode_is_read_from_params_mode_only() {
        let mut nested = item("n.png", 1.0, "t2i");
        nested.params = json!({ "params": { "mode": "i2i" } }).as_object().cloned();
        assert_eq!(nested.mode(), None);
        assert_eq!(nested.mode_label(), "UNK");
        assert_eq!(item("x.png", 1.0, "I2T").mode(), Some(Mode::ImageToText));
    }

    #[test]
    fn flat_output_and_string_numbers_are_accepted() {
        let mut record = item("f.png", 1.0, "i2t");
        record.output = Some(json!({ "final_answer": "flat" }));
        if let Some(params) = record.params.as_mut() {
            params.insert("steps".to_string(), json!("28"));
        }
        assert_eq!(record.output_text().answer, "flat");
        assert_eq!(record.param_f64("steps"), Some(28.0));
    }
}
