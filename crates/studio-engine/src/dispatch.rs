use std::path::Path;

use anyhow::{bail, Context, Result};
use studio_contracts::chat::Intent;
use studio_contracts::history::{HistoryEntry, IconSize};
use studio_contracts::mode::Mode;
use studio_contracts::stream::StreamEvent;

use crate::api::StudioApi;
use crate::app::StudioApp;
use crate::params::parse_ratio;
use crate::session::{GenerationSession, SessionControl, SessionOutcome};
use crate::slots::Slot;

/// What the console should show after a command ran.
#[derive(Debug, Clone)]
pub enum ChatReply {
    Nothing,
    Status(Vec<String>),
    History,
    Help,
    Session(Option<SessionOutcome>),
    Unknown(String),
    Quit,
}

pub type EventObserver<'a> = dyn FnMut(&StreamEvent, &GenerationSession) -> SessionControl + 'a;

/// Applies one parsed console line to the app. Malformed arguments are
/// returned as errors; everything else is reported on the app console.
pub fn dispatch<A: StudioApi>(
    app: &mut StudioApp<A>,
    intent: &Intent,
    observer: &mut EventObserver<'_>,
) -> Result<ChatReply> {
    let args = intent.args();
    let reply = match intent.action.as_str() {
        "noop" => ChatReply::Nothing,
        "set_prompt" => {
            app.set_prompt(intent.prompt.as_deref().unwrap_or_default());
            ChatReply::Nothing
        }
        "set_mode" => {
            let raw = intent.arg_str("value").unwrap_or_default();
            if raw.is_empty() {
                return Ok(ChatReply::Status(vec![format!("mode: {}", app.mode())]));
            }
            let mode: Mode = raw.parse()?;
            app.switch_mode(mode);
            ChatReply::History
        }
        "generate" => ChatReply::Session(app.generate(|event, session| observer(event, session))),
        "stop" => {
            app.request_stop();
            ChatReply::Nothing
        }
        "upload" => {
            let (slot, path) = match args.as_slice() {
                [path] => (Slot::First, *path),
                [slot, path] => (slot.parse::<Slot>()?, *path),
                _ => bail!("usage: /upload [1|2] <path>"),
            };
            app.upload(slot, Path::new(path));
            ChatReply::Nothing
        }
        "remove_image" => {
            let slot = match args.first() {
                Some(raw) => raw.parse::<Slot>()?,
                None => Slot::First,
            };
            app.remove_image(slot);
            ChatReply::Nothing
        }
        "swap_images" => {
            app.swap_images();
            ChatReply::Nothing
        }
        "set_param" => {
            let name = intent.arg_str("name").unwrap_or_default();
            let value = intent.arg_str("value").unwrap_or_default();
            app.set_param(name, value);
            ChatReply::Nothing
        }
        "set_ratio" => {
            if args.is_empty() {
                bail!("usage: /ratio <w:h>");
            }
            let (ratio_w, ratio_h) = parse_ratio(&args.join(" "))?;
            app.set_ratio(ratio_w, ratio_h);
            ChatReply::Nothing
        }
        "set_original_ratio" => {
            app.set_original_ratio();
            ChatReply::Nothing
        }
        "set_lora_folder" => {
            let folder = intent.arg_str("value").unwrap_or_default();
            if folder.is_empty() {
                bail!("usage: /lora_folder <path>");
            }
            app.set_lora_folder(folder);
            ChatReply::Nothing
        }
        "scan_loras" => {
            let folder = intent.arg_str("value").unwrap_or_default();
            if !folder.is_empty() {
                app.set_lora_folder(folder);
            }
            app.scan_loras();
            let available = app.loras().available();
            let mut lines = vec![format!("LoRA files in {}:", app.loras().folder)];
            lines.extend(available.iter().map(|file| format!("  {file}")));
            ChatReply::Status(lines)
        }
        "add_lora" => {
            app.add_lora_slot();
            ChatReply::Nothing
        }
        "set_lora" => {
            let (index, filename, strength) = match args.as_slice() {
                [index, filename] => (*index, *filename, None),
                [index, filename, strength] => (
                    *index,
                    *filename,
                    Some(
                        strength
                            .parse::<f64>()
                            .with_context(|| format!("bad LoRA strength '{strength}'"))?,
                    ),
                ),
                _ => bail!("usage: /lora <slot> <file|-> [strength]"),
            };
            app.set_lora(parse_index(index)?, filename, strength);
            ChatReply::Nothing
        }
        "remove_lora" => {
            let index = args.first().context("usage: /remove_lora <slot>")?;
            app.remove_lora(parse_index(index)?);
            ChatReply::Nothing
        }
        "history" => {
            app.refresh_history();
            ChatReply::History
        }
        "change_page" => {
            let delta = match args.first().copied() {
                None | Some("next") | Some("+") => 1,
                Some("prev") | Some("-") => -1,
                Some(raw) => raw
                    .parse::<i64>()
                    .with_context(|| format!("bad page step '{raw}'"))?,
            };
            app.change_page(delta);
            ChatReply::History
        }
        "set_icon_size" => {
            let icon_size = match args.first().copied() {
                None => app.history_view().icon_size.toggled(),
                Some("large") => IconSize::Large,
                Some("small") => IconSize::Small,
                Some(raw) => raw
                    .parse::<u32>()
                    .ok()
                    .and_then(IconSize::from_pixels)
                    .with_context(|| format!("icon size must be 128 or 64, got '{raw}'"))?,
            };
            app.set_icon_size(icon_size);
            ChatReply::History
        }
        "toggle_show_all" => {
            app.toggle_show_all();
            ChatReply::History
        }
        "restore_history" => {
            let entry = entry_arg(app, args.first().copied())?;
            app.restore_history_item(&entry);
            ChatReply::Nothing
        }
        "load_to_slot" => {
            let entry = entry_arg(app, args.first().copied())?;
            let slot = match args.get(1) {
                Some(raw) => raw.parse::<Slot>()?,
                None => Slot::First,
            };
            app.load_to_slot(&entry, slot);
            ChatReply::Nothing
        }
        "load_sources" => {
            let entry = entry_arg(app, args.first().copied())?;
            app.load_sources(&entry);
            ChatReply::Nothing
        }
        "delete_history" => {
            let raw = intent.arg_str("value").unwrap_or_default();
            if raw.is_empty() {
                bail!("usage: /delete <filename|#>");
            }
            let filename = match raw.parse::<usize>() {
                Ok(_) => entry_arg(app, Some(raw))?.item.filename,
                Err(_) => raw.to_string(),
            };
            if app.delete_history_item(&filename) {
                ChatReply::History
            } else {
                ChatReply::Nothing
            }
        }
        "send_result" => {
            let target = target_mode(intent, Mode::ImageToImage)?;
            app.send_result_to(target);
            ChatReply::Nothing
        }
        "send_answer" => {
            let target = target_mode(intent, Mode::TextToImage)?;
            app.send_answer_to(target);
            ChatReply::Nothing
        }
        "send_thinking" => {
            let target = target_mode(intent, Mode::TextToImage)?;
            app.send_thinking_to(target);
            ChatReply::Nothing
        }
        "status" => ChatReply::Status(app.status_report()),
        "shutdown" => {
            if app.shutdown() {
                ChatReply::Quit
            } else {
                ChatReply::Nothing
            }
        }
        "help" => ChatReply::Help,
        "quit" => ChatReply::Quit,
        _ => ChatReply::Unknown(intent.raw.trim().to_string()),
    };
    Ok(reply)
}

fn parse_index(raw: &str) -> Result<usize> {
    raw.parse::<usize>()
        .ok()
        .filter(|value| *value > 0)
        .with_context(|| format!("expected a number starting at 1, got '{raw}'"))
}

fn entry_arg<A: StudioApi>(app: &StudioApp<A>, raw: Option<&str>) -> Result<HistoryEntry> {
    let raw = raw.context("expected a history entry number from /history")?;
    let index = parse_index(raw)?;
    app.history_entry(index)
        .with_context(|| format!("no history entry {index} on this page"))
}

fn target_mode(intent: &Intent, default: Mode) -> Result<Mode> {
    match intent.arg_str("value").filter(|value| !value.is_empty()) {
        Some(raw) => raw.parse(),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use studio_contracts::chat::parse_intent;
    use studio_contracts::mode::Mode;
    use studio_contracts::stream::StreamEvent;

    use super::{dispatch, ChatReply};
    use crate::app::StudioApp;
    use crate::config::StudioConfig;
    use crate::session::{GenerationSession, SessionControl, SessionState};
    use crate::slots::Slot;
    use crate::testing::{sample_history, sse, FakeApi, ScriptedPrompter};

    fn run(app: &mut StudioApp<FakeApi>, line: &str) -> anyhow::Result<ChatReply> {
        let mut observer = |_: &StreamEvent, _: &GenerationSession| SessionControl::Continue;
        dispatch(app, &parse_intent(line), &mut observer)
    }

    fn studio(api: FakeApi) -> StudioApp<FakeApi> {
        StudioApp::new(
            api,
            StudioConfig::default(),
            Box::new(ScriptedPrompter::new(true)),
        )
    }

    #[test]
    fn console_lines_drive_a_generation() -> anyhow::Result<()> {
        let api = FakeApi::new().with_stream(sse(&["IMG|/outputs/t2i_0001.png", "DONE|ok"]));
        let mut app = studio(api);

        run(&mut app, "a lighthouse in fog")?;
        run(&mut app, "/steps 12")?;
        run(&mut app, "/ratio 16:9")?;
        let reply = run(&mut app, "/go")?;

        match reply {
            ChatReply::Session(Some(outcome)) => assert_eq!(outcome.state, SessionState::Completed),
            other => panic!("unexpected reply {other:?}"),
        }
        let requests = app.api.generate_requests.borrow();
        assert_eq!(requests[0].prompt, "a lighthouse in fog");
        assert_eq!(requests[0].steps, 12);
        assert_eq!(requests[0].height, 576);
        Ok(())
    }

    #[test]
    fn history_commands_page_and_restore() -> anyhow::Result<()> {
        let api = FakeApi::new().with_history(sample_history());
        let mut app = studio(api);

        assert!(matches!(run(&mut app, "/mode i2i")?, ChatReply::History));
        assert_eq!(app.mode(), Mode::ImageToImage);
        assert!(matches!(run(&mut app, "/icons 64")?, ChatReply::History));
        run(&mut app, "/restore 1")?;
        assert_eq!(app.prompt(), "make it blue");
        run(&mut app, "/load 1 2")?;
        assert_eq!(app.slots().get(Slot::Second), Some("/app/outputs/i2i_0002.png"));
        assert!(run(&mut app, "/restore 7").is_err());
        Ok(())
    }

    #[test]
    fn delete_by_page_number() -> anyhow::Result<()> {
        let api = FakeApi::new().with_history(sample_history());
        let mut app = studio(api);
        run(&mut app, "/history")?;
        assert!(matches!(run(&mut app, "/delete 1")?, ChatReply::History));
        assert_eq!(app.api.deleted.borrow().as_slice(), ["t2i_0001.png"]);
        Ok(())
    }

    #[test]
    fn bad_arguments_are_errors() {
        let mut app = studio(FakeApi::new());
        assert!(run(&mut app, "/mode video").is_err());
        assert!(run(&mut app, "/upload 3 a.png").is_err());
        assert!(run(&mut app, "/ratio wide").is_err());
        assert!(run(&mut app, "/lora x y").is_err());
        assert!(run(&mut app, "/icons 32").is_err());
    }

    #[test]
    fn unknown_and_quit() -> anyhow::Result<()> {
        let mut app = studio(FakeApi::new());
        match run(&mut app, "/teleport now")? {
            ChatReply::Unknown(raw) => assert_eq!(raw, "/teleport now"),
            other => panic!("unexpected reply {other:?}"),
        }
        assert!(matches!(run(&mut app, "/quit")?, ChatReply::Quit));
        assert!(matches!(run(&mut app, "/exit_server")?, ChatReply::Quit));
        assert!(matches!(run(&mut app, "/status")?, ChatReply::Status(_)));
        Ok(())
    }
}
