use std::io::{self, ErrorKind, Write};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use studio_contracts::chat::{parse_intent, CHAT_HELP_COMMANDS};
use studio_contracts::events::EventWriter;
use studio_contracts::history::{HistoryPage, HistoryView, IconSize};
use studio_contracts::mode::Mode;
use studio_contracts::stream::StreamEvent;
use studio_engine::journal::LogLine;
use studio_engine::session::GenerationSession;
use studio_engine::slots::Slot;
use studio_engine::{
    dispatch, ChatReply, HttpStudioClient, Prompter, SessionControl, SessionOutcome,
    SessionState, StudioApi, StudioApp, StudioConfig,
};

#[derive(Debug, Parser)]
#[command(name = "studio-rs", version, about = "Console client for the image studio server")]
struct Cli {
    /// Server base URL (overrides STUDIO_API_BASE).
    #[arg(long, global = true)]
    api_base: Option<String>,
    /// Seconds allowed for JSON calls.
    #[arg(long, global = true, value_parser = parse_seconds_flag)]
    request_timeout: Option<f64>,
    /// Seconds allowed for a whole generate/analyze stream; 0 disables.
    #[arg(long, global = true, value_parser = parse_seconds_flag)]
    stream_timeout: Option<f64>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Chat(ChatArgs),
    Generate(GenerateArgs),
    Analyze(AnalyzeArgs),
    History(HistoryArgs),
    Delete(DeleteArgs),
    Upload(UploadArgs),
    ScanLoras(ScanLorasArgs),
    Stop(ConfirmArgs),
    Shutdown(ConfirmArgs),
}

#[derive(Debug, Parser)]
struct ChatArgs {
    #[arg(long, default_value = "t2i")]
    mode: Mode,
    #[arg(long)]
    events: Option<PathBuf>,
}

#[derive(Debug, Parser)]
struct GenerateArgs {
    #[arg(long, default_value = "t2i")]
    mode: Mode,
    #[arg(long, default_value = "")]
    prompt: String,
    /// Local input image; repeat for the second slot.
    #[arg(long = "image")]
    images: Vec<PathBuf>,
    #[arg(long)]
    width: Option<u32>,
    #[arg(long)]
    height: Option<u32>,
    #[arg(long)]
    steps: Option<u32>,
    #[arg(long)]
    guidance: Option<f64>,
    #[arg(long)]
    seed: Option<i64>,
    #[arg(long)]
    randomize: bool,
    #[arg(long)]
    strength: Option<f64>,
    #[arg(long)]
    mix: Option<f64>,
    /// `file[:strength]`, repeatable.
    #[arg(long = "lora")]
    loras: Vec<String>,
    #[arg(long)]
    lora_folder: Option<String>,
    #[arg(long)]
    events: Option<PathBuf>,
}

#[derive(Debug, Parser)]
struct AnalyzeArgs {
    /// Local image; repeat once to compare two images.
    #[arg(long = "image", required = true)]
    images: Vec<PathBuf>,
    #[arg(long, default_value = "")]
    prompt: String,
    #[arg(long)]
    top_k: Option<u32>,
    #[arg(long)]
    temperature: Option<f64>,
    #[arg(long)]
    events: Option<PathBuf>,
}

#[derive(Debug, Parser)]
struct HistoryArgs {
    #[arg(long, default_value = "t2i")]
    mode: Mode,
    /// Include items of every mode.
    #[arg(long)]
    all: bool,
    /// 1-based page number.
    #[arg(long, default_value_t = 1)]
    page: usize,
    /// 64px icons: 20 items per page instead of 10.
    #[arg(long)]
    small: bool,
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Parser)]
struct DeleteArgs {
    filename: String,
    #[arg(long)]
    yes: bool,
}

#[derive(Debug, Parser)]
struct UploadArgs {
    path: PathBuf,
}

#[derive(Debug, Parser)]
struct ScanLorasArgs {
    #[arg(long)]
    folder: Option<String>,
}

#[derive(Debug, Parser)]
struct ConfirmArgs {
    #[arg(long)]
    yes: bool,
}

/// Reads confirmations from stdin unless told to assume yes.
struct ConsolePrompter {
    assume_yes: bool,
}

impl Prompter for ConsolePrompter {
    fn confirm(&mut self, message: &str) -> bool {
        if self.assume_yes {
            return true;
        }
        print!("{message} [y/N] ");
        if io::stdout().flush().is_err() {
            return false;
        }
        let mut answer = String::new();
        match io::stdin().read_line(&mut answer) {
            Ok(_) => matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"),
            Err(_) => false,
        }
    }

    fn alert(&mut self, message: &str) {
        eprintln!("! {message}");
    }
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("studio-rs error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let config = StudioConfig::from_env()
        .with_api_base(cli.api_base.as_deref())
        .with_request_timeout(cli.request_timeout)
        .with_stream_timeout(cli.stream_timeout);
    match cli.command {
        Command::Chat(args) => {
            run_chat(config, args)?;
            Ok(0)
        }
        Command::Generate(args) => run_generate(config, args),
        Command::Analyze(args) => run_analyze(config, args),
        Command::History(args) => run_history(config, args),
        Command::Delete(args) => run_delete(config, args),
        Command::Upload(args) => run_upload(config, args),
        Command::ScanLoras(args) => run_scan_loras(config, args),
        Command::Stop(args) => run_stop(config, args),
        Command::Shutdown(args) => run_shutdown(config, args),
    }
}

fn build_app(
    config: StudioConfig,
    assume_yes: bool,
    events: Option<PathBuf>,
) -> Result<StudioApp<HttpStudioClient>> {
    let client = HttpStudioClient::new(config.clone())?;
    let mut app = StudioApp::new(client, config, Box::new(ConsolePrompter { assume_yes }))
        .with_log_sink(Box::new(|line: &LogLine| println!("{line}")));
    if let Some(path) = events {
        app = app.with_event_writer(EventWriter::with_new_session(path));
    }
    Ok(app)
}

fn run_chat(config: StudioConfig, args: ChatArgs) -> Result<()> {
    let api_base = config.api_base.clone();
    let mut app = build_app(config, false, args.events)?;
    app.switch_mode(args.mode);

    println!("Studio chat on {api_base} ({}). Type /help for commands.", app.mode());
    print_history(app.history_page(), app.history_view());

    let stdin = io::stdin();
    let mut line = String::new();
    loop {
        print!("{}> ", app.mode());
        io::stdout().flush()?;

        line.clear();
        let read = match stdin.read_line(&mut line) {
            Ok(read) => read,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        };
        if read == 0 {
            break;
        }

        let input = line.trim_end_matches(['\n', '\r']);
        let intent = parse_intent(input);
        if intent.action == "noop" {
            continue;
        }

        let mut observer = print_stream_event;
        let reply = match dispatch(&mut app, &intent, &mut observer) {
            Ok(reply) => reply,
            Err(err) => {
                println!("{err:#}");
                continue;
            }
        };
        match reply {
            ChatReply::Nothing => {}
            ChatReply::Status(lines) => {
                for line in lines {
                    println!("{line}");
                }
            }
            ChatReply::History => print_history(app.history_page(), app.history_view()),
            ChatReply::Help => println!("Commands: {}", CHAT_HELP_COMMANDS.join(" ")),
            ChatReply::Session(outcome) => {
                if let Some(outcome) = outcome {
                    print_outcome(&outcome);
                    if outcome.state == SessionState::Completed {
                        print_history(app.history_page(), app.history_view());
                    }
                }
            }
            ChatReply::Unknown(raw) => println!("Unknown command: {raw} (try /help)"),
            ChatReply::Quit => break,
        }
    }
    Ok(())
}

fn print_stream_event(event: &StreamEvent, _session: &GenerationSession) -> SessionControl {
    match event {
        StreamEvent::ImageReady(path) => println!("[image] {path}"),
        StreamEvent::TextDelta(delta) => println!("{delta}"),
        StreamEvent::Log(_) | StreamEvent::Done(_) | StreamEvent::Error(_) => {}
    }
    SessionControl::Continue
}

fn print_outcome(outcome: &SessionOutcome) {
    let message = outcome.message.as_deref().unwrap_or_default();
    println!("[{}] {message}", outcome.state);
    if let Some(image) = outcome.last_image.as_deref() {
        println!("result: {image}");
    }
    if !outcome.split.thinking.is_empty() {
        println!("--- thinking ---\n{}", outcome.split.thinking);
    }
    if !outcome.split.answer.is_empty() {
        println!("--- answer ---\n{}", outcome.split.answer);
    }
}

fn print_history(page: &HistoryPage, view: HistoryView) {
    println!(
        "History [{}px{}] {}",
        view.icon_size.pixels(),
        if view.show_all { ", all modes" } else { "" },
        page.label()
    );
    for (idx, entry) in page.entries.iter().enumerate() {
        let item = &entry.item;
        let prompt = item.prompt().unwrap_or_default();
        let mut flags = Vec::new();
        if !entry.restorable {
            flags.push("reference only");
        }
        if entry.loadable {
            flags.push("loadable");
        }
        println!(
            "{:>3}. [{}] {} {}  {}{}",
            idx + 1,
            item.mode_label(),
            item.display_time(),
            item.filename,
            truncate_chars(prompt, 60),
            if flags.is_empty() {
                String::new()
            } else {
                format!("  ({})", flags.join(", "))
            }
        );
    }
    if page.has_prev() || page.has_next() {
        let mut nav = Vec::new();
        if page.has_prev() {
            nav.push("/page prev");
        }
        if page.has_next() {
            nav.push("/page next");
        }
        println!("     {}", nav.join("  "));
    }
}

fn parse_seconds_flag(raw: &str) -> Result<f64> {
    let seconds = raw
        .trim()
        .parse::<f64>()
        .with_context(|| format!("'{raw}' is not a number of seconds"))?;
    if !seconds.is_finite() {
        bail!("'{raw}' is not a finite number of seconds");
    }
    Ok(seconds)
}

fn truncate_chars(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}

fn session_exit_code(outcome: Option<&SessionOutcome>) -> i32 {
    match outcome.map(|outcome| outcome.state) {
        Some(SessionState::Completed) => 0,
        Some(SessionState::Aborted) => 130,
        _ => 1,
    }
}

fn parse_lora_flag(raw: &str) -> Result<(String, Option<f64>)> {
    match raw.rsplit_once(':') {
        Some((file, strength)) if !file.is_empty() => {
            let strength = strength
                .parse::<f64>()
                .with_context(|| format!("bad LoRA strength in '{raw}'"))?;
            Ok((file.to_string(), Some(strength)))
        }
        _ => Ok((raw.to_string(), None)),
    }
}

fn upload_inputs<A: StudioApi>(app: &mut StudioApp<A>, images: &[PathBuf]) -> Result<()> {
    if images.len() > 2 {
        bail!("at most two --image inputs are supported");
    }
    for (path, slot) in images.iter().zip([Slot::First, Slot::Second]) {
        if !app.upload(slot, path) {
            bail!("upload of {} failed", path.display());
        }
    }
    Ok(())
}

fn apply_param<A: StudioApi>(
    app: &mut StudioApp<A>,
    name: &str,
    value: Option<impl ToString>,
) -> Result<()> {
    if let Some(value) = value {
        let value = value.to_string();
        if !app.set_param(name, &value) {
            bail!("invalid --{name} {value}");
        }
    }
    Ok(())
}

fn run_generate(config: StudioConfig, args: GenerateArgs) -> Result<i32> {
    if args.mode.is_analysis() {
        bail!("use `studio-rs analyze` for i2t");
    }
    let mut app = build_app(config, true, args.events)?;
    app.switch_mode(args.mode);
    upload_inputs(&mut app, &args.images)?;
    app.set_prompt(&args.prompt);

    apply_param(&mut app, "width", args.width)?;
    apply_param(&mut app, "height", args.height)?;
    apply_param(&mut app, "steps", args.steps)?;
    apply_param(&mut app, "guidance", args.guidance)?;
    apply_param(&mut app, "seed", args.seed)?;
    if args.randomize {
        apply_param(&mut app, "randomize", Some("on"))?;
    }
    apply_param(&mut app, "strength", args.strength)?;
    apply_param(&mut app, "mix", args.mix)?;

    if let Some(folder) = args.lora_folder.as_deref() {
        app.set_lora_folder(folder);
    }
    for (idx, raw) in args.loras.iter().enumerate() {
        let (file, strength) = parse_lora_flag(raw)?;
        while app.loras().slots().len() <= idx {
            app.add_lora_slot();
        }
        if !app.set_lora(idx + 1, &file, strength) {
            bail!("invalid --lora {raw}");
        }
    }

    if let Some(hint) = app.invalid_hint() {
        bail!("{hint}");
    }
    let outcome = app.generate(print_stream_event);
    if let Some(outcome) = outcome.as_ref() {
        print_outcome(outcome);
    }
    Ok(session_exit_code(outcome.as_ref()))
}

fn run_analyze(config: StudioConfig, args: AnalyzeArgs) -> Result<i32> {
    let mut app = build_app(config, true, args.events)?;
    app.switch_mode(Mode::ImageToText);
    upload_inputs(&mut app, &args.images)?;
    app.set_prompt(&args.prompt);
    apply_param(&mut app, "top_k", args.top_k)?;
    apply_param(&mut app, "temperature", args.temperature)?;

    // Deltas are shown once, split, at the end.
    let outcome = app.generate(|_: &StreamEvent, _: &GenerationSession| SessionControl::Continue);
    if let Some(outcome) = outcome.as_ref() {
        print_outcome(outcome);
    }
    Ok(session_exit_code(outcome.as_ref()))
}

fn run_history(config: StudioConfig, args: HistoryArgs) -> Result<i32> {
    let client = HttpStudioClient::new(config.clone())?;
    let mut app = StudioApp::new(client, config, Box::new(ConsolePrompter { assume_yes: false }));
    app.switch_mode(args.mode);
    if args.small {
        app.set_icon_size(IconSize::Small);
    }
    if args.all {
        app.toggle_show_all();
    }
    for _ in 1..args.page.max(1) {
        if !app.change_page(1) {
            break;
        }
    }
    for line in app.console() {
        eprintln!("{line}");
    }
    if args.json {
        let items: Vec<_> = app
            .history_page()
            .entries
            .iter()
            .map(|entry| &entry.item)
            .collect();
        println!("{}", serde_json::to_string_pretty(&items)?);
    } else {
        print_history(app.history_page(), app.history_view());
    }
    Ok(0)
}

fn run_delete(config: StudioConfig, args: DeleteArgs) -> Result<i32> {
    let mut app = build_app(config, args.yes, None)?;
    app.refresh_history();
    // Items can only be deleted from their own mode.
    let owner_mode = app
        .find_history_item(&args.filename)
        .and_then(|item| item.mode());
    if let Some(mode) = owner_mode.filter(|mode| *mode != app.mode()) {
        app.switch_mode(mode);
    }
    Ok(if app.delete_history_item(&args.filename) {
        0
    } else {
        1
    })
}

fn run_upload(config: StudioConfig, args: UploadArgs) -> Result<i32> {
    let client = HttpStudioClient::new(config)?;
    let path = client.upload_image(&args.path)?;
    println!("{path}");
    Ok(0)
}

fn run_scan_loras(config: StudioConfig, args: ScanLorasArgs) -> Result<i32> {
    let folder = args
        .folder
        .unwrap_or_else(|| config.lora_folder.clone());
    let client = HttpStudioClient::new(config)?;
    let files = client
        .scan_loras(&folder)
        .with_context(|| format!("scanning {folder}"))?;
    if files.is_empty() {
        eprintln!("No LoRA files in {folder}");
    }
    for file in files {
        println!("{file}");
    }
    Ok(0)
}

fn run_stop(config: StudioConfig, args: ConfirmArgs) -> Result<i32> {
    let mut app = build_app(config, args.yes, None)?;
    Ok(if app.request_stop() { 0 } else { 1 })
}

fn run_shutdown(config: StudioConfig, args: ConfirmArgs) -> Result<i32> {
    let mut app = build_app(config, args.yes, None)?;
    Ok(if app.shutdown() { 0 } else { 1 })
}

#[cfg(test)]
mod tests {
    use clap::Parser;
    use studio_contracts::mode::Mode;

    use super::{parse_lora_flag, truncate_chars, Cli, Command};

    #[test]
    fn parses_global_flags_and_generate() -> anyhow::Result<()> {
        let cli = Cli::try_parse_from([
            "studio-rs",
            "--api-base",
            "http://gpu:7860",
            "generate",
            "--mode",
            "i2i",
            "--prompt",
            "make it blue",
            "--image",
            "a.png",
            "--image",
            "b.png",
            "--lora",
            "detail.safetensors:0.6",
        ])?;
        assert_eq!(cli.api_base.as_deref(), Some("http://gpu:7860"));
        match cli.command {
            Command::Generate(args) => {
                assert_eq!(args.mode, Mode::ImageToImage);
                assert_eq!(args.images.len(), 2);
                assert_eq!(args.loras, vec!["detail.safetensors:0.6"]);
            }
            other => panic!("unexpected command {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn rejects_unknown_mode() {
        assert!(Cli::try_parse_from(["studio-rs", "chat", "--mode", "video"]).is_err());
        assert!(Cli::try_parse_from(["studio-rs", "analyze"]).is_err());
    }

    #[test]
    fn timeout_flags_must_be_finite() -> anyhow::Result<()> {
        let cli = Cli::try_parse_from(["studio-rs", "--request-timeout", "12.5", "stop"])?;
        assert_eq!(cli.request_timeout, Some(12.5));
        assert!(Cli::try_parse_from(["studio-rs", "--request-timeout", "nan", "history"]).is_err());
        assert!(Cli::try_parse_from(["studio-rs", "--stream-timeout", "inf", "history"]).is_err());
        assert!(Cli::try_parse_from(["studio-rs", "--stream-timeout", "soon", "history"]).is_err());
        Ok(())
    }

    #[test]
    fn lora_flag_strength_is_optional() -> anyhow::Result<()> {
        assert_eq!(
            parse_lora_flag("detail.safetensors:0.6")?,
            ("detail.safetensors".to_string(), Some(0.6))
        );
        assert_eq!(
            parse_lora_flag("detail.safetensors")?,
            ("detail.safetensors".to_string(), None)
        );
        assert!(parse_lora_flag("detail.safetensors:strong").is_err());
        Ok(())
    }

    #[test]
    fn truncates_long_prompts() {
        assert_eq!(truncate_chars("short", 10), "short");
        assert_eq!(truncate_chars("abcdefghij", 4), "abcd…");
    }
}
