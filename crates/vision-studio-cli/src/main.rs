use std::fs;
use std::io::{self, BufRead, ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing_subscriber::EnvFilter;
use vision_studio_contracts::chat::{parse_intent, Intent, CHAT_HELP_COMMANDS};
use vision_studio_contracts::events::{EventLog, SessionEvent, SessionMode};
use vision_studio_contracts::Operation;
use vision_studio_engine::{
    load_source_image, Dispatcher, DryrunClient, GeminiClient, GenerationRequest,
    ImageModelClient, ResolvedImage, Rotation, SessionState, StudioConfig,
};

const DRYRUN_API_KEY: &str = "dryrun";

#[derive(Debug, Parser)]
#[command(
    name = "vision-studio",
    version,
    about = "Edit, fuse, restore, and generate images with Gemini"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Chat(ChatArgs),
    Run(RunArgs),
}

#[derive(Debug, Parser)]
struct ChatArgs {
    /// Directory `/save` writes into when no path is given.
    #[arg(long, default_value = ".")]
    out: PathBuf,
    #[arg(long)]
    events: Option<PathBuf>,
    /// Answer locally with placeholder images instead of calling Gemini.
    #[arg(long)]
    dryrun: bool,
}

#[derive(Debug, Parser)]
struct RunArgs {
    #[arg(long, value_parser = parse_operation)]
    operation: Operation,
    #[arg(long)]
    prompt: Option<String>,
    #[arg(long = "image")]
    images: Vec<PathBuf>,
    /// Clockwise degrees per image, in `--image` order.
    #[arg(long = "rotate")]
    rotations: Vec<u32>,
    #[arg(long)]
    out: Option<PathBuf>,
    #[arg(long)]
    events: Option<PathBuf>,
    #[arg(long)]
    dryrun: bool,
}

fn parse_operation(raw: &str) -> Result<Operation, String> {
    Operation::parse(raw).ok_or_else(|| {
        format!("unknown operation '{raw}' (expected edit, fusion, restoration, or text_to_image)")
    })
}

fn main() {
    init_tracing();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("vision-studio error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Chat(args) => {
            run_chat_native(args)?;
            Ok(0)
        }
        Command::Run(args) => run_run_native(args),
    }
}

/// A missing key is only fatal when the remote client is actually used.
fn load_config(dryrun: bool) -> Result<StudioConfig> {
    match StudioConfig::from_env() {
        Ok(config) => Ok(config),
        Err(err) if dryrun => {
            tracing::debug!(error = %err, "no API key, continuing in dryrun mode");
            Ok(StudioConfig::with_api_key(DRYRUN_API_KEY))
        }
        Err(err) => Err(err),
    }
}

fn build_client(config: &StudioConfig, dryrun: bool) -> Box<dyn ImageModelClient> {
    if dryrun {
        Box::new(DryrunClient::new())
    } else {
        Box::new(GeminiClient::new(config))
    }
}

/// Events go to `--events` when given; otherwise only counters are kept.
fn open_event_log(path: Option<&Path>) -> Result<EventLog> {
    let session_id = uuid::Uuid::new_v4().to_string();
    match path {
        Some(path) => EventLog::open(path, session_id),
        None => Ok(EventLog::disabled(session_id)),
    }
}

fn run_chat_native(args: ChatArgs) -> Result<()> {
    let config = load_config(args.dryrun)?;
    let client = build_client(&config, args.dryrun);
    let dispatcher = Dispatcher::new(&config, client.as_ref());
    let events = open_event_log(args.events.as_deref())?;
    let mut chat = ChatLoop::new(dispatcher, args.out, events);
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    drive_chat(&mut chat, stdin.lock(), &mut stdout)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

struct ChatLoop<'a> {
    dispatcher: Dispatcher<'a>,
    session: SessionState,
    out_dir: PathBuf,
    events: EventLog,
}

fn drive_chat<R: BufRead, W: Write>(
    chat: &mut ChatLoop<'_>,
    mut input: R,
    output: &mut W,
) -> Result<()> {
    chat.events.record(&SessionEvent::SessionStarted {
        mode: SessionMode::Chat,
        client: chat.dispatcher.client_name().to_string(),
        operation: chat.session.operation(),
    })?;
    writeln!(
        output,
        "Vision Studio chat started ({}). Type /help for commands.",
        chat.dispatcher.client_name()
    )?;

    let mut line = String::new();
    loop {
        write!(output, "> ")?;
        output.flush()?;

        line.clear();
        let read = match input.read_line(&mut line) {
            Ok(read) => read,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        };
        if read == 0 {
            break;
        }

        let intent = parse_intent(line.trim_end_matches(['\n', '\r']));
        if chat.handle(&intent, output)? == Flow::Quit {
            break;
        }
    }

    chat.events.finish()
}

impl<'a> ChatLoop<'a> {
    fn new(dispatcher: Dispatcher<'a>, out_dir: PathBuf, events: EventLog) -> Self {
        Self {
            dispatcher,
            session: SessionState::new(),
            out_dir,
            events,
        }
    }

    fn handle<W: Write>(&mut self, intent: &Intent, out: &mut W) -> Result<Flow> {
        match intent.action.as_str() {
            "noop" => {}
            "help" => {
                writeln!(out, "Commands: {}", CHAT_HELP_COMMANDS.join(" "))?;
                writeln!(out, "Any other text generates with the current operation.")?;
                writeln!(out, "{}", self.session.operation().example_prompt())?;
            }
            "set_mode" => self.set_mode(intent.arg_str("operation").unwrap_or_default(), out)?,
            "upload" => {
                let paths: Vec<&str> = intent
                    .command_args
                    .get("paths")
                    .and_then(Value::as_array)
                    .map(|paths| paths.iter().filter_map(Value::as_str).collect())
                    .unwrap_or_default();
                self.upload(&paths, out)?;
            }
            "rotate_upload" => {
                let Some(rotation) = rotation_arg(intent) else {
                    writeln!(out, "{}", rotation_usage())?;
                    return Ok(Flow::Continue);
                };
                let slot = intent
                    .command_args
                    .get("slot")
                    .and_then(Value::as_u64)
                    .and_then(|slot| usize::try_from(slot).ok())
                    .unwrap_or(1);
                match self.session.rotate_upload(slot, rotation) {
                    Ok(()) => writeln!(out, "Image {slot} rotated {}°", rotation.degrees())?,
                    Err(err) => writeln!(out, "Cannot rotate: {err:#}")?,
                }
            }
            "rotate_result" => {
                let Some(rotation) = rotation_arg(intent) else {
                    writeln!(out, "{}", rotation_usage())?;
                    return Ok(Flow::Continue);
                };
                match self.session.rotate_result(rotation) {
                    Ok(()) => writeln!(out, "Result rotated {}°", rotation.degrees())?,
                    Err(err) => writeln!(out, "Cannot rotate: {err:#}")?,
                }
            }
            "generate" => {
                let prompt = intent.prompt.as_deref().unwrap_or_default();
                self.generate(prompt, out)?;
            }
            "save" => {
                let path = intent.arg_str("path").unwrap_or_default();
                if let Err(err) = self.save(path, out) {
                    writeln!(out, "Save failed: {err:#}")?;
                }
            }
            "reset" => {
                self.session.reset_result();
                writeln!(out, "Result cleared.")?;
            }
            "status" => {
                for line in self.session.summary() {
                    writeln!(out, "{line}")?;
                }
            }
            "quit" => return Ok(Flow::Quit),
            _ => {
                let command = intent.arg_str("command").unwrap_or(intent.raw.as_str());
                writeln!(out, "Unknown command /{command}. Type /help for commands.")?;
            }
        }
        Ok(Flow::Continue)
    }

    fn set_mode<W: Write>(&mut self, raw: &str, out: &mut W) -> Result<()> {
        if raw.trim().is_empty() {
            let names: Vec<&str> = Operation::ALL.iter().map(|op| op.slug()).collect();
            writeln!(
                out,
                "Operation is {}. Choose one of: {}",
                self.session.operation(),
                names.join(", ")
            )?;
            return Ok(());
        }
        match Operation::parse(raw) {
            Some(operation) => {
                self.session.set_operation(operation);
                writeln!(out, "Operation set to {operation}: {}", operation.description())?;
                writeln!(out, "{}", operation.example_prompt())?;
            }
            None => writeln!(out, "{}", parse_operation(raw).err().unwrap_or_default())?,
        }
        Ok(())
    }

    fn upload<W: Write>(&mut self, paths: &[&str], out: &mut W) -> Result<()> {
        let operation = self.session.operation();
        let expected = operation.required_images();
        if expected == 0 {
            writeln!(out, "{operation} takes no source images.")?;
            return Ok(());
        }
        if paths.len() != expected {
            writeln!(
                out,
                "{operation} needs {expected} image path(s), got {}.",
                paths.len()
            )?;
            return Ok(());
        }

        let mut loaded = Vec::with_capacity(paths.len());
        for path in paths {
            match load_source_image(Path::new(path)) {
                Ok(image) => loaded.push(image),
                Err(err) => {
                    writeln!(out, "Upload failed: {err:#}")?;
                    return Ok(());
                }
            }
        }
        let mut loaded = loaded.into_iter();
        match (loaded.next(), loaded.next()) {
            (Some(first), Some(second)) => self.session.upload_fusion(first, second),
            (Some(image), None) => self.session.upload(image),
            _ => return Ok(()),
        }
        for line in self.session.summary() {
            writeln!(out, "{line}")?;
        }
        Ok(())
    }

    fn generate<W: Write>(&mut self, prompt: &str, out: &mut W) -> Result<()> {
        let operation = self.session.operation();
        self.events.record(&SessionEvent::GenerationStarted {
            operation,
            prompt: prompt.to_string(),
            images: self.session.source_count(),
        })?;

        match self.session.generate(&self.dispatcher, prompt) {
            Ok(image) => {
                writeln!(
                    out,
                    "Generated {}x{} {} image. Use /save to write it.",
                    image.width(),
                    image.height(),
                    image.encoding()
                )?;
                let event = succeeded_event(operation, image);
                self.events.record(&event)?;
            }
            Err(diagnostic) => {
                writeln!(out, "{}", diagnostic.user_message())?;
                self.events
                    .record(&SessionEvent::generation_failed(operation, &diagnostic))?;
            }
        }
        Ok(())
    }

    fn save<W: Write>(&mut self, path: &str, out: &mut W) -> Result<()> {
        let download = self.session.download()?;
        let operation = self.session.result_operation().unwrap_or(self.session.operation());
        let target = if path.trim().is_empty() {
            self.out_dir.join(&download.filename)
        } else {
            PathBuf::from(path)
        };
        write_png(&target, &download.png)?;
        writeln!(out, "Saved {}", target.display())?;
        self.events.record(&SessionEvent::ArtifactSaved {
            operation,
            path: target.display().to_string(),
            rotation: self.session.result_rotation().degrees(),
            bytes: download.png.len(),
        })
    }
}

fn rotation_arg(intent: &Intent) -> Option<Rotation> {
    intent
        .command_args
        .get("degrees")
        .and_then(Value::as_u64)
        .and_then(|degrees| u32::try_from(degrees).ok())
        .and_then(Rotation::from_degrees)
}

fn rotation_usage() -> String {
    let degrees: Vec<String> = Rotation::DEGREES.iter().map(u32::to_string).collect();
    format!("Rotation must be one of {} degrees.", degrees.join(", "))
}

fn succeeded_event(operation: Operation, image: &ResolvedImage) -> SessionEvent {
    SessionEvent::GenerationSucceeded {
        operation,
        mime_type: image.encoding().mime_type().to_string(),
        width: image.width(),
        height: image.height(),
    }
}

fn write_png(path: &Path, png: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed creating {}", parent.display()))?;
    }
    fs::write(path, png).with_context(|| format!("failed writing {}", path.display()))
}

fn run_run_native(args: RunArgs) -> Result<i32> {
    let config = load_config(args.dryrun)?;
    let client = build_client(&config, args.dryrun);
    let dispatcher = Dispatcher::new(&config, client.as_ref());
    let prompt = args
        .prompt
        .clone()
        .unwrap_or_else(|| args.operation.default_prompt().to_string());
    let request = build_run_request(args.operation, &prompt, &args.images, &args.rotations)?;
    let out_path = args
        .out
        .clone()
        .unwrap_or_else(|| PathBuf::from(args.operation.default_output_filename()));
    let mut events = open_event_log(args.events.as_deref())?;
    run_single(&dispatcher, &request, &out_path, &mut events)
}

fn build_run_request(
    operation: Operation,
    prompt: &str,
    images: &[PathBuf],
    rotations: &[u32],
) -> Result<GenerationRequest> {
    if rotations.len() > images.len() {
        bail!(
            "got {} --rotate value(s) for {} image(s)",
            rotations.len(),
            images.len()
        );
    }
    let mut request = GenerationRequest::new(operation, prompt);
    for (index, path) in images.iter().enumerate() {
        let mut source = load_source_image(path)?;
        if let Some(&degrees) = rotations.get(index) {
            let Some(rotation) = Rotation::from_degrees(degrees) else {
                bail!("unsupported rotation {degrees} for {}", path.display());
            };
            source.set_rotation(rotation);
        }
        request = request.with_image(source.oriented());
    }
    Ok(request)
}

/// Exit code 0 when an image was written, 2 when the run ended in a diagnostic.
fn run_single(
    dispatcher: &Dispatcher<'_>,
    request: &GenerationRequest,
    out_path: &Path,
    events: &mut EventLog,
) -> Result<i32> {
    let operation = request.operation;
    events.record(&SessionEvent::SessionStarted {
        mode: SessionMode::Run,
        client: dispatcher.client_name().to_string(),
        operation,
    })?;
    events.record(&SessionEvent::GenerationStarted {
        operation,
        prompt: request.prompt.clone(),
        images: request.images.len(),
    })?;

    let code = match dispatcher.dispatch(request) {
        Ok(image) => {
            events.record(&succeeded_event(operation, &image))?;
            let png = image.to_png_bytes()?;
            write_png(out_path, &png)?;
            println!("Saved {}", out_path.display());
            events.record(&SessionEvent::ArtifactSaved {
                operation,
                path: out_path.display().to_string(),
                rotation: 0,
                bytes: png.len(),
            })?;
            0
        }
        Err(diagnostic) => {
            eprintln!("{}", diagnostic.user_message());
            events.record(&SessionEvent::generation_failed(operation, &diagnostic))?;
            2
        }
    };

    events.finish()?;
    Ok(code)
}
