mod terminal;

use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use chartsignal_contracts::analysis::ResultPanel;
use chartsignal_contracts::chat::{parse_intent, Intent, PAGE_HELP_COMMANDS};
use chartsignal_contracts::events::{payload, EventWriter};
use chartsignal_contracts::models::{ModelSelector, CAPABILITY_VISION};
use chartsignal_contracts::ui::{Control, ModalKind, WidgetEvent};
use chartsignal_engine::files::load_chart_file;
use chartsignal_engine::{AppConfig, ChartApp, PageEvent, ResultRenderer};
use clap::{Parser, Subcommand};
use serde_json::json;

use terminal::{format_panel, TerminalView};

#[derive(Debug, Parser)]
#[command(name = "chartsignal", version, about = "Trading chart signal analyzer")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Analyze one chart image and print the signal.
    Analyze(AnalyzeArgs),
    /// Drive the upload page interactively from the terminal.
    Page(PageArgs),
    /// List the chart-reading models.
    Models(ModelsArgs),
}

#[derive(Debug, Parser)]
struct AnalyzeArgs {
    #[arg(long)]
    image: PathBuf,
    #[arg(long)]
    detailed: bool,
    #[arg(long)]
    json: bool,
    #[arg(long)]
    model: Option<String>,
    #[arg(long)]
    out: Option<PathBuf>,
    #[arg(long)]
    events: Option<PathBuf>,
}

#[derive(Debug, Parser)]
struct PageArgs {
    #[arg(long)]
    model: Option<String>,
    #[arg(long)]
    out: Option<PathBuf>,
    #[arg(long)]
    events: Option<PathBuf>,
}

#[derive(Debug, Parser)]
struct ModelsArgs {
    #[arg(long)]
    model: Option<String>,
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("chartsignal error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Analyze(args) => run_analyze(args),
        Command::Page(args) => {
            run_page(args)?;
            Ok(0)
        }
        Command::Models(args) => {
            run_models(args)?;
            Ok(0)
        }
    }
}

fn event_writer(out: Option<&Path>, events: Option<PathBuf>) -> EventWriter {
    let trace_id = EventWriter::new_trace_id();
    match events.or_else(|| out.map(|out| out.join("events.jsonl"))) {
        Some(path) => EventWriter::new(path, trace_id),
        None => EventWriter::in_memory(trace_id),
    }
}

fn run_analyze(args: AnalyzeArgs) -> Result<i32> {
    let config = AppConfig::from_env()?.with_model(args.model.as_deref());
    let events = event_writer(args.out.as_deref(), args.events);
    let gateway = config.gateway(events.clone())?;

    let file = load_chart_file(&args.image)?;
    file.validate()?;
    let image = file.to_data_url();
    events.record(
        "upload_accepted",
        payload(json!({
            "file": file.name,
            "media_type": file.media_type,
            "bytes": file.size(),
            "image": image.fingerprint(),
        })),
    );

    let result = gateway.quick_analyze(&image)?;
    let panel = ResultPanel::project(&result, config.unknown_signal);
    let report = if args.detailed {
        Some(gateway.detailed_analyze(&image)?)
    } else {
        None
    };

    if args.json {
        let out = json!({
            "result": result,
            "panel": panel,
            "report": report,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!("{}", format_panel(&panel));
        if let Some(report) = report {
            println!("\n{report}");
        }
    }
    Ok(0)
}

fn run_models(args: ModelsArgs) -> Result<()> {
    let config = AppConfig::from_env()?.with_model(args.model.as_deref());
    let registry = config.model_registry();
    let selected = ModelSelector::new(Some(registry.clone()))
        .select(Some(&config.model), CAPABILITY_VISION)?;
    for model in registry.list() {
        let marker = if model.name == selected.model.name { "*" } else { " " };
        println!(
            "{marker} {:<18} {:<8} {}",
            model.name,
            model.provider,
            model.capabilities.join(",")
        );
    }
    if let Some(reason) = selected.fallback_reason {
        println!("note: {reason}");
    }
    Ok(())
}

fn run_page(args: PageArgs) -> Result<()> {
    let config = AppConfig::from_env()?.with_model(args.model.as_deref());
    let events = event_writer(args.out.as_deref(), args.events);
    let gateway = config.gateway(events.clone())?;
    let auth = config.auth_backend()?;
    let mut app = ChartApp::new(
        TerminalView::interactive(),
        gateway,
        ResultRenderer::new(config.unknown_signal),
        auth,
        events,
    );

    println!("chartsignal page started. Type /help for commands.");
    if let Err(err) = app.start() {
        println!("[auth] session check failed: {err}");
    }
    app.pump_session_events();

    let stdin = io::stdin();
    let mut line = String::new();
    loop {
        print!("> ");
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

        let intent = parse_intent(line.trim_end_matches(['\n', '\r']));
        match intent.action.as_str() {
            "noop" => continue,
            "quit" => break,
            "help" => {
                println!("Commands: {}", PAGE_HELP_COMMANDS.join(" "));
                continue;
            }
            "status" => {
                print_status(&app, &config.model);
                continue;
            }
            _ => {}
        }

        match page_event(&intent) {
            Ok(Some(event)) => {
                if let Err(err) = app.handle(event) {
                    println!("  ({}: {err})", err.kind());
                }
            }
            Ok(None) => {}
            Err(err) => println!("{err:#}"),
        }
        app.pump_session_events();
    }
    Ok(())
}

fn print_status(app: &ChartApp<TerminalView>, model: &str) {
    let controller = app.controller();
    println!("widget: {}", controller.widget().state().name());
    println!(
        "stored image: {}",
        controller
            .stored_image()
            .map(|image| image.fingerprint())
            .unwrap_or_else(|| "none".to_string())
    );
    let buttons = app.auth_panel().buttons();
    println!("signed in: {}", buttons.logout);
    println!("model: {model}");
    println!("trace: {}", app.events().trace_id());
    if let Some(path) = app.events().path() {
        println!("events: {}", path.display());
    }
}

fn modal_arg(intent: &Intent) -> Result<ModalKind> {
    let raw = intent.arg_str("modal").unwrap_or_default();
    match ModalKind::parse(raw) {
        Some(kind) => Ok(kind),
        None => bail!("expected a modal name (signin or signup), got '{raw}'"),
    }
}

/// Maps a parsed terminal command onto a page gesture.
fn page_event(intent: &Intent) -> Result<Option<PageEvent>> {
    let event = match intent.action.as_str() {
        "choose_file" => {
            let Some(path) = intent.arg_str("path") else {
                bail!("/upload requires a path");
            };
            let file = load_chart_file(Path::new(path))?;
            PageEvent::Widget(WidgetEvent::FileChosen(file))
        }
        "drop" => {
            let mut files = Vec::new();
            for path in intent.arg_list("paths") {
                match load_chart_file(Path::new(&path)) {
                    Ok(file) => files.push(file),
                    Err(err) => println!("skipping {path}: {err:#}"),
                }
            }
            PageEvent::Widget(WidgetEvent::Drop(files))
        }
        "drag_over" => PageEvent::Widget(WidgetEvent::DragOver),
        "drag_leave" => PageEvent::Widget(WidgetEvent::DragLeave),
        "click" => {
            let control = match intent.arg_str("target").unwrap_or("area") {
                "area" => Control::UploadArea,
                "choose" | "button" => Control::ChooseFileButton,
                "retry" => Control::RetryButton,
                other => bail!("unknown click target '{other}' (area, choose, retry)"),
            };
            PageEvent::Widget(WidgetEvent::Click(control))
        }
        "retry" => PageEvent::Widget(WidgetEvent::Click(Control::RetryButton)),
        "detailed_report" => PageEvent::GetDetailedAnalysis,
        "close_report" => PageEvent::CloseReport,
        "open_modal" => PageEvent::OpenModal(modal_arg(intent)?),
        "close_modal" => PageEvent::CloseModal(modal_arg(intent)?),
        "click_outside_modal" => PageEvent::ClickOutsideModal(modal_arg(intent)?),
        "sign_in" | "sign_up" => {
            let kind = if intent.action == "sign_in" {
                ModalKind::SignIn
            } else {
                ModalKind::SignUp
            };
            PageEvent::Submit {
                kind,
                email: intent.arg_str("email").unwrap_or_default().to_string(),
                password: intent
                    .command_args
                    .get("password")
                    .and_then(|value| value.as_str())
                    .unwrap_or_default()
                    .to_string(),
            }
        }
        "logout" => PageEvent::Logout,
        "unknown" => {
            let command = intent.arg_str("command").unwrap_or_default();
            println!("Unknown command /{command}. Type /help for commands.");
            return Ok(None);
        }
        other => bail!("unsupported command: {other}"),
    };
    Ok(Some(event))
}
