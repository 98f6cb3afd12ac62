//! Purpose: `catalog-boot` CLI entrypoint: parse args, install logging, dispatch, map exit codes.
//! Exports: binary entrypoint only.
//! Role: Thin shell over `catalog_boot::api`; results go to stdout, diagnostics to stderr.
//! Invariants: stdout carries exactly one JSON document per invocation.
//! Invariants: Exit codes come from `to_exit_code`, so scripts can branch on error class.
use std::io::{self, IsTerminal};
use std::time::Duration;

use catalog_boot::api::{
    BootstrapConfig, BootstrapOutcome, Error, ErrorKind, LinkRules, Navigation, to_exit_code,
};
use catalog_boot::notice::{Notice, notice_json};
use clap::error::ErrorKind as ClapErrorKind;
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde_json::{Map, Value, json};
use std::error::Error as StdError;
use tracing_subscriber::EnvFilter;

mod command_dispatch;

struct RunOutcome {
    exit_code: i32,
}

impl RunOutcome {
    fn ok() -> Self {
        Self { exit_code: 0 }
    }

    fn with_code(exit_code: i32) -> Self {
        Self { exit_code }
    }
}

fn main() {
    let exit_code = match run() {
        Ok(outcome) => outcome.exit_code,
        Err((err, color_mode)) => {
            emit_error(&err, color_mode);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn run() -> Result<RunOutcome, (Error, ColorMode)> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => match err.kind() {
            ClapErrorKind::DisplayHelp
            | ClapErrorKind::DisplayVersion
            | ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                err.print().map_err(|io_err| {
                    (
                        Error::new(ErrorKind::Io)
                            .with_message("failed to write help")
                            .with_source(io_err),
                        ColorMode::Auto,
                    )
                })?;
                let exit_code = if matches!(
                    err.kind(),
                    ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
                ) {
                    2
                } else {
                    0
                };
                return Ok(RunOutcome::with_code(exit_code));
            }
            _ => {
                return Err((
                    Error::new(ErrorKind::Usage)
                        .with_message(clap_error_summary(&err))
                        .with_hint("Try `catalog-boot --help`."),
                    ColorMode::Auto,
                ));
            }
        },
    };

    init_tracing();
    let color_mode = cli.color;
    command_dispatch::dispatch_command(cli.command, color_mode)
        .map_err(add_transient_hint)
        .map_err(|err| (err, color_mode))
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}

#[derive(Parser)]
#[command(
    name = "catalog-boot",
    version,
    about = "Run a library catalog client's startup hydration and deep-link routing",
    long_about = None,
    after_help = r#"EXAMPLES
  $ catalog-boot stages
  $ catalog-boot resolve-link 'libapp://Browse/GroupedWork/123'
  $ catalog-boot hydrate --library-url https://catalog.example.org --token "$TOKEN"
  $ catalog-boot session --library-url https://catalog.example.org   # stdin: focus | link <url> | notify <json> | quit

Logging goes to stderr; set RUST_LOG=debug to trace each stage."#,
    arg_required_else_help = true
)]
struct Cli {
    #[arg(
        long,
        default_value = "auto",
        value_enum,
        help = "Colorize stderr diagnostics and pretty JSON output: auto|always|never"
    )]
    color: ColorMode,

    #[command(subcommand)]
    command: Command,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum ColorMode {
    Auto,
    Always,
    Never,
}

impl ColorMode {
    fn use_color(self, is_tty: bool) -> bool {
        match self {
            ColorMode::Auto => is_tty,
            ColorMode::Always => true,
            ColorMode::Never => false,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    #[command(about = "Run one bootstrap against a library and print the outcome")]
    Hydrate {
        #[command(flatten)]
        library: LibraryArgs,
        #[arg(long, help = "Cold-start deep link to route to once hydration completes")]
        link: Option<String>,
        #[arg(long, help = "Push-notification payload (JSON) carrying an optional url")]
        notification_json: Option<String>,
        #[arg(long, help = "Print progress notices to stderr as stages apply")]
        progress: bool,
    },
    #[command(about = "Show the route a deep link resolves to, without fetching anything")]
    ResolveLink {
        raw: String,
        #[arg(long, env = "CATALOG_BOOT_LIBRARY_BASE_URL")]
        library_base_url: Option<String>,
        #[command(flatten)]
        links: LinkArgs,
    },
    #[command(about = "Print the stage graph and its launch order")]
    Stages {
        #[arg(long, default_value = "https://catalog.example.org")]
        library_url: String,
    },
    #[command(
        about = "Keep a session open; stdin lines drive refocus and link arrivals",
        long_about = r#"Bootstraps once, then reads commands from stdin:
  focus          restart hydration (drops an in-flight run)
  link <url>     queue a deep link for the next completed run
  notify <json>  queue the url carried by a notification payload
  quit           stop after the current step
Each outcome is written to stderr as a notice; the last one goes to stdout."#
    )]
    Session {
        #[command(flatten)]
        library: LibraryArgs,
    },
}

#[derive(Args, Clone, Debug)]
struct LibraryArgs {
    #[arg(long, env = "CATALOG_BOOT_LIBRARY_URL")]
    library_url: String,
    #[arg(long, env = "CATALOG_BOOT_TIMEOUT", default_value = "30s")]
    timeout: String,
    #[arg(long, env = "CATALOG_BOOT_MAX_CATEGORIES", default_value_t = 5)]
    max_categories: usize,
    #[arg(long, env = "CATALOG_BOOT_LANDING_ROUTE", default_value = "DrawerStack")]
    landing_route: String,
    #[arg(long, env = "CATALOG_BOOT_LANGUAGE", default_value = "en")]
    fallback_language: String,
    #[arg(long, env = "CATALOG_BOOT_TOKEN", hide_env_values = true)]
    token: Option<String>,
    #[command(flatten)]
    links: LinkArgs,
}

#[derive(Args, Clone, Debug)]
struct LinkArgs {
    #[arg(long, env = "CATALOG_BOOT_PUBLIC_PREFIX", default_value = "https://libapp.link/")]
    public_prefix: String,
    #[arg(long, env = "CATALOG_BOOT_PRIVATE_SCHEME", default_value = "libapp")]
    private_scheme: String,
}

impl LinkArgs {
    fn rules(&self) -> LinkRules {
        LinkRules {
            private_scheme: self.private_scheme.trim_end_matches("://").to_string(),
            public_prefix: self.public_prefix.clone(),
            ..LinkRules::default()
        }
    }
}

fn build_config(args: &LibraryArgs) -> Result<BootstrapConfig, Error> {
    let mut config = BootstrapConfig::new(&args.library_url)?
        .with_fetch_timeout(parse_duration(&args.timeout)?)
        .with_max_categories(args.max_categories)
        .with_landing_route(args.landing_route.clone())
        .with_fallback_language(args.fallback_language.clone())
        .with_link_rules(args.links.rules());
    if let Some(token) = &args.token {
        config = config.with_session_token(token.clone());
    }
    config.validate()?;
    Ok(config)
}

fn parse_duration(input: &str) -> Result<Duration, Error> {
    let invalid = || {
        Error::new(ErrorKind::Usage)
            .with_message("invalid duration")
            .with_hint("Use a number plus ms|s|m|h (e.g. 10s).")
    };
    let trimmed = input.trim();
    let split = trimmed.char_indices().find(|(_, ch)| !ch.is_ascii_digit());
    let (num_str, unit) = match split {
        Some((idx, _)) => trimmed.split_at(idx),
        None => ("", ""),
    };
    if num_str.is_empty() || unit.is_empty() {
        return Err(invalid());
    }
    let value: u64 = num_str.parse().map_err(|_| invalid())?;
    let millis = match unit {
        "ms" => value,
        "s" => value.saturating_mul(1_000),
        "m" => value.saturating_mul(60_000),
        "h" => value.saturating_mul(3_600_000),
        _ => return Err(invalid()),
    };
    Ok(Duration::from_millis(millis))
}

fn outcome_exit_code(outcome: &BootstrapOutcome) -> i32 {
    outcome.error_kind().map(to_exit_code).unwrap_or(0)
}

fn navigation_json(navigation: &Navigation) -> Value {
    serde_json::to_value(navigation).unwrap_or(Value::Null)
}

fn outcome_json(outcome: &BootstrapOutcome) -> Value {
    let mut inner = Map::new();
    inner.insert("status".to_string(), json!(outcome.as_str()));
    inner.insert("epoch".to_string(), json!(outcome.epoch().get()));
    match outcome {
        BootstrapOutcome::Ready {
            navigation, state, ..
        } => {
            inner.insert("percent".to_string(), json!(100));
            inner.insert("navigation".to_string(), navigation_json(navigation));
            inner.insert(
                "state".to_string(),
                serde_json::to_value(state.as_ref()).unwrap_or(Value::Null),
            );
        }
        BootstrapOutcome::ForcedLogout {
            failure, percent, ..
        } => {
            inner.insert("percent".to_string(), json!(percent));
            inner.insert("stage".to_string(), json!(failure.stage.as_str()));
            inner.insert("error".to_string(), error_json(&failure.error)["error"].clone());
        }
        BootstrapOutcome::Failed {
            failures, percent, ..
        } => {
            inner.insert("percent".to_string(), json!(percent));
            let failures: Vec<Value> = failures
                .iter()
                .map(|failure| {
                    json!({
                        "stage": failure.stage.as_str(),
                        "error": error_json(&failure.error)["error"].clone(),
                    })
                })
                .collect();
            inner.insert("failures".to_string(), Value::Array(failures));
        }
        BootstrapOutcome::NavigationFailed { error, .. } => {
            inner.insert("error".to_string(), error_json(error)["error"].clone());
        }
        BootstrapOutcome::Superseded { .. } => {}
    }
    let mut outer = Map::new();
    outer.insert("outcome".to_string(), Value::Object(inner));
    Value::Object(outer)
}

fn emit_json(value: Value, color_mode: ColorMode) {
    let pretty = io::stdout().is_terminal() || matches!(color_mode, ColorMode::Always);
    let encoded = if pretty {
        serde_json::to_string_pretty(&value)
    } else {
        serde_json::to_string(&value)
    };
    let json = encoded.unwrap_or_else(|_| "{\"error\":\"json encode failed\"}".to_string());
    println!("{json}");
}

#[derive(Copy, Clone, Debug)]
enum AnsiColor {
    Red,
    Yellow,
}

fn colorize_label(label: &str, enabled: bool, color: AnsiColor) -> String {
    if !enabled {
        return label.to_string();
    }
    let code = match color {
        AnsiColor::Red => "31",
        AnsiColor::Yellow => "33",
    };
    format!("\u{1b}[{code}m{label}\u{1b}[0m")
}

fn emit_error(err: &Error, color_mode: ColorMode) {
    let is_tty = io::stderr().is_terminal();
    if is_tty {
        eprintln!("{}", error_text(err, color_mode.use_color(is_tty)));
        return;
    }

    let value = error_json(err);
    let json = serde_json::to_string(&value).unwrap_or_else(|_| {
        "{\"error\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn emit_notice(notice: &Notice, color_mode: ColorMode) {
    let is_tty = io::stderr().is_terminal();
    if is_tty {
        let label = colorize_label("notice:", color_mode.use_color(is_tty), AnsiColor::Yellow);
        eprintln!("{label} [epoch {}] {}", notice.epoch, notice.message);
        return;
    }
    let json = serde_json::to_string(&notice_json(notice)).unwrap_or_else(|_| {
        "{\"notice\":{\"kind\":\"internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn error_message(err: &Error) -> String {
    if let Some(message) = err.message() {
        return message.to_string();
    }
    match err.kind() {
        ErrorKind::Internal => "internal error".to_string(),
        ErrorKind::Usage => "usage error".to_string(),
        ErrorKind::Transient => "temporary failure".to_string(),
        ErrorKind::UserFacing => "session is no longer valid".to_string(),
        ErrorKind::Ignorable => "optional feature unavailable".to_string(),
        ErrorKind::Io => "i/o error".to_string(),
    }
}

fn error_causes(err: &Error) -> Vec<String> {
    let mut causes = Vec::new();
    let mut cur = err.source();
    while let Some(source) = cur {
        causes.push(source.to_string());
        cur = source.source();
    }
    causes
}

fn error_json(err: &Error) -> Value {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(err.kind().as_str()));
    inner.insert("message".to_string(), json!(error_message(err)));
    if let Some(hint) = err.hint() {
        inner.insert("hint".to_string(), json!(hint));
    }
    if let Some(stage) = err.stage() {
        inner.insert("stage".to_string(), json!(stage));
    }
    if let Some(url) = err.url() {
        inner.insert("url".to_string(), json!(url));
    }
    let causes = error_causes(err);
    if !causes.is_empty() {
        inner.insert("causes".to_string(), json!(causes));
    }

    let mut outer = Map::new();
    outer.insert("error".to_string(), Value::Object(inner));
    Value::Object(outer)
}

fn error_text(err: &Error, use_color: bool) -> String {
    let mut lines = Vec::new();
    lines.push(format!(
        "{} {}",
        colorize_label("error:", use_color, AnsiColor::Red),
        error_message(err)
    ));
    if let Some(hint) = err.hint() {
        lines.push(format!(
            "{} {hint}",
            colorize_label("hint:", use_color, AnsiColor::Yellow)
        ));
    }
    if let Some(stage) = err.stage() {
        lines.push(format!(
            "{} {stage}",
            colorize_label("stage:", use_color, AnsiColor::Yellow)
        ));
    }
    if let Some(url) = err.url() {
        lines.push(format!(
            "{} {url}",
            colorize_label("url:", use_color, AnsiColor::Yellow)
        ));
    }
    lines.join("\n")
}

fn add_transient_hint(err: Error) -> Error {
    if err.kind() != ErrorKind::Transient || err.hint().is_some() {
        return err;
    }
    err.with_hint("Retry once the library is reachable.")
}

fn clap_error_summary(err: &clap::Error) -> String {
    for line in err.to_string().lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix("error:") {
            return rest.trim().to_string();
        }
        return trimmed.to_string();
    }
    "invalid arguments".to_string()
}
