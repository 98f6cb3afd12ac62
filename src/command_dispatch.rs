//! Purpose: Hold top-level CLI command dispatch for `catalog-boot`.
//! Exports: `dispatch_command`.
//! Role: Keep `main.rs` focused on parse/bootstrap and delegate command execution.
//! Invariants: Each command writes one JSON document to stdout; progress and notices go to stderr.
//! Invariants: Async work runs on a runtime owned by the command, shut down before returning.

use super::*;
use catalog_boot::api::{
    BootstrapController, CatalogGraph, HttpCatalog, LinkContext, LinkSender, RecordingNavigator,
    Screen, SessionSignal, catalog_graph, resolve_link,
};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, watch};
use tracing::warn;

pub(super) fn dispatch_command(command: Command, color_mode: ColorMode) -> Result<RunOutcome, Error> {
    match command {
        Command::Stages { library_url } => {
            let config = BootstrapConfig::new(&library_url)?;
            let api = HttpCatalog::new(library_url)?;
            let graph = catalog_graph(Arc::new(api), &config)?;
            emit_json(stages_json(&graph, &config.library_base_url()), color_mode);
            Ok(RunOutcome::ok())
        }
        Command::ResolveLink {
            raw,
            library_base_url,
            links,
        } => {
            let ctx = LinkContext { library_base_url };
            let route = resolve_link(&raw, &links.rules(), &ctx)?;
            emit_json(
                json!({
                    "route": {
                        "path": route.path,
                        "target": route.target(),
                        "query": route.query,
                        "normalized_url": route.normalized_url,
                    }
                }),
                color_mode,
            );
            Ok(RunOutcome::ok())
        }
        Command::Hydrate {
            library,
            link,
            notification_json,
            progress,
        } => {
            let config = build_config(&library)?;
            let api = http_catalog(&config)?;
            let notification = notification_json
                .as_deref()
                .map(|raw| {
                    serde_json::from_str::<Value>(raw).map_err(|err| {
                        Error::new(ErrorKind::Usage)
                            .with_message("invalid notification json")
                            .with_hint("Pass a JSON object such as '{\"url\":\"libapp://Account/Holds\"}'.")
                            .with_source(err)
                    })
                })
                .transpose()?;

            let runtime = build_runtime()?;
            let outcome = runtime.block_on(async move {
                let mut controller =
                    BootstrapController::new(config, api, RecordingNavigator::new())?;
                let links = controller.link_sender();
                if let Some(raw) = link {
                    links.cold_start(raw);
                }
                if let Some(payload) = &notification {
                    if !links.notification_payload(payload) {
                        warn!("notification payload carries no url");
                    }
                }
                let watcher =
                    progress.then(|| spawn_progress_notices(controller.screen(), color_mode));
                let outcome = controller.bootstrap().await;
                drop(controller);
                if let Some(handle) = watcher {
                    let _ = handle.await;
                }
                Ok::<_, Error>(outcome)
            })?;
            runtime.shutdown_background();

            emit_json(outcome_json(&outcome), color_mode);
            Ok(RunOutcome::with_code(outcome_exit_code(&outcome)))
        }
        Command::Session { library } => {
            let config = build_config(&library)?;
            let api = http_catalog(&config)?;
            let runtime = build_runtime()?;
            let last = runtime.block_on(async move {
                let mut controller =
                    BootstrapController::new(config, api, RecordingNavigator::new())?;
                let (signal_tx, mut signals) = mpsc::unbounded_channel();
                let ctrl_c = signal_tx.downgrade();
                tokio::spawn(async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        if let Some(tx) = ctrl_c.upgrade() {
                            let _ = tx.send(SessionSignal::Shutdown);
                        }
                    }
                });
                let input = tokio::spawn(forward_stdin(controller.link_sender(), signal_tx));
                let last = controller
                    .run_session(&mut signals, |outcome| {
                        emit_notice(&outcome_notice(outcome), color_mode);
                    })
                    .await;
                input.abort();
                Ok::<_, Error>(last)
            })?;
            // Stdin reads cannot be cancelled; do not wait on them.
            runtime.shutdown_background();

            match last {
                Some(outcome) => {
                    emit_json(outcome_json(&outcome), color_mode);
                    Ok(RunOutcome::with_code(outcome_exit_code(&outcome)))
                }
                None => {
                    emit_json(json!({ "outcome": Value::Null }), color_mode);
                    Ok(RunOutcome::ok())
                }
            }
        }
    }
}

fn build_runtime() -> Result<tokio::runtime::Runtime, Error> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| {
            Error::new(ErrorKind::Internal)
                .with_message("failed to start runtime")
                .with_source(err)
        })
}

fn http_catalog(config: &BootstrapConfig) -> Result<HttpCatalog, Error> {
    let api = HttpCatalog::new(config.library_url.as_str())?.with_timeout(config.fetch_timeout);
    Ok(match &config.session_token {
        Some(token) => api.with_token(token.clone()),
        None => api,
    })
}

fn stages_json(graph: &CatalogGraph, library: &str) -> Value {
    let stages: Vec<Value> = graph
        .stages()
        .iter()
        .map(|stage| {
            json!({
                "id": stage.id().as_str(),
                "depends_on": stage.dependencies().iter().map(|dep| dep.as_str()).collect::<Vec<_>>(),
                "weight": stage.progress_weight(),
                "message_key": stage.loading_message_key(),
                "optional": stage.is_optional(),
                "cache_key": stage.cache_key(library),
            })
        })
        .collect();
    let order: Vec<&str> = graph
        .launch_order()
        .into_iter()
        .map(|id| id.as_str())
        .collect();
    json!({ "stages": stages, "launch_order": order })
}

fn spawn_progress_notices(
    mut screen: watch::Receiver<Screen>,
    color_mode: ColorMode,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while screen.changed().await.is_ok() {
            let current = screen.borrow_and_update().clone();
            if let Screen::Loading {
                epoch,
                percent,
                message,
            } = current
            {
                let text = message.unwrap_or_else(|| format!("{percent}%"));
                let notice = Notice::new("progress", "hydrate", epoch, text)
                    .with_detail("percent", percent);
                emit_notice(&notice, color_mode);
            }
        }
    })
}

fn outcome_notice(outcome: &BootstrapOutcome) -> Notice {
    let notice = Notice::new(
        "outcome",
        "session",
        outcome.epoch().get(),
        format!("run {}", outcome.as_str()),
    )
    .with_detail("exit_code", outcome_exit_code(outcome));
    match outcome {
        BootstrapOutcome::Ready { navigation, .. } => {
            notice.with_detail("navigation", navigation_json(navigation))
        }
        BootstrapOutcome::ForcedLogout { percent, .. } | BootstrapOutcome::Failed { percent, .. } => {
            notice.with_detail("percent", *percent)
        }
        _ => notice,
    }
}

#[derive(Debug, PartialEq)]
enum SessionCommand {
    Focus,
    Link(String),
    Notify(Value),
    Quit,
}

fn parse_session_command(line: &str) -> Result<Option<SessionCommand>, Error> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };
    match word {
        "focus" | "refocus" => Ok(Some(SessionCommand::Focus)),
        "quit" | "exit" => Ok(Some(SessionCommand::Quit)),
        "link" if !rest.is_empty() => Ok(Some(SessionCommand::Link(rest.to_string()))),
        "notify" if !rest.is_empty() => serde_json::from_str(rest)
            .map(|value| Some(SessionCommand::Notify(value)))
            .map_err(|err| {
                Error::new(ErrorKind::Usage)
                    .with_message("invalid notification json")
                    .with_source(err)
            }),
        _ => Err(Error::new(ErrorKind::Usage)
            .with_message(format!("unknown session command `{line}`"))
            .with_hint("Use focus, link <url>, notify <json>, or quit.")),
    }
}

async fn forward_stdin(links: LinkSender, signals: mpsc::UnboundedSender<SessionSignal>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(err) => {
                warn!(error = %err, "stdin read failed");
                break;
            }
        };
        match parse_session_command(&line) {
            Ok(Some(SessionCommand::Focus)) => {
                let _ = signals.send(SessionSignal::Refocus);
            }
            Ok(Some(SessionCommand::Link(url))) => {
                links.cold_start(url);
            }
            Ok(Some(SessionCommand::Notify(payload))) => {
                if !links.notification_payload(&payload) {
                    warn!("notification payload carries no url");
                }
            }
            Ok(Some(SessionCommand::Quit)) => {
                let _ = signals.send(SessionSignal::Shutdown);
                break;
            }
            Ok(None) => {}
            Err(err) => warn!(error = %err, "ignoring session input"),
        }
    }
}
