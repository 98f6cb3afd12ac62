//! Purpose: Drive hydration runs for one client session and route when they finish.
//! Exports: `BootstrapController`, `BootstrapOutcome`, `Screen`, `LinkSender`, `SessionSignal`.
//! Role: Owns the state, progress, epoch clock and link resolver of a session.
//! Invariants: Every run advances the epoch and starts from fresh state at 0%.
//! Invariants: Links arrive through a channel and are drained into the resolver only between runs.
//! Invariants: Navigation happens once per completed run; failed runs never navigate.
//! Invariants: A refocus drops the in-flight run; its late results cannot reach the new run.

use super::catalog::CatalogApi;
use super::config::BootstrapConfig;
use super::navigator::{Navigation, Navigator, RouteParams};
use super::pipeline::{CatalogGraph, catalog_graph};
use super::state::HydrationState;
use crate::core::deeplink::{DeepLinkResolver, IncomingLink, LinkContext, RouteDecision};
use crate::core::epoch::{EpochClock, RunEpoch};
use crate::core::error::{Error, ErrorKind};
use crate::core::progress::Progress;
use crate::core::scheduler::{RunReport, Scheduler, StageEvent, StageFailure};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

const DEFAULT_LOGOUT_REASON: &str = "session is no longer valid";

/// What the host should be showing right now.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "screen", rename_all = "snake_case")]
pub enum Screen {
    Idle,
    Loading {
        epoch: u64,
        percent: u8,
        message: Option<String>,
    },
    ForceLogout {
        epoch: u64,
        reason: String,
    },
    Ready {
        epoch: u64,
        navigation: Navigation,
    },
}

#[derive(Debug)]
pub enum BootstrapOutcome {
    Ready {
        epoch: RunEpoch,
        navigation: Navigation,
        state: Box<HydrationState>,
    },
    ForcedLogout {
        epoch: RunEpoch,
        failure: StageFailure,
        percent: u8,
    },
    /// Transient failures; progress stays incomplete until the next run.
    Failed {
        epoch: RunEpoch,
        failures: Vec<StageFailure>,
        percent: u8,
    },
    NavigationFailed {
        epoch: RunEpoch,
        error: Error,
    },
    Superseded {
        epoch: RunEpoch,
    },
}

impl BootstrapOutcome {
    pub fn epoch(&self) -> RunEpoch {
        match self {
            Self::Ready { epoch, .. }
            | Self::ForcedLogout { epoch, .. }
            | Self::Failed { epoch, .. }
            | Self::NavigationFailed { epoch, .. }
            | Self::Superseded { epoch } => *epoch,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ready { .. } => "ready",
            Self::ForcedLogout { .. } => "forced_logout",
            Self::Failed { .. } => "failed",
            Self::NavigationFailed { .. } => "navigation_failed",
            Self::Superseded { .. } => "superseded",
        }
    }

    /// Error class that ended the run, if it did not reach a screen.
    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Ready { .. } | Self::Superseded { .. } => None,
            Self::ForcedLogout { failure, .. } => Some(failure.error.kind()),
            Self::Failed { failures, .. } => Some(
                failures
                    .first()
                    .map(|failure| failure.error.kind())
                    .unwrap_or(ErrorKind::Internal),
            ),
            Self::NavigationFailed { error, .. } => Some(error.kind()),
        }
    }
}

/// Producer side of the pending-link slot; cheap to clone and hand to listeners.
#[derive(Clone, Debug)]
pub struct LinkSender {
    tx: mpsc::UnboundedSender<IncomingLink>,
}

impl LinkSender {
    /// Returns false once the controller is gone.
    pub fn send(&self, link: IncomingLink) -> bool {
        self.tx.send(link).is_ok()
    }

    pub fn cold_start(&self, raw_url: impl Into<String>) -> bool {
        self.send(IncomingLink::cold_start(raw_url))
    }

    /// Queues the payload's `url`, if it carries one.
    pub fn notification_payload(&self, payload: &Value) -> bool {
        match IncomingLink::from_notification_payload(payload) {
            Some(link) => self.send(link),
            None => false,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SessionSignal {
    Refocus,
    Shutdown,
}

enum SessionStep {
    Finished(BootstrapOutcome),
    Interrupted(SessionSignal),
}

pub struct BootstrapController<A: CatalogApi, N: Navigator> {
    config: BootstrapConfig,
    graph: CatalogGraph,
    navigator: N,
    clock: Arc<EpochClock>,
    resolver: DeepLinkResolver,
    links_tx: mpsc::UnboundedSender<IncomingLink>,
    links_rx: mpsc::UnboundedReceiver<IncomingLink>,
    screen: watch::Sender<Screen>,
    last_state: Option<HydrationState>,
    api: Arc<A>,
}

impl<A: CatalogApi, N: Navigator> BootstrapController<A, N> {
    pub fn new(config: BootstrapConfig, api: A, navigator: N) -> Result<Self, Error> {
        config.validate()?;
        let api = Arc::new(api);
        let graph = catalog_graph(Arc::clone(&api), &config)?;
        let (links_tx, links_rx) = mpsc::unbounded_channel();
        let (screen, _) = watch::channel(Screen::Idle);
        Ok(Self {
            resolver: DeepLinkResolver::new(config.link_rules.clone()),
            config,
            graph,
            navigator,
            clock: Arc::new(EpochClock::new()),
            links_tx,
            links_rx,
            screen,
            last_state: None,
            api,
        })
    }

    pub fn config(&self) -> &BootstrapConfig {
        &self.config
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn graph(&self) -> &CatalogGraph {
        &self.graph
    }

    pub fn link_sender(&self) -> LinkSender {
        LinkSender {
            tx: self.links_tx.clone(),
        }
    }

    pub fn screen(&self) -> watch::Receiver<Screen> {
        self.screen.subscribe()
    }

    pub fn epoch_clock(&self) -> Arc<EpochClock> {
        Arc::clone(&self.clock)
    }

    pub fn current_epoch(&self) -> RunEpoch {
        self.clock.current()
    }

    pub fn navigator(&self) -> &N {
        &self.navigator
    }

    pub fn resolver(&self) -> &DeepLinkResolver {
        &self.resolver
    }

    /// State of the most recent run that reached a screen.
    pub fn last_state(&self) -> Option<&HydrationState> {
        self.last_state.as_ref()
    }

    /// Runs one hydration from scratch and routes if it completes.
    pub async fn bootstrap(&mut self) -> BootstrapOutcome {
        let epoch = self.clock.advance();
        let mut state = HydrationState::new(&self.config.fallback_language);
        let mut progress = Progress::new();
        info!(epoch = %epoch, library = %self.config.library_url, "bootstrap started");
        self.screen.send_replace(Screen::Loading {
            epoch: epoch.get(),
            percent: progress.percent(),
            message: None,
        });

        let report = {
            let graph = &self.graph;
            let screen = &self.screen;
            let library = self.config.library_base_url();
            Scheduler::new(graph, Arc::clone(&self.clock), epoch)
                .with_fetch_timeout(self.config.fetch_timeout)
                .run(&mut state, &mut progress, |event, state, progress| match event {
                    StageEvent::Launched { stage } => {
                        if let Some(stage) = graph.stage(*stage) {
                            debug!(cache_key = %stage.cache_key(&library), "fetch started");
                        }
                    }
                    StageEvent::Applied { stage, .. } | StageEvent::Recovered { stage, .. } => {
                        let message = graph
                            .stage(*stage)
                            .and_then(|stage| stage.loading_message_key())
                            .map(|key| state.term(key));
                        let percent = progress.percent();
                        screen.send_modify(|screen| {
                            if let Screen::Loading {
                                percent: shown,
                                message: text,
                                ..
                            } = screen
                            {
                                *shown = percent;
                                if message.is_some() {
                                    *text = message;
                                }
                            }
                        });
                    }
                    StageEvent::Halted { stage, message } => {
                        warn!(epoch = %epoch, stage = %stage, "forcing logout");
                        screen.send_replace(Screen::ForceLogout {
                            epoch: epoch.get(),
                            reason: message
                                .clone()
                                .unwrap_or_else(|| DEFAULT_LOGOUT_REASON.to_string()),
                        });
                    }
                    StageEvent::Failed { .. } | StageEvent::Discarded { .. } => {}
                })
                .await
        };

        self.collect_links();

        match report {
            RunReport::Completed => match self.route(&state) {
                Ok(navigation) => {
                    info!(epoch = %epoch, "bootstrap ready");
                    self.screen.send_replace(Screen::Ready {
                        epoch: epoch.get(),
                        navigation: navigation.clone(),
                    });
                    self.last_state = Some(state.clone());
                    BootstrapOutcome::Ready {
                        epoch,
                        navigation,
                        state: Box::new(state),
                    }
                }
                Err(error) => {
                    warn!(epoch = %epoch, error = %error, "landing navigation failed");
                    BootstrapOutcome::NavigationFailed { epoch, error }
                }
            },
            // The logout screen went up when the halt was observed.
            RunReport::Halted(failure) => {
                info!(epoch = %epoch, percent = progress.percent(), "bootstrap ended in forced logout");
                BootstrapOutcome::ForcedLogout {
                    epoch,
                    failure,
                    percent: progress.percent(),
                }
            }
            RunReport::Failed(failures) => {
                info!(
                    epoch = %epoch,
                    failed = failures.len(),
                    percent = progress.percent(),
                    "bootstrap incomplete; waiting for refocus"
                );
                BootstrapOutcome::Failed {
                    epoch,
                    failures,
                    percent: progress.percent(),
                }
            }
            RunReport::Superseded { epoch, .. } => BootstrapOutcome::Superseded { epoch },
        }
    }

    /// Screen regained focus: start over under a new epoch.
    pub async fn refocus(&mut self) -> BootstrapOutcome {
        info!(previous = %self.clock.current(), "refocus; restarting bootstrap");
        self.bootstrap().await
    }

    /// Bootstraps, then restarts on every refocus until shutdown or the signal source closes.
    /// A signal that lands mid-run drops that run and reports it as superseded; a closed
    /// signal source lets the current run finish first.
    pub async fn run_session<F>(
        &mut self,
        signals: &mut mpsc::UnboundedReceiver<SessionSignal>,
        mut on_outcome: F,
    ) -> Option<BootstrapOutcome>
    where
        F: FnMut(&BootstrapOutcome),
    {
        let mut last = None;
        loop {
            let step = {
                let run = self.bootstrap();
                tokio::pin!(run);
                tokio::select! {
                    outcome = &mut run => SessionStep::Finished(outcome),
                    Some(signal) = signals.recv() => SessionStep::Interrupted(signal),
                }
            };

            let signal = match step {
                SessionStep::Finished(outcome) => {
                    on_outcome(&outcome);
                    last = Some(outcome);
                    signals.recv().await
                }
                SessionStep::Interrupted(signal) => {
                    let outcome = BootstrapOutcome::Superseded {
                        epoch: self.clock.current(),
                    };
                    info!(epoch = %outcome.epoch(), "in-flight run dropped");
                    on_outcome(&outcome);
                    Some(signal)
                }
            };

            match signal {
                Some(SessionSignal::Refocus) => {
                    info!(previous = %self.clock.current(), "refocus; restarting bootstrap");
                }
                Some(SessionSignal::Shutdown) | None => return last,
            }
        }
    }

    fn collect_links(&mut self) {
        while let Ok(link) = self.links_rx.try_recv() {
            self.resolver.receive(link);
        }
    }

    /// Lands on the named route with the hydrated user, library and location, then opens
    /// the pending link on top of it. The link stays pending if landing fails.
    fn route(&mut self, state: &HydrationState) -> Result<Navigation, Error> {
        let ctx = LinkContext {
            library_base_url: Some(
                state
                    .library()
                    .map(|library| library.base_url.trim_end_matches('/').to_string())
                    .filter(|base| !base.is_empty())
                    .unwrap_or_else(|| self.config.library_base_url()),
            ),
        };
        let params = RouteParams {
            user: state.user().cloned(),
            library: state.library().cloned(),
            location: state.location().cloned(),
            prev_route: self.config.prev_route.clone(),
        };
        self.navigator
            .navigate_named(&self.config.landing_route, &params)?;
        let landing = Navigation::Named {
            route: self.config.landing_route.clone(),
            params: Box::new(params),
        };

        let RouteDecision::Link(route) = self.resolver.on_hydration_complete(&ctx) else {
            return Ok(landing);
        };
        match self.navigator.navigate_by_path(&route.path, &route.query) {
            Ok(()) => {
                info!(path = %route.path, "routed to deep link");
                Ok(Navigation::Path {
                    target: route.target(),
                    path: route.path,
                    query: route.query,
                })
            }
            Err(err) => {
                warn!(path = %route.path, error = %err, "deep link navigation failed; staying on landing route");
                Ok(landing)
            }
        }
    }
}
