//! Subcommand handlers.

use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use postwhale_application::{
    ActionInvoker, ApplicationError, Catalog, FavoritesRepository, RequestLifecycleStore,
    WorkerApi, load_catalog, summarize_errors,
};
use postwhale_domain::{FilterCriteria, ItemKind, ViewMode, VisibilitySets, filter_tree};
use postwhale_infrastructure::{
    Bridge, FileKeyValueStore, Settings, SettingsError, StartError, SystemClock,
};
use serde_json::Value;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinSet;

use crate::cli::{Cli, Command};

/// Errors surfaced to the user.
#[derive(Debug, Error)]
pub enum CommandError {
    /// Settings could not be loaded.
    #[error(transparent)]
    Settings(#[from] SettingsError),

    /// The worker could not be started.
    #[error(transparent)]
    Start(#[from] StartError),

    /// A call or a store operation failed.
    #[error(transparent)]
    Application(#[from] ApplicationError),

    /// The payload argument is not JSON.
    #[error("payload is not valid JSON: {0}")]
    InvalidPayload(#[from] serde_json::Error),

    /// Standard input could not be read.
    #[error("failed to read input: {0}")]
    Io(#[from] std::io::Error),
}

/// Loads settings, starts the worker, runs the subcommand and shuts the
/// worker down again.
///
/// # Errors
///
/// Returns the first error met by any of those steps.
pub async fn run(cli: Cli) -> Result<(), CommandError> {
    let settings = effective_settings(&cli)?;
    let bridge = Arc::new(Bridge::new(settings.bridge_options()));
    bridge.start(&settings.worker_command())?;

    let result = match cli.command {
        Command::Invoke { action, data } => invoke(&bridge, &action, data.as_deref()).await,
        Command::Tree {
            mode,
            search,
            methods,
        } => {
            tree(
                &bridge,
                &settings,
                mode,
                &search,
                &FilterCriteria::methods(methods),
            )
            .await
        }
        Command::Repl => repl(&bridge).await,
    };

    let pending = bridge.shutdown();
    if pending > 0 {
        tracing::warn!(pending, "Calls still pending at exit");
    }
    result
}

fn effective_settings(cli: &Cli) -> Result<Settings, CommandError> {
    let mut settings = Settings::load(cli.config.as_deref())?;
    if let Some(worker) = &cli.worker {
        settings.worker_path.clone_from(worker);
        settings.worker_args.clear();
    }
    if let Some(timeout_ms) = cli.timeout_ms {
        settings.call_timeout_ms = timeout_ms.max(1);
    }
    tracing::debug!(
        worker = %settings.worker_path.display(),
        timeout = ?Duration::from_millis(settings.call_timeout_ms),
        "Settings loaded"
    );
    Ok(settings)
}

fn parse_payload(data: Option<&str>) -> Result<Value, serde_json::Error> {
    match data.map(str::trim) {
        None | Some("") => Ok(Value::Object(serde_json::Map::new())),
        Some(text) => serde_json::from_str(text),
    }
}

async fn invoke(bridge: &Arc<Bridge>, action: &str, data: Option<&str>) -> Result<(), CommandError> {
    let data = parse_payload(data)?;
    let lifecycle = RequestLifecycleStore::<Value, Value, _>::new(SystemClock);

    let result = lifecycle
        .send(action, data.clone(), async {
            bridge.invoke(action, data).await.map_err(ApplicationError::from)
        })
        .await?;

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

async fn tree(
    bridge: &Arc<Bridge>,
    settings: &Settings,
    mode: ViewMode,
    search: &str,
    criteria: &FilterCriteria,
) -> Result<(), CommandError> {
    let api = WorkerApi::new(Arc::clone(bridge));
    let catalog = load_catalog(&api).await;
    if let Some(warning) = summarize_errors(&catalog.errors) {
        eprintln!("{warning}");
    }

    let favorites = FavoritesRepository::new(FileKeyValueStore::new(&settings.preferences_path))
        .load()
        .await?;

    let visible = filter_tree(
        &catalog.repositories,
        &catalog.services,
        &catalog.endpoints,
        mode,
        search,
        criteria,
        &favorites,
    );
    print!("{}", render_tree(&catalog, &visible));
    Ok(())
}

/// Renders the visible part of the tree, one item per line.
///
/// Expanded parents are marked `-`, collapsed ones `+`.
#[must_use]
pub fn render_tree(catalog: &Catalog, visible: &VisibilitySets) -> String {
    let mut out = String::new();
    let marker = |expanded: bool| if expanded { '-' } else { '+' };

    for repository in visible.visible_repositories(&catalog.repositories) {
        let expanded = visible.expanded_repositories.contains(&repository.id);
        let _ = writeln!(out, "{} {}", marker(expanded), repository.name);

        let services = catalog.services.iter().filter(|service| {
            service.repo_id == repository.id
                && visible.is_item_visible(ItemKind::Service, service.id)
        });
        for service in services {
            let expanded = visible.expanded_services.contains(&service.id);
            let _ = writeln!(out, "  {} {}", marker(expanded), service.name);

            let endpoints = catalog.endpoints.iter().filter(|endpoint| {
                endpoint.service_id == service.id
                    && visible.is_item_visible(ItemKind::Endpoint, endpoint.id)
            });
            for endpoint in endpoints {
                let _ = writeln!(out, "      {:<7} {}", endpoint.method, endpoint.path);
            }
        }
    }

    if out.is_empty() {
        out.push_str("(nothing matches)\n");
    }
    out
}

/// Splits a repl line into an action and its payload.
fn parse_line(line: &str) -> Option<(&str, Option<&str>)> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    Some(match line.split_once(char::is_whitespace) {
        Some((action, rest)) => (action, Some(rest)),
        None => (line, None),
    })
}

async fn repl(bridge: &Arc<Bridge>) -> Result<(), CommandError> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut calls = JoinSet::new();
    let mut line_no = 0_usize;

    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        let Some((action, data)) = parse_line(&line) else {
            continue;
        };
        let data = match parse_payload(data) {
            Ok(data) => data,
            Err(error) => {
                println!("[{line_no}] error: payload is not valid JSON: {error}");
                continue;
            }
        };

        let bridge = Arc::clone(bridge);
        let action = action.to_string();
        calls.spawn(async move {
            match bridge.invoke(&action, data).await {
                Ok(result) => println!("[{line_no}] {action}: {result}"),
                Err(error) => println!("[{line_no}] {action} failed ({:?}): {error}", error.kind()),
            }
        });
    }

    while let Some(joined) = calls.join_next().await {
        if let Err(error) = joined {
            tracing::warn!(%error, "Repl call task failed");
        }
    }
    Ok(())
}
