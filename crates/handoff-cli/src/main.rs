//! handoff - drive the cross-application session handoff from a terminal.
//!
//! Session storage shared by both applications lives in the cache dir, so a
//! `switch` from one app followed by a `bootstrap` of the other behaves like
//! two pages in the same browser tab.

mod console;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use handoff_core::api::{CookieRefreshMechanism, GatewayClient, OidcClient, OidcMechanism};
use handoff_core::auth::{self, AuthMechanism, CredentialCache};
use handoff_core::handoff::fragment::fragment_of;
use handoff_core::monitor::{EventMonitor, PollingMonitor};
use handoff_core::storage::{FileStorage, KeyringStorage};
use handoff_core::{AppId, Bootstrap, BootstrapState, Config, Handoff, Storage, SystemClock};

use console::{ConsoleNavigator, ConsoleUi};

// ============================================================================
// Constants
// ============================================================================

/// How often the identity-provider session is checked for expiry
const EXPIRY_CHECK_INTERVAL: Duration = Duration::from_secs(5);

/// Keychain service name for persistent credentials
const KEYRING_SERVICE: &str = "handoff";

const USAGE: &str = "\
usage: handoff <command>

  switch --from <app> [--via-login <return-path>]
  validate --as <app> <url-or-fragment>
  bootstrap --as <app> [--fragment <url-or-fragment>] [--call <api-path>]
  config [--save]

apps: aceas (a), cpds (b)";

enum Command {
    Switch { from: AppId, via_login: Option<String> },
    Validate { app: AppId, input: String },
    Bootstrap { app: AppId, fragment: String, call: Option<String> },
    Config { save: bool },
}

/// Initialize the tracing subscriber for logging.
/// The returned guard must be held for the file writer to flush.
fn init_tracing(config: &Config) -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match log_dir(config) {
        Some(dir) => {
            let appender = tracing_appender::rolling::never(dir, "handoff.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_ansi(false).with_writer(writer)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();
    guard
}

fn log_dir(config: &Config) -> Option<PathBuf> {
    if !config.log_to_file {
        return None;
    }
    let dir = config.session_path().ok()?.parent()?.to_path_buf();
    match std::fs::create_dir_all(&dir) {
        Ok(()) => Some(dir),
        Err(e) => {
            eprintln!("Not logging to file: {}", e);
            None
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let config = Config::load()?;
    let _guard = init_tracing(&config);

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = match parse_args(&args) {
        Ok(command) => command,
        Err(e) => {
            eprintln!("{}\n\n{}", e, USAGE);
            std::process::exit(2);
        }
    };

    match command {
        Command::Switch { from, via_login } => switch(&config, from, via_login.as_deref()),
        Command::Validate { app, input } => validate(&config, app, &input),
        Command::Bootstrap { app, fragment, call } => {
            bootstrap(&config, app, fragment_of(&fragment), call.as_deref()).await
        }
        Command::Config { save } => show_config(&config, save),
    }
}

fn parse_args(args: &[String]) -> Result<Command> {
    let Some((name, rest)) = args.split_first() else {
        bail!("missing command");
    };

    let mut app = None;
    let mut via_login = None;
    let mut fragment = None;
    let mut call = None;
    let mut save = false;
    let mut positional = Vec::new();

    let mut iter = rest.iter();
    while let Some(arg) = iter.next() {
        let mut value = |flag: &str| {
            iter.next()
                .cloned()
                .with_context(|| format!("{} needs a value", flag))
        };
        match arg.as_str() {
            "--from" | "--as" => {
                let raw = value(arg.as_str())?;
                app = Some(AppId::parse(&raw).with_context(|| format!("unknown app '{}'", raw))?);
            }
            "--via-login" => via_login = Some(value(arg.as_str())?),
            "--fragment" => fragment = Some(value(arg.as_str())?),
            "--call" => call = Some(value(arg.as_str())?),
            "--save" => save = true,
            flag if flag.starts_with("--") => bail!("unknown option {}", flag),
            _ => positional.push(arg.clone()),
        }
    }

    let need_app = || app.context("--from/--as is required");
    match name.as_str() {
        "switch" => Ok(Command::Switch {
            from: need_app()?,
            via_login,
        }),
        "validate" => {
            let Some(input) = positional.pop() else {
                bail!("validate needs a URL or fragment");
            };
            Ok(Command::Validate {
                app: need_app()?,
                input,
            })
        }
        "bootstrap" => Ok(Command::Bootstrap {
            app: need_app()?,
            fragment: fragment.unwrap_or_default(),
            call,
        }),
        "config" => Ok(Command::Config { save }),
        other => bail!("unknown command '{}'", other),
    }
}

fn session_storage(config: &Config) -> Result<FileStorage> {
    let path = config.session_path()?;
    FileStorage::open(&path).with_context(|| format!("opening {}", path.display()))
}

fn credential_storage(config: &Config, app: AppId) -> Result<Arc<dyn Storage>> {
    if config.use_keyring {
        return Ok(Arc::new(KeyringStorage::new(KEYRING_SERVICE)));
    }
    let path = config.cache_dir(app)?.join("credentials.json");
    let storage =
        FileStorage::open(&path).with_context(|| format!("opening {}", path.display()))?;
    Ok(Arc::new(storage))
}

fn page_handoff(config: &Config, app: AppId) -> Result<Handoff<FileStorage, SystemClock>> {
    Ok(Handoff::new(app, session_storage(config)?, SystemClock).with_ttl_ms(config.transfer_ttl_ms))
}

fn switch(config: &Config, from: AppId, via_login: Option<&str>) -> Result<()> {
    let handoff = page_handoff(config, from)?;

    if let Some(return_path) = via_login {
        let login_url = GatewayClient::new(&config.gateway_url)?.login_url()?;
        handoff.switch_via_login(login_url.as_str(), return_path, &ConsoleNavigator)?;
        return Ok(());
    }

    let mut ui = ConsoleUi::default();
    let token = handoff.switch(config.base_url(from.peer()), &ConsoleNavigator, &mut ui)?;
    info!(issued_at = %token.issued_at, "Transfer token issued");
    Ok(())
}

fn validate(config: &Config, app: AppId, input: &str) -> Result<()> {
    let handoff = page_handoff(config, app)?;
    let check = handoff.check(fragment_of(input));
    println!("{}", check.user_message());
    if !check.is_valid() {
        bail!("{}", check);
    }
    Ok(())
}

async fn bootstrap(config: &Config, app: AppId, fragment: &str, call: Option<&str>) -> Result<()> {
    let mut page = Bootstrap::new(page_handoff(config, app)?, config.handoff_policy);
    let storage = credential_storage(config, app)?;
    let gateway = GatewayClient::new(&config.gateway_url)?;
    let mut ui = ConsoleUi::default();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = shutdown_tx.send(true);
        }
    });

    match app {
        AppId::AppA => {
            let oidc = OidcClient::new(
                &config.oidc.url,
                &config.oidc.realm,
                &config.oidc.client_id,
                &config.oidc.redirect_uri,
            )?;
            let mut mechanism = OidcMechanism::new(
                oidc,
                CredentialCache::new(storage, app),
                ConsoleNavigator,
                SystemClock,
                config.renew_min_validity_secs,
            )
            .with_return_fragment(fragment);
            if page.run(fragment, &mut mechanism, &mut ui).await != BootstrapState::Authenticated {
                return Ok(());
            }
            show_session(&mut page, &mechanism, &gateway, &ui, call).await;

            // Sign-out notifications would arrive here from a host that can see them
            let (_events_tx, events_rx) = mpsc::channel(8);
            let mut monitor = EventMonitor::new(config.renew_min_validity_secs);
            eprintln!("Watching session, ctrl-c to stop");
            let exit = monitor
                .watch_expiry(
                    &mut mechanism,
                    page.session_mut(),
                    &SystemClock,
                    EXPIRY_CHECK_INTERVAL,
                    events_rx,
                    shutdown_rx,
                )
                .await;
            info!(?exit, "Expiry watch stopped");
        }
        AppId::AppB => {
            let mut mechanism = CookieRefreshMechanism::new(
                gateway.clone(),
                CredentialCache::new(Arc::clone(&storage), app),
                ConsoleNavigator,
                SystemClock,
            );
            if page.run(fragment, &mut mechanism, &mut ui).await != BootstrapState::Authenticated {
                return Ok(());
            }
            show_session(&mut page, &mechanism, &gateway, &ui, call).await;

            let mut monitor = PollingMonitor::new(&gateway, CredentialCache::new(storage, app), SystemClock)
                .with_period(Duration::from_secs(config.poll_interval_secs));
            eprintln!("Polling session, ctrl-c to stop");
            let exit = monitor.run(shutdown_rx).await?;
            info!(?exit, refreshes = monitor.refreshes(), "Session polling stopped");
        }
    }
    Ok(())
}

/// Run the read-only authenticated actions once for the terminal user.
async fn show_session<S, C, M>(
    page: &mut Bootstrap<S, C>,
    mechanism: &M,
    gateway: &GatewayClient,
    ui: &ConsoleUi,
    call: Option<&str>,
) where
    S: Storage,
    C: handoff_core::Clock,
    M: AuthMechanism,
{
    info!(actions = ?ui.actions(), "Actions available");

    match auth::user_info(page.session_mut(), mechanism).await {
        Ok(info) => println!("User: {}", info.username().unwrap_or("(unknown)")),
        Err(e) => warn!(error = %e, "Could not fetch user profile"),
    }

    if let Some(path) = call {
        match auth::call_api(page.session(), gateway, path).await {
            Ok(response) => println!("{} {}", response.status, response.body),
            Err(e) => println!("API call failed: {}", e),
        }
    }
}

fn show_config(config: &Config, save: bool) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(config)?);
    if save {
        config.save()?;
    }
    Ok(())
}
