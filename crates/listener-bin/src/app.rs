//! Listener bootstrap and the event printing loop.

use std::process::ExitCode;

use edge_session::{start_listening, ListenerSettings};
use edge_transport::WsConnector;
use listener_config_and_utils::{
    init_logging, AppState, BrowserKind, Config, Paths, UserAgentPool,
};
use tracing::{error, info, warn};

use crate::guidance;
use crate::Cli;

pub async fn run(cli: Cli) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let paths = match &cli.base_dir {
        Some(base) => Paths::with_base_dir(base.clone()),
        None => Paths::new()?,
    };
    paths.ensure_dirs()?;

    let config = match load_config(&paths, &cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", guidance::for_config_error(&e));
            return Ok(ExitCode::FAILURE);
        }
    };

    init_logging(&config.log_level, Some(paths.log_file()));
    info!(base_dir = %paths.base_dir().display(), "Starting edge listener");

    let appstate_path = cli.appstate.clone().unwrap_or_else(|| paths.appstate_file());
    let appstate = match AppState::load(&appstate_path) {
        Ok(appstate) => appstate,
        Err(e) => {
            error!(error = %e, "Failed to load credentials");
            eprintln!("{}", guidance::for_credentials_error(&e));
            return Ok(ExitCode::FAILURE);
        }
    };

    for notice in startup_warnings(&config, &appstate) {
        warn!(kind = %notice.kind, "Starting despite a credentials warning");
        eprintln!("{notice}");
    }

    let settings = listener_settings(&config, &appstate, cli.browser.as_deref())
        .with_resume_from(cli.resume_from);
    info!(
        user_id = %settings.user_id,
        auto_reconnect = settings.listen.auto_reconnect,
        self_listen = settings.listen.self_listen,
        "Credentials loaded"
    );

    let handle = start_listening(WsConnector::new(), settings, None);
    let (Some(mut messages), Some(mut errors)) =
        (handle.take_message_receiver(), handle.take_error_receiver())
    else {
        return Err("listener started without event channels".into());
    };

    let exit = loop {
        tokio::select! {
            Some(event) = messages.recv() => {
                println!("{}", serde_json::to_string(&event)?);
            }
            Some(fatal) = errors.recv() => {
                error!(error = %fatal, "Listener terminated");
                println!("{}", serde_json::to_string(&fatal)?);
                eprintln!("{}", guidance::for_listen_error(&fatal));
                break ExitCode::FAILURE;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received interrupt, closing listener");
                break ExitCode::SUCCESS;
            }
        }
    };

    handle.close().await;
    info!(cursor = ?handle.resume_cursor(), "Edge listener stopped");
    Ok(exit)
}

/// Problems worth reporting that do not stop the listener.
fn startup_warnings(config: &Config, appstate: &AppState) -> Vec<guidance::Guidance> {
    guidance::for_checkpoint(appstate, &config.ignored_checkpoint_codes)
        .into_iter()
        .collect()
}

fn load_config(paths: &Paths, cli: &Cli) -> listener_config_and_utils::CoreResult<Config> {
    let mut config = Config::load(paths)?;

    if let Some(level) = &cli.log_level {
        config.log_level = level.clone();
    }
    if cli.self_listen {
        config.listen.self_listen = true;
    }
    if cli.no_auto_reconnect {
        config.listen.auto_reconnect = false;
    }
    if let Some(region) = &cli.region {
        config.connection.region = Some(region.clone());
    }
    if let Some(endpoint) = &cli.endpoint {
        config.connection.endpoint_override = Some(endpoint.clone());
    }
    if let Some(proxy) = &cli.proxy {
        config.connection.proxy = Some(proxy.clone());
    }

    config.validate()?;
    Ok(config)
}

/// A named browser pins the user agent; otherwise the pool rotates it
/// across reconnects.
fn listener_settings(config: &Config, appstate: &AppState, browser: Option<&str>) -> ListenerSettings {
    let mut pool = UserAgentPool::new(&config.user_agent);
    match browser.map(|name| (name, BrowserKind::parse(name))) {
        Some((_, Some(kind))) => ListenerSettings::from_config(config, appstate, pool.by_browser(kind)),
        other => {
            if let Some((name, None)) = other {
                warn!(browser = %name, "Unknown browser, rotating user agents");
            }
            let initial = pool.get();
            ListenerSettings::from_config(config, appstate, initial).with_user_agent_pool(pool)
        }
    }
}
