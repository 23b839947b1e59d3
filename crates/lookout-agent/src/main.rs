//! lookout-agent entry point.
//!
//! Wires the hardware-facing backends into the core session controller and
//! runs exactly one session per process lifetime. The supervisor's restart
//! loop is what advances the two-mode state machine, so the unit must
//! restart us on the restart exit code and stay down on the configuration
//! code:
//!
//! ```text
//! [Unit]
//! Description=lookout presence watch
//! After=network.target NetworkManager.service
//!
//! [Service]
//! ExecStart=/usr/local/bin/lookout-agent
//! Restart=always
//! RestartSec=2
//! RestartPreventExitStatus=78
//! Environment=LOOKOUT_ENV=production
//!
//! [Install]
//! WantedBy=multi-user.target
//! ```
//!
//! On first start with no configuration present, a commented template is
//! written to the configuration path and the process exits with the
//! configuration code for an operator to take over.

use std::path::PathBuf;

use lookout_agent::capture::TcpdumpCapture;
use lookout_agent::indicator::LedIndicator;
use lookout_agent::logging;
use lookout_agent::notify::WebhookNotifier;
use lookout_agent::restart::DeviceRestarter;
use lookout_agent::store::FileModeStore;
use lookout_agent::wifi::NmcliAssociation;
use lookout_core::assoc::AssociationManager;
use lookout_core::config::Config;
use lookout_core::error::{LookoutError, EXIT_CONFIG};
use lookout_core::indicator::{NullIndicator, StatusIndicator};
use lookout_core::monitor::PassiveMonitor;
use lookout_core::notify::NotificationDispatcher;
use lookout_core::session::{run_forever, SessionController};
use lookout_core::trigger::TriggerMatcher;
use tracing::{error, info, info_span, Instrument};

/// Environment variables read at startup.
mod env_vars {
    /// Overrides the configuration file location.
    pub const CONFIG_PATH: &str = "LOOKOUT_CONFIG";

    /// `development` switches to pretty stdout logging; anything else gets
    /// the production JSON-file-plus-journal setup.
    pub const ENV: &str = "LOOKOUT_ENV";
}

#[tokio::main]
async fn main() {
    let is_production = std::env::var(env_vars::ENV).map_or(true, |env| env != "development");
    if let Err(err) = logging::init(is_production) {
        eprintln!("failed to initialize logging: {err}");
        std::process::exit(EXIT_CONFIG);
    }

    let config = load_config();
    info!(
        version = env!("CARGO_PKG_VERSION"),
        trigger = %config.trigger.address,
        interface = %config.radio.interface,
        "lookout agent starting"
    );

    let store = match FileModeStore::open(&config.store.path) {
        Ok(store) => store,
        Err(err) => fatal(&err.into()),
    };

    let monitor = PassiveMonitor::new(
        TcpdumpCapture::new(&config.radio.interface),
        TriggerMatcher::new(config.trigger.address),
        config.radio.channel_plan(),
    );
    let association = AssociationManager::new(
        NmcliAssociation::new(&config.radio.interface),
        config.wifi.clone(),
    );
    let dispatcher = match WebhookNotifier::new(config.notify.clone()) {
        Ok(notifier) => NotificationDispatcher::new(notifier),
        Err(err) => fatal(&LookoutError::ConfigInvalid {
            field: "notify",
            reason: err.to_string(),
        }),
    };
    let indicator: Box<dyn StatusIndicator> = match &config.indicator.led {
        Some(led) => Box::new(LedIndicator::new(led)),
        None => Box::new(NullIndicator),
    };

    let controller = SessionController::new(store, monitor, association, dispatcher, indicator);
    let restarter = DeviceRestarter::new(config.restart.strategy);

    let span = info_span!("session", id = %controller.session_id());
    let err = run_forever(controller, restarter).instrument(span).await;
    fatal(&err);
}

/// Resolve, provision, and load the configuration, exiting with the
/// configuration code on any failure so the supervisor leaves us down.
fn load_config() -> Config {
    let path = match std::env::var(env_vars::CONFIG_PATH) {
        Ok(path) => PathBuf::from(path),
        Err(_) => match Config::config_path() {
            Ok(path) => path,
            Err(err) => fatal(&err.into()),
        },
    };

    if !path.exists() {
        match Config::write_example(&path) {
            Ok(()) => error!(
                path = %path.display(),
                "no configuration found; wrote a template, fill it in and restart"
            ),
            Err(err) => error!(
                path = %path.display(),
                error = %err,
                "no configuration found and the template could not be written"
            ),
        }
        std::process::exit(EXIT_CONFIG);
    }

    match Config::load(&path) {
        Ok(config) => {
            info!(path = %path.display(), "configuration loaded");
            config
        }
        Err(err) => fatal(&err.into()),
    }
}

/// Log a fatal error and exit with its contract code. The configuration
/// code tells the supervisor to stay down; every other code invites a
/// restart into a fresh capture attempt.
fn fatal(err: &LookoutError) -> ! {
    error!(code = err.error_code(), error = %err, "fatal error");
    std::process::exit(err.exit_code());
}
