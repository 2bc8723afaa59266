//! Tab organizer service: newline-delimited JSON on stdin and stdout.
mod session;
mod settings;
mod snapshot;

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use organizer_engine::{
    EngineHandle, HttpClassificationService, JsonFileBackend, Organizer, StateStore,
};
use organizer_logging::{organizer_info, organizer_warn, LogDestination};

use crate::session::Session;
use crate::settings::{AppSettings, DEFAULT_SETTINGS_FILE};

fn main() -> Result<()> {
    let settings_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SETTINGS_FILE));
    let settings = AppSettings::load(&settings_path);

    let destination = if settings.log_to_terminal {
        LogDestination::Both
    } else {
        LogDestination::File
    };
    organizer_logging::initialize(destination, settings.level(), &settings.log_path);
    organizer_info!("Starting tab organizer with settings {:?}", settings_path);

    let api_key = std::env::var(&settings.api_key_env).unwrap_or_else(|_| {
        organizer_warn!(
            "{} is not set; classification requests will be rejected",
            settings.api_key_env
        );
        String::new()
    });

    let snapshot = match &settings.snapshot_path {
        Some(path) => snapshot::load(path)?,
        None => snapshot::HostSnapshot::default(),
    };
    let host = Arc::new(snapshot::seed_host(&snapshot).context("seeding browser state")?);

    let store = Arc::new(StateStore::open(JsonFileBackend::new(&settings.state_path)));
    let service = HttpClassificationService::new(settings.service_settings(api_key))
        .context("building classification client")?;
    let organizer = Arc::new(Organizer::new(
        host.clone(),
        Arc::new(service),
        store,
        settings.organizer_settings(),
    ));
    let engine = EngineHandle::start(organizer, settings.cache_settings())
        .context("starting organizer engine")?;
    engine.scan();

    let session = Session::new(host, engine, settings.reply_timeout());
    let stdin = io::stdin();
    let mut stdout = io::stdout().lock();
    for line in stdin.lock().lines() {
        let line = line.context("reading stdin")?;
        if line.trim().is_empty() {
            continue;
        }
        if let Some(response) = session.handle_line(&line) {
            writeln!(stdout, "{response}")?;
            stdout.flush()?;
        }
    }

    organizer_info!("Input closed, shutting down");
    Ok(())
}
