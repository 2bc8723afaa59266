use std::io;
use std::sync::{mpsc, Arc};
use std::thread;

use organizer_core::{Msg, Tab, TabId};
use organizer_logging::{organizer_debug, organizer_info};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use crate::cache::{spawn_cache_cleaner, CacheSettings};
use crate::organizer::Organizer;
use crate::protocol::{Request, Response};

enum EngineCommand {
    Request {
        request: Request,
        reply: mpsc::Sender<Response>,
    },
    Lifecycle(LifecycleEvent),
}

#[derive(Debug)]
enum LifecycleEvent {
    TabLoaded(Tab),
    TabRemoved(TabId),
    Scan,
}

/// Runs an [`Organizer`] on a background thread that owns the tokio runtime.
///
/// Requests are handled concurrently; each gets at most one reply, and a
/// reply nobody waits for any more is dropped. Tab lifecycle events are
/// applied to the index one at a time in the order they were sent, while
/// the classifications they start run in the background.
pub struct EngineHandle {
    cmd_tx: mpsc::Sender<EngineCommand>,
}

impl EngineHandle {
    pub fn start(organizer: Arc<Organizer>, cache: CacheSettings) -> io::Result<Self> {
        let runtime = tokio::runtime::Runtime::new()?;
        let (cmd_tx, cmd_rx) = mpsc::channel();

        thread::Builder::new()
            .name("organizer-engine".to_string())
            .spawn(move || {
                let (lifecycle_tx, lifecycle_rx) = unbounded_channel();
                let _cleaner = {
                    let _context = runtime.enter();
                    spawn_cache_cleaner(organizer.cache().clone(), cache)
                };
                runtime.spawn(run_lifecycle(organizer.clone(), lifecycle_rx));

                while let Ok(command) = cmd_rx.recv() {
                    match command {
                        EngineCommand::Request { request, reply } => {
                            let organizer = organizer.clone();
                            runtime.spawn(async move {
                                answer(organizer.as_ref(), request, reply).await;
                            });
                        }
                        EngineCommand::Lifecycle(event) => forward(&lifecycle_tx, event),
                    }
                }
                organizer_info!("Engine command channel closed");
            })?;

        Ok(Self { cmd_tx })
    }

    /// Submits a request; the receiver yields the single response.
    pub fn request(&self, request: Request) -> mpsc::Receiver<Response> {
        let (reply, response_rx) = mpsc::channel();
        let _ = self.cmd_tx.send(EngineCommand::Request { request, reply });
        response_rx
    }

    pub fn notify_tab_loaded(&self, tab: Tab) {
        self.send_lifecycle(LifecycleEvent::TabLoaded(tab));
    }

    pub fn notify_tab_removed(&self, tab_id: TabId) {
        self.send_lifecycle(LifecycleEvent::TabRemoved(tab_id));
    }

    /// Classifies every open tab in the background.
    pub fn scan(&self) {
        self.send_lifecycle(LifecycleEvent::Scan);
    }

    fn send_lifecycle(&self, event: LifecycleEvent) {
        let _ = self.cmd_tx.send(EngineCommand::Lifecycle(event));
    }
}

fn forward(lifecycle_tx: &UnboundedSender<LifecycleEvent>, event: LifecycleEvent) {
    if let Err(err) = lifecycle_tx.send(event) {
        organizer_debug!("Lifecycle task stopped, dropping {:?}", err.0);
    }
}

async fn answer(organizer: &Organizer, request: Request, reply: mpsc::Sender<Response>) {
    let response = organizer.handle(request).await;
    if reply.send(response).is_err() {
        organizer_debug!("Requester went away before the response was ready");
    }
}

/// Applies lifecycle events strictly in arrival order. Only the state change
/// is serialized; the effects each event starts are spawned.
async fn run_lifecycle(
    organizer: Arc<Organizer>,
    mut events: UnboundedReceiver<LifecycleEvent>,
) {
    while let Some(event) = events.recv().await {
        let effects = match event {
            LifecycleEvent::TabLoaded(tab) => organizer.admit_tab_loaded(tab).await,
            LifecycleEvent::TabRemoved(tab_id) => organizer.admit(Msg::TabRemoved(tab_id)),
            LifecycleEvent::Scan => organizer.admit_scan().await,
        };
        if effects.is_empty() {
            continue;
        }
        let organizer = organizer.clone();
        tokio::spawn(async move { organizer.drive(effects).await });
    }
}
