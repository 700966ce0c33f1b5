//! Background writer that keeps the state slot in sync with the registry

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error};

use super::database::Database;
use super::snapshot::Snapshot;
use crate::core::instance::{Instance, InstanceId};
use crate::core::profile::Profile;

/// A change the persister must fold into the stored state
#[derive(Debug)]
pub enum PersistEvent {
    Upsert(Instance),
    Remove(InstanceId),
    Profile(Profile),
    /// Reply once every earlier event has been written
    Flush(oneshot::Sender<()>),
}

pub struct Persister {
    database: Arc<Database>,
    state: Snapshot,
    rx: mpsc::UnboundedReceiver<PersistEvent>,
}

impl Persister {
    /// Spawn the writer task seeded with `state`, which is written out once immediately
    pub fn spawn(database: Arc<Database>, state: Snapshot) -> mpsc::UnboundedSender<PersistEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let persister = Self {
            database,
            state,
            rx,
        };
        tokio::spawn(persister.run());
        tx
    }

    async fn run(mut self) {
        self.write();

        while let Some(event) = self.rx.recv().await {
            let mut flushes = Vec::new();
            let mut dirty = self.apply(event, &mut flushes);

            // Coalesce whatever queued up meanwhile into one write
            while let Ok(event) = self.rx.try_recv() {
                dirty |= self.apply(event, &mut flushes);
            }

            if dirty {
                self.write();
            }
            for flush in flushes {
                let _ = flush.send(());
            }
        }

        debug!("Persister stopped");
    }

    fn apply(&mut self, event: PersistEvent, flushes: &mut Vec<oneshot::Sender<()>>) -> bool {
        match event {
            PersistEvent::Upsert(instance) => {
                self.state.upsert(instance);
                true
            }
            PersistEvent::Remove(id) => self.state.remove(&id),
            PersistEvent::Profile(profile) => {
                self.state.profile = profile;
                true
            }
            PersistEvent::Flush(reply) => {
                flushes.push(reply);
                false
            }
        }
    }

    fn write(&self) {
        if let Err(e) = self.database.save_snapshot(&self.state) {
            error!("Failed to persist state: {:#}", e);
        }
    }
}
