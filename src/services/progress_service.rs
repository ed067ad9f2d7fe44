//! services/progress_service.rs
//! Difusión de progreso de jobs a los clientes suscritos (SSE).

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::models::job_model::MigrationStatus;
use crate::models::migration_model::JobStatusResponse;
use crate::services::job_runner_service::JobRunner;

/// Eventos en buffer por job antes de que un cliente lento empiece a perderlos
const CHANNEL_CAPACITY: usize = 64;
const MONITOR_RETRY_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ProgressEvent {
    ProgressUpdate(JobStatusResponse),
    TenantProgress {
        tenant_id: String,
        scripts_completed: usize,
        total_scripts: usize,
    },
    JobComplete(JobStatusResponse),
}

impl ProgressEvent {
    pub fn event_name(&self) -> &'static str {
        match self {
            ProgressEvent::ProgressUpdate(_) => "progress_update",
            ProgressEvent::TenantProgress { .. } => "tenant_progress",
            ProgressEvent::JobComplete(_) => "job_complete",
        }
    }

    /// Frame SSE listo para escribir al socket
    pub fn to_sse_frame(&self) -> String {
        let data = serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string());
        format!("event: {}\ndata: {}\n\n", self.event_name(), data)
    }
}

/// Canales de broadcast por job_id
#[derive(Clone, Default)]
pub struct ProgressHub {
    channels: Arc<Mutex<HashMap<String, broadcast::Sender<ProgressEvent>>>>,
    /// Jobs que tienen un monitor vivo
    monitors: Arc<Mutex<HashSet<String>>>,
}

impl ProgressHub {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, broadcast::Sender<ProgressEvent>>> {
        // un panic con el lock tomado no deja el mapa inconsistente
        self.channels.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Suscribe un cliente a las actualizaciones de un job
    pub fn subscribe(&self, job_id: &str) -> Subscription {
        let receiver = self
            .lock()
            .entry(job_id.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe();
        log::info!("Progress subscriber connected for job {}", job_id);

        Subscription {
            hub: self.clone(),
            job_id: job_id.to_string(),
            receiver: Some(receiver),
        }
    }

    pub fn subscriber_count(&self, job_id: &str) -> usize {
        self.lock()
            .get(job_id)
            .map(|tx| tx.receiver_count())
            .unwrap_or(0)
    }

    pub fn has_job(&self, job_id: &str) -> bool {
        self.lock().contains_key(job_id)
    }

    /// Envía el evento a todos los suscriptores; devuelve a cuántos llegó.
    pub fn broadcast_to_job(&self, job_id: &str, event: ProgressEvent) -> usize {
        let mut channels = self.lock();
        let Some(sender) = channels.get(job_id) else {
            return 0;
        };

        match sender.send(event) {
            Ok(n) => n,
            Err(_) => {
                // ya no queda nadie escuchando
                channels.remove(job_id);
                0
            }
        }
    }

    /// Reserva el monitor del job; `None` si ya hay uno corriendo.
    pub fn claim_monitor(&self, job_id: &str) -> Option<MonitorClaim> {
        let mut monitors = self.monitors.lock().unwrap_or_else(|e| e.into_inner());
        if !monitors.insert(job_id.to_string()) {
            return None;
        }
        Some(MonitorClaim {
            hub: self.clone(),
            job_id: job_id.to_string(),
        })
    }

    pub fn has_monitor(&self, job_id: &str) -> bool {
        self.monitors
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(job_id)
    }
}

/// Marca de monitor activo; se libera al soltarse (incluso si el monitor hace panic).
pub struct MonitorClaim {
    hub: ProgressHub,
    job_id: String,
}

impl Drop for MonitorClaim {
    fn drop(&mut self) {
        self.hub
            .monitors
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.job_id);
    }
}

/// Receptor de eventos; al soltarse limpia el canal si era el último.
pub struct Subscription {
    hub: ProgressHub,
    job_id: String,
    receiver: Option<broadcast::Receiver<ProgressEvent>>,
}

impl Subscription {
    /// `None` cuando el canal se cerró. Los eventos perdidos por lag se saltan.
    pub async fn recv(&mut self) -> Option<ProgressEvent> {
        let receiver = self.receiver.as_mut()?;
        loop {
            match receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    log::warn!("Subscriber for job {} lagged by {} events", self.job_id, n);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let mut channels = self.hub.lock();
        // el receiver se suelta con el lock tomado para que el conteo sea exacto
        self.receiver.take();
        let empty = channels
            .get(&self.job_id)
            .map(|tx| tx.receiver_count() == 0)
            .unwrap_or(false);
        if empty {
            channels.remove(&self.job_id);
        }
        log::info!("Progress subscriber disconnected for job {}", self.job_id);
    }
}

/// Consulta el estado del job periódicamente y lo difunde hasta que termine.
pub async fn monitor_job_progress(
    runner: JobRunner,
    hub: ProgressHub,
    job_id: String,
    interval: Duration,
) {
    log::info!("Starting progress monitor for job {}", job_id);

    loop {
        match runner.get_job_status(&job_id).await {
            Ok(Some(status)) => {
                hub.broadcast_to_job(&job_id, ProgressEvent::ProgressUpdate(status.clone()));

                let finished = status
                    .status
                    .parse::<MigrationStatus>()
                    .map(|s| s.is_terminal())
                    .unwrap_or(false);
                if finished {
                    log::info!("Job {} completed with status: {}", job_id, status.status);
                    hub.broadcast_to_job(&job_id, ProgressEvent::JobComplete(status));
                    break;
                }

                tokio::time::sleep(interval).await;
            }
            Ok(None) => {
                log::warn!("Job {} not found, stopping monitor", job_id);
                break;
            }
            Err(e) => {
                log::error!("Error monitoring job {}: {:?}", job_id, e);
                tokio::time::sleep(MONITOR_RETRY_DELAY).await;
            }
        }
    }
}
