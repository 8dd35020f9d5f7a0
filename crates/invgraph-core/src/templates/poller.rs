use super::{TemplateSource, TemplateStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

/// Owns a running template poller; dropping it stops the task.
pub struct PollerHandle {
    shutdown: Arc<Notify>,
    task: Option<JoinHandle<()>>,
}

impl PollerHandle {
    /// Stop polling and wait for the task to exit.
    pub async fn shutdown(mut self) {
        self.shutdown.notify_one();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!("Template poller exited abnormally: {:?}", e);
            }
        }
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        self.shutdown.notify_one();
    }
}

/// Reload `store` from `source` on every tick of `interval`. The first tick
/// fires immediately. Failures are logged by the store and the previous set
/// stays active.
pub fn spawn_template_poller(
    store: TemplateStore,
    source: Arc<dyn TemplateSource>,
    interval: Duration,
) -> PollerHandle {
    let shutdown = Arc::new(Notify::new());
    let shutdown_clone = shutdown.clone();

    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    // Errors are already reported by the store.
                    let _ = store.reload(source.as_ref()).await;
                }
                _ = shutdown_clone.notified() => {
                    tracing::debug!("Template poller for {} stopping", source.describe());
                    break;
                }
            }
        }
    });

    PollerHandle {
        shutdown,
        task: Some(task),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::templates::StaticTemplateSource;
    use invgraph_common::{QueryTemplate, Step};

    async fn wait_for<F: Fn() -> bool>(check: F) -> bool {
        for _ in 0..200 {
            if check() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    #[tokio::test]
    async fn test_poller_picks_up_changes() {
        let store = TemplateStore::default();
        let source = Arc::new(StaticTemplateSource::new(vec![
            QueryTemplate::new("first", "pserver").step(Step::hop("p-interface")),
        ]));

        let handle = spawn_template_poller(store.clone(), source.clone(), Duration::from_millis(10));
        assert!(wait_for(|| store.get("first").is_ok()).await);

        source.set(vec![QueryTemplate::new("second", "pserver").step(Step::hop("p-interface"))]);
        assert!(wait_for(|| store.get("second").is_ok()).await);
        assert!(store.get("first").is_err());

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_poller_survives_bad_reload() {
        let store = TemplateStore::default();
        let source = Arc::new(StaticTemplateSource::new(vec![
            QueryTemplate::new("good", "pserver").step(Step::hop("p-interface")),
        ]));
        let handle = spawn_template_poller(store.clone(), source.clone(), Duration::from_millis(10));
        assert!(wait_for(|| store.get("good").is_ok()).await);

        source.set(vec![QueryTemplate::new("bad", "pserver").step(Step::where_param("k", "missing"))]);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(store.get("good").is_ok());
        assert!(store.get("bad").is_err());

        source.set(vec![QueryTemplate::new("fixed", "pserver").step(Step::hop("p-interface"))]);
        assert!(wait_for(|| store.get("fixed").is_ok()).await);

        handle.shutdown().await;
    }
}
