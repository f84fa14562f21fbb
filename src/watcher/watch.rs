use crate::agent::AgentId;
use crate::orchestrator::LoopEvent;
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::Path;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Change triggers for one agent's transcript.
///
/// Notifications are best effort (some platforms drop or coalesce them), so
/// an interval poll runs alongside. Both only post
/// [`LoopEvent::TranscriptChanged`]; the loop does the reading. Dropping the
/// handle tears down both.
pub struct FileWatch {
    _watcher: Option<RecommendedWatcher>,
    poll: JoinHandle<()>,
}

impl FileWatch {
    pub fn start(
        agent: AgentId,
        path: &Path,
        poll_interval: Duration,
        tx: UnboundedSender<LoopEvent>,
    ) -> Self {
        let watcher = match watch_file(agent, path, tx.clone()) {
            Ok(watcher) => Some(watcher),
            Err(e) => {
                warn!("File notifications unavailable for {}: {}; polling only", path.display(), e);
                None
            }
        };
        let poll = ticker(poll_interval, tx, move || LoopEvent::TranscriptChanged(agent));
        debug!("Watching {} for agent {}", path.display(), agent);

        Self {
            _watcher: watcher,
            poll,
        }
    }
}

impl Drop for FileWatch {
    fn drop(&mut self) {
        self.poll.abort();
    }
}

fn watch_file(
    agent: AgentId,
    path: &Path,
    tx: UnboundedSender<LoopEvent>,
) -> notify::Result<RecommendedWatcher> {
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
        if let Ok(event) = res {
            if matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
                let _ = tx.send(LoopEvent::TranscriptChanged(agent));
            }
        }
    })?;
    watcher.watch(path, RecursiveMode::NonRecursive)?;
    Ok(watcher)
}

/// Post `make_event()` to the loop every `period`, starting one period from
/// now. Stops on its own once the loop is gone.
pub fn ticker<F>(period: Duration, tx: UnboundedSender<LoopEvent>, make_event: F) -> JoinHandle<()>
where
    F: Fn() -> LoopEvent + Send + 'static,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // first tick completes immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            if tx.send(make_event()).is_err() {
                break;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[tokio::test(start_paused = true)]
    async fn ticker_posts_each_period() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = ticker(Duration::from_secs(1), tx, || LoopEvent::TranscriptChanged(AgentId(4)));

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(rx.try_recv().is_err());

        tokio::time::sleep(Duration::from_millis(2600)).await;
        let mut ticks = 0;
        while let Ok(event) = rx.try_recv() {
            assert!(matches!(event, LoopEvent::TranscriptChanged(AgentId(4))));
            ticks += 1;
        }
        assert_eq!(ticks, 3);

        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_watch_stops_polling() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("t.jsonl");
        std::fs::write(&path, "").unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let watch = FileWatch::start(AgentId(1), &path, Duration::from_secs(1), tx);
        drop(watch);

        tokio::time::sleep(Duration::from_secs(3)).await;
        while let Ok(event) = rx.try_recv() {
            // only notifications queued before the drop may remain
            assert!(matches!(event, LoopEvent::TranscriptChanged(AgentId(1))));
        }
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(rx.try_recv().is_err());
    }
}
