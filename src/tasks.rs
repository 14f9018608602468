use crate::state::AppState;
use tracing::{debug, info};

pub fn start_background_tasks(state: AppState) {
    // Registry sweeper: drops progress nobody has updated for longer than a download may take
    let max_age = state.settings.download_timeout() + state.settings.progress_grace();
    let every = state.settings.sweep_interval();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            tokio::select! {
                _ = state.shutdown.cancelled() => break,
                _ = interval.tick() => {}
            }
            let removed = state.registry.sweep(max_age);
            if removed > 0 {
                info!("Swept {} stale progress entries", removed);
            }
        }
        debug!("Progress sweeper stopped");
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::extractor::fake::FakeExtractor;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_sweeper_drops_stale_entries() {
        let settings = Settings {
            download_timeout_secs: 0,
            progress_grace_secs: 0,
            ..Settings::default()
        };
        let state = AppState::new(settings, Arc::new(FakeExtractor::broken()));
        state.registry.set("token:stale", 12.0);

        start_background_tasks(state.clone());
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(state.registry.is_empty());
        state.shutdown.cancel();
    }
}
