use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use presence_core::matcher::CosineMatcher;
use presence_engine::{
    EngineConfig, EnrollmentManager, HttpRecognitionService, MemoryDirectory, SessionStore,
    VerificationEngine,
};
use tracing_subscriber::EnvFilter;

mod dbus_interface;

use dbus_interface::AttendanceService;

const SWEEP_INTERVAL_SECS: u64 = 30;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = Arc::new(EngineConfig::from_env());
    tracing::info!(
        recognizer = %config.recognizer_url,
        angles = ?config.required_angles,
        "presenced starting"
    );

    let recognizer = Arc::new(HttpRecognitionService::new(config.recognizer_url.clone()));
    let directory = Arc::new(MemoryDirectory::new());
    let sessions = Arc::new(SessionStore::new(config.session_ttl()));

    let enrollment = EnrollmentManager::new(
        config.clone(),
        recognizer.clone(),
        directory.clone(),
        sessions.clone(),
    );
    let verification = VerificationEngine::new(
        config.clone(),
        recognizer,
        directory,
        Arc::new(CosineMatcher),
    );

    // Background sweep reaps sessions whose TTL lapsed without a capture.
    let sweep_store = sessions.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(SWEEP_INTERVAL_SECS));
        loop {
            interval.tick().await;
            let purged = sweep_store.purge_expired().await;
            if purged > 0 {
                tracing::debug!(purged, "expired enrollment sessions reaped");
            }
        }
    });

    let service = AttendanceService::new(enrollment, verification, sessions);
    let _conn = zbus::connection::Builder::session()?
        .name("org.presence.Attendance1")?
        .serve_at("/org/presence/Attendance1", service)?
        .build()
        .await?;

    tracing::info!("presenced ready on org.presence.Attendance1");

    tokio::signal::ctrl_c().await?;
    tracing::info!("presenced shutting down");

    Ok(())
}
