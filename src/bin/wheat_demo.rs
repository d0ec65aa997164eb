//! wheat_demo - single-page web demo for the wheat head detector
//!
//! This server:
//! 1. Fetches the checkpoint if it is not on disk yet
//! 2. Loads the model once and keeps it in the model cache
//! 3. Serves the upload page and detection endpoints until Ctrl-C

use anyhow::Result;
use std::sync::{mpsc, Arc};

use wheat_detector::pipeline::load_backend;
use wheat_detector::web::{DetectorProvider, WebServer};
use wheat_detector::{CheckpointSource, DemoConfig, DetectorBackend, ModelCache, WheatDetector};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cfg = DemoConfig::load()?;
    log::info!(
        "backend={}, checkpoint={}, threshold={}",
        cfg.model.backend,
        cfg.checkpoint.path.display(),
        cfg.confidence_threshold
    );

    if cfg.model.backend == "tract" {
        CheckpointSource::from_settings(&cfg.checkpoint).ensure_local()?;
    }
    let cache: Arc<ModelCache<dyn DetectorBackend>> = Arc::new(ModelCache::new(
        cfg.model.cache_ttl,
        cfg.model.cache_capacity,
    ));
    // Load eagerly so a broken checkpoint fails at startup, not on the first upload.
    load_backend(&cfg, &cache, false)?;

    let provider: DetectorProvider = {
        let cfg = cfg.clone();
        let cache = cache.clone();
        Arc::new(move || {
            let backend = load_backend(&cfg, &cache, false)?;
            WheatDetector::new(backend, cfg.confidence_threshold)
        })
    };
    let handle = WebServer::new(cfg.web.clone(), provider, cfg.confidence_threshold).spawn()?;
    log::info!("wheat demo listening on http://{}", handle.addr);

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })?;

    log::info!("wheat_demo waiting for shutdown signal (Ctrl-C)...");
    let _ = rx.recv();
    log::info!("shutdown signal received, stopping web server...");
    handle.stop()?;

    Ok(())
}
