//! Model provisioning for the emotion classifier.
//!
//! Downloads the face cascade and the emotion model on first run if they
//! are not present. A failed download is not fatal: the classifier then
//! runs in degraded mode and reports the default label.

use anyhow::{Context, Result};
use log::{info, warn};
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;
use std::time::Duration;

use moodtune_core::config::ClassifierConfig;

/// Upper bound for trusting a `content-length` header when pre-allocating.
const MAX_PREALLOC: usize = 64 * 1024 * 1024;

/// Make sure every model file with a known URL exists locally.
pub fn ensure_models(config: &ClassifierConfig) {
    let agent = download_agent(config.download_timeout());
    let wanted = [
        (config.cascade_path(), config.cascade_url.as_deref()),
        (config.model_path(), config.model_url.as_deref()),
    ];

    for (path, url) in wanted {
        if path.exists() {
            continue;
        }
        let Some(url) = url else {
            warn!("{:?} is missing and no download URL is configured", path);
            continue;
        };
        if let Err(e) = download_model(&agent, url, &path) {
            warn!("Could not download {:?}: {:#}", path, e);
        }
    }
}

fn download_agent(timeout: Duration) -> ureq::Agent {
    ureq::AgentBuilder::new().timeout(timeout).build()
}

/// Download a single model, decompressing `.bz2` payloads.
fn download_model(agent: &ureq::Agent, url: &str, dest: &Path) -> Result<()> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create models directory {:?}", parent))?;
    }

    info!("Downloading {:?} from {}", dest.file_name().unwrap_or_default(), url);

    let response = agent
        .get(url)
        .call()
        .with_context(|| format!("Failed to download {}", url))?;

    let capacity = initial_capacity(response.header("content-length"));

    let mut reader = response.into_reader();
    let mut data = Vec::with_capacity(capacity);
    reader.read_to_end(&mut data).context("Download error")?;

    info!("Downloaded {} bytes", data.len());

    let data = if url.ends_with(".bz2") {
        let mut decompressor = bzip2::read::BzDecoder::new(&data[..]);
        let mut decompressed = Vec::new();
        decompressor
            .read_to_end(&mut decompressed)
            .with_context(|| format!("Failed to decompress {}", url))?;
        info!("Decompressed to {} bytes", decompressed.len());
        decompressed
    } else {
        data
    };

    // Write next to the destination first so a broken download never
    // leaves a truncated model behind.
    let partial = dest.with_extension("part");
    let mut file = File::create(&partial).with_context(|| format!("Failed to create {:?}", partial))?;
    file.write_all(&data).with_context(|| format!("Failed to write {:?}", partial))?;
    fs::rename(&partial, dest).with_context(|| format!("Failed to move model into {:?}", dest))?;

    info!("Saved model to {:?}", dest);
    Ok(())
}

fn initial_capacity(content_length: Option<&str>) -> usize {
    content_length
        .and_then(|s| s.trim().parse::<usize>().ok())
        .unwrap_or(0)
        .min(MAX_PREALLOC)
}
