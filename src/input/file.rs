//! File input source: publishes JPEG files from a folder (or one file) as
//! frames, in name order, with a configurable inter-frame delay.
//!
//! Spec: `file:folder=<dir>[,delay=<ms>][,loop=<0|1>]` or
//! `file:file=<path>[,delay=<ms>][,loop=<0|1>]`.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{anyhow, Result};

use crate::channel::{FrameChannel, FrameTimestamp};
use crate::control::{ControlDescriptor, ControlRegistry};
use crate::module::{InputModule, ModuleParams};

/// Control id of the (fixed) inter-frame delay control.
pub const CTRL_DELAY: u32 = 1;

const DEFAULT_DELAY_MS: u64 = 1000;

enum Source {
    Folder(PathBuf),
    Single(PathBuf),
}

pub struct FileInput {
    controls: ControlRegistry,
    source: Arc<Source>,
    delay: Duration,
    repeat: bool,
    producer: Option<JoinHandle<()>>,
}

impl FileInput {
    pub fn new(params: &ModuleParams) -> Result<Self> {
        let source = match (params.get("folder"), params.get("file")) {
            (Some(folder), None) => Source::Folder(PathBuf::from(folder)),
            (None, Some(file)) => Source::Single(PathBuf::from(file)),
            (Some(_), Some(_)) => {
                return Err(anyhow!("file input takes either folder= or file=, not both"))
            }
            (None, None) => return Err(anyhow!("file input needs folder= or file=")),
        };
        let delay_ms: u64 = params.get_parsed("delay", DEFAULT_DELAY_MS)?;
        let repeat: u8 = params.get_parsed("loop", 1u8)?;

        let mut controls = ControlRegistry::new();
        // The delay is fixed at init time; exposing it non-dynamic makes it
        // visible in input.json without pretending it can be changed.
        controls.register(
            ControlDescriptor::integer(
                CTRL_DELAY,
                "frame delay (ms)",
                0,
                60_000,
                delay_ms.min(60_000) as i64,
            )
            .fixed(),
        );

        Ok(Self {
            controls,
            source: Arc::new(source),
            delay: Duration::from_millis(delay_ms),
            repeat: repeat != 0,
            producer: None,
        })
    }
}

/// JPEG files in `folder`, sorted by name for a stable playback order.
fn scan_folder(folder: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(folder) else {
        return Vec::new();
    };
    let mut files: Vec<PathBuf> = entries
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("jpg") || e.eq_ignore_ascii_case("jpeg"))
        })
        .collect();
    files.sort();
    files
}

fn publish_file(channel: &FrameChannel, path: &Path) {
    match std::fs::read(path) {
        Ok(bytes) if !bytes.is_empty() => channel.publish(&bytes, FrameTimestamp::now()),
        Ok(_) => log::warn!("skipping empty frame file {}", path.display()),
        Err(err) => log::warn!("failed to read frame file {}: {}", path.display(), err),
    }
}

impl InputModule for FileInput {
    fn name(&self) -> &str {
        "file"
    }

    fn controls(&self) -> &ControlRegistry {
        &self.controls
    }

    fn controls_mut(&mut self) -> &mut ControlRegistry {
        &mut self.controls
    }

    fn start(&mut self, channel: Arc<FrameChannel>, stop: Arc<AtomicBool>) -> Result<()> {
        if let Source::Folder(folder) = &*self.source {
            if !folder.is_dir() {
                return Err(anyhow!("frame folder {} does not exist", folder.display()));
            }
        }
        let source = self.source.clone();
        let delay = self.delay;
        let repeat = self.repeat;
        self.producer = Some(std::thread::spawn(move || {
            loop {
                if stop.load(Ordering::SeqCst) {
                    break;
                }
                match &*source {
                    Source::Single(path) => {
                        publish_file(&channel, path);
                    }
                    Source::Folder(folder) => {
                        // Rescan each pass so newly dropped files are picked up.
                        for path in scan_folder(folder) {
                            if stop.load(Ordering::SeqCst) {
                                break;
                            }
                            publish_file(&channel, &path);
                            std::thread::sleep(delay);
                        }
                    }
                }
                if !repeat {
                    log::info!("file input finished one pass, idling until stop");
                    while !stop.load(Ordering::SeqCst) {
                        std::thread::sleep(Duration::from_millis(100));
                    }
                    break;
                }
                std::thread::sleep(delay);
            }
            log::info!("file input producer exited");
        }));
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(join) = self.producer.take() {
            if join.join().is_err() {
                log::error!("file input producer panicked");
            }
        }
    }
}
