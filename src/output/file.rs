//! File output sink: writes published frames to a folder, optionally
//! decimated to every nth frame. A `take` command stores the next frame
//! under a caller-chosen name.
//!
//! Spec: `file:folder=<dir>[,input=<n>][,mod=<n>]`.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use anyhow::{anyhow, Result};

use crate::context::StreamerContext;
use crate::control::{ControlDescriptor, ControlRegistry};
use crate::module::{ModuleParams, OutputModule};

/// Control id of the take-snapshot button.
pub const CTRL_TAKE: u32 = 1;

pub struct FileOutput {
    controls: ControlRegistry,
    folder: PathBuf,
    input: usize,
    every_nth: u64,
    /// Filename requested by a pending take command; consumed by the writer
    /// thread on the next frame.
    take_request: Arc<Mutex<Option<PathBuf>>>,
    writer: Option<JoinHandle<()>>,
}

impl FileOutput {
    pub fn new(params: &ModuleParams) -> Result<Self> {
        let folder = params
            .get("folder")
            .ok_or_else(|| anyhow!("file output needs folder="))?;
        let input: usize = params.get_parsed("input", 0)?;
        let every_nth: u64 = params.get_parsed("mod", 1u64)?;
        if every_nth == 0 {
            return Err(anyhow!("mod= must be at least 1"));
        }

        let mut controls = ControlRegistry::new();
        controls.register(ControlDescriptor::button(CTRL_TAKE, "take snapshot"));

        Ok(Self {
            controls,
            folder: PathBuf::from(folder),
            input,
            every_nth,
            take_request: Arc::new(Mutex::new(None)),
            writer: None,
        })
    }
}

impl OutputModule for FileOutput {
    fn name(&self) -> &str {
        "file"
    }

    fn controls(&self) -> &ControlRegistry {
        &self.controls
    }

    fn controls_mut(&mut self) -> &mut ControlRegistry {
        &mut self.controls
    }

    fn start(&mut self, ctx: Arc<StreamerContext>) -> Result<()> {
        let slot = ctx
            .input(self.input)
            .ok_or_else(|| anyhow!("file output references input {} which is not registered", self.input))?;
        if !self.folder.is_dir() {
            return Err(anyhow!("output folder {} does not exist", self.folder.display()));
        }

        let mut reader = slot.channel().reader();
        let folder = self.folder.clone();
        let every_nth = self.every_nth;
        let take_request = self.take_request.clone();
        self.writer = Some(std::thread::spawn(move || {
            let mut frame = Vec::new();
            let mut seq: u64 = 0;
            while let Some((len, _timestamp)) = reader.wait_and_copy(&mut frame) {
                let pending = take_request
                    .lock()
                    .expect("take request lock poisoned")
                    .take();
                if let Some(name) = pending {
                    let path = folder.join(name);
                    if let Err(err) = std::fs::write(&path, &frame[..len]) {
                        log::error!("failed to take snapshot {}: {}", path.display(), err);
                    } else {
                        log::info!("snapshot taken to {}", path.display());
                    }
                }

                if seq % every_nth == 0 {
                    let path = folder.join(format!("frame_{:010}.jpg", seq));
                    if let Err(err) = std::fs::write(&path, &frame[..len]) {
                        log::error!("failed to write {}: {}", path.display(), err);
                    }
                }
                seq += 1;
            }
            log::info!("file output writer exited");
        }));
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(join) = self.writer.take() {
            if join.join().is_err() {
                log::error!("file output writer panicked");
            }
        }
    }

    fn command(&mut self, control_id: u32, _group: u32, value: i64, value_string: Option<&str>) -> i32 {
        if control_id == CTRL_TAKE {
            let name = value_string.unwrap_or("snapshot.jpg");
            // Only bare filenames; the writer joins it under the folder.
            if name.contains('/') || name.contains("..") {
                return crate::control::CODE_OUT_OF_RANGE;
            }
            *self.take_request.lock().expect("take request lock poisoned") =
                Some(PathBuf::from(name));
            return 0;
        }
        match self.controls.set(control_id, value) {
            Ok(()) => 0,
            Err(e) => e.code(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::testutil::{publish, stub_context};
    use std::time::Duration;

    fn module(dir: &std::path::Path, extra: &str) -> FileOutput {
        let spec = format!("file:folder={}{}", dir.display(), extra);
        let params = ModuleParams::parse(&spec).unwrap();
        FileOutput::new(&params).unwrap()
    }

    #[test]
    fn writes_published_frames() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = stub_context();
        let mut out = module(dir.path(), "");
        out.start(ctx.clone()).unwrap();

        publish(&ctx, 0, b"frame zero");
        // Writer thread races the assertion; give it a moment.
        std::thread::sleep(Duration::from_millis(200));

        let written = dir.path().join("frame_0000000000.jpg");
        assert_eq!(std::fs::read(written).unwrap(), b"frame zero");

        ctx.request_stop();
        out.stop();
    }

    #[test]
    fn take_command_writes_requested_filename() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = stub_context();
        let mut out = module(dir.path(), "");
        out.start(ctx.clone()).unwrap();

        assert_eq!(out.command(CTRL_TAKE, 0, 0, Some("evidence.jpg")), 0);
        publish(&ctx, 0, b"the frame");
        std::thread::sleep(Duration::from_millis(200));

        assert_eq!(
            std::fs::read(dir.path().join("evidence.jpg")).unwrap(),
            b"the frame"
        );

        ctx.request_stop();
        out.stop();
    }

    #[test]
    fn take_command_refuses_path_escapes() {
        let dir = tempfile::tempdir().unwrap();
        let mut out = module(dir.path(), "");
        assert!(out.command(CTRL_TAKE, 0, 0, Some("../escape.jpg")) < 0);
    }

    #[test]
    fn missing_folder_fails_at_start() {
        let ctx = stub_context();
        let params = ModuleParams::parse("file:folder=/nonexistent/frames").unwrap();
        let mut out = FileOutput::new(&params).unwrap();
        assert!(out.start(ctx).is_err());
    }

    #[test]
    fn unknown_input_index_fails_at_start() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = stub_context();
        let mut out = module(dir.path(), ",input=5");
        assert!(out.start(ctx).is_err());
    }
}
