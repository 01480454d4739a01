//! Synthetic input source: publishes a built-in (or user supplied) JPEG at a
//! configurable frame rate. Exists so the relay, the command plane and the
//! HTTP server can be exercised without any capture hardware.
//!
//! Spec: `test_picture[:fps=<1..60>][,picture=<path>]`.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{anyhow, Result};

use crate::channel::{FrameChannel, FrameTimestamp};
use crate::control::{ControlDescriptor, ControlRegistry};
use crate::module::{InputModule, ModuleParams};

/// Control id of the dynamic frame-rate control.
pub const CTRL_FPS: u32 = 1;

const MIN_FPS: i64 = 1;
const MAX_FPS: i64 = 60;
const DEFAULT_FPS: u32 = 10;

/// Built-in 1x1 grayscale baseline JPEG used when no `picture=` override is
/// given.
pub(crate) const DEFAULT_PICTURE: &[u8] = &[
    // SOI
    0xFF, 0xD8,
    // DQT, flat table
    0xFF, 0xDB, 0x00, 0x43, 0x00, 0x10, 0x10, 0x10, 0x10, 0x10, 0x10, 0x10, 0x10, 0x10, 0x10,
    0x10, 0x10, 0x10, 0x10, 0x10, 0x10, 0x10, 0x10, 0x10, 0x10, 0x10, 0x10, 0x10, 0x10, 0x10,
    0x10, 0x10, 0x10, 0x10, 0x10, 0x10, 0x10, 0x10, 0x10, 0x10, 0x10, 0x10, 0x10, 0x10, 0x10,
    0x10, 0x10, 0x10, 0x10, 0x10, 0x10, 0x10, 0x10, 0x10, 0x10, 0x10, 0x10, 0x10, 0x10, 0x10,
    0x10, 0x10, 0x10, 0x10, 0x10, 0x10, 0x10, 0x10, 0x10,
    // SOF0, 8-bit 1x1, one component
    0xFF, 0xC0, 0x00, 0x0B, 0x08, 0x00, 0x01, 0x00, 0x01, 0x01, 0x01, 0x11, 0x00,
    // DHT, standard luminance DC
    0xFF, 0xC4, 0x00, 0x1F, 0x00, 0x00, 0x01, 0x05, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08,
    0x09, 0x0A, 0x0B,
    // DHT, standard luminance AC
    0xFF, 0xC4, 0x00, 0xB5, 0x10, 0x00, 0x02, 0x01, 0x03, 0x03, 0x02, 0x04, 0x03, 0x05, 0x05,
    0x04, 0x04, 0x00, 0x00, 0x01, 0x7D, 0x01, 0x02, 0x03, 0x00, 0x04, 0x11, 0x05, 0x12, 0x21,
    0x31, 0x41, 0x06, 0x13, 0x51, 0x61, 0x07, 0x22, 0x71, 0x14, 0x32, 0x81, 0x91, 0xA1, 0x08,
    0x23, 0x42, 0xB1, 0xC1, 0x15, 0x52, 0xD1, 0xF0, 0x24, 0x33, 0x62, 0x72, 0x82, 0x09, 0x0A,
    0x16, 0x17, 0x18, 0x19, 0x1A, 0x25, 0x26, 0x27, 0x28, 0x29, 0x2A, 0x34, 0x35, 0x36, 0x37,
    0x38, 0x39, 0x3A, 0x43, 0x44, 0x45, 0x46, 0x47, 0x48, 0x49, 0x4A, 0x53, 0x54, 0x55, 0x56,
    0x57, 0x58, 0x59, 0x5A, 0x63, 0x64, 0x65, 0x66, 0x67, 0x68, 0x69, 0x6A, 0x73, 0x74, 0x75,
    0x76, 0x77, 0x78, 0x79, 0x7A, 0x83, 0x84, 0x85, 0x86, 0x87, 0x88, 0x89, 0x8A, 0x92, 0x93,
    0x94, 0x95, 0x96, 0x97, 0x98, 0x99, 0x9A, 0xA2, 0xA3, 0xA4, 0xA5, 0xA6, 0xA7, 0xA8, 0xA9,
    0xAA, 0xB2, 0xB3, 0xB4, 0xB5, 0xB6, 0xB7, 0xB8, 0xB9, 0xBA, 0xC2, 0xC3, 0xC4, 0xC5, 0xC6,
    0xC7, 0xC8, 0xC9, 0xCA, 0xD2, 0xD3, 0xD4, 0xD5, 0xD6, 0xD7, 0xD8, 0xD9, 0xDA, 0xE1, 0xE2,
    0xE3, 0xE4, 0xE5, 0xE6, 0xE7, 0xE8, 0xE9, 0xEA, 0xF1, 0xF2, 0xF3, 0xF4, 0xF5, 0xF6, 0xF7,
    0xF8, 0xF9, 0xFA,
    // SOS + entropy data (DC 0, EOB) + EOI
    0xFF, 0xDA, 0x00, 0x08, 0x01, 0x01, 0x00, 0x00, 0x3F, 0x00, 0x2B, 0xFF, 0xD9,
];

pub struct TestPictureInput {
    controls: ControlRegistry,
    picture: Arc<Vec<u8>>,
    /// Shared with the producer thread so fps commands apply immediately.
    fps: Arc<AtomicU32>,
    producer: Option<JoinHandle<()>>,
}

impl TestPictureInput {
    pub fn new(params: &ModuleParams) -> Result<Self> {
        let fps = params.get_parsed("fps", DEFAULT_FPS)?;
        if i64::from(fps) < MIN_FPS || i64::from(fps) > MAX_FPS {
            return Err(anyhow!("fps must be within {}..={}", MIN_FPS, MAX_FPS));
        }
        let picture = match params.get("picture") {
            Some(path) => std::fs::read(path)
                .map_err(|e| anyhow!("failed to read picture file {}: {}", path, e))?,
            None => DEFAULT_PICTURE.to_vec(),
        };

        let mut controls = ControlRegistry::new();
        controls.register(ControlDescriptor::integer(
            CTRL_FPS,
            "frames per second",
            MIN_FPS,
            MAX_FPS,
            i64::from(fps),
        ));

        Ok(Self {
            controls,
            picture: Arc::new(picture),
            fps: Arc::new(AtomicU32::new(fps)),
            producer: None,
        })
    }
}

impl InputModule for TestPictureInput {
    fn name(&self) -> &str {
        "test_picture"
    }

    fn controls(&self) -> &ControlRegistry {
        &self.controls
    }

    fn controls_mut(&mut self) -> &mut ControlRegistry {
        &mut self.controls
    }

    fn start(&mut self, channel: Arc<FrameChannel>, stop: Arc<AtomicBool>) -> Result<()> {
        let picture = self.picture.clone();
        let fps = self.fps.clone();
        self.producer = Some(std::thread::spawn(move || {
            log::info!("test picture producer running ({} bytes/frame)", picture.len());
            while !stop.load(Ordering::SeqCst) {
                channel.publish(&picture, FrameTimestamp::now());
                let rate = fps.load(Ordering::SeqCst).max(1);
                std::thread::sleep(Duration::from_millis(1000 / u64::from(rate)));
            }
            log::info!("test picture producer exited");
        }));
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(join) = self.producer.take() {
            if join.join().is_err() {
                log::error!("test picture producer panicked");
            }
        }
    }

    fn command(&mut self, control_id: u32, _group: u32, value: i64, _vs: Option<&str>) -> i32 {
        match self.controls.set(control_id, value) {
            Ok(()) if control_id == CTRL_FPS => {
                // Registry bounds guarantee the cast fits.
                self.fps.store(value as u32, Ordering::SeqCst);
                0
            }
            Ok(()) => 0,
            Err(e) => e.code(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_picture_is_a_jpeg() {
        assert_eq!(&DEFAULT_PICTURE[..2], &[0xFF, 0xD8]);
        assert_eq!(&DEFAULT_PICTURE[DEFAULT_PICTURE.len() - 2..], &[0xFF, 0xD9]);
    }

    #[test]
    fn publishes_frames_until_stopped() {
        let params = ModuleParams::parse("test_picture:fps=60").unwrap();
        let mut module = TestPictureInput::new(&params).unwrap();

        let stop = Arc::new(AtomicBool::new(false));
        let channel = Arc::new(FrameChannel::new(stop.clone(), 0));
        module.start(channel.clone(), stop.clone()).unwrap();

        let mut reader = channel.reader();
        let mut out = Vec::new();
        let (len, _) = reader.wait_and_copy(&mut out).expect("frame");
        assert_eq!(&out[..len], DEFAULT_PICTURE);

        stop.store(true, Ordering::SeqCst);
        channel.wake_all();
        module.stop();
    }

    #[test]
    fn fps_command_updates_producer_rate() {
        let params = ModuleParams::parse("test_picture").unwrap();
        let mut module = TestPictureInput::new(&params).unwrap();

        assert_eq!(module.command(CTRL_FPS, 0, 30, None), 0);
        assert_eq!(module.controls().value(CTRL_FPS), Ok(30));
        assert_eq!(module.fps.load(Ordering::SeqCst), 30);

        // Out-of-range write leaves both the registry and the thread rate.
        assert!(module.command(CTRL_FPS, 0, 500, None) < 0);
        assert_eq!(module.controls().value(CTRL_FPS), Ok(30));
        assert_eq!(module.fps.load(Ordering::SeqCst), 30);
    }

    #[test]
    fn rejects_out_of_range_fps_parameter() {
        let params = ModuleParams::parse("test_picture:fps=0").unwrap();
        assert!(TestPictureInput::new(&params).is_err());
        let params = ModuleParams::parse("test_picture:fps=600").unwrap();
        assert!(TestPictureInput::new(&params).is_err());
    }
}
