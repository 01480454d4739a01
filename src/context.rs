//! Process-wide relay context: the owned registries of input sources and
//! output sinks, plus the single stop flag that cancels everything.
//!
//! There is exactly one [`StreamerContext`] per process. It is built once at
//! startup and handed around behind an `Arc`; there is no global mutable
//! state. Each input slot owns its module and the [`FrameChannel`] the
//! module publishes into; each output slot owns its module.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use anyhow::{Context as _, Result};

use crate::channel::FrameChannel;
use crate::module::{InputModule, ModuleParams, OutputModule};

/// Initial retained-buffer size per source. Grows on demand, never shrinks.
const CHANNEL_CAPACITY_HINT: usize = 64 * 1024;

/// Grace period for cooperative teardown before resources are dropped.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

/// One registered input source: module identity, its control table (behind
/// the module), and the frame channel it publishes into.
pub struct InputSlot {
    pub params: ModuleParams,
    module: Mutex<Box<dyn InputModule>>,
    channel: Arc<FrameChannel>,
}

impl InputSlot {
    pub fn channel(&self) -> &Arc<FrameChannel> {
        &self.channel
    }

    /// Serialization point for commands and control enumeration: at most one
    /// caller is inside the module at a time.
    pub fn lock_module(&self) -> MutexGuard<'_, Box<dyn InputModule>> {
        self.module.lock().expect("input module lock poisoned")
    }
}

/// One registered output sink.
pub struct OutputSlot {
    pub params: ModuleParams,
    module: Mutex<Box<dyn OutputModule>>,
}

impl OutputSlot {
    pub fn lock_module(&self) -> MutexGuard<'_, Box<dyn OutputModule>> {
        self.module.lock().expect("output module lock poisoned")
    }
}

/// The single owned context shared by producers, the command router and the
/// HTTP server.
pub struct StreamerContext {
    stop: Arc<AtomicBool>,
    inputs: Vec<InputSlot>,
    outputs: Vec<OutputSlot>,
}

impl StreamerContext {
    pub fn builder() -> ContextBuilder {
        ContextBuilder::default()
    }

    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    pub fn inputs(&self) -> &[InputSlot] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[OutputSlot] {
        &self.outputs
    }

    pub fn input(&self, index: usize) -> Option<&InputSlot> {
        self.inputs.get(index)
    }

    pub fn output(&self, index: usize) -> Option<&OutputSlot> {
        self.outputs.get(index)
    }

    /// Start every module, sources first so sinks find live channels.
    pub fn start_all(self: &Arc<Self>) -> Result<()> {
        for slot in &self.inputs {
            slot.lock_module()
                .start(slot.channel.clone(), self.stop.clone())
                .with_context(|| format!("starting input module '{}'", slot.params.name))?;
            log::info!("input module '{}' started", slot.params.raw);
        }
        for slot in &self.outputs {
            slot.lock_module()
                .start(self.clone())
                .with_context(|| format!("starting output module '{}'", slot.params.name))?;
            log::info!("output module '{}' started", slot.params.raw);
        }
        Ok(())
    }

    /// Set the process-wide stop flag and wake every blocked channel reader.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
        for slot in &self.inputs {
            slot.channel.wake_all();
        }
    }

    /// Cooperative teardown: request stop, give readers and producer loops a
    /// fixed grace period to observe it, then stop modules in
    /// source-then-sink order.
    ///
    /// The grace period is a plain sleep: producer threads expose nothing
    /// pollable, so there is no earlier exit to detect.
    pub fn shutdown(&self) {
        self.request_stop();
        std::thread::sleep(SHUTDOWN_GRACE);

        for slot in &self.inputs {
            log::info!("stopping input module '{}'", slot.params.name);
            slot.lock_module().stop();
        }
        for slot in &self.outputs {
            log::info!("stopping output module '{}'", slot.params.name);
            slot.lock_module().stop();
        }
    }
}

/// Builds the context from configured module specs.
#[derive(Default)]
pub struct ContextBuilder {
    inputs: Vec<(ModuleParams, Box<dyn InputModule>)>,
    outputs: Vec<(ModuleParams, Box<dyn OutputModule>)>,
}

impl ContextBuilder {
    pub fn input(mut self, params: ModuleParams, module: Box<dyn InputModule>) -> Self {
        self.inputs.push((params, module));
        self
    }

    pub fn output(mut self, params: ModuleParams, module: Box<dyn OutputModule>) -> Self {
        self.outputs.push((params, module));
        self
    }

    pub fn build(self) -> Arc<StreamerContext> {
        let stop = Arc::new(AtomicBool::new(false));
        let inputs = self
            .inputs
            .into_iter()
            .map(|(params, module)| InputSlot {
                params,
                module: Mutex::new(module),
                channel: Arc::new(FrameChannel::new(stop.clone(), CHANNEL_CAPACITY_HINT)),
            })
            .collect();
        let outputs = self
            .outputs
            .into_iter()
            .map(|(params, module)| OutputSlot {
                params,
                module: Mutex::new(module),
            })
            .collect();
        Arc::new(StreamerContext { stop, inputs, outputs })
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    //! Minimal scripted modules for exercising the command and HTTP planes.

    use super::*;
    use crate::channel::FrameTimestamp;
    use crate::control::{ControlDescriptor, ControlRegistry};

    /// Input module that publishes nothing by itself; tests publish into its
    /// channel directly. Exposes one dynamic control (id 5, 0..=100) and one
    /// fixed control (id 9).
    pub struct StubInput {
        controls: ControlRegistry,
    }

    impl StubInput {
        pub fn new() -> Self {
            let mut controls = ControlRegistry::new();
            controls.register(ControlDescriptor::integer(5, "quality", 0, 100, 80));
            controls.register(ControlDescriptor::integer(9, "width", 160, 1920, 640).fixed());
            Self { controls }
        }
    }

    impl InputModule for StubInput {
        fn name(&self) -> &str {
            "stub"
        }

        fn controls(&self) -> &ControlRegistry {
            &self.controls
        }

        fn controls_mut(&mut self) -> &mut ControlRegistry {
            &mut self.controls
        }

        fn start(&mut self, _channel: Arc<FrameChannel>, _stop: Arc<AtomicBool>) -> Result<()> {
            Ok(())
        }

        fn stop(&mut self) {}
    }

    pub fn stub_context() -> Arc<StreamerContext> {
        let params = ModuleParams::parse("stub").expect("stub spec");
        StreamerContext::builder()
            .input(params, Box::new(StubInput::new()))
            .build()
    }

    pub fn publish(ctx: &StreamerContext, input: usize, bytes: &[u8]) {
        ctx.inputs()[input]
            .channel()
            .publish(bytes, FrameTimestamp::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_stop_wakes_channel_readers() {
        let ctx = testutil::stub_context();
        let mut reader = ctx.inputs()[0].channel().reader();
        let handle = std::thread::spawn(move || {
            let mut out = Vec::new();
            reader.wait_and_copy(&mut out)
        });
        std::thread::sleep(Duration::from_millis(50));
        ctx.request_stop();
        assert!(handle.join().unwrap().is_none());
        assert!(ctx.is_stopped());
    }

    #[test]
    fn shutdown_finishes_within_the_grace_period() {
        let ctx = testutil::stub_context();
        let started = std::time::Instant::now();
        ctx.shutdown();
        let elapsed = started.elapsed();
        assert!(ctx.is_stopped());
        // One grace sleep, not an accumulating wait.
        assert!(elapsed >= SHUTDOWN_GRACE);
        assert!(elapsed < SHUTDOWN_GRACE * 3);
    }

    #[test]
    fn slots_are_indexed_in_registration_order() {
        let ctx = testutil::stub_context();
        assert_eq!(ctx.inputs().len(), 1);
        assert!(ctx.input(0).is_some());
        assert!(ctx.input(1).is_none());
        assert!(ctx.output(0).is_none());
    }
}
