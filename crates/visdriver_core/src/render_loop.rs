//! Render Loop - Polling Consumer Thread
//!
//! In render-thread mode something has to call [`FrameConsumer::render`] at a
//! steady cadence. `RenderLoop` owns the consumer on a dedicated thread and
//! polls it at the interval the pipeline was built with, using the command channel's receive
//! deadline as its clock so commands are handled without extra latency.
//!
//! The loop never touches the producer; the only link between the two threads
//! is the slot arbiter inside the pipeline.

use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use tracing::{debug, info, warn};

use crate::config::DeliveryMode;
use crate::error::{EngineError, EngineResult};
use crate::message::{Command, Event};
use crate::pipeline::FrameConsumer;
use crate::renderer::Renderer;

/// Handle to a running render loop
pub struct RenderLoop<R> {
    /// Channel for sending commands to the render thread
    command_sender: Sender<Command>,

    /// Channel for receiving events from the render thread
    event_receiver: Receiver<Event>,

    /// Handle to the render thread; yields the consumer back on exit
    render_thread: Option<JoinHandle<FrameConsumer<R>>>,
}

impl<R: Renderer + 'static> RenderLoop<R> {
    /// Start polling `consumer` on a new thread, at its configured interval
    pub fn spawn(consumer: FrameConsumer<R>) -> EngineResult<Self> {
        if consumer.delivery_mode() == DeliveryMode::ProducerThread {
            warn!("Render loop started in producer-thread mode; it will not draw anything");
        }

        let (command_sender, command_receiver) = bounded::<Command>(8);
        let (event_sender, event_receiver) = unbounded::<Event>();
        let interval = consumer.render_interval();

        let render_thread = thread::Builder::new()
            .name("visdriver-render".into())
            .spawn(move || {
                Self::render_thread_main(consumer, command_receiver, event_sender, interval)
            })
            .map_err(|e| EngineError::ThreadSpawn(e.to_string()))?;

        Ok(Self {
            command_sender,
            event_receiver,
            render_thread: Some(render_thread),
        })
    }

    /// Ask for a Stats event
    pub fn request_stats(&self) -> EngineResult<()> {
        self.send_command(Command::RequestStats)
    }

    /// Get next event (non-blocking)
    pub fn poll_event(&self) -> Option<Event> {
        self.event_receiver.try_recv().ok()
    }

    /// Get next event, waiting at most `timeout`
    pub fn wait_event(&self, timeout: Duration) -> Option<Event> {
        self.event_receiver.recv_timeout(timeout).ok()
    }

    /// Stop the loop and get the consumer (and its renderer) back
    pub fn shutdown(mut self) -> EngineResult<FrameConsumer<R>> {
        // The thread may already be gone; joining tells us how it ended
        let _ = self.command_sender.send(Command::Shutdown);

        let handle = self
            .render_thread
            .take()
            .ok_or(EngineError::RenderThreadPanicked)?;
        handle.join().map_err(|_| EngineError::RenderThreadPanicked)
    }

    /// Send command to render thread
    fn send_command(&self, command: Command) -> EngineResult<()> {
        self.command_sender
            .send(command)
            .map_err(|_| EngineError::ChannelSendError)
    }

    /// Render thread main loop
    fn render_thread_main(
        mut consumer: FrameConsumer<R>,
        command_receiver: Receiver<Command>,
        event_sender: Sender<Event>,
        interval: Duration,
    ) -> FrameConsumer<R> {
        info!("Render thread started ({}ms interval)", interval.as_millis());

        let mut next_tick = Instant::now() + interval;

        loop {
            match command_receiver.recv_deadline(next_tick) {
                Ok(Command::RequestStats) => {
                    let _ = event_sender.send(Event::Stats {
                        slots: consumer.stats(),
                        frames_rendered: consumer.frames_rendered(),
                    });
                }
                Ok(Command::Shutdown) => break,
                Err(RecvTimeoutError::Timeout) => {
                    consumer.render();

                    next_tick += interval;
                    let now = Instant::now();
                    if next_tick < now {
                        // Fell behind (slow renderer); don't try to catch up
                        next_tick = now + interval;
                    }
                }
                Err(RecvTimeoutError::Disconnected) => {
                    debug!("Render loop handle dropped");
                    break;
                }
            }
        }

        let frames_rendered = consumer.frames_rendered();
        info!("Render thread stopped after {} frames", frames_rendered);
        let _ = event_sender.send(Event::Stopped { frames_rendered });

        consumer
    }
}

impl<R> Drop for RenderLoop<R> {
    fn drop(&mut self) {
        if let Some(handle) = self.render_thread.take() {
            let _ = self.command_sender.send(Command::Shutdown);
            let _ = handle.join();
        }
    }
}
