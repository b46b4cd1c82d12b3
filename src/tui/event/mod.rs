use crate::pty::{StreamEvent, STREAM_QUEUE_SIZE};
use crossterm::event::{self, Event};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::warn;

/// What woke the main loop.
#[derive(Debug)]
pub enum LoopEvent {
    Input(Event),
    Stream(StreamEvent),
    /// The deadline passed without other events
    Timer,
}

pub struct EventHandler {
    input_rx: mpsc::UnboundedReceiver<Event>,
    stream_tx: mpsc::Sender<StreamEvent>,
    stream_rx: mpsc::Receiver<StreamEvent>,
}

impl EventHandler {
    pub fn new() -> Self {
        let (input_tx, input_rx) = mpsc::unbounded_channel();
        let (stream_tx, stream_rx) = mpsc::channel(STREAM_QUEUE_SIZE);

        // Spawn dedicated thread for terminal events
        std::thread::spawn(move || {
            let poll_timeout = Duration::from_millis(50);
            loop {
                match event::poll(poll_timeout) {
                    Ok(true) => match event::read() {
                        Ok(event) => {
                            if input_tx.send(event).is_err() {
                                break; // Channel closed, exit thread
                            }
                        }
                        Err(e) => {
                            warn!(error = %e, "failed to read terminal event");
                            break;
                        }
                    },
                    Ok(false) => {
                        if input_tx.is_closed() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "failed to poll terminal events");
                        break;
                    }
                }
            }
        });

        Self {
            input_rx,
            stream_tx,
            stream_rx,
        }
    }

    /// Sender handed to every stream reader thread
    pub fn stream_sender(&self) -> mpsc::Sender<StreamEvent> {
        self.stream_tx.clone()
    }

    /// Try to receive a stream event without blocking (for batch processing)
    pub fn try_next_stream(&mut self) -> Option<StreamEvent> {
        self.stream_rx.try_recv().ok()
    }

    /// Wait for input, stream output or `deadline`, whichever comes first.
    /// Keyboard and mouse input always wins over pending output.
    pub async fn next(&mut self, deadline: Option<Instant>) -> LoopEvent {
        let sleep = tokio::time::sleep_until(tokio::time::Instant::from_std(
            deadline.unwrap_or_else(Instant::now),
        ));

        tokio::select! {
            biased;

            Some(event) = self.input_rx.recv() => LoopEvent::Input(event),
            Some(event) = self.stream_rx.recv() => LoopEvent::Stream(event),
            _ = sleep, if deadline.is_some() => LoopEvent::Timer,
            else => LoopEvent::Timer,
        }
    }
}

impl Default for EventHandler {
    fn default() -> Self {
        Self::new()
    }
}
