use sono_guide_pipeline::{FrameOutput, Severity, Status};
use std::io::BufRead;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Operator request coming back from the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    ToggleDetection,
    Quit,
}

impl Command {
    /// Parse one line of operator input. Unknown input is ignored.
    pub fn parse(line: &str) -> Option<Self> {
        match line.trim().to_ascii_lowercase().as_str() {
            "d" | "toggle" => Some(Self::ToggleDetection),
            "q" | "quit" | "exit" => Some(Self::Quit),
            _ => None,
        }
    }
}

/// Receives every processed frame and hands back operator commands.
pub trait Presenter {
    fn present(&mut self, output: &FrameOutput);

    fn poll_command(&mut self) -> Option<Command> {
        None
    }
}

/// Headless presenter: logs status transitions and takes commands from a
/// channel, typically fed by [`spawn_stdin_reader`].
pub struct ConsolePresenter {
    last_status: Option<Status>,
    commands: Option<mpsc::UnboundedReceiver<Command>>,
    frames: u64,
}

impl ConsolePresenter {
    pub fn new(commands: Option<mpsc::UnboundedReceiver<Command>>) -> Self {
        Self {
            last_status: None,
            commands,
            frames: 0,
        }
    }

    pub fn last_status(&self) -> Option<&Status> {
        self.last_status.as_ref()
    }
}

impl Presenter for ConsolePresenter {
    fn present(&mut self, output: &FrameOutput) {
        self.frames += 1;
        if let Some(label) = &output.annotated.label {
            debug!(
                label = label.text,
                x = label.anchor.0,
                y = label.anchor.1,
                "overlay label"
            );
        }

        if self.last_status.as_ref() == Some(&output.status) {
            return;
        }
        let text = output.status.text.as_str();
        match output.status.severity {
            Severity::Ok => info!(frame = self.frames, status = text, "status"),
            Severity::Warning => warn!(frame = self.frames, status = text, "status"),
            Severity::Error => error!(frame = self.frames, status = text, "status"),
            Severity::Capture => info!(frame = self.frames, status = text, "capture"),
        }
        self.last_status = Some(output.status.clone());
    }

    fn poll_command(&mut self) -> Option<Command> {
        self.commands.as_mut()?.try_recv().ok()
    }
}

/// Read operator commands from stdin on a dedicated thread.
///
/// The thread ends when stdin closes or the receiver is dropped.
pub fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<Command> {
    let (tx, rx) = mpsc::unbounded_channel();
    let spawned = std::thread::Builder::new()
        .name("stdin-commands".into())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                match Command::parse(&line) {
                    Some(cmd) => {
                        if tx.send(cmd).is_err() {
                            break;
                        }
                    }
                    None => debug!(input = line, "ignoring unknown command"),
                }
            }
        });
    if let Err(e) = spawned {
        warn!(error = %e, "failed to start stdin reader, operator commands disabled");
    }
    rx
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;
    use sono_guide_common::frame::Frame;
    use sono_guide_pipeline::{AnnotatedFrame, StabilityState};

    fn output(text: &str, severity: Severity) -> FrameOutput {
        let frame = Frame::new(RgbImage::new(4, 4), 0, 0);
        FrameOutput {
            annotated: AnnotatedFrame::plain(&frame),
            status: Status {
                text: text.into(),
                severity,
            },
            capture: None,
            detection: None,
            placement: None,
            stability: StabilityState::default(),
        }
    }

    #[test]
    fn parses_commands() {
        assert_eq!(Command::parse("d"), Some(Command::ToggleDetection));
        assert_eq!(Command::parse("  Toggle \n"), Some(Command::ToggleDetection));
        assert_eq!(Command::parse("q"), Some(Command::Quit));
        assert_eq!(Command::parse("hello"), None);
        assert_eq!(Command::parse(""), None);
    }

    #[test]
    fn tracks_latest_status() {
        let mut p = ConsolePresenter::new(None);
        assert!(p.last_status().is_none());
        p.present(&output("Status: CALIBRATION OK", Severity::Ok));
        p.present(&output("Status: CALIBRATION OK", Severity::Ok));
        p.present(&output("WARNING: OUT OF FOCUS", Severity::Warning));
        assert_eq!(p.last_status().unwrap().text, "WARNING: OUT OF FOCUS");
        assert_eq!(p.frames, 3);
    }

    #[test]
    fn drains_queued_commands() {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut p = ConsolePresenter::new(Some(rx));
        assert_eq!(p.poll_command(), None);
        tx.send(Command::ToggleDetection).unwrap();
        tx.send(Command::Quit).unwrap();
        assert_eq!(p.poll_command(), Some(Command::ToggleDetection));
        assert_eq!(p.poll_command(), Some(Command::Quit));
        assert_eq!(p.poll_command(), None);
    }
}
