use crate::error::{CliError, Result};
use crate::ui::UiEvent;
use std::fs::File;
use std::io;
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::Subscriber;
use tracing_subscriber::{
    Layer,
    filter::LevelFilter,
    fmt::{self, MakeWriter},
    prelude::*,
    registry::LookupSpan,
};

/// Hands each formatted console record to the UI task, which prints it above
/// the live progress bar instead of letting it tear through the bar.
#[derive(Clone)]
pub struct UiLogMakeWriter {
    sender: mpsc::Sender<UiEvent>,
}

impl UiLogMakeWriter {
    pub fn new(sender: mpsc::Sender<UiEvent>) -> Self {
        Self { sender }
    }
}

impl<'a> MakeWriter<'a> for UiLogMakeWriter {
    type Writer = UiLogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        UiLogWriter {
            sender: self.sender.clone(),
            buffer: Vec::new(),
        }
    }
}

/// Buffers one record and sends it when dropped.
pub struct UiLogWriter {
    sender: mpsc::Sender<UiEvent>,
    buffer: Vec<u8>,
}

impl io::Write for UiLogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for UiLogWriter {
    fn drop(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        let line = String::from_utf8_lossy(&self.buffer)
            .trim_end_matches('\n')
            .to_string();
        // The UI task is gone or backed up; the record still has to reach the user.
        if let Err(e) = self.sender.try_send(UiEvent::Log(line)) {
            if let UiEvent::Log(line) = e.into_inner() {
                eprintln!("{}", line);
            }
        }
    }
}

fn console_layer<S>(sender: mpsc::Sender<UiEvent>) -> impl Layer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fmt::layer()
        .with_writer(UiLogMakeWriter::new(sender))
        .with_ansi(true)
        .with_target(false)
        .with_thread_names(true)
        .compact()
}

fn level_filter(verbosity: u8, quiet: bool) -> LevelFilter {
    if quiet {
        return LevelFilter::OFF;
    }
    match verbosity {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}

pub fn setup_logging(
    verbosity: u8,
    quiet: bool,
    log_file: Option<PathBuf>,
    ui_sender: mpsc::Sender<UiEvent>,
) -> Result<()> {
    let subscriber = tracing_subscriber::registry()
        .with(level_filter(verbosity, quiet))
        .with(console_layer(ui_sender));

    if let Some(path) = log_file {
        let file = File::create(&path).map_err(CliError::Io)?;

        // The file keeps scheduler thread names so interleaved runs can be told apart.
        let file_layer = fmt::layer()
            .with_writer(file)
            .with_ansi(false)
            .with_thread_names(true)
            .with_target(true);

        subscriber.with(file_layer).init();
    } else {
        subscriber.init();
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;
    use std::sync::Once;
    use tracing::{debug, info, warn};

    static INIT: Once = Once::new();

    fn ensure_global_logger_is_set() {
        INIT.call_once(|| {
            let (sender, _receiver) = mpsc::channel(16);
            setup_logging(3, false, None, sender).expect("Failed to set up global logger for tests");
        });
    }

    fn next_log(receiver: &mut mpsc::Receiver<UiEvent>) -> String {
        match receiver.try_recv() {
            Ok(UiEvent::Log(line)) => line,
            other => panic!("expected a log line, got {:?}", other),
        }
    }

    #[test]
    fn verbosity_maps_to_level_filters() {
        assert_eq!(level_filter(0, false), LevelFilter::WARN);
        assert_eq!(level_filter(1, false), LevelFilter::INFO);
        assert_eq!(level_filter(2, false), LevelFilter::DEBUG);
        assert_eq!(level_filter(7, false), LevelFilter::TRACE);
        assert_eq!(level_filter(3, true), LevelFilter::OFF);
    }

    #[test]
    fn writer_sends_one_event_per_record_without_trailing_newline() {
        let (sender, mut receiver) = mpsc::channel(4);
        let make_writer = UiLogMakeWriter::new(sender);

        {
            let mut writer = make_writer.make_writer();
            write!(writer, "process 2 ").unwrap();
            writeln!(writer, "failed to start").unwrap();
        }
        drop(make_writer.make_writer());

        assert_eq!(next_log(&mut receiver), "process 2 failed to start");
        assert!(receiver.try_recv().is_err());
    }

    #[test]
    fn writer_survives_a_closed_ui_channel() {
        let (sender, receiver) = mpsc::channel(1);
        drop(receiver);

        let mut writer = UiLogMakeWriter::new(sender).make_writer();
        writeln!(writer, "printed directly").unwrap();
        drop(writer);
    }

    #[test]
    fn console_layer_routes_records_through_the_ui_channel() {
        let (sender, mut receiver) = mpsc::channel(8);
        let subscriber = tracing_subscriber::registry()
            .with(LevelFilter::INFO)
            .with(console_layer(sender));

        tracing::subscriber::with_default(subscriber, || {
            debug!("filtered out");
            warn!("Process 1 failed (2 so far)");
        });

        let line = next_log(&mut receiver);
        assert!(line.contains("Process 1 failed (2 so far)"));
        assert!(line.contains("WARN"));
        assert!(receiver.try_recv().is_err());
    }

    #[test]
    #[serial]
    fn global_logger_accepts_records() {
        ensure_global_logger_is_set();
        info!("Scheduler started.");
        debug!("Process 0 started, attempt 1.");
    }

    #[test]
    #[serial]
    fn invalid_log_file_path_propagates_error() {
        let invalid_path = PathBuf::from("/");

        if cfg!(unix) && invalid_path.is_dir() {
            let (sender, _receiver) = mpsc::channel(1);
            let result = setup_logging(0, false, Some(invalid_path), sender);
            assert!(matches!(result, Err(CliError::Io(_))));
        }
    }
}
