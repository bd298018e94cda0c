// Local crates
use crate::{
    discovery::resolver::{report_scope, resolve_streams, stream_name_width},
    error::BridgeError,
    formatter::formatter::LineTemplate,
    helpers::{load_config::BridgeConfig, shutdown::Shutdown},
    ingest::{
        source::{InputSource, lines},
        writer::{IngestionWriter, validate_target},
    },
    metrics::metrics::{FORMAT_FAILURES_TOTAL, UNITS_DELIVERED_TOTAL, summary},
    store::{client::LogStore, redis_store::RedisStore},
    tailer::tailer::MultiplexedTailer,
};

// External crates
use futures::StreamExt;
use std::io::{self, Write};
use std::os::fd::AsFd;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

/// Pattern listed when list mode is asked for without names.
pub const LIST_ALL_PATTERN: &str = "*";

/// What a run does, picked once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    /// Append input lines to one stream.
    Ingest(InputSource),
    /// Follow the resolved streams until cancelled.
    Tail,
    /// Print the resolved stream names and exit.
    List,
}

/// Pick the mode of a run.
///
/// List mode wins, then an explicit input source, then pending stdin data. Tailing is the
/// fallback, so an interactive shell with nothing piped in tails.
pub fn choose_mode(config: &BridgeConfig, stdin_ready: bool) -> Mode {
    if config.list_only {
        Mode::List
    } else if let Some(source) = &config.input {
        Mode::Ingest(source.clone())
    } else if stdin_ready {
        Mode::Ingest(InputSource::Stdin)
    } else {
        Mode::Tail
    }
}

/// Non-blocking readiness probe: does stdin have data (or EOF) to read right now?
pub fn stdin_has_data() -> bool {
    use nix::poll::{PollFd, PollFlags, PollTimeout, poll};

    let stdin = io::stdin();
    let mut fds = [PollFd::new(stdin.as_fd(), PollFlags::POLLIN)];

    match poll(&mut fds, PollTimeout::ZERO) {
        Ok(0) => false,
        Ok(_) => fds[0]
            .revents()
            .is_some_and(|revents| revents.intersects(PollFlags::POLLIN | PollFlags::POLLHUP)),
        Err(e) => {
            warn!(error = %e, "Failed to probe stdin, assuming no input");
            false
        }
    }
}

/// Bridge runtime: connect to Redis and run one mode to completion.
///
/// Configuration errors are raised before the connection is opened.
#[instrument(name = "stream_bridge_runtime", target = "runtime", skip_all, level = "debug")]
pub async fn run_bridge(config: BridgeConfig, shutdown: &Shutdown) -> Result<(), BridgeError> {
    let mode = choose_mode(&config, stdin_has_data());
    info!(mode = ?mode, "Starting stream bridge");

    if matches!(mode, Mode::Ingest(_)) {
        validate_target(&config.streams)?;
    }

    let store = RedisStore::connect(&config.store).await?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let mut diag = io::stderr();

    let result = execute(store, &config, mode, shutdown.token(), &mut out, &mut diag).await;
    info!(
        cancelled = shutdown.is_triggered(),
        metrics = %summary(),
        "Stream bridge stopped"
    );
    result
}

/// Run `mode` against `store`, writing data lines to `out` and the resolved scope to `diag`.
///
/// Cancellation of `cancel` is a normal end of the run.
pub async fn execute<S, W, D>(
    mut store: S,
    config: &BridgeConfig,
    mode: Mode,
    cancel: CancellationToken,
    out: &mut W,
    diag: &mut D,
) -> Result<(), BridgeError>
where
    S: LogStore,
    W: Write,
    D: Write,
{
    match mode {
        Mode::Ingest(source) => run_ingest(store, config, &source, cancel).await,
        Mode::List => run_list(&mut store, config, out).await,
        Mode::Tail => run_tail(store, config, cancel, out, diag).await,
    }
}

#[instrument(name = "stream_bridge_runtime::ingest", target = "runtime", skip_all, level = "debug")]
async fn run_ingest<S: LogStore>(
    store: S,
    config: &BridgeConfig,
    source: &InputSource,
    cancel: CancellationToken,
) -> Result<(), BridgeError> {
    let mut writer = IngestionWriter::new(
        store,
        &config.streams,
        config.field_key.clone(),
        config.retention,
    )?;

    let reader = source.open(cancel).await.map_err(BridgeError::Input)?;
    let appended = writer.ingest(lines(reader)).await?;

    info!(stream = %writer.target(), appended, "Ingestion finished");
    Ok(())
}

#[instrument(name = "stream_bridge_runtime::list", target = "runtime", skip_all, level = "debug")]
async fn run_list<S: LogStore, W: Write>(
    store: &mut S,
    config: &BridgeConfig,
    out: &mut W,
) -> Result<(), BridgeError> {
    let requested = if config.streams.is_empty() {
        vec![LIST_ALL_PATTERN.to_string()]
    } else {
        config.streams.clone()
    };

    let streams = resolve_streams(store, &requested).await?;
    for stream in &streams {
        match write_line(out, stream) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::BrokenPipe => break,
            Err(e) => return Err(BridgeError::Output(e)),
        }
    }
    Ok(())
}

#[instrument(name = "stream_bridge_runtime::tail", target = "runtime", skip_all, level = "debug")]
async fn run_tail<S, W, D>(
    mut store: S,
    config: &BridgeConfig,
    cancel: CancellationToken,
    out: &mut W,
    diag: &mut D,
) -> Result<(), BridgeError>
where
    S: LogStore,
    W: Write,
    D: Write,
{
    let streams = resolve_streams(&mut store, &config.streams).await?;
    report_scope(diag, &streams).map_err(BridgeError::Output)?;

    let template = LineTemplate::new(config.columns, stream_name_width(&streams));
    let tailer = MultiplexedTailer::new(store, streams, config.start, config.batch_size).await?;
    let units = tailer.into_stream();
    tokio::pin!(units);

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!("Tail cancelled");
                return Ok(());
            }
            next = units.next() => next,
        };

        let unit = match next {
            Some(Ok(unit)) => unit,
            Some(Err(e)) => return Err(e.into()),
            None => return Ok(()),
        };
        UNITS_DELIVERED_TOTAL.inc();

        let line = match template.render(&unit) {
            Ok(line) => line,
            Err(e) => {
                FORMAT_FAILURES_TOTAL.inc();
                warn!(error = %e, "Failed to format entry, printing raw index");
                e.into_fallback()
            }
        };

        match write_line(out, &line) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
                info!("Output closed, stopping tail");
                return Ok(());
            }
            Err(e) => return Err(BridgeError::Output(e)),
        }
    }
}

fn write_line<W: Write>(out: &mut W, line: &str) -> io::Result<()> {
    writeln!(out, "{line}")?;
    out.flush()
}
