use futures::future::try_join_all;
use std::future::Future;
use std::time::Duration;
use tokio::io::AsyncWrite;
use tokio::sync::oneshot;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{Result, TailError};
use crate::kubernetes::{Inventory, LogProvider};
use crate::pipeline::buffer::DEFAULT_POLL_INTERVAL;
use crate::pipeline::{
    FilterChain, FilterKind, HandoffBuffer, Sink, SourceReader, run_filter_stage,
};
use crate::types::{StreamOptions, TargetRecord};
use crate::utils::select_targets;

/// Settings for one tail invocation.
#[derive(Debug, Clone)]
pub struct TailConfig {
    pub names: Vec<String>,
    pub filters: FilterChain,
    pub headers: bool,
    pub color: bool,
    pub tail_lines: i64,
    /// Abort every source when one of them fails with a hard read error.
    pub fail_fast: bool,
    pub poll_interval: Duration,
}

impl Default for TailConfig {
    fn default() -> Self {
        Self {
            names: Vec::new(),
            filters: FilterChain::default(),
            headers: false,
            color: false,
            tail_lines: StreamOptions::default().tail_lines,
            fail_fast: false,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Resolving,
    Streaming,
    ShuttingDown,
    Terminated,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// No target matched the requested names.
    NoMatches,
    /// Every task stopped after cancellation or after all streams closed.
    Completed { sources: usize },
}

#[derive(Debug)]
enum Task {
    Reader(String),
    Filter,
    Sink,
}

/// Everything one reader task needs to open and follow its stream.
struct SourceContext<C> {
    cluster: C,
    target: TargetRecord,
    options: StreamOptions,
    buffer: HandoffBuffer,
    cancel: CancellationToken,
}

/// Resolve targets and tail them into `out` until `shutdown` completes or
/// every stream has closed.
pub async fn run<C, W, S>(
    cluster: &C,
    config: TailConfig,
    out: W,
    shutdown: S,
) -> Result<Outcome>
where
    C: Inventory + LogProvider + Clone + Send + Sync + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
    S: Future<Output = ()>,
{
    let mut phase = Phase::Resolving;
    debug!("Phase: {:?}", phase);

    let targets = resolve(cluster, &config.names).await?;
    if targets.is_empty() {
        info!("No pods matched: {}", config.names.join(", "));
        return Ok(Outcome::NoMatches);
    }

    let options = StreamOptions {
        follow: true,
        tail_lines: config.tail_lines,
    };
    let cancel = CancellationToken::new();
    let raw = HandoffBuffer::new(config.poll_interval);
    let mut tasks: JoinSet<(Task, Result<()>)> = JoinSet::new();
    let mut failure: Option<TailError> = None;

    let mut opened = Vec::with_capacity(targets.len());
    for target in &targets {
        let (opened_tx, opened_rx) = oneshot::channel();
        opened.push(opened_rx);
        let source = SourceContext {
            cluster: cluster.clone(),
            target: target.clone(),
            options,
            buffer: raw.clone(),
            cancel: cancel.clone(),
        };
        let name = target.name.clone();
        tasks.spawn(async move { (Task::Reader(name), tail_source(source, opened_tx).await) });
    }

    // Nothing is printed until every stream has opened.
    tokio::pin!(shutdown);
    let all_opened = try_join_all(
        opened
            .into_iter()
            .map(|rx| async move { rx.await.unwrap_or(Ok(())) }),
    );
    tokio::select! {
        result = all_opened => {
            if let Err(e) = result {
                info!("A log stream failed to open, stopping all streams");
                failure = Some(e);
                cancel.cancel();
            }
        }
        _ = &mut shutdown => {
            info!("Caught signal: terminating");
            phase = Phase::ShuttingDown;
            debug!("Phase: {:?}", phase);
            cancel.cancel();
        }
    }

    if !cancel.is_cancelled() {
        phase = Phase::Streaming;
        debug!("Phase: {:?}", phase);

        let sink_input = if config.filters.is_empty() {
            raw.clone()
        } else {
            info!(
                "Filters > Exclude: {}  Include: {}",
                count_patterns(&config.filters, FilterKind::Exclude),
                count_patterns(&config.filters, FilterKind::Include)
            );
            let filtered = HandoffBuffer::new(config.poll_interval);
            let stage = run_filter_stage(
                config.filters.clone(),
                raw.clone(),
                filtered.clone(),
                cancel.clone(),
            );
            tasks.spawn(async move {
                stage.await;
                (Task::Filter, Ok(()))
            });
            filtered
        };

        let sink = Sink::new(out, config.headers, config.color);
        let sink_cancel = cancel.clone();
        tasks.spawn(async move { (Task::Sink, sink.run(sink_input, sink_cancel).await) });
    }

    let mut readers_left = targets.len();
    loop {
        tokio::select! {
            _ = &mut shutdown, if !cancel.is_cancelled() => {
                info!("Caught signal: terminating");
                phase = Phase::ShuttingDown;
                debug!("Phase: {:?}", phase);
                cancel.cancel();
            }
            joined = tasks.join_next() => {
                let Some(joined) = joined else { break };
                let (task, result) = match joined {
                    Ok(done) => done,
                    Err(e) => {
                        info!("A tail task panicked, stopping all streams");
                        failure = failure.or(Some(TailError::Task(e)));
                        cancel.cancel();
                        continue;
                    }
                };
                match (task, result) {
                    (Task::Reader(name), result) => {
                        readers_left -= 1;
                        if let Err(e) = result {
                            if config.fail_fast {
                                info!("{} failed, stopping all streams", name);
                                failure = failure.or(Some(e));
                                cancel.cancel();
                            } else {
                                warn!(
                                    "{:#}; continuing with remaining streams",
                                    anyhow::Error::from(e)
                                );
                            }
                        }
                        if readers_left == 0 {
                            debug!("All log streams finished");
                            raw.close();
                        }
                    }
                    (task, Err(e)) => {
                        info!("{:?} stage failed, stopping all streams", task);
                        failure = failure.or(Some(e));
                        cancel.cancel();
                    }
                    (task, Ok(())) => debug!("{:?} stage finished", task),
                }
            }
        }
    }

    phase = Phase::Terminated;
    debug!("Phase: {:?}", phase);
    info!("kubetail stopped.");

    match failure {
        Some(e) => Err(e),
        None => Ok(Outcome::Completed {
            sources: targets.len(),
        }),
    }
}

/// Open one target's log stream, report the result on `opened`, then read
/// it until it closes or the run is cancelled. Open failures travel through
/// `opened` only.
async fn tail_source<C: LogProvider>(
    source: SourceContext<C>,
    opened: oneshot::Sender<Result<()>>,
) -> Result<()> {
    let SourceContext {
        cluster,
        target,
        options,
        buffer,
        cancel,
    } = source;
    debug!(
        "Opening log stream for {} {}/{} ({})",
        target.kind, target.namespace, target.name, target.url
    );

    let stream = tokio::select! {
        _ = cancel.cancelled() => return Ok(()),
        result = cluster.open_log_stream(&target, options) => result,
    };
    let stream = match stream {
        Ok(stream) => {
            let _ = opened.send(Ok(()));
            stream
        }
        Err(e) => {
            let _ = opened.send(Err(e));
            return Ok(());
        }
    };

    let exit = SourceReader::new(target.name.as_str(), stream, buffer, cancel)
        .run()
        .await?;
    debug!("{} exited: {:?}", target.name, exit);
    Ok(())
}

async fn resolve<I: Inventory>(inventory: &I, names: &[String]) -> Result<Vec<TargetRecord>> {
    let targets = select_targets(inventory.list_targets("pods").await?, names)?;
    for target in &targets {
        info!("Found: {}", target.name);
    }
    Ok(targets)
}

fn count_patterns(chain: &FilterChain, kind: FilterKind) -> usize {
    chain
        .rules()
        .iter()
        .filter(|r| r.kind() == kind)
        .map(|r| r.patterns().len())
        .sum()
}
