//! Pipes an upstream media stream into a response body while keeping the
//! progress registry current.
//!
//! The body is pull-driven: a chunk is only requested from upstream when
//! hyper asks for the next one, so a slow client slows the extractor down
//! instead of piling bytes up in memory.

use bytes::Bytes;
use futures::StreamExt;
use futures::stream::BoxStream;
use std::io;
use tokio::time::Instant;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, error, info};

use crate::estimate;
use crate::extractor::{ExtractError, MediaStream};
use crate::progress::ProgressRegistry;

pub type BodyStream = BoxStream<'static, Result<Bytes, io::Error>>;

/// Highest percentage reported while bytes are still flowing; 100 means done.
const IN_FLIGHT_CAP: f64 = 99.0;

struct Transfer {
    registry: ProgressRegistry,
    client_id: String,
    generation: u64,
    estimated_total: u64,
    bytes: u64,
    done: bool,
    _cancel_upstream: DropGuard,
}

impl Transfer {
    fn record(&mut self, len: usize) {
        self.bytes += len as u64;
        let percent = estimate::percent(self.bytes, self.estimated_total).min(IN_FLIGHT_CAP);
        self.registry.update(&self.client_id, self.generation, percent);
        debug!(
            "Downloaded: {:.2} MB ({:.2}%) for {}",
            self.bytes as f64 / 1024.0 / 1024.0,
            percent,
            self.client_id
        );
    }

    fn complete(&mut self) {
        self.done = true;
        self.registry.finish(&self.client_id, self.generation);
        info!(
            "Download completed for {} ({} bytes, estimated {})",
            self.client_id, self.bytes, self.estimated_total
        );
    }

    fn fail(&mut self, err: &ExtractError) {
        self.done = true;
        self.registry.discard(&self.client_id, self.generation);
        error!("Stream error for {} after {} bytes: {}", self.client_id, self.bytes, err);
    }
}

impl Drop for Transfer {
    fn drop(&mut self) {
        if !self.done {
            self.registry.discard(&self.client_id, self.generation);
            info!(
                "Client {} disconnected after {} bytes, stopping upstream",
                self.client_id, self.bytes
            );
        }
    }
}

struct Pump {
    upstream: MediaStream,
    transfer: Transfer,
    cancel: CancellationToken,
    deadline: Instant,
}

async fn pull(
    upstream: &mut MediaStream,
    cancel: &CancellationToken,
    deadline: Instant,
) -> Result<Option<Bytes>, ExtractError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ExtractError::Cancelled),
        _ = tokio::time::sleep_until(deadline) => Err(ExtractError::TimedOut),
        next = upstream.next() => next.transpose(),
    }
}

/// Registers `client_id` at 0% and waits for the first upstream chunk.
///
/// An error here happens before any response header is written, so the
/// caller can still answer with a proper error. After this returns, failures
/// surface as an error item in the body, which aborts the connection.
/// Dropping the returned body (client gone) cancels `cancel` and clears the
/// registry entry.
pub async fn start(
    registry: &ProgressRegistry,
    client_id: &str,
    mut upstream: MediaStream,
    estimated_total: u64,
    deadline: Instant,
    cancel: CancellationToken,
) -> Result<BodyStream, ExtractError> {
    let generation = registry.start(client_id);
    let mut transfer = Transfer {
        registry: registry.clone(),
        client_id: client_id.to_string(),
        generation,
        estimated_total,
        bytes: 0,
        done: false,
        _cancel_upstream: cancel.clone().drop_guard(),
    };

    let first = match pull(&mut upstream, &cancel, deadline).await {
        Ok(Some(first)) => first,
        Ok(None) => {
            transfer.complete();
            return Ok(futures::stream::empty().boxed());
        }
        Err(e) => {
            transfer.fail(&e);
            return Err(e);
        }
    };
    transfer.record(first.len());

    let pump = Pump {
        upstream,
        transfer,
        cancel,
        deadline,
    };
    let rest = futures::stream::unfold(Some(pump), |state| async move {
        let mut pump = state?;
        match pull(&mut pump.upstream, &pump.cancel, pump.deadline).await {
            Ok(Some(bytes)) => {
                pump.transfer.record(bytes.len());
                Some((Ok(bytes), Some(pump)))
            }
            Ok(None) => {
                pump.transfer.complete();
                None
            }
            Err(e) => {
                pump.transfer.fail(&e);
                Some((Err(io::Error::other(e)), None))
            }
        }
    });

    Ok(futures::stream::once(async move { Ok::<_, io::Error>(first) })
        .chain(rest)
        .boxed())
}
