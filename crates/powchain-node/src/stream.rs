//! Server-sent-events transport for live mining sessions.
use crate::error::ApiError;
use crate::routes::AppState;
use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use futures_util::stream::{self, Stream};
use powchain_core::{MiningSession, ProgressEvent};
use std::{convert::Infallible, time::Duration};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

// Small on purpose: a stalled client should stall the search, not buffer it.
const EVENT_BUFFER: usize = 4;

pub async fn mine_stream(
    State(state): State<AppState>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let session = state.ledger.start_session()?;
    let (tx, rx) = mpsc::channel(EVENT_BUFFER);
    tokio::spawn(pump(session, tx));

    let events = stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|event| (Ok::<_, Infallible>(event), rx))
    });
    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

/// Drive `session` one attempt at a time, forwarding each event until the
/// search completes or the client goes away. Dropping the session on early
/// exit hands its transactions back to the pool.
async fn pump(mut session: MiningSession, tx: mpsc::Sender<Event>) {
    let block_index = session.block_index();
    let pace = session.pace();

    while let Some(item) = session.next() {
        let progress = match item {
            Ok(progress) => progress,
            Err(err) => {
                error!(block_index, "mining session failed: {err}");
                let _ = tx
                    .send(Event::default().event("error").data(err.to_string()))
                    .await;
                return;
            }
        };
        let found = progress.found;
        if tx.send(to_event(&progress)).await.is_err() {
            info!(block_index, attempt = progress.attempt, "stream client disconnected");
            return;
        }
        if found {
            continue;
        }
        if !pause(&tx, pace).await {
            info!(block_index, attempt = progress.attempt, "stream client disconnected");
            return;
        }
    }

    if let Some(block) = session.sealed_block() {
        debug!(index = block.index(), hash = %block.hash(), "streamed block sealed");
    }
}

/// Wait out the pacing delay. Returns false if the client disconnected.
async fn pause(tx: &mpsc::Sender<Event>, pace: Duration) -> bool {
    if pace.is_zero() {
        tokio::task::yield_now().await;
        return !tx.is_closed();
    }
    tokio::select! {
        _ = tx.closed() => false,
        _ = tokio::time::sleep(pace) => true,
    }
}

fn to_event(progress: &ProgressEvent) -> Event {
    Event::default()
        .json_data(progress)
        .unwrap_or_else(|err| Event::default().event("error").data(err.to_string()))
}
