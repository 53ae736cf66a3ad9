use crate::{ChunkdlError, Result};
use futures::future::join_all;
use std::time::Duration;
use tokio::task::{JoinError, JoinHandle};
use tracing::debug;

/// Wait for every task to finish, in spawn order
///
/// Failed tasks don't cancel their siblings. When `deadline` elapses first,
/// every task still running is aborted.
pub(crate) async fn join_barrier<T>(
    handles: &mut [JoinHandle<T>],
    deadline: Option<Duration>,
) -> Result<Vec<std::result::Result<T, JoinError>>> {
    let limit = match deadline {
        Some(limit) => limit,
        None => return Ok(join_all(handles.iter_mut()).await),
    };
    let res = tokio::time::timeout(limit, join_all(handles.iter_mut())).await;
    match res {
        Ok(joined) => Ok(joined),
        Err(_) => {
            debug!("Deadline of {:?} elapsed, aborting {} tasks", limit, handles.len());
            for h in handles.iter() {
                h.abort();
            }
            Err(ChunkdlError::DeadlineExceeded(limit))
        }
    }
}
