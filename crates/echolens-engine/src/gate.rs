use tokio::task::JoinSet;

use echolens_core::agents::AgentRun;

use crate::error::PipelineError;
use crate::multiplexer::DrainOutcome;

/// Wait for every drain task and return the runs in roster order.
///
/// Released only once all `roster_len` tasks have reported a completed run.
/// On the first failure the remaining tasks are aborted and awaited, so no
/// further chunk can be emitted once this returns.
pub async fn await_all(
    mut tasks: JoinSet<DrainOutcome>,
    roster_len: usize,
) -> Result<Vec<AgentRun>, PipelineError> {
    let mut slots: Vec<Option<AgentRun>> = (0..roster_len).map(|_| None).collect();

    while let Some(joined) = tasks.join_next().await {
        let failure = match joined {
            Ok((index, Ok(run))) => match slots.get_mut(index) {
                Some(slot) if slot.is_none() => {
                    *slot = Some(run);
                    continue;
                }
                _ => PipelineError::Internal(format!("drain task reported bad slot {index}")),
            },
            Ok((_, Err(e))) => e,
            Err(join_err) => PipelineError::Internal(format!("drain task failed: {join_err}")),
        };

        shutdown(&mut tasks).await;
        return Err(failure);
    }

    let runs = slots
        .into_iter()
        .enumerate()
        .map(|(index, slot)| match slot {
            Some(run) if run.is_complete() => Ok(run),
            _ => Err(PipelineError::Internal(format!(
                "agent {index} finished without completing"
            ))),
        })
        .collect::<Result<Vec<_>, _>>()?;

    tracing::info!(agents = runs.len(), "all agent streams complete");
    Ok(runs)
}

async fn shutdown(tasks: &mut JoinSet<DrainOutcome>) {
    tasks.abort_all();
    while tasks.join_next().await.is_some() {}
}
