use std::collections::{HashMap, HashSet};
use std::path::Path;

use lanzou_core::RemoteApi;
use lanzou_transfer::{Subscription, TaskError, TaskEvent, TaskId, TaskStatus, TransferQueue};

const KB: f64 = 1024.0;
const MB: f64 = 1024.0 * 1024.0;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Summary {
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
}

/// One progress line, e.g. `  42.0% 1.2/3.0MB | name`.
pub fn format_progress(name: &str, total: Option<u64>, now: u64) -> String {
    let Some(total) = total else {
        let (piece, unit) = unit_for(now);
        return format!("        {:.1}{unit} | {name}", now as f64 / piece);
    };
    let percent = if total == 0 {
        100.0
    } else {
        now.min(total) as f64 * 100.0 / total as f64
    };
    let (piece, unit) = unit_for(total);
    let mut line = format!(
        "{percent:>6.1}% {:.1}/{:.1}{unit} | {name}",
        now as f64 / piece,
        total as f64 / piece
    );
    if now >= total {
        line.push_str(" | done");
    }
    line
}

fn unit_for(bytes: u64) -> (f64, &'static str) {
    if bytes as f64 >= MB { (MB, "MB") } else { (KB, "KB") }
}

fn retry_hint(error: &TaskError) -> &'static str {
    match error {
        TaskError::Api(api) if api.is_transient() => " (temporary, try again later)",
        _ => "",
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Consumes queue events until every task in `ids` is finished.
///
/// Text mode prints a line whenever a task's whole percentage moves; JSON
/// mode prints every event. Ctrl-C shuts the queue down and keeps draining.
pub async fn watch<A: RemoteApi>(
    queue: &TransferQueue<A>,
    events: &mut Subscription,
    ids: &[TaskId],
    json: bool,
) -> anyhow::Result<Summary> {
    let mut outstanding: HashSet<TaskId> = ids.iter().copied().collect();
    let names: HashMap<TaskId, String> = queue
        .snapshot()
        .into_iter()
        .filter(|task| outstanding.contains(&task.id))
        .map(|task| (task.id, display_name(&task.local_path)))
        .collect();
    let mut shown: HashMap<TaskId, u64> = HashMap::new();
    let mut summary = Summary::default();

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut interrupted = false;

    while !outstanding.is_empty() {
        let event = tokio::select! {
            _ = &mut ctrl_c, if !interrupted => {
                interrupted = true;
                tracing::warn!("interrupted, cancelling transfers");
                queue.shutdown();
                continue;
            }
            event = events.recv() => event,
        };
        let Some(event) = event else {
            break;
        };
        let id = event.task_id();
        if !outstanding.contains(&id) {
            continue;
        }
        if json {
            println!("{}", serde_json::to_string(&event)?);
        }
        let name = names.get(&id).map(String::as_str).unwrap_or("?");

        match event {
            TaskEvent::Progress {
                transferred, total, ..
            } if !json => {
                let step = match total {
                    Some(total) if total > 0 => transferred.saturating_mul(100) / total,
                    _ => transferred / (MB as u64),
                };
                if shown.insert(id, step) != Some(step) {
                    eprintln!("{}", format_progress(name, total, transferred));
                }
            }
            TaskEvent::StatusChanged { status, error, .. } if status.is_terminal() => {
                outstanding.remove(&id);
                match status {
                    TaskStatus::Completed => summary.completed += 1,
                    TaskStatus::Cancelled => summary.cancelled += 1,
                    _ => summary.failed += 1,
                }
                if !json {
                    match error {
                        Some(error) => {
                            eprintln!("{status} {name}: {error}{}", retry_hint(&error))
                        }
                        None => eprintln!("{status} {name}"),
                    }
                }
            }
            _ => {}
        }
    }
    Ok(summary)
}
