use batch_core::{AppViewModel, ResultRow, RowStatus, SessionState};

const BAR_WIDTH: usize = 30;
const LABEL_WIDTH: usize = 16;

pub(crate) fn status_line(view: &AppViewModel) -> String {
    let session_label = match view.session {
        SessionState::Idle => "Idle",
        SessionState::Running => "Running",
        SessionState::Cancelling => "Cancelling",
        SessionState::Finished => "Finished",
    };
    let filled = BAR_WIDTH * usize::from(view.percent) / 100;
    format!(
        "{} [{}{}] {}/{} ({}%)",
        session_label,
        "#".repeat(filled),
        "-".repeat(BAR_WIDTH - filled),
        view.completed,
        view.progress_total,
        view.percent
    )
}

pub(crate) fn results_table(view: &AppViewModel) -> String {
    let mut out = format!(
        "{:>4}  {:<width$}  {:<9}  {:>8}  {:>4}  {:>5}  {}\n",
        "ROW",
        "LABEL",
        "STATUS",
        "ATTEMPTS",
        "HTTP",
        "FILES",
        "ERRORS",
        width = LABEL_WIDTH
    );
    for row in &view.results {
        out.push_str(&table_line(row));
        out.push('\n');
    }
    let s = &view.summary;
    out.push_str(&format!(
        "{} ok, {} failed, {} cancelled, {} invalid, {} crashed; {} files downloaded",
        s.succeeded, s.failed, s.cancelled, s.invalid, s.crashed, s.downloads
    ));
    out
}

fn table_line(row: &ResultRow) -> String {
    let http = row
        .http_status
        .map_or_else(|| "-".to_string(), |code| code.to_string());
    format!(
        "{:>4}  {:<width$}  {:<9}  {:>8}  {:>4}  {:>5}  {}",
        row.index + 1,
        truncate(&row.label, LABEL_WIDTH),
        status_label(row.status),
        row.attempts,
        http,
        row.downloads,
        row.errors.join(" | "),
        width = LABEL_WIDTH
    )
}

fn status_label(status: RowStatus) -> &'static str {
    match status {
        RowStatus::Success => "ok",
        RowStatus::Failed => "failed",
        RowStatus::Cancelled => "cancelled",
        RowStatus::Invalid => "invalid",
        RowStatus::Crashed => "crashed",
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max - 1).collect();
    out.push('…');
    out
}
