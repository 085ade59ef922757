//! Single-line progress rendering for `rwl load`.

use rwl_core::coordinator::LoadSession;
use std::io::Write;

const MIB: f64 = 1_048_576.0;

pub fn status_line(session: &LoadSession) -> String {
    let state = session.state.as_str();
    match session.byte_progress() {
        Some((current, total)) => format!(
            "  {:<18} {:.1} / {:.1} MiB ({}%)",
            state,
            current as f64 / MIB,
            total as f64 / MIB,
            session.percent
        ),
        None => format!("  {:<18} {}%", state, session.percent),
    }
}

/// Redraw the progress line in place.
pub fn draw(session: &LoadSession) {
    print!("\r{}  ", status_line(session));
    let _ = std::io::stdout().flush();
}

/// Move past the progress line before printing anything else.
pub fn end_line() {
    println!();
}
