use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout},
    style::{Color, Style, Modifier},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Wrap},
};

use hunter_core::control::{TickAction, TickOutcome};
use hunter_core::types::{DeathState, RunState};
use crate::App;

pub fn draw(f: &mut Frame, app: &App) {
    let chunks = if app.log_visible {
        Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(45), Constraint::Percentage(55)])
            .split(f.area())
    } else {
        Layout::default()
            .constraints([Constraint::Percentage(100)])
            .split(f.area())
    };

    let state = app.state();
    let telemetry = state.telemetry();

    // -- Left panel: status --

    let (banner_label, banner_bg) = match state.run_state() {
        RunState::Running => ("RUNNING (Press S to pause)", Color::Green),
        RunState::Paused => ("PAUSED (Press S to resume)", Color::Yellow),
        RunState::Idle => ("IDLE (Press S to start)", Color::Red),
    };

    let mut lines: Vec<Line> = Vec::new();

    lines.push(Line::from(vec![
        Span::styled(" s", Style::default().fg(Color::Yellow)),
        Span::raw(" run/pause, "),
        Span::styled("z", Style::default().fg(Color::Yellow)),
        Span::raw(" zone, "),
        Span::styled("d", Style::default().fg(Color::Yellow)),
        Span::raw(" death test, "),
        Span::styled("l", Style::default().fg(Color::Yellow)),
        Span::raw(" log, "),
        Span::styled("q", Style::default().fg(Color::Yellow)),
        Span::raw(" quit"),
    ]));
    lines.push(Line::from(""));

    let (death_label, death_color) = match state.death_state() {
        DeathState::Alive => ("alive", Color::Green),
        DeathState::Incapacitated => ("incapacitated", Color::Red),
    };
    let (lock_label, lock_color) = if state.is_locked() {
        ("locked", Color::Magenta)
    } else {
        ("free", Color::Cyan)
    };
    let zone = match telemetry.zone_preset {
        Some(p) if telemetry.zone_radius <= 0.0 => format!("{} (hunting off)", p),
        Some(p) => format!("{} {:.0}px", p, telemetry.zone_radius),
        None => "-".into(),
    };
    let target = telemetry.target.map_or_else(|| "none".to_string(), |p| p.to_string());

    lines.push(field("player", Span::styled(death_label, Style::default().fg(death_color))));
    lines.push(field("combat", Span::styled(lock_label, Style::default().fg(lock_color))));
    lines.push(field("zone", Span::raw(zone)));
    lines.push(field("target", Span::raw(target)));
    lines.push(field("fps", Span::raw(format!("{:.1}", telemetry.fps))));
    lines.push(Line::from(""));
    lines.push(field("ticks", Span::raw(telemetry.ticks.to_string())));
    lines.push(field("clicks", Span::raw(telemetry.clicks.to_string())));
    lines.push(field("moves", Span::raw(format!("{} ({} turns)", telemetry.moves, telemetry.viewpoint_adjusts))));
    lines.push(field(
        "errors",
        Span::styled(
            format!("{} collaborator, {} action", telemetry.collaborator_errors, telemetry.action_errors),
            Style::default().fg(Color::DarkGray),
        ),
    ));
    if let Some(outcome) = &telemetry.last_outcome {
        lines.push(field("last", describe(outcome)));
    }

    // Split left panel into banner (1 line) + status (fills space)
    let left_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Min(0)])
        .split(chunks[0]);

    // Full-width centered banner
    let banner_width = left_chunks[0].width as usize;
    let pad_total = banner_width.saturating_sub(banner_label.len());
    let pad_left = pad_total / 2;
    let pad_right = pad_total - pad_left;
    let centered_banner = format!("{}{}{}", " ".repeat(pad_left), banner_label, " ".repeat(pad_right));
    let banner = Paragraph::new(Line::from(Span::styled(
        centered_banner,
        Style::default().fg(Color::Black).bg(banner_bg).add_modifier(Modifier::BOLD),
    )));
    f.render_widget(banner, left_chunks[0]);

    let status = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::LEFT | Borders::RIGHT | Borders::BOTTOM)
            .border_style(Style::default().fg(Color::Cyan)),
    );
    f.render_widget(status, left_chunks[1]);

    // -- Right panel: logs --
    if app.log_visible && chunks.len() > 1 {
        let visible_height = chunks[1].height.saturating_sub(2) as usize;
        let total = app.log_messages.len();
        let max_scroll = total.saturating_sub(visible_height);
        let scroll = app.log_scroll.min(max_scroll);
        let start = total.saturating_sub(visible_height + scroll);
        let end = total.saturating_sub(scroll);
        let log_lines: Vec<Line> = app.log_messages[start..end]
            .iter()
            .map(|m| parse_log_line(m))
            .collect();

        let log_panel = Paragraph::new(log_lines)
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title(" Logs ")
                    .border_style(Style::default().fg(Color::Yellow)),
            )
            .wrap(Wrap { trim: false });
        f.render_widget(log_panel, chunks[1]);
    }

    if let Some(dialog) = &app.confirm {
        dialog.render(f);
    }
}

fn field<'a>(name: &'a str, value: Span<'a>) -> Line<'a> {
    Line::from(vec![
        Span::styled(format!(" {:<8}", name), Style::default().fg(Color::DarkGray)),
        value,
    ])
}

fn describe(outcome: &TickOutcome) -> Span<'static> {
    let action = |a: &TickAction| match a {
        TickAction::NotRunning => "not running".to_string(),
        TickAction::Incapacitated => "waiting out incapacitation".to_string(),
        TickAction::DeathHandled(r) => format!("death handled ({})", r),
        TickAction::Hold => "holding, in combat".to_string(),
        TickAction::Clicked(p) => format!("clicked {}", p),
        TickAction::Explored(p) => format!("explored to {}", p),
        TickAction::Waiting => "waiting for targets".to_string(),
    };
    match outcome {
        TickOutcome::Success(a) => Span::styled(action(a), Style::default().fg(Color::White)),
        TickOutcome::CollaboratorError { error, fallback } => Span::styled(
            format!("{} ({})", action(fallback), error),
            Style::default().fg(Color::Yellow),
        ),
        TickOutcome::ActionError { error } => Span::styled(error.to_string(), Style::default().fg(Color::Red)),
    }
}

/// Parse a structured log line (level\x1fprefix\x1fcolor\x1ftimestamp\x1fmessage)
/// into a colored Line for TUI rendering.
fn parse_log_line(raw: &str) -> Line<'_> {
    let parts: Vec<&str> = raw.splitn(5, '\x1f').collect();
    if parts.len() < 5 {
        // Fallback for unstructured messages
        return Line::from(raw);
    }

    let level = parts[0];
    let prefix = parts[1];
    let color_idx: u8 = parts[2].parse().unwrap_or(0);
    let timestamp = parts[3];
    let message = parts[4];

    let prefix_color = match color_idx {
        1 => Color::DarkGray,  // COLOR_GRAY
        2 => Color::LightBlue, // COLOR_BLUE
        _ => Color::White,
    };

    let mut spans = vec![
        Span::styled(timestamp, Style::default().fg(Color::DarkGray)),
        Span::raw(" "),
    ];

    // Level tag: only show for warn/error/debug
    match level {
        "ERROR" => spans.push(Span::styled("error ", Style::default().fg(Color::Red))),
        "WARN" => spans.push(Span::styled("warn ", Style::default().fg(Color::Yellow))),
        "DEBUG" | "TRACE" => spans.push(Span::styled("debug ", Style::default().fg(Color::DarkGray))),
        _ => {}
    }

    if !prefix.is_empty() {
        spans.push(Span::styled(prefix, Style::default().fg(prefix_color).add_modifier(Modifier::BOLD)));
        spans.push(Span::styled(" ", Style::default().fg(prefix_color)));
    }
    spans.push(Span::styled(message, Style::default().fg(prefix_color)));

    Line::from(spans)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structured_line_gets_level_tag_and_prefix() {
        let line = parse_log_line("WARN\x1ftracker\x1f2\x1f12:00:01\x1fcombat probe failed");
        let text: Vec<&str> = line.spans.iter().map(|s| s.content.as_ref()).collect();
        assert_eq!(text, vec!["12:00:01", " ", "warn ", "tracker", " ", "combat probe failed"]);
        assert_eq!(line.spans[3].style.fg, Some(Color::LightBlue));
    }

    #[test]
    fn unstructured_line_is_passed_through() {
        let line = parse_log_line("plain text");
        assert_eq!(line.spans.len(), 1);
        assert_eq!(line.spans[0].content, "plain text");
    }
}
