mod app;

use std::io;
use std::time::Duration;

use app::{
    format_large_number, format_percentage, format_price, truncate, Action, AppState,
    ConnectionStatus, InputMode,
};
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState},
    Frame, Terminal,
};

const REFRESH_INTERVAL: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> io::Result<()> {
    let base_url = std::env::var("API_URL").unwrap_or_else(|_| "http://localhost:3000".to_string());

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .map_err(io::Error::other)?;

    let mut app = AppState::new(base_url);

    // Initial fetch before rendering
    app.refresh(&client).await;

    // Terminal setup
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run_loop(&mut terminal, &mut app, &client).await;

    // Restore terminal regardless of result
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    result
}

// ---------------------------------------------------------------------------
// Main event loop
// ---------------------------------------------------------------------------

async fn run_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut AppState,
    client: &reqwest::Client,
) -> io::Result<()> {
    let mut table_state = TableState::default();
    let mut last_tick = std::time::Instant::now();

    loop {
        table_state.select(app.selected);
        terminal.draw(|f| render(f, app, &mut table_state))?;

        let timeout = REFRESH_INTERVAL
            .checked_sub(last_tick.elapsed())
            .unwrap_or(Duration::ZERO);

        if event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    match app.handle_key(key.code) {
                        Action::Quit => return Ok(()),
                        Action::Refresh => {
                            app.refresh(client).await;
                            last_tick = std::time::Instant::now();
                        }
                        Action::None => {}
                    }
                }
            }
        }

        if last_tick.elapsed() >= REFRESH_INTERVAL {
            app.refresh(client).await;
            last_tick = std::time::Instant::now();
        }
    }
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

fn render(f: &mut Frame, app: &AppState, table_state: &mut TableState) {
    let area = f.area();

    // Outer vertical split: header | query bar | markets | footer
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // header
            Constraint::Length(3), // query bar
            Constraint::Min(0),    // markets
            Constraint::Length(1), // footer
        ])
        .split(area);

    render_header(f, app, chunks[0]);
    render_query_bar(f, app, chunks[1]);
    render_markets_table(f, app, table_state, chunks[2]);
    render_footer(f, app, chunks[3]);
}

fn change_color(v: f64) -> Color {
    if v > 0.0 {
        Color::Green
    } else if v < 0.0 {
        Color::Red
    } else {
        Color::DarkGray
    }
}

fn render_header(f: &mut Frame, app: &AppState, area: Rect) {
    let (status_text, status_color) = match &app.status {
        ConnectionStatus::Connected => ("● connected".to_string(), Color::Green),
        ConnectionStatus::Connecting => ("◌ connecting".to_string(), Color::Yellow),
        ConnectionStatus::Error(e) => (format!("✗ {}", truncate(e, 40)), Color::Red),
    };
    let o = &app.overview;

    let title_spans = vec![
        Span::styled(
            " Market Dashboard  ",
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        ),
        Span::styled(status_text, Style::default().fg(status_color)),
        Span::raw("  │  cap "),
        Span::styled(
            format!("${}", format_large_number(o.total_market_cap)),
            Style::default().fg(Color::White),
        ),
        Span::styled(
            format!(" {}", format_percentage(o.market_cap_change_24h)),
            Style::default().fg(change_color(o.market_cap_change_24h)),
        ),
        Span::raw("  │  vol "),
        Span::styled(
            format!("${}", format_large_number(o.total_volume)),
            Style::default().fg(Color::White),
        ),
        Span::raw("  │  "),
        Span::styled(
            format!("BTC {:.1}%  ETH {:.1}%", o.btc_dominance, o.eth_dominance),
            Style::default().fg(Color::White),
        ),
        Span::raw("  │  "),
        Span::styled(format!("▲{}", o.gainers), Style::default().fg(Color::Green)),
        Span::raw(" "),
        Span::styled(format!("▼{}", o.losers), Style::default().fg(Color::Red)),
    ];

    let paragraph = Paragraph::new(Line::from(title_spans))
        .block(Block::default().borders(Borders::ALL).border_style(
            Style::default().fg(Color::DarkGray),
        ));

    f.render_widget(paragraph, area);
}

fn render_query_bar(f: &mut Frame, app: &AppState, area: Rect) {
    let search_style = match app.mode {
        InputMode::Search => Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        InputMode::Normal => Style::default().fg(Color::White),
    };
    let cursor = if app.mode == InputMode::Search { "▏" } else { "" };
    let category = app.spec.category.as_deref().unwrap_or("all");

    let line = Line::from(vec![
        Span::styled(" search: ", Style::default().fg(Color::DarkGray)),
        Span::styled(format!("{}{cursor}", app.spec.search_text), search_style),
        Span::raw("  │  "),
        Span::styled("category: ", Style::default().fg(Color::DarkGray)),
        Span::styled(category.to_string(), Style::default().fg(Color::Cyan)),
        Span::raw("  │  "),
        Span::styled("sort: ", Style::default().fg(Color::DarkGray)),
        Span::styled(app.sort_label(), Style::default().fg(Color::Cyan)),
        Span::raw("  │  "),
        Span::styled(
            format!("{} of {} markets", app.view.len(), app.view.total),
            Style::default().fg(Color::White),
        ),
    ]);

    let paragraph = Paragraph::new(line)
        .block(Block::default().borders(Borders::ALL).border_style(
            Style::default().fg(Color::DarkGray),
        ));
    f.render_widget(paragraph, area);
}

fn render_markets_table(f: &mut Frame, app: &AppState, state: &mut TableState, area: Rect) {
    let header_cells = ["#", "Name", "Price", "24h %", "24h", "Volume", "Market Cap"]
        .iter()
        .map(|h| Cell::from(*h).style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)));
    let header = Row::new(header_cells).height(1);

    let rows: Vec<Row> = app
        .view
        .records
        .iter()
        .map(|m| {
            let color = change_color(m.change_percent_24h);
            Row::new(vec![
                Cell::from(m.rank.to_string()).style(Style::default().fg(Color::DarkGray)),
                Cell::from(format!("{} {}", m.symbol, truncate(&m.name, 18))),
                Cell::from(format_price(m.price)),
                Cell::from(format_percentage(m.change_percent_24h)).style(Style::default().fg(color)),
                Cell::from(format_price(m.change_24h)).style(Style::default().fg(color)),
                Cell::from(format!("${}", format_large_number(m.volume_24h)))
                    .style(Style::default().fg(Color::Cyan)),
                Cell::from(format!("${}", format_large_number(m.market_cap))),
            ])
        })
        .collect();

    let title = match app.selected_market() {
        _ if app.view.is_empty() && !app.markets.is_empty() => " MARKETS (no matches) ".to_string(),
        Some(m) => format!(" MARKETS › {} {} ", m.name, format_price(m.price)),
        None => " MARKETS ".to_string(),
    };

    let table = Table::new(
        rows,
        [
            Constraint::Length(4),
            Constraint::Min(16),
            Constraint::Length(14),
            Constraint::Length(9),
            Constraint::Length(12),
            Constraint::Length(10),
            Constraint::Length(11),
        ],
    )
    .header(header)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::DarkGray))
            .title(Span::styled(
                title,
                Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
            )),
    )
    .row_highlight_style(
        Style::default()
            .bg(Color::DarkGray)
            .add_modifier(Modifier::BOLD),
    );

    f.render_stateful_widget(table, area, state);
}

fn render_footer(f: &mut Frame, app: &AppState, area: Rect) {
    let key = |k: &'static str| Span::styled(k, Style::default().fg(Color::Yellow));
    let line = match app.mode {
        InputMode::Search => Line::from(vec![
            key(" [enter/esc] "),
            Span::raw("done  "),
            key("[backspace] "),
            Span::raw("delete"),
        ]),
        InputMode::Normal => Line::from(vec![
            key(" [q] "),
            Span::raw("quit  "),
            key("[r] "),
            Span::raw("refresh  "),
            key("[s/o] "),
            Span::raw("sort/order  "),
            key("[c] "),
            Span::raw("category  "),
            key("[/] "),
            Span::raw("search  "),
            key("[x] "),
            Span::raw("clear  "),
            key("[↑↓ / j k] "),
            Span::raw("select  "),
            Span::styled(
                format!(
                    "auto-refresh: {}s ({}s ago)",
                    REFRESH_INTERVAL.as_secs(),
                    app.last_refresh.elapsed().as_secs()
                ),
                Style::default().fg(Color::DarkGray),
            ),
        ]),
    };
    f.render_widget(Paragraph::new(line).style(Style::default().fg(Color::White)), area);
}
