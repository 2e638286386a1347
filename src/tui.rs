//! Terminal UI for the live publish feed.
//! Retro terminal style - green on black like classic computers.

use std::io;
use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::Utc;
use crossterm::{
    event::{self, Event, KeyCode, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, Paragraph},
    Frame, Terminal,
};

use crate::client::NotificationFeed;

// Classic green-on-black palette.
const TERM_GREEN: Color = Color::Rgb(0, 255, 65);
const TERM_GREEN_DIM: Color = Color::Rgb(0, 180, 45);
const TERM_AMBER: Color = Color::Rgb(255, 176, 0);
const TERM_BLACK: Color = Color::Rgb(0, 0, 0);

/// Feed viewer state.
struct App {
    feed: NotificationFeed,
    endpoint: String,
    should_quit: bool,
}

impl App {
    fn new(feed: NotificationFeed, endpoint: &str) -> Self {
        Self {
            feed,
            endpoint: endpoint.to_string(),
            should_quit: false,
        }
    }
}

/// Run the feed viewer until the user quits.
pub async fn run_feed(feed: NotificationFeed, endpoint: &str) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = App::new(feed, endpoint);

    let tick_rate = Duration::from_millis(100);
    let mut last_tick = Instant::now();

    loop {
        terminal.draw(|f| ui(f, &app))?;

        let timeout = tick_rate.saturating_sub(last_tick.elapsed());

        if event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                match key.code {
                    KeyCode::Char('q') | KeyCode::Esc => app.should_quit = true,
                    KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                        app.should_quit = true
                    }
                    KeyCode::Char('x') => app.feed.clear_notifications(),
                    _ => {}
                }
            }
        }

        if last_tick.elapsed() >= tick_rate {
            last_tick = Instant::now();
        }

        if app.should_quit {
            break;
        }
    }

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    Ok(())
}

fn ui(f: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(8),
            Constraint::Min(5),
        ])
        .split(f.area());

    // Header
    let header = Paragraph::new(Line::from(vec![
        Span::styled(
            " BLOGCAST ",
            Style::default()
                .fg(TERM_BLACK)
                .bg(TERM_GREEN)
                .add_modifier(Modifier::BOLD),
        ),
        Span::styled(" live publish feed ", Style::default().fg(TERM_GREEN)),
        Span::styled(
            format!("· {} · q quit · x dismiss", app.endpoint),
            Style::default().fg(TERM_GREEN_DIM),
        ),
    ]))
    .block(Block::default().borders(Borders::ALL).border_style(Style::default().fg(TERM_GREEN_DIM)));
    f.render_widget(header, chunks[0]);

    // Notifications (each disappears a few seconds after it arrived)
    let notifications = app.feed.notifications();
    let items: Vec<ListItem> = if notifications.is_empty() {
        vec![ListItem::new(Span::styled(
            "no new posts",
            Style::default().fg(TERM_GREEN_DIM),
        ))]
    } else {
        notifications
            .iter()
            .map(|n| {
                let age = (Utc::now() - n.timestamp).num_seconds();
                ListItem::new(Line::from(vec![
                    Span::styled("● ", Style::default().fg(TERM_AMBER)),
                    Span::styled(n.message.clone(), Style::default().fg(TERM_GREEN)),
                    Span::styled(format!("  {age}s ago"), Style::default().fg(TERM_GREEN_DIM)),
                ]))
            })
            .collect()
    };
    let notifications_list = List::new(items).block(
        Block::default()
            .borders(Borders::ALL)
            .title(" notifications ")
            .border_style(Style::default().fg(TERM_GREEN_DIM)),
    );
    f.render_widget(notifications_list, chunks[1]);

    // Posts received since the feed opened
    let posts = app.feed.posts();
    let items: Vec<ListItem> = if posts.is_empty() {
        vec![ListItem::new(Span::styled(
            "waiting for published posts...",
            Style::default().fg(TERM_GREEN_DIM),
        ))]
    } else {
        posts
            .iter()
            .map(|post| {
                ListItem::new(Line::from(vec![
                    Span::styled(
                        post.title.clone(),
                        Style::default().fg(TERM_GREEN).add_modifier(Modifier::BOLD),
                    ),
                    Span::styled(
                        format!("  by {}", post.author.username),
                        Style::default().fg(TERM_GREEN_DIM),
                    ),
                    Span::styled(
                        format!("  {}", post.created_at.format("%H:%M:%S")),
                        Style::default().fg(TERM_GREEN_DIM),
                    ),
                ]))
            })
            .collect()
    };
    let posts_list = List::new(items).block(
        Block::default()
            .borders(Borders::ALL)
            .title(" posts ")
            .border_style(Style::default().fg(TERM_GREEN_DIM)),
    );
    f.render_widget(posts_list, chunks[2]);
}
