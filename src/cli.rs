//! CLI front-end — stdin command REPL that redraws the email table on
//! every session change.

use std::sync::Arc;

use futures::StreamExt;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_stream::wrappers::BroadcastStream;

use crate::model::{FilterField, SearchFilters};
use crate::session::{InboxSession, LoadOutcome};
use crate::view::{self, Column, SortDirection, TableView};

/// A parsed REPL command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Set one filter field; empty value clears it.
    Filter(FilterField, String),
    /// Reset all four filters.
    Clear,
    Sort(Column, SortDirection),
    Next,
    Prev,
    /// One-based page number as typed.
    Page(usize),
    Show,
    Help,
    Quit,
}

pub const HELP: &str = "\
Commands:
  q <text>          search keyword
  account <text>    filter by account
  to <text>         filter by recipient
  from <text>       filter by sender
  clear             reset all filters
  sort <column> [asc|desc]
                    subject, from, to, date, category, reply
  next | prev       change page
  page <n>          jump to page n
  show              redraw the table
  help              this text
  quit              exit";

/// Parse one input line.
pub fn parse_command(line: &str) -> Result<Command, String> {
    let line = line.trim();
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    let filter = |field: FilterField| -> Result<Command, String> {
        Ok(Command::Filter(field, rest.to_string()))
    };

    match word.to_lowercase().as_str() {
        "q" | "search" => filter(FilterField::Query),
        "account" => filter(FilterField::Account),
        "to" => filter(FilterField::To),
        "from" => filter(FilterField::From),
        "clear" => Ok(Command::Clear),
        "next" | "n" => Ok(Command::Next),
        "prev" | "p" => Ok(Command::Prev),
        "show" | "" => Ok(Command::Show),
        "help" | "?" => Ok(Command::Help),
        "quit" | "exit" | "/quit" => Ok(Command::Quit),
        "page" => rest
            .parse::<usize>()
            .ok()
            .filter(|n| *n > 0)
            .map(Command::Page)
            .ok_or_else(|| format!("page expects a number from 1 up, got {rest:?}")),
        "sort" => {
            let mut parts = rest.split_whitespace();
            let column = parts
                .next()
                .and_then(Column::parse)
                .ok_or_else(|| format!("unknown column {rest:?}"))?;
            if !column.sortable() {
                return Err(format!("{} is not sortable", column.title()));
            }
            let direction = match parts.next().map(str::to_lowercase).as_deref() {
                None | Some("asc") => SortDirection::Ascending,
                Some("desc") => SortDirection::Descending,
                Some(other) => return Err(format!("expected asc or desc, got {other:?}")),
            };
            Ok(Command::Sort(column, direction))
        }
        other => Err(format!("unknown command {other:?} (try help)")),
    }
}

/// Terminal viewer over an `InboxSession`.
pub struct CliViewer {
    session: Arc<InboxSession>,
    view: TableView,
}

impl CliViewer {
    pub fn new(session: Arc<InboxSession>, page_size: usize) -> Self {
        Self {
            session,
            view: TableView::new(page_size),
        }
    }

    pub fn view(&self) -> &TableView {
        &self.view
    }

    /// Apply one command. Returns `false` when the viewer should exit.
    pub async fn handle(&mut self, command: Command) -> bool {
        match command {
            Command::Filter(field, value) => {
                let outcome = self.session.update_filter(field, value).await;
                self.after_search(outcome);
            }
            Command::Clear => {
                let outcome = self.session.update_filters(SearchFilters::default()).await;
                self.after_search(outcome);
            }
            Command::Sort(column, direction) => {
                self.view.sort_by(column, direction);
            }
            Command::Next => {
                let total = self.session.emails().await.len();
                self.view.next_page(total);
            }
            Command::Prev => self.view.prev_page(),
            Command::Page(n) => {
                let total = self.session.emails().await.len();
                self.view.set_page(n - 1, total);
            }
            Command::Show => {}
            Command::Help => eprintln!("{HELP}"),
            Command::Quit => return false,
        }
        true
    }

    fn after_search(&mut self, outcome: Result<LoadOutcome, crate::error::ApiError>) {
        match outcome {
            Ok(LoadOutcome::Loaded { .. }) => self.view.page = 0,
            Ok(_) => {}
            // Already recorded as the session's error banner.
            Err(e) => tracing::debug!(error = %e, "Search failed"),
        }
    }

    /// Render the current session to a string.
    pub async fn screen(&self) -> String {
        let snapshot = self.session.snapshot().await;
        view::render(&snapshot, &self.view)
    }

    async fn redraw(&self) {
        println!("\n{}", self.screen().await);
        eprint!("> ");
    }

    /// Run the REPL until `quit` or EOF on stdin.
    pub async fn run(mut self) -> crate::error::Result<()> {
        let mut events = BroadcastStream::new(self.session.subscribe());
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        if let Err(e) = self.session.reload().await {
            tracing::debug!(error = %e, "Initial search failed");
        }
        self.redraw().await;

        loop {
            tokio::select! {
                line = lines.next_line() => {
                    let Some(line) = line? else { break };
                    match parse_command(&line) {
                        Ok(command) => {
                            if !self.handle(command).await {
                                break;
                            }
                            self.redraw().await;
                        }
                        Err(message) => {
                            eprintln!("❌ {message}");
                            eprint!("> ");
                        }
                    }
                }
                Some(event) = events.next() => {
                    match event {
                        Ok(event) => tracing::debug!(?event, "Session changed"),
                        Err(e) => tracing::debug!(error = %e, "Missed session events"),
                    }
                    self.redraw().await;
                }
            }
        }

        Ok(())
    }
}
