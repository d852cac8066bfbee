use crate::print_stdout;
use crate::render;
use anyhow::{Context as AnyhowContext, Result};
use log::debug;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::Instant;
use usersearch_engine::{Query, QueryValidator, SearchSession, SearchSnapshot, StateTag};
use usersearch_protocol::{User, UsersMetadata};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Line {
    Input(String),
    More,
    Retry,
    Clear,
    Quit,
}

impl Line {
    fn parse(line: &str) -> Self {
        match line.trim() {
            ":more" | ":m" => Self::More,
            ":retry" | ":r" => Self::Retry,
            ":clear" | ":c" => Self::Clear,
            ":quit" | ":q" => Self::Quit,
            _ => Self::Input(line.to_string()),
        }
    }
}

/// Each stdin line replaces the search box contents. On EOF the last line is
/// committed right away and the final state is printed.
pub async fn run(session: &SearchSession<User>, validator: QueryValidator) -> Result<()> {
    print_stdout("Type to search GitHub users. Commands: :more, :retry, :clear, :quit")?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut updates = session.subscribe();
    let mut debounce = session.subscribe_debounce();
    let mut debounce_open = true;
    let mut view = View::default();
    let mut last_input: Option<String> = None;

    let initial = updates.borrow_and_update().clone();
    view.show(&initial)?;

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read stdin")? else {
                    break;
                };
                match Line::parse(&line) {
                    Line::Quit => return Ok(()),
                    Line::More => session.load_next_page()?,
                    Line::Retry => session.retry()?,
                    Line::Clear => {
                        last_input = None;
                        session.reset()?;
                    }
                    Line::Input(raw) => {
                        session.submit_input(raw.clone())?;
                        last_input = Some(raw);
                    }
                }
            }
            changed = updates.changed() => {
                if changed.is_err() {
                    debug!("search session closed");
                    return Ok(());
                }
                let snapshot = updates.borrow_and_update().clone();
                view.show(&snapshot)?;
            }
            changed = debounce.changed(), if debounce_open => {
                if changed.is_err() {
                    debounce_open = false;
                    continue;
                }
                let progress = *debounce.borrow_and_update();
                let bar = render::debounce_bar(&progress, Instant::now());
                if !bar.is_empty() {
                    print_stdout(&format!("  {bar}"))?;
                }
            }
        }
    }

    let expected = match last_input {
        Some(raw) => flush(session, validator, &raw)?,
        None => None,
    };
    let snapshot = updates
        .wait_for(|s| {
            !s.is_loading()
                && s.tag() != StateTag::Validating
                && expected.as_ref().map_or(true, |q| s.query.as_ref() == Some(q))
        })
        .await
        .context("Search session stopped unexpectedly")?
        .clone();
    view.show(&snapshot)?;
    Ok(())
}

/// Commits pending input without waiting out the debounce.
fn flush(
    session: &SearchSession<User>,
    validator: QueryValidator,
    raw: &str,
) -> Result<Option<Query>> {
    session.cancel_input()?;
    match validator.validate(raw) {
        Ok(query) => {
            session.set_query(query.as_str())?;
            Ok(Some(query))
        }
        Err(err) => {
            debug!("discarding pending input: {err}");
            Ok(None)
        }
    }
}

/// Prints snapshots incrementally: new users as they arrive, status changes once.
#[derive(Default)]
struct View {
    query: Option<Query>,
    shown: usize,
    status: Option<String>,
}

impl View {
    fn show(&mut self, snapshot: &SearchSnapshot<User>) -> Result<()> {
        let items = snapshot.items();
        if snapshot.query != self.query || items.len() < self.shown {
            self.query = snapshot.query.clone();
            self.shown = 0;
        }

        if items.len() > self.shown {
            if self.shown == 0 {
                if let Some(header) = render::results_header(snapshot) {
                    print_stdout(&header)?;
                }
            }
            for user in &items[self.shown..] {
                print_stdout(&render::user_line(user))?;
            }
            self.shown = items.len();
            print_stdout(&render::metadata_line(&UsersMetadata::from_users(items)))?;
        }

        let status = render::status_message(snapshot);
        if status != self.status {
            if let Some(message) = &status {
                print_stdout(message)?;
            }
            self.status = status;
        }
        Ok(())
    }
}
