use crate::render::{self, SearchReport};
use crate::{print_stdout, SearchArgs};
use anyhow::{Context as AnyhowContext, Result};
use log::warn;
use tokio::sync::watch;
use usersearch_engine::{EngineError, QueryValidator, SearchSession, SearchSnapshot, StateTag};
use usersearch_protocol::{User, UsersMetadata};

pub async fn run(
    session: &SearchSession<User>,
    validator: QueryValidator,
    args: SearchArgs,
) -> Result<()> {
    let query = validator.validate(&args.query).map_err(EngineError::from)?;
    let mut updates = session.subscribe();

    let before = updates.borrow_and_update().revision;
    session.set_query(query.as_str())?;
    let mut snapshot = settle(&mut updates, before).await?;

    let mut pages = 1;
    while pages < args.pages && snapshot.tag() == StateTag::Loaded && snapshot.has_next_page() {
        let before = snapshot.revision;
        session.load_next_page()?;
        snapshot = settle(&mut updates, before).await?;
        pages += 1;
    }

    if args.json {
        print_stdout(&serde_json::to_string_pretty(&SearchReport::from_snapshot(
            &snapshot,
        ))?)?;
    } else {
        print_text(&snapshot)?;
    }

    match snapshot.tag() {
        StateTag::FirstPageError => anyhow::bail!("Search for \"{query}\" failed"),
        StateTag::NextPageError => {
            warn!("Stopped after {} users: a later page failed", snapshot.items().len());
        }
        _ => {}
    }
    Ok(())
}

/// Waits for the first snapshot past `after` that is not loading.
async fn settle(
    updates: &mut watch::Receiver<SearchSnapshot<User>>,
    after: u64,
) -> Result<SearchSnapshot<User>> {
    let snapshot = updates
        .wait_for(|s| s.revision > after && !s.is_loading())
        .await
        .context("Search session stopped unexpectedly")?
        .clone();
    Ok(snapshot)
}

fn print_text(snapshot: &SearchSnapshot<User>) -> Result<()> {
    if let Some(header) = render::results_header(snapshot) {
        print_stdout(&header)?;
        print_stdout(&render::metadata_line(&UsersMetadata::from_users(
            snapshot.items(),
        )))?;
        for user in snapshot.items() {
            print_stdout(&render::user_line(user))?;
        }
    }
    if let Some(message) = render::status_message(snapshot) {
        print_stdout(&message)?;
    }
    Ok(())
}
