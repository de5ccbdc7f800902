#![forbid(unsafe_code)]

use std::fmt::Write as _;
use std::sync::Arc;

use folio_kernel_contracts::hierarchy::{EntityId, Rank};
use folio_os::navigator::{FetchApplyOutcome, ListPresence, VisiblePath};
use folio_os::session::SessionTokenStore;
use folio_os::{ExplorerError, ExplorerSession, SelectOutcome};

pub const BROWSE_USAGE: &str = "\
commands:
  ls                    show the current path
  select <rank> <id>    select an item (rank: 0-6 or library|book|section|chapter|act|parent-action|action)
  add <name>            add a library
  refresh               reload libraries
  login [token]         sign in with a bearer token
  logout                sign out (anonymous browsing)
  help                  show this help
  quit                  exit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrowseCommand {
    List,
    Select { rank: Rank, id: EntityId },
    Add { name: String },
    Refresh,
    Login { token: Option<String> },
    Logout,
    Help,
    Quit,
}

impl BrowseCommand {
    /// Log label; never carries the login token.
    pub fn name(&self) -> &'static str {
        match self {
            BrowseCommand::List => "ls",
            BrowseCommand::Select { .. } => "select",
            BrowseCommand::Add { .. } => "add",
            BrowseCommand::Refresh => "refresh",
            BrowseCommand::Login { .. } => "login",
            BrowseCommand::Logout => "logout",
            BrowseCommand::Help => "help",
            BrowseCommand::Quit => "quit",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrowseStep {
    Continue(String),
    Quit,
}

pub struct BrowseContext {
    pub explorer: Arc<ExplorerSession>,
    pub session: Arc<SessionTokenStore>,
}

/// Returns `Ok(None)` for a blank line.
pub fn parse_browse_command(line: &str) -> Result<Option<BrowseCommand>, String> {
    let trimmed = line.trim();
    let Some((head, rest)) = split_head(trimmed) else {
        return Ok(None);
    };
    let command = match head.to_ascii_lowercase().as_str() {
        "ls" | "list" => BrowseCommand::List,
        "select" | "cd" => {
            let (raw_rank, raw_id) = split_head(rest)
                .ok_or_else(|| "usage: select <rank> <id>".to_string())?;
            if raw_id.is_empty() || raw_id.contains(char::is_whitespace) {
                return Err("usage: select <rank> <id>".to_string());
            }
            let rank = Rank::parse(raw_rank).ok_or_else(|| format!("unknown rank '{raw_rank}'"))?;
            let id = EntityId::new(raw_id).map_err(|e| e.to_string())?;
            BrowseCommand::Select { rank, id }
        }
        "add" => {
            if rest.is_empty() {
                return Err("usage: add <name>".to_string());
            }
            BrowseCommand::Add {
                name: rest.to_string(),
            }
        }
        "refresh" => BrowseCommand::Refresh,
        "login" => BrowseCommand::Login {
            token: (!rest.is_empty()).then(|| rest.to_string()),
        },
        "logout" => BrowseCommand::Logout,
        "help" | "?" => BrowseCommand::Help,
        "quit" | "exit" | "q" => BrowseCommand::Quit,
        other => return Err(format!("unknown command: {other}. try 'help'")),
    };
    Ok(Some(command))
}

fn split_head(input: &str) -> Option<(&str, &str)> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }
    match input.split_once(char::is_whitespace) {
        Some((head, rest)) => Some((head, rest.trim())),
        None => Some((input, "")),
    }
}

pub async fn execute_browse_command(
    ctx: &BrowseContext,
    command: BrowseCommand,
) -> Result<BrowseStep, String> {
    tracing::debug!(command = command.name(), "executing browse command");
    let report = match command {
        BrowseCommand::List => render_visible_path(&ctx.explorer.visible_path().map_err(describe)?),
        BrowseCommand::Select { rank, id } => {
            let outcome = ctx.explorer.select_at(rank, &id).await.map_err(describe)?;
            let mut out = String::new();
            match outcome {
                SelectOutcome::LeafSelected { rank, id } => {
                    let _ = writeln!(out, "Selected {rank} {id}.");
                }
                SelectOutcome::Fetched(outcome) => {
                    if let Some(note) = outcome_note(&outcome) {
                        let _ = writeln!(out, "{note}");
                    }
                }
            }
            out.push_str(&render_visible_path(
                &ctx.explorer.visible_path().map_err(describe)?,
            ));
            out
        }
        BrowseCommand::Add { name } => {
            let outcome = ctx.explorer.create_library(&name).await.map_err(describe)?;
            let mut out = format!("Library \"{}\" added.\n", outcome.created.name.as_str());
            if outcome.present_exactly_once == Some(false) {
                out.push_str("Note: the new library did not appear after refresh.\n");
            }
            out.push_str(&render_visible_path(
                &ctx.explorer.visible_path().map_err(describe)?,
            ));
            out
        }
        BrowseCommand::Refresh => refresh_report(ctx).await?,
        BrowseCommand::Login { token } => {
            let token = token.ok_or_else(|| "missing token".to_string())?;
            let token = token.trim();
            if token.is_empty() {
                return Err("token must not be empty".to_string());
            }
            ctx.session.set_token(token);
            refresh_report(ctx).await?
        }
        BrowseCommand::Logout => {
            ctx.session.clear();
            refresh_report(ctx).await?
        }
        BrowseCommand::Help => BROWSE_USAGE.to_string(),
        BrowseCommand::Quit => return Ok(BrowseStep::Quit),
    };
    Ok(BrowseStep::Continue(report))
}

async fn refresh_report(ctx: &BrowseContext) -> Result<String, String> {
    let outcome = ctx.explorer.initialize().await.map_err(describe)?;
    let mut out = String::new();
    if let Some(note) = outcome_note(&outcome) {
        let _ = writeln!(out, "{note}");
    }
    out.push_str(&render_visible_path(
        &ctx.explorer.visible_path().map_err(describe)?,
    ));
    Ok(out)
}

fn outcome_note(outcome: &FetchApplyOutcome) -> Option<String> {
    match outcome {
        FetchApplyOutcome::Failed { rank, kind, .. } => {
            tracing::warn!(rank = %rank, kind = kind.as_str(), "browse fetch failed");
            Some(format!(
                "Could not load {} ({}).",
                heading(*rank).to_ascii_lowercase(),
                kind.as_str()
            ))
        }
        FetchApplyOutcome::Applied { .. } | FetchApplyOutcome::DiscardedStale { .. } => None,
    }
}

fn describe(err: ExplorerError) -> String {
    err.to_string()
}

pub fn render_visible_path(path: &VisiblePath) -> String {
    let mut out = String::from("Library Explorer\n");
    for view in &path.ranks {
        let _ = writeln!(out, "\n{}", heading(view.rank));
        match view.presence {
            ListPresence::Loading => out.push_str("  Loading...\n"),
            ListPresence::Empty => {
                let _ = writeln!(out, "  {}", empty_message(view.rank));
            }
            ListPresence::Populated => {
                for entity in &view.items {
                    let marker = if view.selected.as_ref() == Some(&entity.id) {
                        '*'
                    } else {
                        ' '
                    };
                    let _ = writeln!(out, " {marker}[{}] {}", entity.id, entity.label);
                }
            }
        }
    }
    out
}

fn heading(rank: Rank) -> &'static str {
    match rank {
        Rank::Library => "Libraries",
        Rank::Book => "Books",
        Rank::Section => "Sections",
        Rank::Chapter => "Chapters",
        Rank::Act => "Acts",
        Rank::ParentAction => "Parent Actions",
        Rank::Action => "Actions",
    }
}

fn empty_message(rank: Rank) -> &'static str {
    match rank {
        Rank::Library => "No libraries found. Try adding one!",
        Rank::Book => "No books found for this library. Try adding one!",
        Rank::Section => "No sections found for this book. Try adding one!",
        Rank::Chapter => "No chapters found for this section. Try adding one!",
        Rank::Act => "No acts found for this chapter. Try adding one!",
        Rank::ParentAction => "No parent actions found for this act. Try adding one!",
        Rank::Action => "No actions found for this parent action. Try adding one!",
    }
}
