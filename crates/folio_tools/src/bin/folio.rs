#![forbid(unsafe_code)]

use std::io::{self, BufRead, IsTerminal, Write};
use std::sync::Arc;

use folio_engines::content_http::{ContentHttpConfig, HttpContentClient};
use folio_os::content_fetch::HttpContentService;
use folio_os::navigator::NavigatorConfig;
use folio_os::session::{CredentialPolicy, SessionTokenStore};
use folio_os::ExplorerSession;
use folio_tools::browse_cli::{
    execute_browse_command, parse_browse_command, BrowseCommand, BrowseContext, BrowseStep,
};
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with_writer(io::stderr)
        .init();

    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(2);
    }
}

fn run() -> Result<(), String> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| format!("failed to start runtime: {e}"))?;

    let http_config = ContentHttpConfig::from_env()?;
    let client = HttpContentClient::new(http_config)?;
    let service = Arc::new(HttpContentService::new(client));
    let session = Arc::new(SessionTokenStore::from_env());
    let ctx = BrowseContext {
        explorer: Arc::new(ExplorerSession::new(
            NavigatorConfig::from_env(),
            service.clone(),
            service,
            session.clone(),
            CredentialPolicy::from_env().map_err(|e| e.to_string())?,
        )),
        session,
    };

    runtime.block_on(repl(&ctx))
}

async fn repl(ctx: &BrowseContext) -> Result<(), String> {
    let interactive = io::stdin().is_terminal();
    if let BrowseStep::Continue(out) = execute_browse_command(ctx, BrowseCommand::Refresh).await? {
        println!("{out}");
    }

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        if interactive {
            print!("folio> ");
            io::stdout().flush().map_err(|e| e.to_string())?;
        }
        let Some(line) = lines.next() else {
            return Ok(());
        };
        let line = line.map_err(|e| e.to_string())?;

        let command = match parse_browse_command(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(err) => {
                eprintln!("{err}");
                continue;
            }
        };
        let command = match command {
            BrowseCommand::Login { token: None } => {
                let token = if interactive {
                    rpassword::prompt_password("Bearer token: ").map_err(|e| e.to_string())?
                } else {
                    match lines.next() {
                        Some(line) => line.map_err(|e| e.to_string())?,
                        None => return Err("missing token after login".to_string()),
                    }
                };
                BrowseCommand::Login { token: Some(token) }
            }
            other => other,
        };

        match execute_browse_command(ctx, command).await {
            Ok(BrowseStep::Continue(out)) => println!("{out}"),
            Ok(BrowseStep::Quit) => return Ok(()),
            Err(err) => eprintln!("{err}"),
        }
    }
}
