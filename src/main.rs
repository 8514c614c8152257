use std::sync::Arc;

use futures::StreamExt;
use futures::stream;
use tokio::io::{AsyncBufReadExt, BufReader};

use persona_chat::cli::{self, Command};
use persona_chat::engine::ChatEngine;
use persona_chat::error::ChatError;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let engine = Arc::new(ChatEngine::from_env()?);

    eprintln!("💬 Persona Chat v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Default model: {}", engine.config().default_model);
    eprintln!("   Pending policy: {}", engine.config().pending_policy);
    eprintln!("   /help for commands, /quit to exit.\n");

    // ── Event printer ───────────────────────────────────────────────
    let mut events = engine.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    if let Some(text) = cli::render_event(&event) {
                        println!("{text}");
                        eprint!("> ");
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "Event printer lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    // ── REPL ────────────────────────────────────────────────────────
    let lines = BufReader::new(tokio::io::stdin()).lines();
    let mut input = Box::pin(stream::unfold(lines, |mut lines| async move {
        match lines.next_line().await {
            Ok(Some(line)) => Some((line, lines)),
            Ok(None) => None,
            Err(e) => {
                tracing::error!("Error reading stdin: {}", e);
                None
            }
        }
    }));

    print_assistants(&engine, None);
    eprint!("> ");

    while let Some(line) = input.next().await {
        if line.trim().is_empty() {
            eprint!("> ");
            continue;
        }

        let command = match Command::parse(&line) {
            Ok(command) => command,
            Err(e) => {
                eprintln!("{e}");
                eprint!("> ");
                continue;
            }
        };

        if command == Command::Quit {
            break;
        }
        if let Err(e) = handle(&engine, command).await {
            eprintln!("⚠️  {e}");
        }
        eprint!("> ");
    }

    engine.shutdown().await;
    eprintln!("Bye!");
    Ok(())
}

async fn handle(engine: &ChatEngine, command: Command) -> Result<(), ChatError> {
    match command {
        Command::Assistants(query) => print_assistants(engine, query.as_deref()),
        Command::Select(id) => {
            engine.select_assistant(&id).await?;
            print_active(engine).await;
        }
        Command::New => {
            let session = engine.active_session().await.ok_or(ChatError::NoActiveSession)?;
            engine.create_session(&session.assistant_id, None).await?;
            print_active(engine).await;
        }
        Command::Sessions => {
            let active = engine.active_session_id().await;
            for (i, session) in engine.sessions().await.iter().enumerate() {
                let marker = if Some(session.id) == active { "*" } else { " " };
                println!(
                    "{marker}{:>2}. {} [{}] ({} messages)",
                    i + 1,
                    session.title,
                    session.model_type,
                    session.messages.len()
                );
            }
        }
        Command::Switch(n) => {
            let sessions = engine.sessions().await;
            let Some(session) = sessions.get(n - 1) else {
                println!("No chat #{n}, see /sessions");
                return Ok(());
            };
            engine.select_session(session.id).await?;
            print_active(engine).await;
        }
        Command::Delete => {
            let id = engine.active_session_id().await.ok_or(ChatError::NoActiveSession)?;
            engine.delete_session(id).await?;
            print_active(engine).await;
        }
        Command::Favorite(id) => {
            let now = engine.toggle_favorite(&id).await?;
            println!("{id} {}", if now { "★ favorited" } else { "☆ unfavorited" });
        }
        Command::Favorites => {
            let names = |list: Vec<persona_chat::catalog::Assistant>| {
                list.into_iter().map(|a| a.name).collect::<Vec<_>>().join(", ")
            };
            println!("Favorites: {}", names(engine.favorite_assistants().await));
            println!("Recent:    {}", names(engine.recent_assistants().await));
        }
        Command::Model(model) => {
            engine.change_model(model).await?;
            engine.set_preferred_model(model).await;
        }
        Command::Cancel => {
            let id = engine.active_session_id().await.ok_or(ChatError::NoActiveSession)?;
            if !engine.cancel_reply(id).await? {
                println!("Nothing to cancel");
            }
        }
        Command::Clear => {
            let id = engine.active_session_id().await.ok_or(ChatError::NoActiveSession)?;
            engine.clear_messages(id).await?;
            print_active(engine).await;
        }
        Command::Help => println!("{}", cli::HELP),
        Command::Send(text) => {
            engine.send_message(&text).await?;
        }
        Command::Quit => {}
    }
    Ok(())
}

fn print_assistants(engine: &ChatEngine, query: Option<&str>) {
    let catalog = engine.catalog();
    let assistants: Vec<_> = match query {
        Some(q) => catalog.search(q),
        None => catalog.list().iter().collect(),
    };
    for a in assistants {
        println!("{} {:<16} {} ({})", a.avatar, a.id, a.name, a.role);
    }
}

async fn print_active(engine: &ChatEngine) {
    match engine.active_view().await {
        Some(view) => {
            println!("── {} [{}] ──", view.title, view.model_type);
            for message in &view.messages {
                println!("{}: {}", message.role, message.content);
            }
        }
        None => println!("(no active chat)"),
    }
}
