// Interactive demo wired to the in-memory backend. Drives the same client
// core the library exposes: session manager, router, synchronizer, auth
// flow and the avatar pipeline.
use std::sync::Arc;

use tokio::io::{stdin, AsyncBufReadExt, BufReader};

use chiacchiera::client::config::ClientConfig;
use chiacchiera::client::router::{AppGraph, Navigator};
use chiacchiera::client::services::auth_flow::AuthFlow;
use chiacchiera::client::services::profile_pipeline::ProfilePipeline;
use chiacchiera::client::services::session_manager::SessionManager;
use chiacchiera::client::services::synchronizer::MessageSynchronizer;
use chiacchiera::common::models::Message;
use chiacchiera::remote::memory::{MemoryBlobStore, MemoryIdentity, MemoryStore, ScriptedPicker};

fn print_view(view: &[Message]) {
    if view.is_empty() {
        println!("[CHAT] (no messages)");
        return;
    }
    for message in view.iter().rev() {
        let name = message
            .sender
            .display_name
            .clone()
            .unwrap_or_else(|| message.sender.id.clone());
        println!(
            "[CHAT] {} {}: {}",
            message.created_at.format("%H:%M:%S"),
            name,
            message.text
        );
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    env_logger::init();
    let config = ClientConfig::from_env();

    let identity = Arc::new(MemoryIdentity::new());
    let store = Arc::new(MemoryStore::new());
    let blobs = Arc::new(MemoryBlobStore::new());
    let picker = Arc::new(ScriptedPicker::new());

    let sessions = Arc::new(SessionManager::start(identity.clone()).await);
    let auth = AuthFlow::new(identity.clone());
    let sync = Arc::new(MessageSynchronizer::new(store.clone(), &config));
    let pipeline = ProfilePipeline::new(
        picker.clone(),
        blobs.clone(),
        identity.clone(),
        &config.avatar_prefix,
    );

    // navigation follows the session; the chat subscription lives only
    // while the chat graph is active
    let nav_sessions = sessions.clone();
    let nav_sync = sync.clone();
    tokio::spawn(async move {
        let mut navigator = Navigator::new();
        let mut sub = nav_sessions.subscribe();
        while let Some(session) = sub.recv().await {
            if !navigator.apply_session(&session) {
                continue;
            }
            match navigator.graph() {
                AppGraph::Loading => println!("[NAV] loading..."),
                AppGraph::Auth => {
                    nav_sync.stop().await;
                    println!("[NAV] auth graph (sign in with /login or /register)");
                }
                AppGraph::Chat => {
                    if let Err(e) = nav_sync.start().await {
                        println!("[NAV] could not open the conversation: {e:#}");
                        continue;
                    }
                    println!("[NAV] chat graph (conversation)");
                }
            }
        }
    });

    // live view printer
    let view_sync = sync.clone();
    tokio::spawn(async move {
        let mut sub = view_sync.subscribe();
        // skip the initial empty list
        let _ = sub.recv().await;
        while let Some(view) = sub.recv().await {
            println!("[CHAT] conversation updated ({} messages)", view.len());
        }
    });

    println!("[CLIENT] benvenuto! comandi: /register, /login, /logout, /send, /list, /name, /avatar, /whoami, /help, /quit");
    let mut lines = BufReader::new(stdin()).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let cmd = line.trim();
        if cmd.is_empty() {
            continue;
        }
        let mut parts = cmd.split_whitespace();
        let command = parts.next().unwrap_or("");
        let args: Vec<&str> = parts.collect();

        match command {
            "/register" if args.len() >= 2 => {
                let name = args[2..].join(" ");
                match auth.register(args[0], args[1], &name).await {
                    Ok(()) => println!("[CLIENT] registered as {}", args[0]),
                    Err(e) => println!("[CLIENT] {}", e),
                }
            }
            "/login" if args.len() == 2 => match auth.sign_in(args[0], args[1]).await {
                Ok(()) => println!("[CLIENT] signed in"),
                Err(e) => println!("[CLIENT] {}", e),
            },
            "/logout" => {
                auth.sign_out().await;
                println!("[CLIENT] signed out");
            }
            "/send" if !args.is_empty() => {
                sync.send(&args.join(" "), &sessions.current_session());
            }
            "/list" => print_view(&sync.view_list()),
            "/name" if !args.is_empty() => {
                match pipeline.update_display_name(&args.join(" ")).await {
                    Ok(true) => println!("[CLIENT] display name updated"),
                    Ok(false) => println!("[CLIENT] nothing to update"),
                    Err(e) => println!("[CLIENT] update failed: {e:#}"),
                }
            }
            "/avatar" => {
                let session = sessions.current_session();
                let Some(profile) = session.profile().cloned() else {
                    println!("[CLIENT] sign in first");
                    continue;
                };
                // the demo "gallery" always offers one picture
                picker.queue_pick("file:///demo/foto.png", b"\x89PNGdemo".to_vec()).await;
                match pipeline.update_avatar(&profile).await {
                    Ok(Some(url)) => println!("[CLIENT] avatar bound ({} chars)", url.len()),
                    Ok(None) => println!("[CLIENT] pick cancelled"),
                    Err(e) => println!("[CLIENT] avatar update failed: {e:#}"),
                }
            }
            "/whoami" => {
                let session = sessions.current_session();
                match session.profile() {
                    Some(p) => println!(
                        "[CLIENT] {} ({})",
                        p.display_name.clone().unwrap_or_else(|| "no name".into()),
                        p.user_id
                    ),
                    None => println!("[CLIENT] not signed in"),
                }
            }
            "/help" => {
                println!("[CLIENT] /register <email> <pw> [name], /login <email> <pw>, /logout");
                println!("[CLIENT] /send <text>, /list, /name <name>, /avatar, /whoami, /quit");
            }
            "/quit" => break,
            _ => println!("[CLIENT] comando non valido, prova /help"),
        }
    }

    sync.stop().await;
    sessions.shutdown().await;
    Ok(())
}
