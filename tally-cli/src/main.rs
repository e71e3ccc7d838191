mod command;
mod config;
mod render;

use std::{cell::Cell, io::Write as _, time::Duration};

use anyhow::Result;
use clap::Parser;
use futures::future::LocalBoxFuture;
use tally::{
    CounterStore, Dispatcher, Engine, LocalSessionProvider, MemoryStore, SaveStatus,
    SessionBinding,
};
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::command::{Command, CommandError, HELP};
use crate::config::{Args, Backend};

/// How long to wait for in-flight writes on the way out.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Runs detached writes on the current `LocalSet`.
struct LocalTasks;

impl Dispatcher for LocalTasks {
    fn dispatch(&self, task: LocalBoxFuture<'static, ()>) {
        tokio::task::spawn_local(task);
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    env_logger::init();

    let args = Args::parse();
    let local = tokio::task::LocalSet::new();

    match args.backend {
        Backend::Memory => local.run_until(run(MemoryStore::new(), args)).await,
        Backend::Firestore => {
            let store = firestore_store(&args)?;
            local.run_until(run(store, args)).await
        }
    }
}

#[cfg(feature = "firestore")]
fn firestore_store(args: &Args) -> Result<tally::firestore::FirestoreStore> {
    let store = tally::firestore::FirestoreStore::new(args.firestore_config()?);
    store.set_id_token(args.id_token.clone());
    Ok(store)
}

#[cfg(not(feature = "firestore"))]
fn firestore_store(_args: &Args) -> Result<MemoryStore> {
    anyhow::bail!("this build of tally was compiled without the `firestore` feature")
}

async fn run<S: CounterStore + 'static>(store: S, args: Args) -> Result<()> {
    let binding = SessionBinding::new(Engine::new(store, LocalTasks), LocalSessionProvider::new());
    let engine = binding.engine();
    report_settled_writes(engine);

    if let Some(user) = args.user {
        // the binding logs and keeps the error for rendering
        let _ = binding.sign_in(user).await;
    }

    println!("{HELP}\n");
    println!(
        "{}",
        render::render(&engine.snapshot(), &binding.auth_status())
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };

        let command = match line.parse::<Command>() {
            Ok(command) => command,
            Err(CommandError::Empty) => continue,
            Err(e) => {
                eprintln!("{e}");
                continue;
            }
        };
        if let Err(e) = command.check(&engine.snapshot()) {
            eprintln!("{e}");
            continue;
        }

        match command {
            Command::Increment(id) => engine.increment(&id),
            Command::Decrement(id) => engine.decrement(&id),
            Command::Delete(id) => engine.delete(&id),
            Command::Reset => engine.reset_all(),
            Command::Restart => engine.restart(),
            Command::Login(user) => {
                let _ = binding.sign_in(user).await;
            }
            Command::Logout => {
                let _ = binding.sign_out().await;
            }
            Command::Show => {}
            Command::Help => {
                println!("{HELP}");
                continue;
            }
            Command::Quit => break,
        }

        println!(
            "{}",
            render::render(&engine.snapshot(), &binding.auth_status())
        );
    }

    drain(engine).await;
    Ok(())
}

/// Prints a line whenever the last outstanding write settles or a new write fails.
fn report_settled_writes<S: CounterStore + 'static>(engine: &Engine<S>) {
    let was_saving = Cell::new(false);
    let failures_seen = Cell::new(None);
    engine.register_listener(move |snapshot| {
        if let Some(failure) = &snapshot.last_failure
            && failures_seen.get() != Some(failure.at)
        {
            failures_seen.set(Some(failure.at));
            eprintln!("\n! {} failed: {}", failure.operation, failure.error);
        }

        match snapshot.save_status() {
            SaveStatus::Saving(_) => was_saving.set(true),
            SaveStatus::Saved if was_saving.replace(false) => println!("\n(saved)"),
            SaveStatus::Saved => {}
        }
    });
}

async fn drain<S: CounterStore + 'static>(engine: &Engine<S>) {
    let wait = async {
        while engine.pending_writes() > 0 {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    };
    if tokio::time::timeout(DRAIN_TIMEOUT, wait).await.is_err() {
        log::warn!(
            "Exiting with {} writes still pending",
            engine.pending_writes()
        );
    }
}
