use std::process::ExitCode;

use bank_ledger::Engine;
use bank_ledger::config::Config;
use bank_ledger::csv::{read_commands, write_balances};
use bank_ledger::notify::{LogNotifier, NotificationSink};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("warn".parse().unwrap()))
        .with_writer(std::io::stderr)
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    if config.input.extension().is_none_or(|ext| ext != "csv") {
        warn!(path = %config.input.display(), "input file seems to not be a csv file");
    }

    let commands = match read_commands(&config.input) {
        Ok(commands) => commands,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let (notifications, worker) = NotificationSink::spawn(LogNotifier, config.notify_queue);
    let engine = Engine::new(notifications);
    let (cmd_sender, cmd_receiver) = tokio::sync::mpsc::channel(16);

    tokio::spawn(async move {
        for result in commands {
            match result {
                Ok(command) => {
                    if cmd_sender.send(command).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!("{e}");
                }
            }
        }
    });

    engine.run(ReceiverStream::new(cmd_receiver)).await;

    let written = write_balances(std::io::stdout().lock(), engine.clients().await);

    // closing the sink lets the worker drain queued emails and exit
    drop(engine);
    if let Err(e) = worker.await {
        warn!(reason = %e, "notification worker failed");
    }

    match written {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("failed to write balances: {e}");
            ExitCode::FAILURE
        }
    }
}
