use crate::buffer::MessageBuffer;
use crate::config::parse::load_config;
use crate::config::types::OutputType;
use crate::dispatch::{run_dispatcher, Output, StdoutOutput};
use crate::input::{FileInput, Input, InputError};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::signal;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] crate::config::parse::ConfigError),

    #[error("input error: {0}")]
    Input(#[from] InputError),

    #[error("task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub async fn run(config_path: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = match config_path {
        Some(path) => path,
        None => {
            eprintln!("No config file found.");
            eprintln!("Checked ~/.config/logship/config.yml and /etc/logship/config.yml.");
            eprintln!();
            eprintln!("Pass --config <path>, or create a starter file with 'logship config init'.");
            std::process::exit(1);
        }
    };

    run_agent(&config_path).await.map_err(|e| e.into())
}

async fn run_agent(config_path: &PathBuf) -> Result<(), RunError> {
    info!(config_path = %config_path.display(), "Loading configuration");
    let config = load_config(config_path)?;

    let buffer = MessageBuffer::new(config.buffer.capacity);
    info!(capacity = config.buffer.capacity, "Message buffer created");

    // Outputs first; the dispatcher routes by these names.
    let mut outputs: HashMap<String, Arc<dyn Output>> = HashMap::new();
    for (name, output_config) in &config.outputs {
        match output_config.output_type {
            OutputType::Stdout => {
                outputs.insert(name.clone(), Arc::new(StdoutOutput::new(name.clone())));
            }
        }
    }

    let dispatcher_buffer = buffer.clone();
    let dispatcher_handle =
        tokio::spawn(async move { run_dispatcher(dispatcher_buffer, outputs).await });

    let mut inputs: Vec<Arc<FileInput>> = Vec::new();
    for (input_id, input_config) in &config.inputs {
        info!(
            input = %input_id,
            path = %input_config.path.display(),
            "Starting input"
        );
        let input = FileInput::new(input_id.clone(), input_config.clone(), buffer.clone());
        Arc::clone(&input).start().await?;
        inputs.push(input);
    }

    if inputs.is_empty() {
        warn!("No inputs configured, agent will not collect any logs");
    }

    info!("Agent started, press Ctrl+C to shutdown");
    if let Err(e) = signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
    }
    info!("Shutdown signal received");

    // Stop inputs first so no producer is left blocked on the buffer, then
    // let the dispatcher drain whatever is queued.
    for input in &inputs {
        if let Err(e) = input.stop().await {
            error!(input = %input.id(), error = %e, "Input stop failed");
        }
    }
    buffer.close();

    let stats = dispatcher_handle.await?;
    info!(
        delivered = stats.delivered,
        failed = stats.failed,
        unroutable = stats.unroutable,
        "Agent shutdown complete"
    );

    Ok(())
}
