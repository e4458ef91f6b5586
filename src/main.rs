//! Javelin - runtime interface client for JavaScript handlers
//!
//! Startup sequence: resolve configuration, build the engine and the
//! control-plane client, load the handler (reporting an init error and
//! exiting non-zero if that fails), then hand off to the invocation loop.

#![forbid(unsafe_code)]

use std::io;

use clap::Parser;
use javelin::cli::Cli;
use javelin::client::RuntimeClient;
use javelin::config::Config;
use javelin::descriptor::HandlerDescriptor;
use javelin::engine::JsEngine;
use javelin::report::FailureValue;
use javelin::runner::Runner;
use javelin::Result;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    // The QuickJS context is not Send; everything runs on one thread.
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("Error: failed to start async runtime: {err}");
            std::process::exit(1);
        }
    };

    if let Err(err) = runtime.block_on(main_impl()) {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

async fn main_impl() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::resolve(&cli)?;
    let client = RuntimeClient::new(&config.runtime_api)?;

    let engine = match load_engine(&config) {
        Ok(engine) => engine,
        Err(err) => {
            tracing::error!(
                event = "main.init_failed",
                error_type = err.wire_type(),
                error = %err,
                "Handler failed to initialize"
            );
            client.post_init_error(&FailureValue::from(&err)).await?;
            return Err(err);
        }
    };
    tracing::info!(
        event = "main.ready",
        handler = %config.handler,
        task_root = %config.task_root.display(),
        "Handler loaded, entering invocation loop"
    );

    Runner::new(client, engine, config.identity.clone())
        .run()
        .await
}

fn load_engine(config: &Config) -> Result<JsEngine> {
    let descriptor = HandlerDescriptor::parse(&config.handler)?;
    let engine = JsEngine::new()?;
    engine.load_handler(&config.task_root, &descriptor)?;
    Ok(engine)
}
