use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod channel;
mod cli;
mod config;
mod console;
mod error;
mod heartbeat;
mod monitor;
mod port;
mod profile;
mod proto;
mod runner;

use channel::CommandChannel;
use cli::{Cmd, SerialOpts};
use config::SessionConfig;

fn main() -> Result<()> {
    let args = cli::Cli::parse();
    init_logging(args.verbose);

    match args.cmd {
        Cmd::Console(opts) => {
            let ch = open(&opts.ser)?;
            ch.begin()?;
            let stdin = std::io::stdin();
            console::run(&ch, stdin.lock(), &mut std::io::stdout())
        }
        Cmd::Status(opts) => {
            let ch = open(&opts.ser)?;
            ch.begin()?;
            println!("{}", ch.read_status()?);
            Ok(())
        }
        Cmd::Profile(opts) => {
            let interrupted = on_ctrl_c()?;
            let ch = open(&opts.ser)?;
            runner::run(&ch, &opts, &interrupted)
        }
        Cmd::Monitor(opts) => {
            let interrupted = on_ctrl_c()?;
            let ch = open(&opts.ser)?;
            runner::init_device(&ch)?;
            monitor::run(&ch, &opts, &interrupted)
        }
    }
    // `ch` drops at the end of each arm, closing the session on every path.
}

fn open(opts: &SerialOpts) -> Result<CommandChannel> {
    CommandChannel::open(&opts.dev, SessionConfig::from_opts(opts))
        .with_context(|| format!("opening controller on {}", opts.dev))
}

/// Flag set by Ctrl-C so heating loops can stop the device before exiting.
fn on_ctrl_c() -> Result<Arc<AtomicBool>> {
    let interrupted = Arc::new(AtomicBool::new(false));
    let flag = interrupted.clone();
    ctrlc::set_handler(move || {
        flag.store(true, Ordering::SeqCst);
    })
    .context("installing Ctrl-C handler")?;
    Ok(interrupted)
}

fn init_logging(verbose: bool) {
    let default = if verbose { "toaster_ctl=debug" } else { "toaster_ctl=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
