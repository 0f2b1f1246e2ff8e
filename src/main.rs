//! emberkv - An In-Memory Key-Value Cache Server
//!
//! This is the main entry point for the emberkv server.
//! It parses the configuration, builds the key-space and runs the event loop.

use anyhow::Context;
use emberkv::commands::CommandHandler;
use emberkv::config::{CliAction, Config};
use emberkv::reactor::Reactor;
use emberkv::storage::StorageEngine;
use std::net::ToSocketAddrs;
use tracing::{info, warn};
use tracing_subscriber::FmtSubscriber;

fn print_help() {
    println!(
        r#"
emberkv - An In-Memory Key-Value Cache Server

USAGE:
    emberkv [OPTIONS]

OPTIONS:
        --config <FILE>                TOML file loaded before the other flags
        --protocol <PROTOCOL>          Transport protocol (default: tcp)
    -h, --host <HOST>                  Host to bind to (default: 127.0.0.1)
    -p, --port <PORT>                  Port to listen on (default: 6380)
        --max-connections <N>          Concurrent client limit (default: 20000)
        --max-keys <N>                 Key count that triggers eviction (default: 1000000)
        --eviction-ratio <RATIO>       Fraction of keys evicted per pass (default: 0.1)
        --eviction-policy <POLICY>     noeviction, allkeys-random, allkeys-lru or
                                       allkeys-lfu (default: allkeys-random)
        --epool-max-size <N>           Eviction candidate pool size (default: 16)
        --epool-sample-size <N>        Keys sampled per pool refill (default: 5)
        --expiry-interval-ms <MS>      Active expiry interval (default: 100)
        --max-request-size <BYTES>     Largest request a client may send
                                       (default: 512 MiB + 64 KiB)
        --log-level <LEVEL>            trace, debug, info, warn or error (default: info)
    -v, --version                      Print version information
        --help                         Print this help message

EXAMPLES:
    emberkv                                      # Start on 127.0.0.1:6380
    emberkv --port 7000                          # Start on port 7000
    emberkv --max-keys 100000 --eviction-policy allkeys-lru
    emberkv --config emberkv.toml --log-level debug

CONNECTING:
    Use redis-cli or any Redis client to connect:
    $ redis-cli -p 6380
    127.0.0.1:6380> PING
    PONG
    127.0.0.1:6380> SET session:42 "alive" EX 60
    OK
    127.0.0.1:6380> TTL session:42
    (integer) 60
"#
    );
}

fn print_banner(config: &Config) {
    println!(
        r#"
                 _               _
   ___ _ __ ___ | |__   ___ _ __| | ____   __
  / _ \ '_ ` _ \| '_ \ / _ \ '__| |/ /\ \ / /
 |  __/ | | | | | |_) |  __/ |  |   <  \ V /
  \___|_| |_| |_|_.__/ \___|_|  |_|\_\  \_/

emberkv v{} - In-Memory Key-Value Cache
──────────────────────────────────────────────────────────────
Server starting on {}
Max keys: {} ({}), max connections: {}

Use Ctrl+C to shutdown gracefully.
"#,
        emberkv::VERSION,
        config.bind_address(),
        config.max_keys,
        config.eviction_policy,
        config.max_connections,
    );
}

fn main() -> anyhow::Result<()> {
    // Parse command-line arguments
    let config = match Config::parse_args(std::env::args().skip(1)) {
        Ok(CliAction::Run(config)) => config,
        Ok(CliAction::Help) => {
            print_help();
            return Ok(());
        }
        Ok(CliAction::Version) => {
            println!("emberkv version {}", emberkv::VERSION);
            return Ok(());
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!("Run with --help for usage.");
            std::process::exit(1);
        }
    };

    // Set up logging
    FmtSubscriber::builder()
        .with_max_level(config.log_level()?)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    print_banner(&config);

    let storage = StorageEngine::with_config(config.storage_config());
    info!(
        max_keys = config.max_keys,
        policy = %config.eviction_policy,
        "Storage engine initialized"
    );

    let handler = CommandHandler::new(storage).with_params(config.params());

    let addr = config
        .bind_address()
        .to_socket_addrs()
        .with_context(|| format!("failed to resolve {}", config.bind_address()))?
        .next()
        .with_context(|| format!("no address found for {}", config.bind_address()))?;

    let mut reactor = Reactor::bind(addr, handler, config.reactor_config())
        .with_context(|| format!("failed to bind {}", addr))?;

    let shutdown = reactor.shutdown_handle();
    ctrlc::set_handler(move || {
        if shutdown.is_shutdown() {
            // Second signal - force exit
            warn!("Received second signal, forcing immediate exit");
            std::process::exit(1);
        }
        info!("Shutdown signal received, stopping server...");
        shutdown.shutdown();
    })
    .context("failed to install Ctrl+C handler")?;

    reactor.run()?;

    info!("Server shutdown complete");
    Ok(())
}
