//! Command-line interface definitions and parsing

use std::net::SocketAddr;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the relay pipeline and print the summary when it stops
    Run {
        /// Seconds to run before shutting down; overrides the config file
        #[arg(short, long)]
        duration: Option<u64>,
    },
    /// Send the test message sequence to the relay's listeners
    Emit {
        /// Number of messages to send
        #[arg(short = 'n', long, default_value_t = 10)]
        count: u64,
        /// Delay between messages in milliseconds
        #[arg(short, long, default_value_t = 500)]
        interval_ms: u64,
        /// Destination endpoint; repeat for several (default: 127.0.0.1:5000 and :5001)
        #[arg(short, long = "target")]
        targets: Vec<SocketAddr>,
    },
    /// Accept one forwarding connection and log every frame received
    Sink {
        /// Address to listen on
        #[arg(short, long, default_value = "0.0.0.0:6000")]
        bind: SocketAddr,
    },
}
