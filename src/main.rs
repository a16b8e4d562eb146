//! # Batch Relay
//!
//! A relay service that batches content announcements and submits them to the
//! chain as combined, capacity-sponsored extrinsics.
use batch_relay::cli::Args;
use clap::Parser;

#[tokio::main]
async fn main() {
    // Enable backtraces unless a RUST_BACKTRACE value has already been explicitly provided.
    if std::env::var_os("RUST_BACKTRACE").is_none() {
        std::env::set_var("RUST_BACKTRACE", "1");
    }

    let args = Args::parse();
    if let Err(err) = args.run().await {
        eprintln!("Error: {err:?}");
        std::process::exit(1);
    }
}
