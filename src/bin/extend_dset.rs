//! # extend_dset
//!
//! Extends one dataset of a WATCH fixture file while a SWMR reader watches.
//!
//! ## Usage
//!
//! ```bash
//! extend_dset <file> <dataset_name> <delta1> <delta2>
//! ```
//!
//! `delta2` is ignored for one-dimensional datasets. Exits 0 on success and
//! 1 on any failure.

use std::env;
use std::process;

use eyre::Result;
use h5lite::cli::{extend_dataset, protocol_for, ExtendOptions, ExtendRequest, USAGE};
use h5lite::swmr::FileRendezvous;
use h5lite::Registry;
use tracing::Level;

fn main() {
    init_logging();
    if let Err(e) = run() {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

fn init_logging() {
    let level = env::var("H5LITE_LOG")
        .ok()
        .and_then(|v| v.parse::<Level>().ok())
        .unwrap_or(Level::WARN);
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

fn run() -> Result<()> {
    let args: Vec<String> = env::args().skip(1).collect();
    let req = match ExtendRequest::from_args(&args) {
        Ok(req) => req,
        Err(e) => {
            if args.len() != 4 {
                eprintln!("{}", USAGE);
                process::exit(1);
            }
            return Err(e);
        }
    };

    if protocol_for(&req.dataset).is_none() {
        println!("Dataset cannot be extended...");
        process::exit(1);
    }

    let opts = ExtendOptions::from_env(&req.file)?;
    let rendezvous = FileRendezvous::new(&opts.message_dir);
    let registry = Registry::new();
    extend_dataset(&registry, &req, &opts, &rendezvous)?;
    registry.shutdown()
}
