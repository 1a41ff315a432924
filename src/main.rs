mod backend;
mod classifier;
mod cli;
mod config;
mod error;
mod handlers;
mod labels;
mod model;
mod models;
mod preprocess;
mod remote;
mod report;

use clap::Parser;
use std::process;

#[actix_web::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    if let Err(error) = cli::Arguments::parse().run().await {
        eprintln!("error: {:#}", error);
        process::exit(1);
    }
}
