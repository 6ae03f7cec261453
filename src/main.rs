mod active;
mod app;
mod cli;
mod config;
mod controller;
mod error;
mod modlist;
mod rimworld;
mod savefile;
mod slots;
mod undo;

use anyhow::Result;

fn main() -> Result<()> {
    cli::run()
}
