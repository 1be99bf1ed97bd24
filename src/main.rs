//! sitepack - static site asset pipeline with a live-reload dev server

use std::process::ExitCode;

use sitepack::cli;

fn main() -> ExitCode {
    cli::run()
}
