//! chatkeep server binary.
//! Run with: cargo run --bin chatkeep-server

use std::process::ExitCode;

use chatkeep::start_chatkeep;

fn main() -> ExitCode {
    start_chatkeep::run()
}
