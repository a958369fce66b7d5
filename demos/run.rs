//! Run commands and reap them until SIGINT or SIGTERM
//!
//!     cargo run --example run -- sh -c 'sleep 1 &' --- true --- false
//!
//! Command lines are separated by `---`. Since this is not pid 1 the pid 1
//! check is turned off; the commands are our own children, so they get
//! reaped all the same, and the log shows each one as it goes.

use std::env::args;
use std::process::Command;

use grim_reaper::trap::Trap;
use grim_reaper::{Config, Scope};
use nix::sys::signal::{SIGINT, SIGTERM};

fn main() {
    // Trap before any thread exists, so every later thread inherits the mask
    // and SIGINT/SIGTERM can only be consumed here.
    let mut trap = Trap::trap(&[SIGTERM, SIGINT]).expect("can't trap signals");

    let args = args().skip(1).collect::<Vec<_>>();
    let commandlines = args.split(|x| &x[..] == "---");

    for cline in commandlines.filter(|c| !c.is_empty()) {
        let mut cmd = Command::new(&cline[0]);
        cmd.args(&cline[1..]);
        println!("Starting {:?}", cmd);
        cmd.spawn().expect("can't spawn command");
    }

    let scope = Scope::new();
    let reaper = grim_reaper::spawn(
        &scope,
        Config {
            enforce_pid1_check: false,
            verbose: true,
            ..Config::default()
        },
    )
    .expect("can't start reaper");

    if let Some(sig) = trap.next() {
        println!("Stopping because of {:?}", sig);
    }
    scope.cancel();
    match reaper.join() {
        Ok(Err(err)) => println!("Reaper stopped: {}", err),
        Ok(Ok(())) => println!("Reaper stopped"),
        Err(_) => println!("Reaper panicked"),
    }
}
