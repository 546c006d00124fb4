//! Interactive command loop, grounded in `labs/src/lab1/client.py`'s
//! `menu()`/command-reading loop -- the same shape, different commands.

use std::io::{self, Write};
use std::net::SocketAddr;
use std::sync::Arc;

use dlock_net::Peer;

fn menu() {
    println!(
        "Choose one of the following commands:\n\
         \x20   acquire  ::  block until this peer holds the token,\n\
         \x20   release  ::  give the token back, forwarding it if owed,\n\
         \x20   status   ::  print this peer's current lock state,\n\
         \x20   help     ::  print this menu,\n\
         \x20   quit     ::  leave the group and exit."
    );
}

pub fn run(peer: Arc<Peer>, name_service: SocketAddr) -> eyre::Result<()> {
    menu();
    let stdin = io::stdin();
    let mut line = String::new();

    loop {
        print!("peerd[{}]> ", peer.own_id());
        io::stdout().flush()?;

        line.clear();
        if stdin.read_line(&mut line)? == 0 {
            break;
        }

        match line.trim() {
            "acquire" => {
                peer.acquire();
                println!("acquired");
            }
            "release" => {
                peer.release();
                println!("released");
            }
            "status" => println!("{}", peer.display_status()),
            "help" => menu(),
            "quit" => break,
            "" => {}
            other => println!("unrecognized command: {other}, type `help` for the menu"),
        }
    }

    peer.destroy(name_service);
    Ok(())
}
