// src/main.rs

use stepexec::{cli, run};

#[tokio::main]
async fn main() {
    if let Err(err) = run(cli::parse()).await {
        eprintln!("stepexec error: {err:?}");
        std::process::exit(1);
    }
}
