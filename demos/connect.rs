//! Connect to a server and print what the handshake produced
//!
//! Usage:
//!   cargo run --example connect -- "host=localhost dbname=postgres"
//!   cargo run --example connect -- --async "host=localhost"
//!   cargo run --example connect -- --defaults
//!
//! Set `RUST_LOG=pgconnect=debug` to watch the state machine.

use pgconnect::conninfo::{defaults, OptionDisplay};
use pgconnect::{Connection, ResolveContext};
use tracing_subscriber::EnvFilter;

fn print_defaults() -> Result<(), Box<dyn std::error::Error>> {
    for option in defaults(&ResolveContext::from_process())? {
        let value = match (option.display, option.value.as_deref()) {
            (OptionDisplay::Password, Some(_)) => "********",
            (_, Some(value)) => value,
            (_, None) => "(unset)",
        };
        println!(
            "{:<16} {:<18} {}",
            option.keyword,
            option.envvar.unwrap_or("-"),
            value
        );
    }
    Ok(())
}

fn report(conn: &Connection) {
    println!("connected to {:?}", conn.remote_address());
    println!("  tls:         {}", conn.is_tls());
    println!("  backend pid: {:?}", conn.backend_pid());
    for name in ["server_version", "server_encoding", "client_encoding", "DateStyle"] {
        if let Some(value) = conn.parameter_status(name) {
            println!("  {:<12} {}", format!("{}:", name), value);
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("pgconnect=info")),
        )
        .with_target(false)
        .init();

    let mut args: Vec<String> = std::env::args().skip(1).collect();
    if args.iter().any(|a| a == "--defaults") {
        return print_defaults();
    }

    let use_async = args.iter().any(|a| a == "--async");
    args.retain(|a| a != "--async");
    let conninfo = args.first().map(String::as_str).unwrap_or("");

    let conn = if use_async {
        pgconnect::connect_async(conninfo).await?
    } else {
        pgconnect::connect(conninfo)?
    };

    report(&conn);
    conn.finish();
    Ok(())
}
