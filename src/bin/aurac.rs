//! `aurac`, the control client for the `aurad` daemon.
//!
//! Sends one control-plane opcode per invocation and prints the daemon's
//! reply (the resulting event label, or an `ERR` line).

use clap::{Parser, Subcommand};
use color_eyre::eyre::{eyre, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Daemon control-plane address
    #[arg(short, long, default_value = "127.0.0.1:8493")]
    addr: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask which event currently drives the light
    Status,
    /// Engage movie mode
    Movie,
    /// Engage sleep mode
    Sleep,
    /// Engage relax mode
    Relax,
    /// Hand the light to the device's sound-reactive mode
    Music,
    /// Turn the light off until cancelled
    Off,
    /// Cancel the active override
    Cancel,
    /// Hold a custom static color
    Color {
        /// Red value (0-255)
        #[arg(short, long, default_value_t = 255)]
        red: u8,
        /// Green value (0-255)
        #[arg(short, long, default_value_t = 255)]
        green: u8,
        /// Blue value (0-255)
        #[arg(short, long, default_value_t = 255)]
        blue: u8,
    },
    /// Program a custom animation loop, e.g. 03f0203,f0206,f0811
    Pattern {
        pattern: String,
    },
}

impl Commands {
    fn encode(&self) -> Vec<u8> {
        match self {
            Commands::Status => b"1".to_vec(),
            Commands::Movie => b"m".to_vec(),
            Commands::Sleep => b"z".to_vec(),
            Commands::Relax => b"r".to_vec(),
            Commands::Music => b"s".to_vec(),
            Commands::Off => b"o".to_vec(),
            Commands::Cancel => b"x".to_vec(),
            Commands::Color { red, green, blue } => {
                format!("c:{red:03},{green:03},{blue:03}").into_bytes()
            }
            Commands::Pattern { pattern } => {
                let mut raw = vec![b'v'];
                raw.extend_from_slice(pattern.as_bytes());
                raw
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    let mut stream = TcpStream::connect(&cli.addr).await?;
    stream.write_all(&cli.command.encode()).await?;
    // tell the daemon the payload is complete
    stream.shutdown().await?;

    let mut reply = Vec::new();
    stream.read_to_end(&mut reply).await?;
    let reply = String::from_utf8_lossy(&reply);
    println!("{reply}");

    if reply.starts_with("ERR") {
        return Err(eyre!("daemon rejected the command"));
    }
    Ok(())
}
