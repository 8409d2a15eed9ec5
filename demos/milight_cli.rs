//! CLI application for controlling Milight bridges.
//!
//! This demo wires a [`BridgeManager`] to the command line: discover bridges,
//! then address a zone by bridge MAC, zone type and zone number.
//!
//! Run with: cargo run --example milight_cli -- --help

use clap::{Parser, Subcommand};
use std::str::FromStr;
use std::time::Duration;
use milight_rs::{
    BridgeEvent, BridgeManager, DiscoverOptions, MacAddress, ManagerConfig, ZoneType,
};

#[derive(Parser)]
#[command(name = "milight-cli")]
#[command(about = "Control Milight / LimitlessLED bridges from the command line", long_about = None)]
struct Cli {
    /// MAC address of the bridge (not required for discover command)
    #[arg(short, long, global = true)]
    mac: Option<String>,

    /// Zone type: RGB, RGBW, RGBWW, WHITE or BRIDGE
    #[arg(short = 't', long, global = true, default_value = "RGBW")]
    zone_type: String,

    /// Zone number (0 addresses every zone of the type)
    #[arg(short, long, global = true, default_value = "1")]
    zone: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Discover all bridges on the network
    Discover {
        /// Discovery timeout in seconds (default: 3)
        #[arg(short, long, default_value = "3")]
        timeout: u64,
    },

    /// Turn the zone on
    On,

    /// Turn the zone off
    Off,

    /// Set brightness (0-100, 0 turns the zone off)
    Brightness {
        #[arg(value_parser = clap::value_parser!(u8).range(0..=100))]
        level: u8,
    },

    /// Set hue (0.0-1.0)
    Hue { hue: f64 },

    /// Set white temperature (0.0 cold - 1.0 warm)
    Temperature { temperature: f64 },

    /// Switch to white mode, optionally at a temperature
    White { temperature: Option<f64> },

    /// Switch to night mode
    Night,

    /// Start a scene, or advance to the next one
    Scene { scene: Option<u8> },

    /// Speed up the running scene
    SpeedUp,

    /// Slow down the running scene
    SpeedDown,

    /// Print zone state and send history of the bridge
    Diagnostics,

    /// Track bridge liveness until interrupted
    Watch {
        /// Poll interval in seconds
        #[arg(short, long, default_value = "10")]
        interval: u64,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Discover { timeout } => {
            println!("Discovering bridges on the network (timeout: {}s)...", timeout);

            let manager = BridgeManager::new(ManagerConfig::default());
            let options = DiscoverOptions {
                timeout: Some(Duration::from_secs(timeout)),
                ..DiscoverOptions::default()
            };
            match manager.discover_bridges(options).await {
                Ok(bridges) => {
                    if bridges.is_empty() {
                        println!("No bridges found on the network.");
                    } else {
                        println!("\nFound {} bridge(s):", bridges.len());
                        for bridge in bridges {
                            println!(
                                "  MAC: {}  IP: {:15}  Generation: {}",
                                bridge.mac(),
                                bridge.ip().to_string(),
                                bridge.generation()
                            );
                        }
                    }
                }
                Err(e) => eprintln!("Error during discovery: {}", e),
            }
        }

        Commands::Watch { interval } => {
            let mut config = ManagerConfig::default();
            config.poll_interval = Duration::from_secs(interval);
            let manager = BridgeManager::new(config);

            for bridge in manager.discover_bridges(DiscoverOptions::default()).await? {
                println!("Watching {} at {}", bridge.mac(), bridge.ip());
                let mac = bridge.mac();
                bridge.subscribe(move |event| match event {
                    BridgeEvent::Online => println!("[{}] online", mac),
                    BridgeEvent::Offline => println!("[{}] offline", mac),
                    BridgeEvent::Destroy => println!("[{}] removed", mac),
                });
            }

            println!("\nPolling every {}s... (Press Ctrl+C to stop)\n", interval);
            loop {
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }

        _ => {
            // All other commands require a bridge
            let mac = cli
                .mac
                .as_deref()
                .ok_or("Bridge MAC is required for this command. Use --mac <MAC>")?;
            let mac = MacAddress::from_str(mac)?;
            let zone_type = ZoneType::from_str(&cli.zone_type.to_uppercase())?;

            let manager = BridgeManager::new(ManagerConfig::default());
            let bridge = manager.find_bridge(mac).await?;
            let zone = if cli.zone == 0 {
                bridge.group_zone(zone_type)?
            } else {
                bridge.zone(zone_type, cli.zone)?
            };
            println!("Using zone {} on bridge at {}", zone.name(), bridge.ip());

            let delivery = match cli.command {
                Commands::Discover { .. } | Commands::Watch { .. } => unreachable!(),
                Commands::On => zone.turn_on().await,
                Commands::Off => zone.turn_off().await,
                Commands::Brightness { level } => {
                    zone.set_brightness(f64::from(level) / 100.0).await
                }
                Commands::Hue { hue } => zone.set_hue(hue).await,
                Commands::Temperature { temperature } => zone.set_temperature(temperature).await,
                Commands::White { temperature } => zone.enable_white_mode(temperature).await,
                Commands::Night => zone.enable_night_mode().await,
                Commands::Scene { scene } => zone.toggle_scene(scene).await,
                Commands::SpeedUp => zone.set_scene_speed_up().await,
                Commands::SpeedDown => zone.set_scene_speed_down().await,
                Commands::Diagnostics => {
                    println!(
                        "\nDiagnostics:\n{}",
                        serde_json::to_string_pretty(&bridge.diagnostics())?
                    );
                    return Ok(());
                }
            };

            match delivery {
                Ok(delivery) => match delivery.await {
                    Ok(()) => println!("Command sent, zone state: {:?}", zone.state()),
                    Err(e) => eprintln!("Error sending command: {}", e),
                },
                Err(e) => eprintln!("Error: {}", e),
            }
        }
    }

    Ok(())
}
