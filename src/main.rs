// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

use std::env;
use std::io::BufRead;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};

use ruleseq::audio::FallbackSynth;
use ruleseq::midi::{print_destinations, ConnectionManager, MidirProvider};
use ruleseq::session::{SessionEvent, SessionStore, SessionWatcher, YamlSessionStore};
use ruleseq::timing::TimingSpec;
use ruleseq::transport::{ControlCommand, TransportController};

fn print_usage() {
    println!("RULESEQ - Rule-driven MIDI Sequencer");
    println!();
    println!("Usage: ruleseq [OPTIONS]");
    println!();
    println!("Options:");
    println!("  --list-midi                 List available MIDI outputs");
    println!("  --play <FILE>               Play a session file");
    println!("  --device <NAME>             Output device name (default: FluidSynth)");
    println!("  --soundfont <FILE>          Soundfont for the built-in synthesizer");
    println!("  --test-clock [BPM]          Print clock timing at BPM (default 120)");
    println!("  --help                      Show this help message");
}

fn test_clock(bpm: f64) -> Result<()> {
    let spec = TimingSpec::new(bpm, 24, 4);
    let interval = spec.tick_interval()?;

    println!("Tempo: {} BPM at {} PPQ", bpm, spec.ticks_per_beat);
    println!(
        "Tick interval: {} ns ({:.3} ms)",
        interval.as_nanos(),
        interval.as_secs_f64() * 1000.0
    );
    println!(
        "Bar length: {} ticks ({:.1} ms)",
        spec.ticks_per_bar(),
        interval.as_secs_f64() * spec.ticks_per_bar() as f64 * 1000.0
    );
    Ok(())
}

fn play_session(path: &str, device: String, soundfont: Option<String>) -> Result<()> {
    let store = YamlSessionStore::new(path);
    let session = store.load_active()?;
    println!(
        "Session '{}': {} BPM, {} players",
        session.name,
        session.tempo,
        session.players.len()
    );

    let mut provider = MidirProvider::new();
    if let Some(soundfont) = soundfont {
        provider = provider.with_soundfont(soundfont);
    }
    let connections = Arc::new(ConnectionManager::new(
        Box::new(provider),
        FallbackSynth::NAME,
    ));

    let session = Arc::new(Mutex::new(session));
    let mut controller =
        TransportController::new(Arc::clone(&session), connections, device)
            .with_store(Box::new(store));

    let watcher = SessionWatcher::new(path, None)?;
    controller.handle(ControlCommand::Play)?;

    println!("Playing. Commands: [s]top+quit, [r]ewind, [f]orward, Enter = status");
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;

        // Apply any pending session file edits before the command
        for event in watcher.recv_all() {
            match event {
                SessionEvent::Reloaded(file) => {
                    {
                        let mut session = session.lock().unwrap();
                        session.tempo = file.session.tempo;
                        session.ticks_per_beat = file.session.ticks_per_beat;
                        session.beats_per_bar = file.session.beats_per_bar;
                        session.players = file.players;
                    }
                    controller.handle(ControlCommand::Retune)?;
                    println!("Session reloaded");
                }
                SessionEvent::Error(err) => eprintln!("Reload failed: {}", err),
                SessionEvent::FileDeleted(path) => {
                    eprintln!("Session file removed: {:?}", path)
                }
            }
        }

        match line.trim() {
            "s" | "q" => break,
            "r" => controller.handle(ControlCommand::Rewind)?,
            "f" => controller.handle(ControlCommand::Forward)?,
            _ => {
                let session = session.lock().unwrap();
                println!(
                    "bar {} beat {} tick {} (part {})",
                    session.bar,
                    session.beat,
                    session.tick,
                    session.current_part()
                );
            }
        }
    }

    controller.handle(ControlCommand::Stop)?;
    println!("Stopped.");
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        println!("RULESEQ - Rule-driven MIDI Sequencer");
        println!("Run with --help for usage information");
        return Ok(());
    }

    match args[1].as_str() {
        "--list-midi" => {
            print_destinations();
        }
        "--test-clock" => {
            let bpm: f64 = if args.len() >= 3 {
                args[2].parse().unwrap_or(120.0)
            } else {
                120.0
            };
            test_clock(bpm)?;
        }
        "--play" => {
            if args.len() < 3 {
                eprintln!("Error: --play requires a session file");
                std::process::exit(1);
            }
            let path = args[2].clone();

            let mut device = FallbackSynth::NAME.to_string();
            let mut soundfont = None;
            let mut rest = args[3..].iter();
            while let Some(arg) = rest.next() {
                match arg.as_str() {
                    "--device" => {
                        device = rest
                            .next()
                            .ok_or_else(|| anyhow!("--device requires a name"))?
                            .clone();
                    }
                    "--soundfont" => {
                        soundfont = Some(
                            rest.next()
                                .ok_or_else(|| anyhow!("--soundfont requires a file"))?
                                .clone(),
                        );
                    }
                    other => return Err(anyhow!("Unknown option: {}", other)),
                }
            }

            play_session(&path, device, soundfont)?;
        }
        "--help" | "-h" => {
            print_usage();
        }
        _ => {
            eprintln!("Unknown option: {}", args[1]);
            print_usage();
            std::process::exit(1);
        }
    }

    Ok(())
}
