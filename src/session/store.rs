// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! YAML session persistence.
//!
//! Sessions are stored as YAML documents with a settings block and a
//! player list. Missing fields fall back to sensible defaults so hand
//! written files stay short.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use super::{Session, SessionStore};
use crate::player::Player;

/// Root document for a persisted session
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionFile {
    /// Session settings
    pub session: SessionConfig,
    /// Player definitions
    #[serde(default)]
    pub players: Vec<Player>,
}

/// Session-level settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionConfig {
    /// Session name
    pub name: String,
    /// Tempo in BPM
    #[serde(default = "default_tempo")]
    pub tempo: f64,
    /// Ticks per beat (PPQ)
    #[serde(default = "default_ticks_per_beat")]
    pub ticks_per_beat: u32,
    /// Beats per bar
    #[serde(default = "default_beats_per_bar")]
    pub beats_per_bar: u32,
    /// Song length in bars
    #[serde(default = "default_bars")]
    pub bars: u32,
    /// Number of parts (0 = single part)
    #[serde(default)]
    pub part_count: u32,
    /// Bars per part (0 = single part)
    #[serde(default)]
    pub bars_per_part: u32,
}

fn default_tempo() -> f64 {
    120.0
}
fn default_ticks_per_beat() -> u32 {
    24
}
fn default_beats_per_bar() -> u32 {
    4
}
fn default_bars() -> u32 {
    16
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            name: "Untitled".to_string(),
            tempo: default_tempo(),
            ticks_per_beat: default_ticks_per_beat(),
            beats_per_bar: default_beats_per_bar(),
            bars: default_bars(),
            part_count: 0,
            bars_per_part: 0,
        }
    }
}

impl SessionFile {
    /// Load a session file from a YAML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read session file: {:?}", path.as_ref()))?;
        Self::from_yaml(&contents)
    }

    /// Parse a session file from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).context("Failed to parse YAML session")
    }

    /// Serialize to a YAML string
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Failed to serialize session to YAML")
    }

    /// Save to a YAML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = self.to_yaml()?;
        fs::write(path.as_ref(), yaml)
            .with_context(|| format!("Failed to write session file: {:?}", path.as_ref()))
    }

    /// Build the runtime session, counters at zero
    pub fn into_session(self) -> Session {
        Session {
            name: self.session.name,
            tempo: self.session.tempo,
            ticks_per_beat: self.session.ticks_per_beat,
            beats_per_bar: self.session.beats_per_bar,
            bars: self.session.bars,
            part_count: self.session.part_count,
            bars_per_part: self.session.bars_per_part,
            running: false,
            tick: 0,
            beat: 0,
            bar: 0,
            players: self.players,
        }
    }

    /// Capture a runtime session for persistence. Counters and the
    /// running flag are transport state and are not stored.
    pub fn from_session(session: &Session) -> Self {
        Self {
            session: SessionConfig {
                name: session.name.clone(),
                tempo: session.tempo,
                ticks_per_beat: session.ticks_per_beat,
                beats_per_bar: session.beats_per_bar,
                bars: session.bars,
                part_count: session.part_count,
                bars_per_part: session.bars_per_part,
            },
            players: session.players.clone(),
        }
    }
}

/// Session store over a single YAML file.
pub struct YamlSessionStore {
    path: PathBuf,
}

impl YamlSessionStore {
    /// Create a store for the given path
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Path this store reads and writes
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SessionStore for YamlSessionStore {
    fn load_active(&self) -> Result<Session> {
        Ok(SessionFile::load(&self.path)?.into_session())
    }

    fn save(&self, session: &Session) -> Result<()> {
        SessionFile::from_session(session).save(&self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::{Rule, RuleComparison, RuleOperator};

    const MINIMAL_YAML: &str = "
session:
  name: Test Session
  tempo: 100.0
players:
  - name: Kick
    note: 36
    rules:
      - operator: tick
        comparison: equals
        value: 0
";

    #[test]
    fn test_minimal_yaml_with_defaults() {
        let file = SessionFile::from_yaml(MINIMAL_YAML).unwrap();
        assert_eq!(file.session.name, "Test Session");
        assert_eq!(file.session.tempo, 100.0);
        // Defaults fill in everything else
        assert_eq!(file.session.ticks_per_beat, 24);
        assert_eq!(file.session.beats_per_bar, 4);
        assert_eq!(file.players.len(), 1);
        assert_eq!(file.players[0].note, 36);
        assert_eq!(file.players[0].probability, 100);
        assert_eq!(file.players[0].rules.len(), 1);
    }

    #[test]
    fn test_into_session_zeroes_counters() {
        let session = SessionFile::from_yaml(MINIMAL_YAML).unwrap().into_session();
        assert_eq!(session.tick, 0);
        assert_eq!(session.beat, 0);
        assert_eq!(session.bar, 0);
        assert!(!session.running);
    }

    #[test]
    fn test_roundtrip_preserves_players() {
        let mut session = Session::new("Round", 132.0, 48, 3);
        session.players.push(
            Player::new("Snare")
                .with_note(38)
                .with_probability(75)
                .with_rule(Rule::new(RuleOperator::Beat, RuleComparison::Modulo, 2)),
        );

        let yaml = SessionFile::from_session(&session).to_yaml().unwrap();
        let restored = SessionFile::from_yaml(&yaml).unwrap().into_session();

        assert_eq!(restored.name, "Round");
        assert_eq!(restored.tempo, 132.0);
        assert_eq!(restored.ticks_per_beat, 48);
        assert_eq!(restored.players, session.players);
    }

    #[test]
    fn test_store_load_and_save() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.yaml");
        fs::write(&path, MINIMAL_YAML).unwrap();

        let store = YamlSessionStore::new(&path);
        let mut session = store.load_active().unwrap();
        assert_eq!(session.name, "Test Session");

        session.tempo = 90.0;
        store.save(&session).unwrap();

        let reloaded = store.load_active().unwrap();
        assert_eq!(reloaded.tempo, 90.0);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let store = YamlSessionStore::new("/nonexistent/session.yaml");
        assert!(store.load_active().is_err());
    }

    #[test]
    fn test_malformed_yaml_is_an_error() {
        assert!(SessionFile::from_yaml("session: [not a mapping").is_err());
    }
}
