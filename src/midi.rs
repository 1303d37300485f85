//! Standard MIDI File → [`Performance`], via `midly`.

use std::collections::{HashMap, VecDeque};
use std::path::Path;

use midly::{MetaMessage, MidiMessage, Smf, Timing, TrackEventKind};
use thiserror::Error;

use crate::performance::{ControlChange, Note, Performance, Track};

const SUSTAIN_CONTROLLER: u8 = 64;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("MIDI parse error: {0}")]
    Parse(#[from] midly::Error),
    #[error("Unsupported timing: SMPTE timecode ({0} subframes per frame)")]
    UnsupportedTiming(u8),
    #[error("Invalid header: ticks per quarter note is zero")]
    ZeroPpq,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Read and decode a MIDI file.
pub fn load_performance(path: &Path) -> Result<Performance, DecodeError> {
    let data = std::fs::read(path)?;
    parse_performance(&data)
}

/// Decode MIDI bytes. Only metrical (ticks per quarter note) timing is supported.
pub fn parse_performance(data: &[u8]) -> Result<Performance, DecodeError> {
    let smf = Smf::parse(data)?;

    let ppq = match smf.header.timing {
        Timing::Metrical(tpq) => tpq.as_int(),
        Timing::Timecode(_, sub) => return Err(DecodeError::UnsupportedTiming(sub)),
    };
    if ppq == 0 {
        return Err(DecodeError::ZeroPpq);
    }

    // (tick, bpm) across all tracks
    let mut tempos: Vec<(u64, f64)> = Vec::new();
    let mut tracks = Vec::with_capacity(smf.tracks.len());

    for events in &smf.tracks {
        let mut track = Track::default();
        // (channel, key) -> open notes, oldest first
        let mut open: HashMap<(u8, u8), VecDeque<(u64, f64)>> = HashMap::new();
        let mut tick: u64 = 0;

        for event in events {
            tick += event.delta.as_int() as u64;

            match event.kind {
                TrackEventKind::Meta(MetaMessage::Tempo(us_per_quarter)) => {
                    let us = us_per_quarter.as_int();
                    if us > 0 {
                        tempos.push((tick, 60_000_000.0 / us as f64));
                    }
                }
                TrackEventKind::Meta(MetaMessage::TrackName(name)) => {
                    track.name = Some(String::from_utf8_lossy(name).into_owned());
                }
                TrackEventKind::Midi { channel, message } => {
                    let channel = channel.as_int();
                    match message {
                        MidiMessage::NoteOn { key, vel } if vel.as_int() > 0 => {
                            open.entry((channel, key.as_int()))
                                .or_default()
                                .push_back((tick, vel.as_int() as f64 / 127.0));
                        }
                        // note-on with velocity 0 is a note-off
                        MidiMessage::NoteOn { key, .. } | MidiMessage::NoteOff { key, .. } => {
                            let pitch = key.as_int();
                            if let Some((start, velocity)) = open
                                .get_mut(&(channel, pitch))
                                .and_then(|q| q.pop_front())
                            {
                                track.notes.push(Note {
                                    tick: start,
                                    duration_ticks: tick - start,
                                    velocity,
                                    pitch,
                                });
                            }
                        }
                        MidiMessage::Controller { controller, value }
                            if controller.as_int() == SUSTAIN_CONTROLLER =>
                        {
                            track.sustain.push(ControlChange {
                                tick,
                                value: value.as_int() as f64 / 127.0,
                            });
                        }
                        _ => {}
                    }
                }
                _ => {}
            }
        }

        // Close any notes still sounding at the end of the track
        let mut dangling: Vec<(u64, u8, u8, f64)> = open
            .into_iter()
            .flat_map(|((channel, pitch), queue)| {
                queue
                    .into_iter()
                    .map(move |(start, velocity)| (start, channel, pitch, velocity))
            })
            .collect();
        // queues are oldest first, so a stable sort keeps same-key notes in onset order
        dangling.sort_by_key(|&(start, channel, pitch, _)| (start, channel, pitch));
        if !dangling.is_empty() {
            log::debug!("Closed {} unterminated notes at end of track", dangling.len());
        }
        track.notes.extend(dangling.into_iter().map(|(start, _, pitch, velocity)| Note {
            tick: start,
            duration_ticks: tick - start,
            velocity,
            pitch,
        }));

        track.notes.sort_by_key(|n| (n.tick, n.pitch));
        tracks.push(track);
    }

    // Tempo maps usually live in the first track, but any track may carry them
    tempos.sort_by_key(|&(tick, _)| tick);
    let tempos = tempos.into_iter().map(|(_, bpm)| bpm).collect();

    Ok(Performance { ppq, tempos, tracks })
}
