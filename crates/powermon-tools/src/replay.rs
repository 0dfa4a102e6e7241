//! Offline decoding of captured sampler words.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use flate2::read::GzDecoder;
use powermon::bus::Decoder;
use powermon::{BusSampler, NotifySlots, QueueSampler, Revision, SharedState, TriacEstimator};

use crate::report::print_report;

/// Read a capture file, transparently decompressing gzip (`\x1f\x8b` magic).
/// `-` reads from stdin.
fn read_capture(path: &Path) -> Result<Vec<u8>> {
    let mut raw = Vec::new();
    if path.as_os_str() == "-" {
        io::stdin()
            .read_to_end(&mut raw)
            .context("reading capture from stdin")?;
    } else {
        File::open(path)
            .and_then(|mut f| f.read_to_end(&mut raw))
            .with_context(|| format!("reading capture {}", path.display()))?;
    }
    if raw.starts_with(&[0x1F, 0x8B]) {
        let mut decoded = Vec::new();
        GzDecoder::new(raw.as_slice())
            .read_to_end(&mut decoded)
            .context("decompressing gzip capture")?;
        return Ok(decoded);
    }
    Ok(raw)
}

/// Replay a capture of raw little-endian 16-bit sampler words through the
/// decoder and print the reconstructed state.
///
/// The capture carries no timing, so the replay drives the decoder
/// synchronously: each word is pushed and dispatched in turn, which keeps
/// the 8-entry receive queue from overflowing and makes the decode
/// deterministic. GI levels need live zero-cross timing and are only
/// meaningful for revision B captures that embed the indicator bit.
pub fn replay_capture(path: &Path, revision: Revision) -> Result<()> {
    let bytes = read_capture(path)?;
    if bytes.len() % 2 != 0 {
        bail!(
            "capture {} has an odd length ({} bytes), expected 16-bit words",
            path.display(),
            bytes.len()
        );
    }

    let (mut sampler, port) = QueueSampler::new();
    sampler.activate();
    let shared = Arc::new(SharedState::new());
    let mut decoder = Decoder::new(
        sampler,
        shared.clone(),
        Arc::new(NotifySlots::new()),
        revision,
        TriacEstimator::with_defaults(),
    );

    for chunk in bytes.chunks_exact(2) {
        let raw = u16::from_le_bytes([chunk[0], chunk[1]]);
        while !port.push_word(raw) {
            decoder.poll_once();
        }
        decoder.poll_once();
    }
    // Drain whatever is still queued.
    for _ in 0..powermon::FIFO_DEPTH {
        decoder.poll_once();
    }

    println!("capture: {} ({} words)", path.display(), bytes.len() / 2);
    print_report(
        &shared.stats(),
        shared.lights(),
        shared.solenoids(),
        shared.gi(),
    );
    Ok(())
}
