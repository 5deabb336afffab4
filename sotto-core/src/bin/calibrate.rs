//! Offline VAD calibration: replay a WAV file through the segmentation state
//! machine and report utterance boundaries plus chunk RMS statistics, to tune
//! `silence_threshold` for a given microphone and room.
//!
//! ```text
//! cargo run -p sotto-core --bin calibrate -- \
//!   --input recording.wav [--threshold 0.01] [--silence-ms 700] \
//!   [--min-ms 300] [--chunk 1024] [--json]
//! ```
//!
//! Replay uses synthetic timestamps derived from the chunk duration, so the
//! result is deterministic and independent of wall-clock speed.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use serde::Serialize;

use sotto_core::segmenter::flow::{FlushOutcome, SegmentBuffer};
use sotto_core::segmenter::SegmenterConfig;
use sotto_core::vad::rms;

#[derive(Debug)]
struct Args {
    input: PathBuf,
    threshold: f32,
    silence_ms: u64,
    min_ms: u64,
    chunk: usize,
    json: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct UtteranceReport {
    index: usize,
    start_secs: f64,
    duration_secs: f64,
    peak_rms: f32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct Report {
    input: String,
    sample_rate: u32,
    total_secs: f64,
    threshold: f32,
    chunks: usize,
    speech_chunks: usize,
    rms_p10: f32,
    rms_p50: f32,
    rms_p90: f32,
    rms_max: f32,
    suggested_threshold: f32,
    utterances: Vec<UtteranceReport>,
    discarded: usize,
}

fn parse_args() -> Result<Args, String> {
    let mut input: Option<PathBuf> = None;
    let mut threshold = 0.01f32;
    let mut silence_ms = 700u64;
    let mut min_ms = 300u64;
    let mut chunk = 1024usize;
    let mut json = false;

    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--input" => {
                let Some(v) = it.next() else {
                    return Err("missing value for --input".into());
                };
                input = Some(PathBuf::from(v));
            }
            "--threshold" => {
                let Some(v) = it.next() else {
                    return Err("missing value for --threshold".into());
                };
                threshold = v
                    .parse()
                    .map_err(|_| "invalid value for --threshold".to_string())?;
            }
            "--silence-ms" => {
                let Some(v) = it.next() else {
                    return Err("missing value for --silence-ms".into());
                };
                silence_ms = v
                    .parse()
                    .map_err(|_| "invalid value for --silence-ms".to_string())?;
            }
            "--min-ms" => {
                let Some(v) = it.next() else {
                    return Err("missing value for --min-ms".into());
                };
                min_ms = v
                    .parse()
                    .map_err(|_| "invalid value for --min-ms".to_string())?;
            }
            "--chunk" => {
                let Some(v) = it.next() else {
                    return Err("missing value for --chunk".into());
                };
                chunk = v
                    .parse::<usize>()
                    .map_err(|_| "invalid value for --chunk".to_string())?
                    .clamp(64, 65_536);
            }
            "--json" => json = true,
            "--help" | "-h" => {
                println!(
                    "Usage: cargo run -p sotto-core --bin calibrate -- \\
  --input <file.wav> [--threshold <rms>] [--silence-ms <n>] \\
  [--min-ms <n>] [--chunk <samples>] [--json]"
                );
                std::process::exit(0);
            }
            other => return Err(format!("unknown argument: {other}")),
        }
    }

    let input = input.ok_or_else(|| "missing required --input".to_string())?;
    Ok(Args {
        input,
        threshold,
        silence_ms,
        min_ms,
        chunk,
        json,
    })
}

/// Load a WAV as mono f32, averaging channels.
fn load_wav(path: &PathBuf) -> Result<(Vec<f32>, u32), String> {
    let mut reader =
        hound::WavReader::open(path).map_err(|e| format!("open {}: {e}", path.display()))?;
    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<_, _>>()
            .map_err(|e| format!("read samples: {e}"))?,
        hound::SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<_, _>>()
                .map_err(|e| format!("read samples: {e}"))?
        }
    };

    let mono = if channels == 1 {
        interleaved
    } else {
        interleaved
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect()
    };

    Ok((mono, spec.sample_rate))
}

fn percentile(sorted: &[f32], p: f64) -> f32 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = ((sorted.len() - 1) as f64 * p).round() as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn run() -> Result<(), String> {
    let args = parse_args()?;
    let (samples, sample_rate) = load_wav(&args.input)?;
    if samples.is_empty() {
        return Err("input file contains no samples".into());
    }

    let config = SegmenterConfig {
        target_sample_rate: sample_rate,
        chunk_samples: args.chunk,
        silence_threshold: args.threshold,
        silence_duration: Duration::from_millis(args.silence_ms),
        min_chunk_duration: Duration::from_millis(args.min_ms),
    };

    let chunk_secs = args.chunk as f64 / sample_rate as f64;
    let mut buffer = SegmentBuffer::new(&config);
    let base = Instant::now();

    let mut levels: Vec<f32> = Vec::new();
    let mut speech_chunks = 0usize;
    let mut utterances: Vec<UtteranceReport> = Vec::new();
    let mut discarded = 0usize;
    let mut peak_rms = 0.0f32;
    let mut consumed_samples = 0usize;

    for (index, chunk) in samples.chunks(args.chunk).enumerate() {
        let level = rms(chunk);
        levels.push(level);
        let is_silence = level < args.threshold;
        if !is_silence {
            speech_chunks += 1;
        }
        peak_rms = peak_rms.max(level);

        let now = base + Duration::from_secs_f64(chunk_secs * index as f64);
        match buffer.push(chunk, is_silence, now) {
            Some(FlushOutcome::Ready(utterance)) => {
                let start_secs = consumed_samples as f64 / sample_rate as f64;
                consumed_samples += utterance.len();
                utterances.push(UtteranceReport {
                    index: utterances.len(),
                    start_secs,
                    duration_secs: utterance.duration_secs(),
                    peak_rms,
                });
                peak_rms = 0.0;
            }
            Some(FlushOutcome::TooShort { samples }) => {
                consumed_samples += samples;
                discarded += 1;
                peak_rms = 0.0;
            }
            Some(FlushOutcome::Empty) | None => {}
        }
    }

    // Trailing audio the silence timer never flushed.
    match buffer.flush() {
        FlushOutcome::Ready(utterance) => {
            let start_secs = consumed_samples as f64 / sample_rate as f64;
            utterances.push(UtteranceReport {
                index: utterances.len(),
                start_secs,
                duration_secs: utterance.duration_secs(),
                peak_rms,
            });
        }
        FlushOutcome::TooShort { .. } => discarded += 1,
        FlushOutcome::Empty => {}
    }

    let mut sorted = levels.clone();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let p10 = percentile(&sorted, 0.10);
    let p50 = percentile(&sorted, 0.50);
    let p90 = percentile(&sorted, 0.90);

    // Noise floor sits near p10, speech near p90 — the geometric mean is a
    // reasonable gate between them.
    let suggested = if p90 > 0.0 && p10 > 0.0 {
        (p10 * p90).sqrt()
    } else {
        args.threshold
    };

    let report = Report {
        input: args.input.display().to_string(),
        sample_rate,
        total_secs: samples.len() as f64 / sample_rate as f64,
        threshold: args.threshold,
        chunks: levels.len(),
        speech_chunks,
        rms_p10: p10,
        rms_p50: p50,
        rms_p90: p90,
        rms_max: percentile(&sorted, 1.0),
        suggested_threshold: suggested,
        utterances,
        discarded,
    };

    if args.json {
        let rendered =
            serde_json::to_string_pretty(&report).map_err(|e| format!("serialize report: {e}"))?;
        println!("{rendered}");
    } else {
        println!(
            "{}: {:.1}s at {} Hz, {} chunks ({} speech)",
            report.input, report.total_secs, report.sample_rate, report.chunks, report.speech_chunks
        );
        println!(
            "rms p10={:.4} p50={:.4} p90={:.4} max={:.4}",
            report.rms_p10, report.rms_p50, report.rms_p90, report.rms_max
        );
        println!(
            "threshold={:.4} suggested={:.4}",
            report.threshold, report.suggested_threshold
        );
        for u in &report.utterances {
            println!(
                "  utterance {}: start={:.2}s duration={:.2}s peak={:.4}",
                u.index, u.start_secs, u.duration_secs, u.peak_rms
            );
        }
        if report.discarded > 0 {
            println!("  ({} segment(s) below minimum duration)", report.discarded);
        }
    }

    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sotto_core=info".parse().expect("valid default filter")),
        )
        .init();

    if let Err(e) = run() {
        eprintln!("calibrate failed: {e}");
        std::process::exit(1);
    }
}
