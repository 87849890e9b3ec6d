//! End-to-end deconvolution: synthesized .vbi captures through the full
//! pipeline, checked against the packets that went in.

use std::fs;
use std::sync::Arc;

use clap::Parser;
use vbitext::app;
use vbitext::cli::Cli;
use vbitext::config::{profile_by_name, GeometryOverrides, LineConfig};
use vbitext::defaults::LINE_BYTES;
use vbitext::io::CollectorSink;
use vbitext::packet::types::PacketPayload;
use vbitext::packet::{encode, hamming, parity};
use vbitext::pipeline::{run_deconvolve, CancelToken, PipelineConfig, StderrReporter};
use vbitext::vbi::synth::Synthesizer;
use vbitext::vbi::{CpuDeconvolver, SampleFrame};

fn line_config() -> Arc<LineConfig> {
    let profile = profile_by_name("bt8x8_pal").unwrap();
    LineConfig::from_profile(&profile, GeometryOverrides::default()).unwrap()
}

fn run_frames(
    frames: Vec<SampleFrame>,
) -> Vec<vbitext::packet::Packet> {
    let config = line_config();
    let sink = CollectorSink::new();
    let handle = sink.handle();
    run_deconvolve(
        frames.into_iter().map(Ok),
        Arc::new(CpuDeconvolver::new(config)),
        &PipelineConfig::default(),
        Box::new(sink),
        Arc::new(StderrReporter),
        CancelToken::new(),
    )
    .unwrap();
    let collected = handle.lock().unwrap();
    collected.clone()
}

#[test]
fn clean_header_line_round_trips_exactly() {
    let config = line_config();
    let synth = Synthesizer::new(config);
    let bytes = encode::header(1, 0x00, 0x0000, 0, b"HELLO");
    let packets = run_frames(vec![SampleFrame::new(0, synth.render(&bytes))]);

    assert_eq!(packets.len(), 1);
    let packet = &packets[0];
    assert_eq!(packet.raw, bytes);

    // Address bytes carry Hamming-coded magazine 1, row 0.
    assert_eq!(packet.raw[0], hamming::encode(0b0001));
    assert_eq!(packet.raw[1], hamming::encode(0b0000));

    match &packet.payload {
        PacketPayload::Header(h) => {
            assert_eq!(h.page, 0x00);
            assert_eq!(h.subpage, 0x0000);
            let text: Vec<u8> = h.text.iter().map(|&b| parity::strip(b)).collect();
            assert_eq!(&text[..5], b"HELLO");
            assert!(text[5..].iter().all(|&b| b == b' '));
        }
        other => panic!("expected header, got {}", other.kind_name()),
    }
    assert_eq!(packet.errors, 0);
}

#[test]
fn noisy_line_still_decodes_with_confidence() {
    let config = line_config();
    let synth = Synthesizer::new(config).with_noise(0.1, 1234);
    let bytes = encode::header(1, 0x00, 0x0000, 0, b"HELLO");
    let packets = run_frames(vec![SampleFrame::new(0, synth.render(&bytes))]);

    assert_eq!(packets.len(), 1);
    let packet = &packets[0];
    assert_eq!(packet.raw, bytes, "noise sigma 0.1 must not corrupt bytes");
    assert!(packet.errors <= 2);
    // Text bytes (10..42 of a header) keep usable confidence. The floor
    // is conservative: a byte's confidence is its weakest bit.
    for (i, &confidence) in packet.channel_confidence.iter().enumerate().skip(10) {
        assert!(
            confidence > 0.25,
            "text byte {i} confidence {confidence} too low"
        );
    }
    let mean: f32 =
        packet.channel_confidence[10..].iter().sum::<f32>() / 32.0;
    assert!(mean > 0.6, "mean text confidence {mean} too low");
}

#[test]
fn frames_without_cri_are_rejected_not_zero_filled() {
    let config = line_config();
    let synth = Synthesizer::new(config.clone());

    // Every third frame carries no teletext line.
    let mut frames = Vec::new();
    for i in 0..12u64 {
        if i % 3 == 2 {
            frames.push(SampleFrame::new(i, synth.render_blank()));
        } else {
            let bytes = encode::display_row(1, (i % 24 + 1) as u8, b"PRESENT");
            frames.push(SampleFrame::new(i, synth.render(&bytes)));
        }
    }

    let packets = run_frames(frames);
    assert_eq!(packets.len(), 8);
    let indices: Vec<u64> = packets.iter().map(|p| p.frame_index).collect();
    assert_eq!(indices, vec![0, 1, 3, 4, 6, 7, 9, 10]);
    // No zero-filled lines: every emitted packet has real content.
    assert!(packets.iter().all(|p| p.raw.iter().any(|&b| b != 0)));
}

#[test]
fn output_order_is_monotone_under_parallel_workers() {
    let config = line_config();
    let synth = Synthesizer::new(config.clone()).with_noise(0.05, 7);

    let frames: Vec<SampleFrame> = (0..64u64)
        .map(|i| {
            let bytes = encode::display_row(((i % 8) + 1) as u8, (i % 24 + 1) as u8, b"ORDER");
            SampleFrame::new(i, synth.render(&bytes))
        })
        .collect();

    let sink = CollectorSink::new();
    let handle = sink.handle();
    run_deconvolve(
        frames.into_iter().map(Ok),
        Arc::new(CpuDeconvolver::new(config)),
        &PipelineConfig {
            workers: 8,
            ..Default::default()
        },
        Box::new(sink),
        Arc::new(StderrReporter),
        CancelToken::new(),
    )
    .unwrap();

    let collected = handle.lock().unwrap();
    assert_eq!(collected.len(), 64);
    let indices: Vec<u64> = collected.iter().map(|p| p.frame_index).collect();
    let mut sorted = indices.clone();
    sorted.sort_unstable();
    assert_eq!(indices, sorted);
}

#[test]
fn cli_deconvolve_produces_t42_multiple_of_42() {
    let dir = tempfile::tempdir().unwrap();
    let vbi_path = dir.path().join("capture.vbi");
    let t42_path = dir.path().join("out.t42");

    let config = line_config();
    let synth = Synthesizer::new(config);
    let stream: Vec<[u8; LINE_BYTES]> = (0..5)
        .map(|i| encode::display_row(1, i + 1, b"CLI ROUND TRIP"))
        .collect();
    fs::write(&vbi_path, synth.render_stream(&stream)).unwrap();

    let cli = Cli::parse_from([
        "vbitext",
        "deconvolve",
        vbi_path.to_str().unwrap(),
        "-o",
        t42_path.to_str().unwrap(),
        "--no-progress",
        "--quiet",
    ]);
    app::run(cli).unwrap();

    let output = fs::read(&t42_path).unwrap();
    assert_eq!(output.len() % 42, 0);
    assert_eq!(output.len(), 5 * 42);
    for (i, record) in output.chunks(42).enumerate() {
        assert_eq!(record, &stream[i][..]);
    }
}

#[test]
fn cli_deconvolve_empty_input_is_clean_empty_output() {
    let dir = tempfile::tempdir().unwrap();
    let vbi_path = dir.path().join("empty.vbi");
    let t42_path = dir.path().join("out.t42");
    fs::write(&vbi_path, b"").unwrap();

    let cli = Cli::parse_from([
        "vbitext",
        "deconvolve",
        vbi_path.to_str().unwrap(),
        "-o",
        t42_path.to_str().unwrap(),
        "--no-progress",
        "--quiet",
    ]);
    app::run(cli).unwrap();

    assert_eq!(fs::read(&t42_path).unwrap().len(), 0);
}

#[test]
fn cli_deconvolve_frame_range_controls() {
    let dir = tempfile::tempdir().unwrap();
    let vbi_path = dir.path().join("capture.vbi");
    let t42_path = dir.path().join("out.t42");

    let config = line_config();
    let synth = Synthesizer::new(config);
    let stream: Vec<[u8; LINE_BYTES]> = (0..10)
        .map(|i| encode::display_row(1, i + 1, b"RANGE"))
        .collect();
    fs::write(&vbi_path, synth.render_stream(&stream)).unwrap();

    let cli = Cli::parse_from([
        "vbitext",
        "deconvolve",
        vbi_path.to_str().unwrap(),
        "--start",
        "2",
        "--stop",
        "8",
        "--step",
        "2",
        "-o",
        t42_path.to_str().unwrap(),
        "--no-progress",
        "--quiet",
    ]);
    app::run(cli).unwrap();

    let output = fs::read(&t42_path).unwrap();
    // Frames 2, 4, 6 pass the range controls.
    assert_eq!(output.len(), 3 * 42);
    assert_eq!(&output[..42], &stream[2][..]);
    assert_eq!(&output[42..84], &stream[4][..]);
    assert_eq!(&output[84..], &stream[6][..]);
}

#[test]
fn cli_unknown_profile_is_exit_code_3() {
    let dir = tempfile::tempdir().unwrap();
    let vbi_path = dir.path().join("capture.vbi");
    fs::write(&vbi_path, b"").unwrap();

    let cli = Cli::parse_from([
        "vbitext",
        "deconvolve",
        vbi_path.to_str().unwrap(),
        "--device",
        "bt9x9_secam",
        "--no-progress",
    ]);
    let error = app::run(cli).unwrap_err();
    assert_eq!(error.exit_code(), 3);
}

#[test]
fn batch_backend_output_matches_scalar_backend() {
    let dir = tempfile::tempdir().unwrap();
    let vbi_path = dir.path().join("capture.vbi");
    let scalar_path = dir.path().join("scalar.t42");
    let batch_path = dir.path().join("batch.t42");

    let config = line_config();
    let synth = Synthesizer::new(config).with_noise(0.06, 4242);
    let stream: Vec<[u8; LINE_BYTES]> = (0..20)
        .map(|i| encode::display_row((i % 8) + 1, (i % 24) + 1, b"BACKEND PARITY"))
        .collect();
    fs::write(&vbi_path, synth.render_stream(&stream)).unwrap();

    for (out, extra) in [(&scalar_path, None), (&batch_path, Some("--batch"))] {
        let mut argv = vec![
            "vbitext",
            "deconvolve",
            vbi_path.to_str().unwrap(),
            "-o",
            out.to_str().unwrap(),
            "--no-progress",
            "--quiet",
        ];
        if let Some(flag) = extra {
            argv.push(flag);
        }
        app::run(Cli::parse_from(argv)).unwrap();
    }

    assert_eq!(
        fs::read(&scalar_path).unwrap(),
        fs::read(&batch_path).unwrap(),
        "backend choice must not change observable results"
    );
}
