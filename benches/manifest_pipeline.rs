//! Manifest hot-path benchmarks: parse, render, detect and stitch.
//!
//! Run with: cargo bench --bench manifest_pipeline

use chrono::Utc;
use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use splicer::hls::playlist::{HostAliases, normalize_urls};
use splicer::hls::{Manifest, Segment, parse_manifest, render_manifest};
use splicer::stitcher::{
    AdBreakWithAds, AdPlaylist, BreakPosition, StaticAdRule, detect_ad_breaks,
    stitch_multiple_ad_breaks_at,
};

/// Live window of `segments` 6s chunks with a cue every 20 segments.
fn live_playlist(segments: usize) -> String {
    let mut out = String::from(
        "#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-TARGETDURATION:6\n#EXT-X-MEDIA-SEQUENCE:1000\n",
    );
    for n in 0..segments {
        if n % 20 == 10 {
            out.push_str("#EXT-X-CUE-OUT:DURATION=30\n");
        }
        if n % 20 == 15 {
            out.push_str("#EXT-X-CUE-IN\n");
        }
        out.push_str(&format!("#EXTINF:6.006,\nchunk_{}.ts\n", 1000 + n));
    }
    out
}

fn ad(id: &str) -> AdPlaylist {
    AdPlaylist {
        ad_id: id.to_string(),
        manifest: Manifest {
            segments: (0..3)
                .map(|i| Segment {
                    uri: format!("https://ads.example.com/{id}/{i}.ts"),
                    duration: 10.0,
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        },
    }
}

fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse_manifest");
    for size in [10usize, 100, 1000] {
        let text = live_playlist(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &text, |b, text| {
            b.iter(|| black_box(parse_manifest(black_box(text)).unwrap()))
        });
    }
    group.finish();
}

fn bench_render(c: &mut Criterion) {
    let manifest = parse_manifest(&live_playlist(100)).unwrap();
    c.bench_function("render_manifest_100", |b| {
        b.iter(|| black_box(render_manifest(black_box(&manifest))))
    });
}

fn bench_normalize(c: &mut Criterion) {
    let text = live_playlist(100);
    let aliases = HostAliases::parse("http://localhost:8000=https://ads.example.com");
    c.bench_function("normalize_urls_100", |b| {
        b.iter(|| {
            black_box(normalize_urls(
                black_box(&text),
                "https://origin.example.com/live/index.m3u8",
                &aliases,
            ))
        })
    });
}

fn bench_detect(c: &mut Criterion) {
    let text = live_playlist(100);
    let manifest = parse_manifest(&text).unwrap();
    let rules = [StaticAdRule {
        position: BreakPosition::MidRoll,
        offset: 60.0,
        duration: 30,
        interval: 120.0,
    }];
    c.bench_function("detect_ad_breaks_100", |b| {
        b.iter(|| black_box(detect_ad_breaks(&manifest, black_box(&text), &rules)))
    });
}

fn bench_stitch(c: &mut Criterion) {
    let manifest = parse_manifest(&live_playlist(100)).unwrap();
    let breaks: Vec<AdBreakWithAds> = [0.0, 120.0, 240.0, 360.0, 480.0]
        .iter()
        .map(|offset| AdBreakWithAds {
            offset: *offset,
            ads: vec![ad("a"), ad("b")],
        })
        .collect();
    let now = Utc::now();

    c.bench_function("stitch_5_breaks_100", |b| {
        b.iter(|| {
            black_box(stitch_multiple_ad_breaks_at(
                manifest.clone(),
                black_box(&breaks),
                now,
            ))
        })
    });
}

criterion_group!(
    benches,
    bench_parse,
    bench_render,
    bench_normalize,
    bench_detect,
    bench_stitch
);
criterion_main!(benches);
