//! Color-change pipeline benchmarks
//!
//! Run with: cargo bench

use colormix::color::ChangeStrategy;
use colormix::config::ColorChangeConfig;
use colormix::gcode::{parse_gcode, GCodeContainer};
use colormix::pipeline::ColorChangePipeline;
use criterion::{black_box, criterion_group, criterion_main, Criterion};

/// Spiral-ish tower: `layers` layers of 64 segments each.
fn tower(layers: usize) -> String {
    let mut raw = String::from(";FLAVOR:Marlin\nG28\nM83\n;END OF THE START GCODE\n");
    for layer in 0..layers {
        let z = (layer + 1) as f64 * 0.2;
        for step in 0..64 {
            let a = step as f64 / 64.0 * std::f64::consts::TAU;
            raw.push_str(&format!(
                "G1 X{:.3} Y{:.3} Z{:.1} E0.05\n",
                100.0 + 20.0 * a.cos(),
                100.0 + 20.0 * a.sin(),
                z
            ));
        }
    }
    raw.push_str(";START OF THE END GCODE\nM104 S0\nM84\n");
    raw
}

fn parse_benchmark(c: &mut Criterion) {
    let raw = tower(200);
    c.bench_function("parse_gcode_12800_moves", |b| {
        b.iter(|| black_box(parse_gcode(black_box(&raw)).map(|lines| lines.len())))
    });
}

fn analytic_table_benchmark(c: &mut Criterion) {
    let raw = tower(200);
    c.bench_function("analytic_table_12800_moves", |b| {
        b.iter(|| {
            let mut container = GCodeContainer::build(black_box(&raw), 0.2, 0.0).ok()?;
            container.partition(0, None).ok()?;
            let rows = container.build_analytic_table().ok()?.len();
            Some(black_box(rows))
        })
    });
}

fn pipeline_benchmark(c: &mut Criterion) {
    let raw = tower(200);
    let config = ColorChangeConfig::new(0.2, vec![[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]])
        .with_strategy(ChangeStrategy::LayerCount { layers: 10 })
        .with_strategy(ChangeStrategy::PolarSplits { splits: 8 });

    c.bench_function("pipeline_retraction", |b| {
        let pipeline = ColorChangePipeline::new(config.clone().with_retraction(1.0, 1800.0));
        b.iter(|| black_box(pipeline.run(black_box(&raw)).map(|o| o.events.len())))
    });

    c.bench_function("pipeline_pressure_compensation", |b| {
        let pipeline = ColorChangePipeline::new(config.clone().with_pressure_compensation(0.5));
        b.iter(|| black_box(pipeline.run(black_box(&raw)).map(|o| o.events.len())))
    });
}

criterion_group!(
    benches,
    parse_benchmark,
    analytic_table_benchmark,
    pipeline_benchmark
);
criterion_main!(benches);
