//! End-to-end color-change tests.
//!
//! These tests run the whole chain on synthetic slicer output:
//! - Container partitioning and the analytic table
//! - Planning with each strategy and with combined strategies
//! - Insertion with retraction, sectioned retraction and pressure compensation
//! - Output naming and writing

use colormix::color::{ChangeStrategy, ColorChangeEditor, ColorChangePlanner};
use colormix::config::{ColorChangeConfig, SectionedParam};
use colormix::gcode::{parse_gcode, Command, GCode, GCodeContainer, CURA_SIGNATURE};
use colormix::pipeline::ColorChangePipeline;
use colormix::Error;

const START: &str = ";FLAVOR:Marlin\nM140 S60\nG28\nM83\n;END OF THE START GCODE\n";
const END: &str = ";START OF THE END GCODE\nM104 S0\nM140 S0\nM84\n";

/// 100 extrusion moves, one per layer, climbing 0.2mm each.
fn staircase() -> String {
    let mut raw = String::from(START);
    for i in 0..100 {
        let z = i as f64 * 0.2;
        raw.push_str(&format!(
            "G1 X{} Y{} Z{:.1} E0.1\n",
            i % 2 * 10,
            i / 2 % 2 * 10,
            z
        ));
    }
    raw.push_str(END);
    raw
}

/// Square perimeters with a Cura header and layer markers.
fn cura_square(layers: usize) -> String {
    let mut raw = format!("{}\n;LAYER_COUNT:{}\n{}", CURA_SIGNATURE, layers, START);
    for layer in 0..layers {
        raw.push_str(&format!(";LAYER:{}\n", layer));
        raw.push_str(&format!("G0 F6000 X0 Y0 Z{:.1}\n", (layer + 1) as f64 * 0.2));
        raw.push_str(";TYPE:WALL-OUTER\n");
        for (x, y) in [(20, 0), (20, 20), (0, 20), (0, 0)] {
            raw.push_str(&format!("G1 X{} Y{} Z{:.1} E0.8\n", x, y, (layer + 1) as f64 * 0.2));
        }
    }
    raw.push_str(END);
    raw
}

/// Test that a 100-layer staircase split every 10 layers yields 9 changes
#[test]
fn test_layer_count_on_staircase() {
    let mut container = GCodeContainer::build(&staircase(), 0.2, 0.0).unwrap();
    container.partition(0, None).unwrap();
    container.build_analytic_table().unwrap();

    let rows = container.rows();
    assert_eq!(rows.len(), 100);
    assert_eq!(rows[0].layer_index, 0);
    assert_eq!(rows[99].layer_index, 99);

    let mut planner = ColorChangePlanner::new(rows);
    assert_eq!(planner.by_layer_count(10).unwrap(), 9);

    let layers: Vec<i32> = planner
        .events()
        .iter()
        .map(|e| e.source_row.layer_index)
        .collect();
    assert_eq!(layers, vec![10, 20, 30, 40, 50, 60, 70, 80, 90]);
}

/// Test that every inserted block lands directly before its triggering move
#[test]
fn test_blocks_precede_triggering_moves() {
    let config = ColorChangeConfig::new(0.2, vec![[1.0, 0.0, 0.0], [0.0, 1.0, 0.0]])
        .with_strategy(ChangeStrategy::LayerCount { layers: 10 });
    let output = ColorChangePipeline::new(config).run(&staircase()).unwrap();
    let lines = parse_gcode(output.gcode.content()).unwrap();

    let commits: Vec<usize> = lines
        .iter()
        .enumerate()
        .filter(|(_, l)| l.command() == Command::M164)
        .map(|(i, _)| i)
        .collect();
    assert_eq!(commits.len(), 9);

    for (n, &i) in commits.iter().enumerate() {
        let next = &lines[i + 1];
        assert!(next.is_extrusion_move());
        let expected_z = format!("{:.1}", (n + 1) as f64 * 10.0 * 0.2);
        assert_eq!(next.number('Z'), Some(expected_z.parse().unwrap()));
    }
}

/// Test Cura marker-based layers, combined strategies and label order
#[test]
fn test_cura_combined_strategies() {
    let config = ColorChangeConfig::new(0.2, vec![[1.0, 0.0, 0.0], [0.0, 0.0, 1.0]])
        .with_strategy(ChangeStrategy::LayerCount { layers: 4 })
        .with_strategy(ChangeStrategy::PolarSplits { splits: 4 });
    let output = ColorChangePipeline::new(config).run(&cura_square(12)).unwrap();

    assert_eq!(output.labels, vec!["layer", "phi"]);
    assert_eq!(output.metrics.center_xy, (10.0, 10.0));
    assert_eq!(output.metrics.layer_count, 12);

    let layer_events = output
        .events
        .iter()
        .filter(|e| e.order < 2)
        .map(|e| e.source_row.layer_index)
        .collect::<Vec<_>>();
    assert_eq!(layer_events, vec![4, 8]);

    // the four corners sit in four different 90 degree sectors
    assert!(output.events.len() > 2);
    assert!(output.events.windows(2).all(|w| w[0].order + 1 == w[1].order));
}

/// Test sectioned retraction: lower half retracts less than upper half
#[test]
fn test_sectioned_retraction() {
    let config = ColorChangeConfig::new(0.2, vec![[1.0, 0.0, 0.0]])
        .with_strategy(ChangeStrategy::LayerCount { layers: 10 })
        .with_retraction(vec![0.5, 2.0], 1800.0);
    let output = ColorChangePipeline::new(config).run(&staircase()).unwrap();

    let retractions: Vec<String> = output
        .gcode
        .lines()
        .filter(|l| l.starts_with("G1 E-"))
        .map(str::to_string)
        .collect();
    assert_eq!(retractions.len(), 9);
    // 99 layers in 2 sections: 0..=49 and 50..
    assert!(retractions[..4].iter().all(|l| l == "G1 E-0.5 F1800"));
    assert!(retractions[4..].iter().all(|l| l == "G1 E-2 F1800"));

    let refills = output
        .gcode
        .lines()
        .filter(|l| *l == "G1 E0.5 F1800" || *l == "G1 E2 F1800")
        .count();
    assert_eq!(refills, 9);
}

/// Test that pressure compensation rewrites extrusion and skips retraction
#[test]
fn test_pressure_compensation_pipeline() {
    let config = ColorChangeConfig::new(0.2, vec![[1.0, 0.0, 0.0]])
        .with_strategy(ChangeStrategy::LayerCount { layers: 50 })
        .with_pressure_compensation(0.4)
        .with_retraction(SectionedParam::Scalar(1.0), 1800.0);
    let output = ColorChangePipeline::new(config).run(&staircase()).unwrap();

    assert_eq!(output.events.len(), 1);
    let text = output.gcode.content();
    assert!(!text.contains("G1 E-1"));

    let lines = parse_gcode(text).unwrap();
    let commit = lines
        .iter()
        .position(|l| l.command() == Command::M164)
        .unwrap();

    // 0.4mm of filament = 4 moves of 0.1mm on each side; the block is
    // M163 x3 + M164, so the last move before it is at commit - 4
    let before: Vec<f64> = lines[commit - 7..commit - 3]
        .iter()
        .map(|l| l.number('E').unwrap())
        .collect();
    let after: Vec<f64> = lines[commit + 1..commit + 5]
        .iter()
        .map(|l| l.number('E').unwrap())
        .collect();

    let expected_before = [0.0875, 0.0625, 0.0375, 0.0125];
    let expected_after = [0.1875, 0.1625, 0.1375, 0.1125];
    for (got, want) in before.iter().zip(expected_before) {
        assert!((got - want).abs() < 1e-5, "{got} vs {want}");
    }
    for (got, want) in after.iter().zip(expected_after) {
        assert!((got - want).abs() < 1e-5, "{got} vs {want}");
    }

    assert_eq!(lines[commit - 8].number('E'), Some(0.1));
    assert_eq!(lines[commit + 5].number('E'), Some(0.1));
    assert!(lines[commit + 1]
        .comment()
        .starts_with("PressureControlFactor:"));
}

/// Test the bottom layer exclusion and leading line removal on the pipeline
#[test]
fn test_start_layer_and_limit() {
    let mut config = ColorChangeConfig::new(0.2, vec![[1.0, 0.0, 0.0]])
        .with_strategy(ChangeStrategy::LayerCount { layers: 10 });
    config.start_layer_height = 5.0;
    config.limit_lines = Some(30);

    let output = ColorChangePipeline::new(config).run(&staircase()).unwrap();

    // body starts after Z5.0 (layer 25) and holds layers 26..=55
    let layers: Vec<i32> = output
        .events
        .iter()
        .map(|e| e.source_row.layer_index)
        .collect();
    assert_eq!(layers, vec![30, 40, 50]);

    let lines = parse_gcode(output.gcode.content()).unwrap();
    let moves = lines.iter().filter(|l| l.is_extrusion_move()).count();
    assert_eq!(moves, 26 + 30);
    assert!(output.gcode.content().ends_with(END));
}

/// Test structural errors surface from the pipeline
#[test]
fn test_missing_end_marker() {
    let raw = staircase().replace(";START OF THE END GCODE\n", "");
    let config = ColorChangeConfig::new(0.2, vec![[1.0, 0.0, 0.0]]);
    assert!(matches!(
        ColorChangePipeline::new(config).run(&raw),
        Err(Error::Structure(_))
    ));
}

/// Test parse errors abort the run
#[test]
fn test_parse_error_aborts() {
    let raw = staircase().replace("M140 S60", "M140 S60\n*garbage*");
    let config = ColorChangeConfig::new(0.2, vec![[1.0, 0.0, 0.0]]);
    assert!(matches!(
        ColorChangePipeline::new(config).run(&raw),
        Err(Error::Parse { line: 3, .. })
    ));
}

/// Test that the editor can be driven manually with a planner's events
#[test]
fn test_manual_planner_and_editor() {
    let mut container = GCodeContainer::build(&cura_square(6), 0.2, 0.0).unwrap();
    container.partition(0, None).unwrap();
    container.build_analytic_table().unwrap();
    let layer_count = container.metrics().unwrap().layer_count;

    let (events, _) = {
        let mut planner = ColorChangePlanner::new(container.rows());
        planner.by_distance_xy(100.0).unwrap();
        planner.into_parts()
    };
    assert!(!events.is_empty());

    let editor = ColorChangeEditor::new(vec![[0.2, 0.3, 0.5]], layer_count).unwrap();
    let mut lines = container.into_lines();
    let before = lines.len();
    editor.apply(&events, &mut lines).unwrap();

    assert_eq!(lines.len(), before + 4 * events.len());
    assert!(GCode::from_lines(&lines)
        .content()
        .contains("M163 S2 P0.5\nM164 S0\n"));
}

/// Test writing the result under its generated name
#[test]
fn test_write_named_output() {
    let config = ColorChangeConfig::new(0.2, vec![[1.0, 0.0, 0.0], [0.0, 1.0, 0.0]])
        .with_strategy(ChangeStrategy::DistanceXy { distance_mm: 50.0 });
    let output = ColorChangePipeline::new(config).run(&staircase()).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let timestamp = chrono::NaiveDate::from_ymd_opt(2024, 6, 1)
        .unwrap()
        .and_hms_opt(12, 30, 0)
        .unwrap();
    let name = output.file_name(&timestamp, std::path::Path::new("/models/stairs.gcode"));
    assert_eq!(name, "0601-1230_colored2_distance_stairs.gcode");

    let path = dir.path().join(&name);
    output.gcode.write_to_file(&path).unwrap();
    assert_eq!(GCode::read_from_file(&path).unwrap(), output.gcode);
}
