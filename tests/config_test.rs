//! Layered settings loading

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use ccogrow::application::{ApplicationError, CandidateStrategy, GeneratorState};
use ccogrow::config::Settings;
use ccogrow::domain::{CostEstimator, Domain, Shape};

fn write_config(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, content).expect("write config");
    path
}

fn load(local: &Path) -> Result<Settings, ApplicationError> {
    Settings::load_from(None, Some(local))
}

// ============================================================
// Layering
// ============================================================

#[test]
fn given_local_file_when_loading_then_overrides_defaults() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        "local.toml",
        r#"
[run]
terminals = 12
seed = 3

[generator]
candidate_count = 8
min_terminal_distance = 0.25
strategy = { kind = "fixed_perfusion_radius", radius = 0.75 }
"#,
    );

    let settings = load(&path).unwrap();

    assert_eq!(settings.run.terminals, 12);
    assert_eq!(settings.run.seed, 3);
    assert_eq!(settings.generator.candidate_count, 8);
    assert_eq!(settings.generator.min_terminal_distance, 0.25);
    assert_eq!(
        settings.generator.strategy,
        CandidateStrategy::FixedPerfusionRadius { radius: 0.75 }
    );
    assert_eq!(settings.generator.n_terminal_trial, 500);
}

#[test]
fn given_global_and_local_files_when_loading_then_local_wins() {
    let dir = TempDir::new().unwrap();
    let global = write_config(&dir, "global.toml", "[run]\nseed = 1\nterminals = 30\n");
    let local = write_config(&dir, "local.toml", "[run]\nseed = 2\n");

    let settings = Settings::load_from(Some(&global), Some(&local)).unwrap();

    assert_eq!(settings.run.seed, 2);
    assert_eq!(settings.run.terminals, 30);
}

#[test]
fn given_power_cost_estimator_when_loading_then_terms_available() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        "local.toml",
        r#"
[generator]
cost_estimator = { kind = "power", length_exponent = 1, radius_exponent = 2 }
"#,
    );

    let settings = load(&path).unwrap();

    assert_eq!(
        settings.generator.cost_estimator,
        CostEstimator::Power {
            length_exponent: 1,
            radius_exponent: 2
        }
    );
    assert_eq!(settings.generator.cost_estimator.power_terms().unwrap().len(), 1);
}

#[test]
fn given_empty_linear_combination_when_loading_then_rejected() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        "bad.toml",
        "[generator]\ncost_estimator = { kind = \"linear_combination\", terms = [] }\n",
    );
    assert!(load(&path).is_err());
}

#[test]
fn given_missing_local_file_when_loading_then_config_error() {
    let dir = TempDir::new().unwrap();
    let result = load(&dir.path().join("absent.toml"));
    assert!(matches!(result, Err(ApplicationError::Config { .. })));
}

#[test]
fn given_threshold_of_one_when_loading_then_rejected() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "bad.toml", "[generator]\nfailure_rate_threshold = 1.0\n");
    assert!(load(&path).is_err());
}

#[test]
fn given_env_variable_when_loading_then_overrides_file() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "local.toml", "[run]\nmax_seconds = 1.0\n");
    std::env::set_var("CCOGROW_RUN__MAX_SECONDS", "2.5");

    let settings = load(&path);
    std::env::remove_var("CCOGROW_RUN__MAX_SECONDS");

    assert_eq!(settings.unwrap().run.max_seconds, Some(2.5));
}

// ============================================================
// Regions and stages
// ============================================================

#[test]
fn given_cuboid_region_when_building_domain_then_measure_matches() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        "cube.toml",
        r#"
[domain.region]
shape = "cuboid"
min = { x = 0.0, y = 0.0, z = 0.0 }
max = { x = 2.0, y = 2.0, z = 2.0 }
"#,
    );

    let settings = load(&path).unwrap();

    assert!(matches!(settings.domain.region, Shape::Cuboid(_)));
    let domain = settings.domain.build().unwrap();
    assert!((domain.measure() - 8.0).abs() < 1e-12);
}

#[test]
fn given_stage_array_when_loading_then_sections_replace_top_level() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        "stages.toml",
        r#"
[generator]
candidate_count = 8

[[stages]]
terminals = 4

[[stages]]
terminals = 6
[stages.generator]
resets_d_lim = true
"#,
    );

    let settings = load(&path).unwrap();

    assert_eq!(settings.stages.len(), 2);
    assert_eq!(settings.total_terminals(), 10);
    let per_stage = settings.stage_settings();
    assert_eq!(per_stage[0].data.candidate_count, 8);
    assert_eq!(per_stage[1].data.candidate_count, 20);
    assert!(per_stage[1].data.resets_d_lim);
    let staged = settings.staged_domain().unwrap();
    assert_eq!(staged.stage_count(), 2);
    assert_eq!(staged.total_target(), 10);
}

#[test]
fn given_invalid_sphere_radius_when_building_domain_then_error() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        "sphere.toml",
        "[domain.region]\nshape = \"sphere\"\ncenter = { x = 0.0, y = 0.0, z = 0.0 }\nradius = -1.0\n",
    );
    let settings = load(&path).unwrap();
    assert!(settings.generator().is_err());
}

// ============================================================
// End to end
// ============================================================

#[test]
fn given_small_config_when_growing_then_done() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "run.toml", "[run]\nterminals = 6\nseed = 4\n");
    let settings = load(&path).unwrap();

    let mut generator = settings.generator().unwrap();
    let report = generator.generate().unwrap();

    assert_eq!(report.state, GeneratorState::Done);
    assert_eq!(report.terminals, 6);
}

#[test]
fn given_settings_when_rendering_toml_then_reloads_identically() {
    let dir = TempDir::new().unwrap();
    let original = load(&write_config(&dir, "a.toml", "[run]\nseed = 11\n")).unwrap();
    let rendered = write_config(&dir, "b.toml", &original.to_toml().unwrap());

    let reloaded = load(&rendered).unwrap();

    assert_eq!(reloaded.run.seed, 11);
    assert_eq!(reloaded.generator, original.generator);
    assert_eq!(reloaded.domain, original.domain);
}
