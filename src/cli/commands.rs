//! Command dispatch

use std::path::{Path, PathBuf};

use tracing::{debug, instrument};

use crate::application::{GeneratorState, GrowthReport};
use crate::cli::args::{Cli, Commands, ConfigCommands};
use crate::cli::error::{CliError, CliResult};
use crate::cli::output;
use crate::config::{global_config_path, Settings};
use crate::domain::{StatManipulator, TreeStatsManager, VascularTree, VesselAttribute};
use crate::infrastructure::{SnapshotWriter, TomlSnapshotWriter, TreeSnapshot};
use crate::tree_traits::TreeNodeConvert;

pub fn execute_command(cli: &Cli) -> CliResult<()> {
    match &cli.command {
        Some(Commands::Grow {
            terminals,
            seed,
            output,
            show_tree,
            stats,
        }) => {
            let mut settings = Settings::load(cli.config.as_deref())?;
            apply_grow_args(&mut settings, *terminals, *seed, output.clone())?;
            grow(&settings, *show_tree, stats)
        }
        Some(Commands::Config { command }) => config(cli.config.as_deref(), command),
        None => Err(CliError::Usage("no command given, see --help".into())),
    }
}

/// Command-line values override the loaded settings.
pub fn apply_grow_args(
    settings: &mut Settings,
    terminals: Option<usize>,
    seed: Option<u64>,
    output: Option<PathBuf>,
) -> CliResult<()> {
    if let Some(terminals) = terminals {
        if !settings.stages.is_empty() {
            return Err(CliError::InvalidArgs(
                "--terminals cannot be combined with configured stages".into(),
            ));
        }
        settings.run.terminals = terminals;
    }
    if let Some(seed) = seed {
        settings.run.seed = seed;
    }
    if output.is_some() {
        settings.run.output = output;
    }
    Ok(())
}

#[instrument(level = "debug", skip(settings))]
fn grow(settings: &Settings, show_tree: bool, stats: &[VesselAttribute]) -> CliResult<()> {
    let mut generator = settings.generator()?;
    output::header(&format!(
        "Growing {} terminals in {} stage(s), seed {}",
        settings.total_terminals(),
        generator.domain().stage_count(),
        settings.run.seed
    ));

    let result = generator.generate();
    let tree = generator.tree();
    let report = generator.report();
    print_report(&report);

    if let Some(path) = &settings.run.output {
        write_snapshot(tree, path)?;
    }
    result?;

    if show_tree {
        output::info(&tree.to_tree_string());
    }
    print_stats(tree, stats);
    Ok(())
}

fn print_report(report: &GrowthReport) {
    match report.state {
        GeneratorState::Done => output::success(&format!("{} terminals", report.terminals)),
        GeneratorState::Stopped => output::warning(&format!(
            "stopped early ({}), {} terminals",
            report
                .stop
                .map_or_else(|| "unknown reason".to_string(), |r| r.to_string()),
            report.terminals
        )),
        _ => output::failure(&format!("{} terminals", report.terminals)),
    }
    let p = &report.progress;
    output::metric("volume", format!("{:.6e}", report.volume));
    output::metric("stage", report.stage);
    output::metric("iterations", p.iterations);
    output::metric("failure rate", format!("{:.3}", p.failure_rate()));
    output::metric(
        "dropped",
        format!(
            "sampling {} / no candidate {} / rollback {}",
            p.sampling_failures, p.no_candidate_failures, p.rollbacks
        ),
    );
    output::metric(
        "rejected",
        format!(
            "topology {} / geometry {} / hydraulic {}",
            p.rejected_topology, p.rejected_geometry, p.rejected_hydraulic
        ),
    );
    output::metric("elapsed", format!("{:.2}s", report.elapsed.as_secs_f64()));
}

fn print_stats(tree: &VascularTree, attributes: &[VesselAttribute]) {
    if attributes.is_empty() {
        return;
    }
    let manager = TreeStatsManager::new();
    output::header("Statistics");
    for attribute in attributes {
        let values = manager.collect(tree, *attribute);
        let fmt = |m: StatManipulator| m.apply(&values).map_or_else(|| "-".to_string(), |v| format!("{v:.4e}"));
        output::metric(
            attribute.as_str(),
            format!(
                "mean {} median {} sd {}",
                fmt(StatManipulator::Mean),
                fmt(StatManipulator::Percentile(50.0)),
                fmt(StatManipulator::StdDev)
            ),
        );
    }
}

fn write_snapshot(tree: &VascularTree, path: &Path) -> CliResult<()> {
    let writer = TomlSnapshotWriter::new(path);
    writer.write(&TreeSnapshot::capture(tree))?;
    output::action("Wrote", &path.display());
    Ok(())
}

fn config(local: Option<&Path>, command: &ConfigCommands) -> CliResult<()> {
    match command {
        ConfigCommands::Show => {
            let settings = Settings::load(local)?;
            output::info(&settings.to_toml()?);
        }
        ConfigCommands::Template => output::info(&Settings::template()),
        ConfigCommands::Path => {
            let global = global_config_path();
            debug!("config path: global={:?}", global);
            match global {
                Some(path) => {
                    let state = if path.exists() { "" } else { " (missing)" };
                    output::action("Global", &format!("{}{}", path.display(), state));
                }
                None => output::warning("no config directory on this platform"),
            }
            if let Some(path) = local {
                output::action("Local", &path.display());
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StageConfig;

    #[test]
    fn given_terminal_override_with_stages_when_applying_then_invalid_args() {
        let mut settings = Settings {
            stages: vec![StageConfig {
                terminals: 4,
                ..StageConfig::default()
            }],
            ..Settings::default()
        };
        let err = apply_grow_args(&mut settings, Some(10), None, None).unwrap_err();
        assert!(matches!(err, CliError::InvalidArgs(_)));
    }

    #[test]
    fn given_overrides_when_applying_then_settings_updated() {
        let mut settings = Settings::default();
        apply_grow_args(&mut settings, Some(12), Some(9), Some(PathBuf::from("t.toml"))).unwrap();
        assert_eq!(settings.run.terminals, 12);
        assert_eq!(settings.run.seed, 9);
        assert_eq!(settings.run.output, Some(PathBuf::from("t.toml")));
    }
}
