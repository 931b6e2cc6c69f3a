//! Subcommand implementations.

use std::fmt::Write as _;
use std::sync::Arc;

use anyhow::Context;
use trialcheck_core::{
    DefinitionRegistry, DefinitionsFile, TimepointScope, TrialCriteriaType, ValidationReport,
};
use trialcheck_runtime::{ConformanceOrchestratorBuilder, RuntimeConfig};

use crate::cli::{DefinitionsArgs, OutputFormatArg, ValidateArgs};
use crate::fixture::Fixture;

/// Run one validation and print its report.
///
/// Returns whether the fixture conforms.
pub async fn run_validate(args: &ValidateArgs) -> anyhow::Result<bool> {
    let config = match &args.config {
        Some(path) => RuntimeConfig::from_yaml_file(path)?,
        None => RuntimeConfig::default(),
    };

    let definitions = DefinitionsFile::from_path(&args.definitions)
        .with_context(|| format!("invalid definitions file {}", args.definitions.display()))?;
    let registry = Arc::new(DefinitionRegistry::new());
    let registered = registry.register_all(&definitions)?;
    tracing::info!(definitions = registered, "Definitions loaded");

    let (store, timepoints, metadata, tool_groups) = Fixture::from_path(&args.fixture)?.into_sources();

    let orchestrator = ConformanceOrchestratorBuilder::new()
        .measurements(Arc::new(store))
        .timepoints(Arc::new(timepoints))
        .metadata(Arc::new(metadata))
        .metadata_cache(config.metadata_cache)
        .registry(registry)
        .tool_groups(tool_groups)
        .build()?;

    let report = orchestrator
        .validate_report(&TrialCriteriaType::new(args.criteria.as_str()))
        .await?;

    println!("{}", render_report(&report, args.format)?);
    Ok(report.is_conformant())
}

/// Check a definitions file and list its criteria types.
pub fn run_definitions(args: &DefinitionsArgs) -> anyhow::Result<()> {
    let definitions = DefinitionsFile::from_path(&args.definitions)
        .with_context(|| format!("invalid definitions file {}", args.definitions.display()))?;

    // Compiles every schema and pattern
    DefinitionRegistry::new().register_all(&definitions)?;

    println!("{}", render_definitions(&definitions));
    Ok(())
}

pub fn render_report(report: &ValidationReport, format: OutputFormatArg) -> anyhow::Result<String> {
    match format {
        OutputFormatArg::Json => Ok(serde_json::to_string_pretty(report)?),
        OutputFormatArg::Grouped => Ok(serde_json::to_string_pretty(&report.grouped)?),
        OutputFormatArg::Text => Ok(render_text(report)),
    }
}

fn render_text(report: &ValidationReport) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "Criteria: {}", report.criteria);
    for (scope, size) in &report.dataset_sizes {
        let _ = writeln!(out, "  {scope}: {size} measurements");
    }
    if let Some(max) = report.max_targets {
        let _ = writeln!(out, "Max targets: {max}");
    }

    if report.is_conformant() {
        let _ = write!(out, "No nonconformities found");
        return out;
    }

    let _ = writeln!(out, "Nonconformities: {}", report.nonconformities.len());
    for message in report.grouped.global_messages() {
        let _ = writeln!(out, "  [global] {message}");
    }
    for (group, tool_group) in &report.grouped.groups {
        for (number, entry) in &tool_group.measurement_numbers {
            for message in &entry.messages {
                let _ = writeln!(out, "  [{group} #{number}] {message}");
            }
        }
    }

    out.trim_end().to_string()
}

fn render_definitions(definitions: &DefinitionsFile) -> String {
    let mut out = String::new();

    for (key, spec) in &definitions.definitions {
        let name = spec.name.as_deref().unwrap_or(key);
        let _ = write!(out, "{key} ({name}):");
        for scope in TimepointScope::EVALUATION_ORDER {
            let rules = spec.rule_set(scope).map_or(0, |set| set.rules.len());
            let _ = write!(out, " {scope}={rules}");
        }
        out.push('\n');
    }

    out.trim_end().to_string()
}
