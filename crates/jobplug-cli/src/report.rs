//! Text and JSON rendering of engine state.

use std::fmt::Write;

use jobplug::{Engine, EngineSummary, Job};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct Resolution {
    pub job: Job,
    pub repository: Option<String>,
    pub manager: Option<String>,
}

/// `None` when the job type is not registered
pub fn resolve(engine: &Engine, job_type: &str) -> Option<Resolution> {
    let job = engine.create_job_prototype(job_type)?;
    let target = |entry: Option<&jobplug::MappingEntry>| {
        entry.map(|e| format!("{} ({})", e.target.key, e.module.display()))
    };
    Some(Resolution {
        repository: target(engine.resolve_repository_mapping(job_type)),
        manager: target(engine.resolve_manager_mapping(job_type)),
        job,
    })
}

pub fn render_summary(summary: &EngineSummary) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Manifest: {}", summary.manifest.display());
    let _ = writeln!(out, "Search directories:");
    for dir in &summary.search_directories {
        let _ = writeln!(out, "  {}", dir.display());
    }
    if summary.dropped_tokens > 0 {
        let _ = writeln!(out, "Dropped entries: {}", summary.dropped_tokens);
    }

    let _ = writeln!(out, "Categories:");
    for category in &summary.categories {
        let _ = writeln!(out, "  {} ({})", category.id, category.name);
    }

    let _ = writeln!(out, "Jobs:");
    for group in &summary.jobs {
        let _ = writeln!(out, "  {}", group.category);
        for job in &group.jobs {
            let _ = writeln!(out, "    {} - {}", job.type_identity, job.name());
        }
    }

    let _ = writeln!(out, "Mappings:");
    for mapping in &summary.mappings {
        let _ = writeln!(
            out,
            "  {} -> {} [{:?}]",
            mapping.job, mapping.target, mapping.kind
        );
    }

    let _ = writeln!(out, "Modules:");
    for module in &summary.modules {
        let _ = writeln!(
            out,
            "  {} {} ({} types, loaded {})",
            module.name,
            module.path.display(),
            module.types.len(),
            module.loaded_at.to_rfc3339()
        );
    }
    out
}

pub fn render_resolution(resolution: &Resolution) -> String {
    let none = || "-".to_string();
    let mut out = String::new();
    let _ = writeln!(out, "Job:        {}", resolution.job.type_identity);
    let _ = writeln!(out, "Name:       {}", resolution.job.name());
    let _ = writeln!(out, "Category:   {}", resolution.job.category_id);
    let _ = writeln!(
        out,
        "Repository: {}",
        resolution.repository.clone().unwrap_or_else(none)
    );
    let _ = writeln!(
        out,
        "Manager:    {}",
        resolution.manager.clone().unwrap_or_else(none)
    );
    out
}
