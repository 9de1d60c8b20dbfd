use std::path::Path;

use tracing::{debug, warn};

use spindle_core::error::{Result, SpindleError};
use spindle_core::item::{ItemConfig, ItemSpec, ToolSpecification};
use spindle_core::resource::Resource;
use spindle_graph::ProjectModel;
use spindle_plan::ExecutionUnit;

use crate::context::RunContext;
use crate::subprocess::{self, SubprocessRequest};

use super::{output_directory_name, ItemOutput};

/// Run the tool's command template as a child process.
///
/// Each filter stack gets its own work directory, so two units of the same
/// tool never see each other's files. A non-zero exit, a timeout, or a
/// cancellation removes the work directory before the error is reported —
/// partial outputs are unreliable and must not reach successors.
pub async fn execute(
    ctx: &RunContext,
    model: &ProjectModel,
    spec: &ItemSpec,
    unit: &ExecutionUnit,
) -> Result<ItemOutput> {
    let ItemConfig::Tool {
        specification,
        cmd_line_args,
    } = &spec.config
    else {
        return Err(SpindleError::InternalInvariant(format!(
            "tool adapter invoked for non-tool item {}",
            spec.name
        )));
    };
    let tool_spec = specification
        .as_deref()
        .and_then(|name| model.specifications().get(name))
        .ok_or_else(|| SpindleError::MissingSpecification {
            item: spec.name.clone(),
        })?;

    let work_dir = ctx
        .dirs
        .item_dir(&spec.short_name())
        .join("work")
        .join(output_directory_name(&unit.filter_stack));
    if work_dir.exists() {
        std::fs::remove_dir_all(&work_dir)?;
    }
    std::fs::create_dir_all(&work_dir)?;

    let mut args = Vec::with_capacity(tool_spec.args.len() + cmd_line_args.len());
    for arg in &tool_spec.args {
        match ToolSpecification::input_placeholder(arg) {
            Some(label) => args.push(resolve_input(unit, &spec.name, label)?),
            None => args.push(arg.clone()),
        }
    }
    args.extend(cmd_line_args.iter().cloned());

    let request = SubprocessRequest {
        item: spec.name.clone(),
        program: tool_spec.program.clone(),
        args,
        work_dir: work_dir.clone(),
        envs: vec![],
        timeout_secs: ctx.settings.subprocess_timeout_secs,
    };

    let output = match subprocess::run(&request, &ctx.cancel).await {
        Ok(output) => output,
        Err(e) => {
            discard_partial_outputs(&work_dir);
            return Err(e);
        }
    };
    if output.exit_code != 0 {
        warn!(item = %spec.name, code = output.exit_code, "Tool failed");
        discard_partial_outputs(&work_dir);
        return Err(SpindleError::ToolExited {
            item: spec.name.clone(),
            code: output.exit_code,
        });
    }

    archive_log(&work_dir, &output.stdout, &output.stderr)?;

    let mut produced = Vec::new();
    for label in &tool_spec.output_files {
        produced.extend(collect_output(&work_dir, &spec.name, label));
    }
    debug!(item = %spec.name, outputs = produced.len(), "Tool finished");

    let mut diagnostics = Vec::new();
    if !output.stderr.trim().is_empty() {
        diagnostics.push(output.stderr.trim().to_string());
    }
    Ok(ItemOutput {
        produced,
        diagnostics,
    })
}

fn resolve_input(unit: &ExecutionUnit, item: &str, label: &str) -> Result<String> {
    let resource = unit
        .resources_from_predecessors
        .iter()
        .find(|r| r.label == label)
        .ok_or_else(|| SpindleError::UnreachableResource {
            item: item.to_string(),
            label: label.to_string(),
        })?;
    if resource.is_database() {
        return Ok(resource.url.clone());
    }
    let path = resource.path().ok_or_else(|| SpindleError::FileNotFound {
        label: label.to_string(),
        path: resource.url.clone(),
    })?;
    if resource.is_actual_file() && !path.exists() {
        return Err(SpindleError::FileNotFound {
            label: label.to_string(),
            path: path.display().to_string(),
        });
    }
    Ok(path.display().to_string())
}

/// Concrete files behind one declared output label: the file itself, or for
/// glob labels every work-directory entry the pattern matches.
fn collect_output(work_dir: &Path, item: &str, label: &str) -> Vec<Resource> {
    if !label.contains('*') {
        let path = work_dir.join(label);
        if path.exists() {
            return vec![Resource::file(item, label, path.display().to_string())];
        }
        return vec![];
    }
    let pattern = Resource::file_pattern(item, label, work_dir.join(label).display().to_string());
    let Ok(entries) = std::fs::read_dir(work_dir) else {
        return vec![];
    };
    let mut matched = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let candidate = Resource::file(
            item,
            entry.file_name().to_string_lossy().into_owned(),
            path.display().to_string(),
        );
        if candidate.matches(&pattern) {
            matched.push(candidate);
        }
    }
    matched.sort_by(|a, b| a.label.cmp(&b.label));
    matched
}

fn archive_log(work_dir: &Path, stdout: &str, stderr: &str) -> Result<()> {
    let mut body = format!("# {}\n", chrono::Utc::now().to_rfc3339());
    if !stdout.is_empty() {
        body.push_str(stdout);
    }
    if !stderr.is_empty() {
        if !body.is_empty() {
            body.push('\n');
        }
        body.push_str("STDERR:\n");
        body.push_str(stderr);
    }
    std::fs::write(work_dir.join("execution.log"), body)?;
    Ok(())
}

fn discard_partial_outputs(work_dir: &Path) {
    if let Err(e) = std::fs::remove_dir_all(work_dir) {
        warn!(path = %work_dir.display(), error = %e, "Could not discard partial outputs");
    }
}
