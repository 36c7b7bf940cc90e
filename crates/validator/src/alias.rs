//! Alias coverage analysis.
//!
//! Every alias should route at least one task somewhere; an alias that
//! matches nothing is a likely authoring mistake but never an error,
//! since the configuration may grow into it.

use crate::ValidationError;
use trellis_config::{Project, ProjectAlias};

/// Check that every alias matches at least one variant and, within
/// matching variants, at least one task.
///
/// The two failure modes get distinct messages: "has no matching
/// variants" points at the variant criteria, "has no matching tasks" at
/// the task criteria. A malformed selector regex degrades the whole check
/// to a single warning rather than aborting the pass.
pub(crate) fn validate_alias_coverage(
    project: &Project,
    aliases: &[ProjectAlias],
) -> Vec<ValidationError> {
    match alias_coverage(project, aliases) {
        Ok(coverage) => construct_alias_warnings(aliases, &coverage),
        Err(_) => vec![ValidationError::warning(
            "error checking alias coverage, continuing without validation",
        )],
    }
}

struct Coverage {
    needs_variant: Vec<bool>,
    needs_task: Vec<bool>,
}

fn alias_coverage(project: &Project, aliases: &[ProjectAlias]) -> Result<Coverage, regex::Error> {
    let mut needs_variant = vec![true; aliases.len()];
    let mut needs_task = vec![true; aliases.len()];

    for bv in &project.build_variants {
        for (i, alias) in aliases.iter().enumerate() {
            if !needs_variant[i] && !needs_task[i] {
                continue;
            }
            if !alias.has_matching_variant(&bv.name, &bv.tags)? {
                continue;
            }
            needs_variant[i] = false;
            for entry in &bv.tasks {
                let Some((name, tags)) = project.task_name_and_tags(entry) else {
                    // Dangling reference; the structural validators report it.
                    continue;
                };
                if project.find_task_group(name).is_some()
                    && alias_matches_task_group_member(project, alias, name)?
                {
                    needs_task[i] = false;
                    break;
                }
                if alias.has_matching_task(name, tags)? {
                    needs_task[i] = false;
                    break;
                }
            }
        }
    }
    Ok(Coverage {
        needs_variant,
        needs_task,
    })
}

fn alias_matches_task_group_member(
    project: &Project,
    alias: &ProjectAlias,
    group_name: &str,
) -> Result<bool, regex::Error> {
    let Some(group) = project.find_task_group(group_name) else {
        return Ok(false);
    };
    for member in &group.tasks {
        let Some(task) = project.find_task(member) else {
            continue;
        };
        if alias.has_matching_task(&task.name, &task.tags)? {
            return Ok(true);
        }
    }
    Ok(false)
}

fn construct_alias_warnings(aliases: &[ProjectAlias], coverage: &Coverage) -> Vec<ValidationError> {
    let mut messages = Vec::new();
    for (i, alias) in aliases.iter().enumerate() {
        let needs_variant = coverage.needs_variant[i];
        let needs_task = coverage.needs_task[i];
        if !needs_variant && !needs_task {
            continue;
        }

        let mut components = vec![alias.kind.label().to_string()];
        if alias.variant_tags.is_empty() {
            components.push(format!("matching variant regexp '{}'", alias.variant));
        } else {
            components.push(format!("matching variant tags '{:?}'", alias.variant_tags));
        }
        if needs_variant {
            components.push("has no matching variants".to_string());
        } else {
            if alias.task_tags.is_empty() {
                components.push(format!("and matching task regexp '{}'", alias.task));
            } else {
                components.push(format!("and matching task tags '{:?}'", alias.task_tags));
            }
            components.push("has no matching tasks".to_string());
        }
        messages.push(components.join(" "));
    }
    messages.sort();
    messages
        .into_iter()
        .map(ValidationError::warning)
        .collect()
}
