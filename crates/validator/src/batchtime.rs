//! Batch-time validation: cron syntax and interval/cron exclusivity.

use crate::ValidationError;
use trellis_config::{BuildVariant, Project};

/// Known `@` shorthands accepted in place of a five-field expression.
const CRON_SHORTHANDS: &[&str] = &[
    "@yearly",
    "@annually",
    "@monthly",
    "@weekly",
    "@daily",
    "@midnight",
    "@hourly",
];

const MONTH_NAMES: &[&str] = &[
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];

const DAY_NAMES: &[&str] = &["sun", "mon", "tue", "wed", "thu", "fri", "sat"];

/// A cron expression the scheduler cannot interpret.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CronError {
    /// The expression is not five whitespace-separated fields.
    #[error("expected 5 fields, found {0}")]
    WrongFieldCount(usize),
    /// An unrecognized `@` shorthand.
    #[error("unknown shorthand '{0}'")]
    UnknownShorthand(String),
    /// A field value outside its range or malformed.
    #[error("invalid value '{value}' in the {field} field")]
    InvalidField {
        /// Which of the five fields failed.
        field: &'static str,
        /// The offending item.
        value: String,
    },
}

/// Validate a cron expression without computing occurrences.
///
/// Accepts the standard five fields (minute, hour, day of month, month,
/// day of week) with `*`, lists, ranges, and steps, plus the `@hourly`
/// style shorthands.
///
/// # Errors
///
/// Returns a [`CronError`] describing the first malformed field.
pub fn validate_cron(expression: &str) -> Result<(), CronError> {
    let expression = expression.trim();
    if let Some(shorthand) = expression.strip_prefix('@') {
        return if CRON_SHORTHANDS.contains(&format!("@{shorthand}").as_str()) {
            Ok(())
        } else {
            Err(CronError::UnknownShorthand(format!("@{shorthand}")))
        };
    }

    let fields: Vec<&str> = expression.split_whitespace().collect();
    if fields.len() != 5 {
        return Err(CronError::WrongFieldCount(fields.len()));
    }
    validate_field(fields[0], "minute", 0, 59, &[])?;
    validate_field(fields[1], "hour", 0, 23, &[])?;
    validate_field(fields[2], "day of month", 1, 31, &[])?;
    validate_field(fields[3], "month", 1, 12, MONTH_NAMES)?;
    validate_field(fields[4], "day of week", 0, 7, DAY_NAMES)?;
    Ok(())
}

fn validate_field(
    field: &str,
    name: &'static str,
    min: u32,
    max: u32,
    names: &[&str],
) -> Result<(), CronError> {
    for item in field.split(',') {
        let (range, step) = match item.split_once('/') {
            Some((range, step)) => (range, Some(step)),
            None => (item, None),
        };
        if let Some(step) = step {
            if step.parse::<u32>().map_or(true, |s| s == 0) {
                return Err(CronError::InvalidField {
                    field: name,
                    value: item.to_string(),
                });
            }
        }
        if range == "*" {
            continue;
        }
        let valid = match range.split_once('-') {
            Some((lo, hi)) => {
                let lo = parse_bound(lo, min, max, names);
                let hi = parse_bound(hi, min, max, names);
                matches!((lo, hi), (Some(lo), Some(hi)) if lo <= hi)
            }
            None => parse_bound(range, min, max, names).is_some(),
        };
        if !valid {
            return Err(CronError::InvalidField {
                field: name,
                value: item.to_string(),
            });
        }
    }
    Ok(())
}

fn parse_bound(value: &str, min: u32, max: u32, names: &[&str]) -> Option<u32> {
    if let Ok(n) = value.parse::<u32>() {
        return (n >= min && n <= max).then_some(n);
    }
    let lowered = value.to_ascii_lowercase();
    names
        .iter()
        .position(|n| *n == lowered)
        .map(|i| u32::try_from(i).unwrap_or(0) + min)
}

/// Cron and fixed-interval batch time are mutually exclusive, on tasks
/// and on variants; a cron expression must also parse.
pub(crate) fn validate_batch_times(project: &Project) -> Vec<ValidationError> {
    let mut errs = Vec::new();
    for bv in &project.build_variants {
        for task in &bv.tasks {
            let Some(cron) = &task.cron_batchtime else {
                continue;
            };
            if task.batchtime.is_some() {
                errs.push(ValidationError::error(format!(
                    "task '{}' cannot specify cron and batchtime for variant '{}'",
                    task.name, bv.name
                )));
            }
            if let Err(err) = validate_cron(cron) {
                errs.push(ValidationError::error(format!(
                    "task cron batchtime '{cron}' has invalid syntax for task '{}' for build \
                     variant '{}': {err}",
                    task.name, bv.name
                )));
            }
        }

        let Some(cron) = &bv.cron_batchtime else {
            continue;
        };
        if bv.batchtime.is_some() {
            errs.push(ValidationError::error(format!(
                "variant '{}' cannot specify cron and batchtime",
                bv.name
            )));
        }
        if let Err(err) = validate_cron(cron) {
            errs.push(ValidationError::error(format!(
                "cron batchtime '{cron}' has invalid syntax: {err}"
            )));
        }
    }
    errs
}

/// Setting `activate: true` alongside any batch time is contradictory;
/// the batch time wins at runtime, so warn.
pub(crate) fn check_batch_times(bv: &BuildVariant) -> Vec<ValidationError> {
    let mut errs = Vec::new();
    for task in &bv.tasks {
        if task.activate == Some(true)
            && (task.cron_batchtime.is_some() || task.batchtime.is_some())
        {
            errs.push(ValidationError::warning(format!(
                "task '{}' for variant '{}' activation ignored since batchtime specified",
                task.name, bv.name
            )));
        }
    }
    if bv.activate == Some(true) && (bv.cron_batchtime.is_some() || bv.batchtime.is_some()) {
        errs.push(ValidationError::warning(format!(
            "variant '{}' activation ignored since batchtime specified",
            bv.name
        )));
    }
    errs
}
