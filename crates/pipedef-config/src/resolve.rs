//! Turning a merged job mapping into a typed [`ResolvedJob`].

use crate::value::{kind_of, name_list, optional_string, scalar_string, string_list};
use crate::{ConfigError, ConfigResult};
use indexmap::IndexMap;
use pipedef_core::{PublishTarget, ResolvedJob, Step, Trait};
use serde_json::{Map, Value};

/// Build a resolved job from its fully merged mapping.
pub(crate) fn build_job(name: &str, merged: Map<String, Value>) -> ConfigResult<ResolvedJob> {
    let mut job = ResolvedJob {
        name: name.to_string(),
        steps: IndexMap::new(),
        traits: IndexMap::new(),
        settings: Map::new(),
    };

    for (key, value) in merged {
        let field = format!("jobs.{}.{}", name, key);
        match key.as_str() {
            "steps" => {
                for (step_name, params) in entries(value, &field)? {
                    let step = parse_step(&field, &step_name, params)?;
                    job.steps.insert(step_name, step);
                }
            }
            "traits" => {
                for (trait_name, params) in entries(value, &field)? {
                    let params = enabled_params(params, &format!("{}.{}", field, trait_name))?;
                    job.traits
                        .insert(trait_name.clone(), Trait::new(trait_name, params));
                }
            }
            _ => {
                job.settings.insert(key, value);
            }
        }
    }

    Ok(job)
}

fn entries(value: Value, field: &str) -> ConfigResult<Map<String, Value>> {
    match value {
        Value::Null => Ok(Map::new()),
        Value::Object(map) => Ok(map),
        other => Err(ConfigError::invalid(
            field,
            format!("expected a mapping, found {}", kind_of(&other)),
        )),
    }
}

/// Step and trait values are either `~` (enabled with defaults) or a mapping.
fn enabled_params(params: Value, field: &str) -> ConfigResult<Value> {
    match params {
        Value::Null | Value::Object(_) => Ok(params),
        other => Err(ConfigError::invalid(
            field,
            format!("expected a mapping or ~, found {}", kind_of(&other)),
        )),
    }
}

fn parse_step(steps_field: &str, name: &str, params: Value) -> ConfigResult<Step> {
    let field = format!("{}.{}", steps_field, name);
    let params = enabled_params(params, &field)?;

    let mut step = Step::with_defaults(name);
    let Value::Object(map) = &params else {
        return Ok(step);
    };
    let sub = |key: &str| format!("{}.{}", field, key);

    step.trait_depends = string_list(map.get("trait_depends"), &sub("trait_depends"))?;
    step.depends = string_list(map.get("depends"), &sub("depends"))?;

    match map.get("inputs") {
        None | Some(Value::Null) => {}
        Some(Value::Object(inputs)) => {
            for (input, value) in inputs {
                let input_field = format!("{}.{}", sub("inputs"), input);
                if input == "steps" {
                    step.input_steps = name_list(Some(value), &input_field)?;
                } else {
                    step.inputs
                        .insert(input.clone(), scalar_string(value, &input_field)?);
                }
            }
        }
        Some(other) => {
            return Err(ConfigError::invalid(
                sub("inputs"),
                format!("expected a mapping, found {}", kind_of(other)),
            ));
        }
    }

    step.output_dir = optional_string(map.get("output_dir"), &sub("output_dir"))?;
    step.image = optional_string(map.get("image"), &sub("image"))?;
    step.registry = optional_string(map.get("registry"), &sub("registry"))?;
    step.publish_to = parse_publish_to(map.get("publish_to"), &sub("publish_to"))?;

    match map.get("execute") {
        None | Some(Value::Null) => {}
        Some(Value::Array(argv)) => {
            step.execute = argv
                .iter()
                .enumerate()
                .map(|(i, arg)| scalar_string(arg, &format!("{}[{}]", sub("execute"), i)))
                .collect::<ConfigResult<_>>()?;
        }
        Some(other) => step.execute = vec![scalar_string(other, &sub("execute"))?],
    }

    if let Some(mode) = optional_string(map.get("privilege_mode"), &sub("privilege_mode"))? {
        step.privilege_mode = mode
            .parse()
            .map_err(|message: String| ConfigError::invalid(sub("privilege_mode"), message))?;
    }

    step.params = params;
    Ok(step)
}

/// `publish_to` is either a list of repository names or a mapping of
/// repository name to options.
fn parse_publish_to(
    value: Option<&Value>,
    field: &str,
) -> ConfigResult<IndexMap<String, PublishTarget>> {
    match value {
        Some(Value::Object(targets)) => targets
            .iter()
            .map(|(repo, options)| {
                let target = match options {
                    Value::Null => PublishTarget::default(),
                    Value::Object(_) => serde_json::from_value(options.clone()).map_err(|e| {
                        ConfigError::invalid(format!("{}.{}", field, repo), e.to_string())
                    })?,
                    other => {
                        return Err(ConfigError::invalid(
                            format!("{}.{}", field, repo),
                            format!("expected a mapping or ~, found {}", kind_of(other)),
                        ));
                    }
                };
                Ok((repo.clone(), target))
            })
            .collect(),
        other => Ok(string_list(other, field)?
            .into_iter()
            .map(|repo| (repo, PublishTarget::default()))
            .collect()),
    }
}
