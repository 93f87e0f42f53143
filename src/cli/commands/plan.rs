//! Plan command implementation.
//!
//! The `agentflow plan` command prints the waves a run would execute
//! without running any step.

use serde_json::{json, Value};

use crate::cli::args::PlanArgs;
use crate::config::{validate, OrchestrationConfig};
use crate::error::Result;
use crate::runner::{step_fn, ExecutionPlan, Orchestrator};

use super::dispatcher::{Command, CommandContext, CommandResult};

/// The plan command implementation.
pub struct PlanCommand {
    args: PlanArgs,
}

impl PlanCommand {
    /// Create a new plan command.
    pub fn new(args: PlanArgs) -> Self {
        Self { args }
    }
}

/// Build the plan for `config` with placeholder step bodies.
pub fn plan_for(config: OrchestrationConfig) -> Result<ExecutionPlan> {
    let mut builder = Orchestrator::builder();
    for id in config.step_ids() {
        builder = builder.step(id, step_fn(|_| async { Ok(Value::Null) }));
    }
    let orchestrator = builder.config(config).build()?;
    Ok(orchestrator.plan().clone())
}

/// JSON form of a plan.
pub fn plan_json(plan: &ExecutionPlan) -> Value {
    let waves: Vec<Value> = plan
        .waves()
        .iter()
        .map(|wave| {
            let groups: Vec<Value> = wave
                .groups()
                .iter()
                .map(|group| {
                    let steps: Vec<Value> = group
                        .steps()
                        .iter()
                        .map(|id| {
                            let step = plan.step(id);
                            json!({
                                "id": id,
                                "priority": step.map_or(0, |s| s.priority()),
                                "enabled": step.map_or(true, |s| s.is_enabled()),
                            })
                        })
                        .collect();
                    json!({ "group": group.tag(), "steps": steps })
                })
                .collect();
            json!({ "wave": wave.index(), "groups": groups })
        })
        .collect();

    json!({ "steps": plan.len(), "waves": waves })
}

#[async_trait::async_trait]
impl Command for PlanCommand {
    async fn execute(&self, ctx: &CommandContext) -> Result<CommandResult> {
        let (_, config) = ctx.load_config()?;
        let warnings = validate(&config)?;
        let renderer = ctx.renderer();
        if !warnings.is_empty() && !ctx.quiet {
            eprint!("{}", renderer.issues(&warnings));
        }

        let plan = plan_for(config)?;
        if self.args.json {
            let text = serde_json::to_string_pretty(&plan_json(&plan))
                .map_err(anyhow::Error::from)?;
            println!("{}", text);
        } else {
            print!("{}", renderer.plan(&plan));
        }

        Ok(CommandResult::success())
    }
}
