//! Scaling simulation command.

use std::time::Duration;

use anyhow::Result;
use clap::Args;
use fisdemo_descriptor::Deployment;
use fisdemo_reconcile::{ScalingActivity, ScalingSimulator};
use serde::Serialize;
use tabled::Tabled;

use crate::error::CliError;
use crate::output::{print_info, print_output, print_single, print_warning, yes_no, OutputFormat};

use super::CommandContext;

/// Feed a constant CPU load to the service's target-tracking policy.
#[derive(Debug, Args)]
pub struct SimulateScalingCommand {
    /// Average CPU utilization of the service, in percent.
    #[arg(long)]
    cpu: f64,

    /// Length of the simulated window.
    #[arg(long, default_value_t = 600)]
    duration_secs: u64,

    /// Interval between utilization samples.
    #[arg(long, default_value_t = 60)]
    step_secs: u64,

    /// Starting task count. Defaults to the service's desired count.
    #[arg(long)]
    start: Option<u32>,
}

#[derive(Debug, Serialize, Tabled)]
struct ActivityRow {
    #[tabled(rename = "At (s)")]
    at_secs: u64,
    #[tabled(rename = "Activity")]
    direction: String,
    #[tabled(rename = "From")]
    from: u32,
    #[tabled(rename = "To")]
    to: u32,
    #[tabled(rename = "Placeable")]
    placeable: String,
}

#[derive(Debug, Serialize)]
struct SimulationView {
    cpu_percent: f64,
    initial: u32,
    final_count: u32,
    activities: Vec<ScalingActivity>,
    unplaceable_counts: Vec<u32>,
}

impl SimulateScalingCommand {
    fn simulate(&self, deployment: &Deployment) -> Result<SimulationView> {
        if self.step_secs == 0 {
            return Err(CliError::InvalidArgument("--step-secs must be positive".into()).into());
        }
        if !self.cpu.is_finite() || self.cpu < 0.0 {
            return Err(CliError::InvalidArgument(format!(
                "--cpu must be a non-negative percentage, got {}",
                self.cpu
            ))
            .into());
        }

        let initial = self.start.unwrap_or(deployment.service.desired_count);
        let mut simulator = ScalingSimulator::new(
            deployment.service.bounds()?,
            deployment.service.scaling_policy.tracking()?,
            initial,
        )?;
        let activities = simulator.run_constant_load(
            self.cpu,
            Duration::from_secs(self.duration_secs),
            Duration::from_secs(self.step_secs),
        );

        let mut unplaceable_counts: Vec<u32> = activities
            .iter()
            .map(|a| a.to)
            .filter(|count| deployment.place(*count).is_err())
            .collect();
        unplaceable_counts.dedup();

        Ok(SimulationView {
            cpu_percent: self.cpu,
            initial,
            final_count: simulator.current(),
            activities,
            unplaceable_counts,
        })
    }

    pub fn run(self, ctx: CommandContext) -> Result<()> {
        let deployment = ctx.deployment()?;
        let view = self.simulate(&deployment)?;

        match ctx.format {
            OutputFormat::Json => print_single(&view),
            OutputFormat::Table => {
                let rows: Vec<ActivityRow> = view
                    .activities
                    .iter()
                    .map(|a| ActivityRow {
                        at_secs: a.at.as_secs(),
                        direction: a.direction.to_string(),
                        from: a.from,
                        to: a.to,
                        placeable: yes_no(!view.unplaceable_counts.contains(&a.to)),
                    })
                    .collect();
                print_output(&rows, OutputFormat::Table);
                print_info(&format!(
                    "{} -> {} tasks at {}% CPU",
                    view.initial, view.final_count, view.cpu_percent
                ));
                for count in &view.unplaceable_counts {
                    print_warning(&format!(
                        "{count} tasks do not fit on the fixed pool; the extra tasks stay pending"
                    ));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fisdemo_descriptor::DeploymentConfig;
    use fisdemo_reconcile::ScalingDirection;

    fn command(cpu: f64, start: Option<u32>) -> SimulateScalingCommand {
        SimulateScalingCommand {
            cpu,
            duration_secs: 600,
            step_secs: 60,
            start,
        }
    }

    fn deployment() -> Deployment {
        Deployment::build(&DeploymentConfig::default()).unwrap()
    }

    #[test]
    fn sustained_high_load_reaches_max_but_cannot_place_it() {
        let view = command(90.0, None).simulate(&deployment()).unwrap();

        assert_eq!(view.initial, 2);
        assert_eq!(view.final_count, 4);
        assert!(view
            .activities
            .iter()
            .all(|a| a.direction == ScalingDirection::Out));
        assert_eq!(view.unplaceable_counts, [4]);
    }

    #[test]
    fn sustained_low_load_returns_to_min() {
        let view = command(5.0, Some(4)).simulate(&deployment()).unwrap();

        assert_eq!(view.final_count, 2);
        assert!(view.unplaceable_counts.is_empty());
    }

    #[test]
    fn start_outside_bounds_is_rejected() {
        assert!(command(50.0, Some(9)).simulate(&deployment()).is_err());
    }

    #[test]
    fn zero_step_is_rejected() {
        let mut cmd = command(50.0, None);
        cmd.step_secs = 0;
        let err = cmd.simulate(&deployment()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CliError>(),
            Some(CliError::InvalidArgument(_))
        ));
    }
}
