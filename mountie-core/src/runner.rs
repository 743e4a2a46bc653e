use crate::config::MountResource;
use crate::engine::ConvergenceEngine;
use crate::report::ConvergenceResult;
use anyhow::{Context, Result};
use mountie_hal::{MountBackend, MountProbe};

/// Converges a list of mount resources one action at a time.
///
/// The probe runs again before every action so each decision sees the
/// effect of the previous one. The first failure stops the run.
pub struct Runner<'a, B, P> {
    engine: &'a ConvergenceEngine<B>,
    probe: &'a P,
    dry_run: bool,
}

impl<'a, B, P> Runner<'a, B, P>
where
    B: MountBackend,
    P: MountProbe,
{
    pub fn new(engine: &'a ConvergenceEngine<B>, probe: &'a P, dry_run: bool) -> Self {
        Self {
            engine,
            probe,
            dry_run,
        }
    }

    pub fn apply(&self, resources: &[MountResource]) -> Result<Vec<ConvergenceResult>> {
        let mut results = Vec::new();
        for resource in resources {
            let mount_point = resource.spec.mount_point.display();
            for &action in &resource.actions {
                let current = self
                    .probe
                    .current_state(&resource.spec)
                    .with_context(|| format!("Failed to probe {mount_point}"))?;
                let result = self
                    .engine
                    .converge(action, &resource.spec, &current, self.dry_run)
                    .with_context(|| format!("Failed to {action} {mount_point}"))?;
                results.push(result);
            }
        }
        Ok(results)
    }
}
