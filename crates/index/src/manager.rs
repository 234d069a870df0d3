use std::thread::sleep;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::error::{IndexError, Result};
use crate::{IndexDescription, IndexSpec, VectorIndex};

/// Bounds the wait on index lifecycle transitions.
#[derive(Debug, Clone, Copy)]
pub struct ReadinessPolicy {
    pub timeout: Duration,
    pub poll_interval: Duration,
    pub max_poll_interval: Duration,
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(120),
            poll_interval: Duration::from_secs(1),
            max_poll_interval: Duration::from_secs(10),
        }
    }
}

impl ReadinessPolicy {
    pub fn new(timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            timeout,
            poll_interval,
            max_poll_interval: poll_interval.max(Duration::from_secs(10)),
        }
    }

    fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.min(6);
        self.poll_interval
            .saturating_mul(factor)
            .min(self.max_poll_interval)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnsureOutcome {
    Existing,
    Created,
    Recreated,
}

/// Makes sure `spec.name` exists, is ready, and matches the configured shape.
///
/// With `recreate` the old index is dropped first and a fresh one is created.
/// Without it an existing index is left untouched.
pub fn ensure_index(
    index: &dyn VectorIndex,
    spec: &IndexSpec,
    recreate: bool,
    policy: &ReadinessPolicy,
) -> Result<EnsureOutcome> {
    let existing = index.describe(&spec.name)?;
    let outcome = match existing {
        Some(description) if !recreate => {
            check_shape(spec, &description)?;
            if !description.ready {
                wait_until_ready(index, &spec.name, policy)?;
            }
            return Ok(EnsureOutcome::Existing);
        }
        Some(_) => {
            info!(index = %spec.name, "deleting index before re-ingest");
            index.delete(&spec.name)?;
            wait_until_gone(index, &spec.name, policy)?;
            EnsureOutcome::Recreated
        }
        None => EnsureOutcome::Created,
    };
    info!(
        index = %spec.name,
        dimension = spec.dimension,
        metric = %spec.metric,
        "creating index"
    );
    index.create(spec)?;
    let ready = wait_until_ready(index, &spec.name, policy)?;
    check_shape(spec, &ready)?;
    Ok(outcome)
}

pub fn wait_until_ready(
    index: &dyn VectorIndex,
    name: &str,
    policy: &ReadinessPolicy,
) -> Result<IndexDescription> {
    let description = poll(name, policy, || {
        Ok(index.describe(name)?.filter(|description| description.ready))
    })?;
    info!(index = %name, "index ready");
    Ok(description)
}

fn wait_until_gone(index: &dyn VectorIndex, name: &str, policy: &ReadinessPolicy) -> Result<()> {
    poll(name, policy, || {
        Ok(match index.describe(name)? {
            Some(_) => None,
            None => Some(()),
        })
    })
}

fn poll<T>(
    name: &str,
    policy: &ReadinessPolicy,
    mut check: impl FnMut() -> Result<Option<T>>,
) -> Result<T> {
    let started = Instant::now();
    let mut attempt = 0u32;
    loop {
        if let Some(value) = check()? {
            return Ok(value);
        }
        let waited = started.elapsed();
        if waited >= policy.timeout {
            return Err(IndexError::NotReady {
                name: name.to_string(),
                waited,
            });
        }
        let delay = policy.delay(attempt).min(policy.timeout - waited);
        debug!(index = %name, attempt, ?delay, "index not ready yet");
        sleep(delay);
        attempt = attempt.saturating_add(1);
    }
}

fn check_shape(spec: &IndexSpec, description: &IndexDescription) -> Result<()> {
    if description.dimension != spec.dimension {
        return Err(IndexError::DimensionMismatch {
            name: spec.name.clone(),
            expected: spec.dimension,
            found: description.dimension,
        });
    }
    if description.metric != spec.metric {
        return Err(IndexError::MetricMismatch {
            name: spec.name.clone(),
            expected: spec.metric,
            found: description.metric,
        });
    }
    Ok(())
}
