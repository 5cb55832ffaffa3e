//! Node drain: cordon, select evictable pods, evict them in order.
//!
//! The individual steps are delegated to the backend's [`NodeDrainer`]; this
//! module sequences them and builds the human-readable transcript returned to
//! the caller. The first failing stage aborts the drain.

use std::time::Instant;

use tracing::{info, warn};

use crate::backend::{DrainOptions, NodeDrainer};
use crate::engine::DescribeEngine;
use crate::error::{BackendError, DescribeError, DrainError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrainRequest {
    pub node: String,
    pub context: String,
    pub options: DrainOptions,
}

struct Transcript {
    lines: Vec<String>,
    suffix: &'static str,
}

impl Transcript {
    fn new(dry_run: bool) -> Self {
        Self {
            lines: Vec::new(),
            suffix: if dry_run { " (server dry run)" } else { "" },
        }
    }

    fn step(&mut self, line: String) {
        self.lines.push(format!("{line}{}", self.suffix));
    }

    fn note(&mut self, line: String) {
        self.lines.push(line);
    }

    fn finish(mut self, node: &str) -> String {
        self.lines.push(format!("Node {node} drained successfully"));
        self.lines.join("\n")
    }
}

pub(crate) fn run(engine: &DescribeEngine, request: &DrainRequest) -> Result<String, DrainError> {
    let connection = engine
        .connection(&request.context)
        .map_err(|err| match err {
            DescribeError::Connection { context, source } => {
                DrainError::Connection { context, source }
            }
            other => DrainError::Connection {
                context: request.context.clone(),
                source: BackendError::new(other.to_string()),
            },
        })?;
    let drainer: &dyn NodeDrainer = engine.backend().drainer().ok_or(DrainError::Unsupported)?;

    let node = request.node.as_str();
    let options = &request.options;
    let mut transcript = Transcript::new(options.dry_run);
    let started = Instant::now();

    let newly_cordoned = drainer
        .cordon(&connection, node, options.dry_run)
        .map_err(DrainError::Cordon)?;
    if newly_cordoned {
        transcript.step(format!("node/{node} cordoned"));
    } else {
        transcript.note(format!("node/{node} already cordoned"));
    }

    let plan = drainer
        .pods_for_deletion(&connection, node, options)
        .map_err(|errors| {
            DrainError::PreFlight(errors.iter().map(|e| e.message().to_string()).collect())
        })?;
    for warning in &plan.warnings {
        transcript.note(format!("Warning: {warning}"));
    }

    for pod in &plan.pods {
        if options.timeout_seconds > 0 && started.elapsed().as_secs() >= options.timeout_seconds {
            warn!(node, timeout_seconds = options.timeout_seconds, "Node drain timed out");
            return Err(DrainError::Timeout(options.timeout_seconds));
        }
        transcript.note(format!("evicting pod {}/{}", pod.namespace, pod.name));
        drainer
            .evict_pod(&connection, pod, options)
            .map_err(|source| DrainError::Evict {
                pod: format!("{}/{}", pod.namespace, pod.name),
                source,
            })?;
        transcript.step(format!("pod/{} evicted", pod.name));
    }

    info!(
        node,
        context = %request.context,
        pods = plan.pods.len(),
        dry_run = options.dry_run,
        "Node drained"
    );
    Ok(transcript.finish(node))
}
