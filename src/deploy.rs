use crate::config::{load_stack_file, DeployConfig};
use crate::env::{parse_overrides, EnvironmentOverride};
use crate::error::{DeployError, Result};
use crate::portainer::{CreateStackRequest, PortainerApi, UpdateStackRequest};
use crate::report::Reporter;
use std::time::Instant;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    LoadStackFile,
    Authenticate,
    FindStack,
    ResolveEndpoint,
    ResolveCluster,
    CreateStack,
    UpdateStack,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointSource {
    /// Pinned by the stack that already exists under this name.
    ExistingStack,
    /// Passed by the operator.
    Explicit,
    /// The only endpoint Portainer knows about.
    Discovered,
}

/// Progress of a deployment, in the order it happens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Overrides(Vec<EnvironmentOverride>),
    Started(Step),
    StackFileLoaded { bytes: usize },
    Authenticated,
    StackFound { id: u64, endpoint_id: u64 },
    StackNotFound,
    EndpointSelected { id: u64, source: EndpointSource },
    ClusterResolved { id: String },
    StackCreated,
    StackUpdated,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Created { endpoint_id: u64, cluster_id: String },
    Updated { stack_id: u64, endpoint_id: u64 },
}

/// Converges the named stack to the given stack file: update it if a stack
/// with that name exists, create it otherwise. Stops at the first failure.
pub fn run(
    config: &DeployConfig,
    api: &dyn PortainerApi,
    reporter: &mut dyn Reporter,
) -> Result<Outcome> {
    let start = Instant::now();

    let env = parse_overrides(&config.env_vars)?;
    reporter.report(&Event::Overrides(env.clone()));

    // Local inputs are checked before the first network round trip.
    reporter.report(&Event::Started(Step::LoadStackFile));
    let stack_file_content = load_stack_file(&config.stack_file)?;
    reporter.report(&Event::StackFileLoaded {
        bytes: stack_file_content.len(),
    });

    reporter.report(&Event::Started(Step::Authenticate));
    let token = api.authenticate(&config.credentials)?;
    reporter.report(&Event::Authenticated);

    reporter.report(&Event::Started(Step::FindStack));
    let existing = api
        .list_stacks(&token)?
        .into_iter()
        .find(|stack| stack.name == config.stack_name);
    match &existing {
        Some(stack) => reporter.report(&Event::StackFound {
            id: stack.id,
            endpoint_id: stack.endpoint_id,
        }),
        None => reporter.report(&Event::StackNotFound),
    }

    let (endpoint_id, source) = match (&existing, config.endpoint_id) {
        (Some(stack), _) => (stack.endpoint_id, EndpointSource::ExistingStack),
        (None, Some(id)) => (id, EndpointSource::Explicit),
        (None, None) => {
            reporter.report(&Event::Started(Step::ResolveEndpoint));
            let endpoints = api.list_endpoints(&token)?;
            match endpoints.as_slice() {
                [only] => (only.id, EndpointSource::Discovered),
                _ => {
                    return Err(DeployError::AmbiguousEndpoint {
                        count: endpoints.len(),
                    })
                }
            }
        }
    };
    reporter.report(&Event::EndpointSelected {
        id: endpoint_id,
        source,
    });

    let outcome = match existing {
        Some(stack) => {
            reporter.report(&Event::Started(Step::UpdateStack));
            let request = UpdateStackRequest {
                env,
                prune: false,
                stack_file_content,
            };
            api.update_stack(&token, stack.id, endpoint_id, &request)?;
            reporter.report(&Event::StackUpdated);
            Outcome::Updated {
                stack_id: stack.id,
                endpoint_id,
            }
        }
        None => {
            reporter.report(&Event::Started(Step::ResolveCluster));
            let cluster = api.swarm_cluster(&token, endpoint_id)?;
            reporter.report(&Event::ClusterResolved {
                id: cluster.id.clone(),
            });

            reporter.report(&Event::Started(Step::CreateStack));
            let request = CreateStackRequest {
                env,
                name: config.stack_name.clone(),
                stack_file_content,
                swarm_id: cluster.id.clone(),
            };
            api.create_stack(&token, endpoint_id, &request)?;
            reporter.report(&Event::StackCreated);
            Outcome::Created {
                endpoint_id,
                cluster_id: cluster.id,
            }
        }
    };

    info!(
        stack = %config.stack_name,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "deployment finished"
    );
    Ok(outcome)
}
