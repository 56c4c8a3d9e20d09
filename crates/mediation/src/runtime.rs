//! Flow Runtime Controller: run/stop and deploy/undeploy status per flow.
//!
//! ```text
//! stopped --run()--> running --stop()--> stopped
//! ```
//!
//! Running and deployed are independent flags, and neither is tied to which
//! node version holds the activation slot. Every transition is idempotent.

use crate::state::{Mutation, Record};
use crate::{Flow, FlowId, FlowStatus, MediationError, MediationService, Timestamp};

/// Which runtime flag a transition changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transition {
    Run,
    Stop,
    Deploy,
    Undeploy,
}

impl Transition {
    fn needs_validation(self) -> bool {
        matches!(self, Transition::Run | Transition::Deploy)
    }

    /// Applies the transition; returns `false` when it was already in effect.
    fn apply(self, flow: &mut Flow) -> bool {
        let (flag, target) = match self {
            Transition::Run => (&mut flow.is_running, true),
            Transition::Stop => (&mut flow.is_running, false),
            Transition::Deploy => (&mut flow.is_deployed, true),
            Transition::Undeploy => (&mut flow.is_deployed, false),
        };
        if *flag == target {
            return false;
        }
        *flag = target;
        true
    }
}

impl MediationService {
    pub async fn flow_status(&self, flow_id: FlowId) -> Result<FlowStatus, MediationError> {
        self.read(|state| state.require_flow(flow_id).map(Flow::status))
            .await
    }

    /// Starts the flow. Fails with a precondition error listing the blocking
    /// issues if validation does not pass.
    #[tracing::instrument(skip(self))]
    pub async fn run_flow(&self, flow_id: FlowId) -> Result<FlowStatus, MediationError> {
        let _guard = self.flow_locks.lock(flow_id).await;
        self.transition(flow_id, Transition::Run).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn stop_flow(&self, flow_id: FlowId) -> Result<FlowStatus, MediationError> {
        let _guard = self.flow_locks.lock(flow_id).await;
        self.transition(flow_id, Transition::Stop).await
    }

    /// Stops then runs the flow inside one critical section, so nobody sees
    /// the flow running and stopped at once. The stop is committed first: if
    /// the run fails, the flow stays stopped.
    #[tracing::instrument(skip(self))]
    pub async fn restart_flow(&self, flow_id: FlowId) -> Result<FlowStatus, MediationError> {
        let _guard = self.flow_locks.lock(flow_id).await;
        self.transition(flow_id, Transition::Stop).await?;
        self.transition(flow_id, Transition::Run).await
    }

    /// Marks the flow deployed. Requires a clean validation like `run`.
    #[tracing::instrument(skip(self))]
    pub async fn deploy_flow(&self, flow_id: FlowId) -> Result<FlowStatus, MediationError> {
        let _guard = self.flow_locks.lock(flow_id).await;
        self.transition(flow_id, Transition::Deploy).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn undeploy_flow(&self, flow_id: FlowId) -> Result<FlowStatus, MediationError> {
        let _guard = self.flow_locks.lock(flow_id).await;
        self.transition(flow_id, Transition::Undeploy).await
    }

    /// Caller holds the flow lock.
    async fn transition(
        &self,
        flow_id: FlowId,
        transition: Transition,
    ) -> Result<FlowStatus, MediationError> {
        let planned = self
            .read(|state| {
                let mut flow = state.require_flow(flow_id)?.clone();
                if !transition.apply(&mut flow) {
                    return Ok(None);
                }
                let issues = if transition.needs_validation() {
                    state.flow_issues(&flow)
                } else {
                    Vec::new()
                };
                Ok::<_, MediationError>(Some((flow, issues)))
            })
            .await?;
        let Some((mut flow, issues)) = planned else {
            return self.flow_status(flow_id).await;
        };

        let blocking: Vec<_> = issues.into_iter().filter(|i| i.is_blocking()).collect();
        if !blocking.is_empty() {
            tracing::warn!(%flow_id, ?transition, blocking = blocking.len(), "Flow failed validation");
            return Err(MediationError::Precondition {
                flow: flow_id,
                issues: blocking,
            });
        }

        flow.updated_at = Timestamp::now();
        let status = flow.status();
        self.commit(vec![Mutation::Put(Record::Flow(flow))]).await?;
        tracing::info!(
            %flow_id,
            ?transition,
            running = status.is_running,
            deployed = status.is_deployed,
            "Flow status changed"
        );
        Ok(status)
    }
}
