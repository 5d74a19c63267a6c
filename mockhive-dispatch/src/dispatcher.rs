//! The command dispatcher: partition by node, deliver locally, broadcast the
//! rest, reconcile one result per target.
//!
//! Batch operations (Start/Stop/Status) fan out to every eligible peer and
//! merge answers first-wins; single-target operations (SyncApis/DeleteApis)
//! probe peers one at a time in directory order and stop at the first
//! non-null answer. In both shapes a target whose node has a live local
//! channel is always resolved locally, never through the broadcast path.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;

use mockhive_core::{
    AgentPush, AgentPushTarget, CommandBatch, CommandTarget, DispatchError, NodeId, Operation,
    ServiceId, StopPayload, TargetResult, MSG_AGENT_NOT_RUNNING, MSG_BROADCAST_IGNORED,
    MSG_CONTROLLER_NOT_FOUND, MSG_INSTANCE_NOT_STARTED,
};

use crate::config::ControllerConfig;
use crate::directory::PeerDirectory;
use crate::metrics::MetricsStore;
use crate::peer::PeerClient;
use crate::registry::{AgentHandle, AgentRegistry};

/// Routes command batches to the agents owning their targets.
///
/// Holds no cross-call state: the directory is re-resolved and the registry
/// re-consulted on every dispatch.
pub struct Dispatcher {
    registry: Arc<dyn AgentRegistry>,
    directory: Arc<dyn PeerDirectory>,
    peers: Arc<dyn PeerClient>,
    metrics: Arc<dyn MetricsStore>,
    config: ControllerConfig,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<dyn AgentRegistry>,
        directory: Arc<dyn PeerDirectory>,
        peers: Arc<dyn PeerClient>,
        metrics: Arc<dyn MetricsStore>,
        config: ControllerConfig,
    ) -> Self {
        Self {
            registry,
            directory,
            peers,
            metrics,
            config,
        }
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Dispatch a batch operation, returning exactly one result per input
    /// target (input order), whatever combination of nodes and peers failed.
    pub async fn dispatch_batch<P>(
        &self,
        batch: &CommandBatch<P>,
    ) -> Result<Vec<TargetResult>, DispatchError>
    where
        P: Serialize + Clone + Send + Sync,
    {
        let mut local: Vec<(Arc<dyn AgentHandle>, Vec<&CommandTarget<P>>)> = Vec::new();
        let mut remote: Vec<&CommandTarget<P>> = Vec::new();

        for (node_id, targets) in group_by_node(&batch.targets) {
            match self.registry.lookup(&node_id, batch.tenant_id) {
                Some(handle) => local.push((handle, targets)),
                None => {
                    tracing::debug!(node = %node_id, "no local channel, deferring to broadcast");
                    remote.extend(targets);
                }
            }
        }

        // Node groups are independent; deliver them concurrently and let a
        // slow agent on one node only cost its own group.
        let pushes = local
            .iter()
            .map(|(handle, targets)| self.push_group(handle.as_ref(), batch.operation, targets));
        let mut results: Vec<TargetResult> =
            join_all(pushes).await.into_iter().flatten().collect();

        if !remote.is_empty() {
            results.extend(self.broadcast_remote(batch, &remote).await?);
        }

        Ok(reconcile(&batch.service_ids(), results))
    }

    /// Handle a batch with local channels only, answering just the targets
    /// this controller can route.
    ///
    /// This is the receiving side of a broadcast: forwarded batches carry
    /// `broadcast=false` and must not relay further, and the origin backfills
    /// whatever is omitted here.
    pub async fn dispatch_local<P>(&self, batch: &CommandBatch<P>) -> Vec<TargetResult>
    where
        P: Serialize + Clone + Send + Sync,
    {
        let mut local: Vec<(Arc<dyn AgentHandle>, Vec<&CommandTarget<P>>)> = Vec::new();
        for (node_id, targets) in group_by_node(&batch.targets) {
            if let Some(handle) = self.registry.lookup(&node_id, batch.tenant_id) {
                local.push((handle, targets));
            }
        }
        let pushes = local
            .iter()
            .map(|(handle, targets)| self.push_group(handle.as_ref(), batch.operation, targets));
        join_all(pushes).await.into_iter().flatten().collect()
    }

    /// Dispatch a single-target operation (SyncApis/DeleteApis).
    ///
    /// Local handle first; otherwise peers are probed one at a time in
    /// directory order, first non-null answer wins.
    pub async fn dispatch_single<P>(
        &self,
        batch: &CommandBatch<P>,
    ) -> Result<TargetResult, DispatchError>
    where
        P: Serialize + Clone + Send + Sync,
    {
        let target = single_target(batch)?;

        if let Some(handle) = self.registry.lookup(&target.node_id, batch.tenant_id) {
            return Ok(self
                .push_single(handle.as_ref(), batch.operation, target)
                .await);
        }

        if !batch.broadcast {
            return Ok(TargetResult::failed(target.service_id, MSG_BROADCAST_IGNORED));
        }

        let hosts = self.directory.controller_hosts().await?;
        if hosts.is_empty() {
            return Err(DispatchError::NoControllerNodes);
        }

        let forwarded = batch.forwarded(vec![target.clone()]);
        let body = serde_json::to_value(&forwarded)?;
        let path = batch.operation.endpoint_path();

        for peer in self.directory.service_instances().await? {
            if peer.host == self.config.self_host {
                continue;
            }
            if !hosts.contains_key(&peer.host) {
                tracing::debug!(host = %peer.host, "skipping peer on non-controller host");
                continue;
            }
            match self.peers.forward_single(&peer, path, body.clone()).await {
                Ok(Some(result)) => return Ok(result),
                // Peer does not route this node; try the next one.
                Ok(None) => continue,
                Err(err) => {
                    tracing::warn!(host = %peer.host, error = %err, "peer forwarding failed");
                    continue;
                }
            }
        }

        Ok(TargetResult::failed(
            target.service_id,
            MSG_CONTROLLER_NOT_FOUND,
        ))
    }

    /// Local-only handling of a forwarded single-target batch. `None` means
    /// this controller has no channel to the target's node.
    pub async fn dispatch_single_local<P>(
        &self,
        batch: &CommandBatch<P>,
    ) -> Result<Option<TargetResult>, DispatchError>
    where
        P: Serialize + Clone + Send + Sync,
    {
        let target = single_target(batch)?;
        match self.registry.lookup(&target.node_id, batch.tenant_id) {
            Some(handle) => Ok(Some(
                self.push_single(handle.as_ref(), batch.operation, target)
                    .await,
            )),
            None => Ok(None),
        }
    }

    /// Dispatch a Stop batch: purge runtime metrics for the batch's service
    /// ids, then dispatch. Purge-then-dispatch, never the other way round:
    /// "a stop was requested" is reason enough to drop the stale series.
    pub async fn dispatch_stop(
        &self,
        batch: &CommandBatch<StopPayload>,
    ) -> Result<Vec<TargetResult>, DispatchError> {
        self.purge_metrics(batch.service_ids().into_iter().collect())
            .await;
        self.dispatch_batch(batch).await
    }

    /// Delete runtime-metrics rows for the given services. A failed purge
    /// must not block the stop itself; it is logged and dropped.
    pub async fn purge_metrics(&self, ids: HashSet<ServiceId>) {
        if ids.is_empty() {
            return;
        }
        if let Err(err) = self.metrics.delete_by_service_ids(&ids).await {
            tracing::warn!(error = %err, "runtime-metrics purge failed");
        }
    }

    /// Deliver one node group's payloads down a local channel.
    ///
    /// Always yields exactly one result per group target: delivery or decode
    /// errors fail the whole group with the error text, replies for
    /// unrequested ids are dropped, omitted ids are backfilled.
    async fn push_group<P>(
        &self,
        handle: &dyn AgentHandle,
        operation: Operation,
        targets: &[&CommandTarget<P>],
    ) -> Vec<TargetResult>
    where
        P: Serialize + Clone,
    {
        let push = AgentPush {
            operation,
            targets: targets
                .iter()
                .map(|t| AgentPushTarget {
                    service_id: t.service_id,
                    payload: t.payload.clone(),
                })
                .collect(),
        };
        let body = match serde_json::to_value(&push) {
            Ok(body) => body,
            Err(err) => {
                return fail_all(targets, format!("failed to encode command payload: {err}"))
            }
        };

        let reply = match handle.push(operation, body).await {
            Ok(reply) => reply,
            Err(err) => {
                tracing::warn!(operation = %operation, error = %err, "agent delivery failed");
                return fail_all(targets, err.to_string());
            }
        };

        let decoded: Vec<TargetResult> = match serde_json::from_value(reply) {
            Ok(decoded) => decoded,
            Err(err) => return fail_all(targets, format!("failed to decode agent reply: {err}")),
        };

        let mut by_id: HashMap<ServiceId, TargetResult> = HashMap::new();
        for result in decoded {
            by_id.entry(result.service_id).or_insert(result);
        }
        let results = targets
            .iter()
            .map(|t| {
                by_id
                    .remove(&t.service_id)
                    .unwrap_or_else(|| TargetResult::failed(t.service_id, MSG_AGENT_NOT_RUNNING))
            })
            .collect();
        if !by_id.is_empty() {
            tracing::warn!(
                operation = %operation,
                count = by_id.len(),
                "agent reply contained unrequested service ids"
            );
        }
        results
    }

    async fn push_single<P>(
        &self,
        handle: &dyn AgentHandle,
        operation: Operation,
        target: &CommandTarget<P>,
    ) -> TargetResult
    where
        P: Serialize + Clone,
    {
        let push = AgentPush {
            operation,
            targets: vec![AgentPushTarget {
                service_id: target.service_id,
                payload: target.payload.clone(),
            }],
        };
        let body = match serde_json::to_value(&push) {
            Ok(body) => body,
            Err(err) => {
                return TargetResult::failed(
                    target.service_id,
                    format!("failed to encode command payload: {err}"),
                )
            }
        };
        match handle.push(operation, body).await {
            Ok(reply) => match serde_json::from_value::<TargetResult>(reply) {
                Ok(result) => result,
                Err(err) => TargetResult::failed(
                    target.service_id,
                    format!("failed to decode agent reply: {err}"),
                ),
            },
            Err(err) => {
                tracing::warn!(operation = %operation, error = %err, "agent delivery failed");
                TargetResult::failed(target.service_id, err.to_string())
            }
        }
    }

    /// Forward the remote bucket to peers and merge their answers.
    async fn broadcast_remote<P>(
        &self,
        batch: &CommandBatch<P>,
        remote: &[&CommandTarget<P>],
    ) -> Result<Vec<TargetResult>, DispatchError>
    where
        P: Serialize + Clone + Send + Sync,
    {
        if !batch.broadcast {
            tracing::debug!(count = remote.len(), "broadcast disabled, refusing remote routing");
            return Ok(fail_all(remote, MSG_BROADCAST_IGNORED.to_string()));
        }

        let hosts = self.directory.controller_hosts().await?;
        if hosts.is_empty() {
            return Err(DispatchError::NoControllerNodes);
        }
        let instances = self.directory.service_instances().await?;

        let forwarded = batch.forwarded(remote.iter().map(|t| (*t).clone()).collect());
        let body = serde_json::to_value(&forwarded)?;
        let path = batch.operation.endpoint_path();

        let mut calls = Vec::new();
        for peer in &instances {
            if peer.host == self.config.self_host {
                continue;
            }
            if !hosts.contains_key(&peer.host) {
                tracing::debug!(host = %peer.host, "skipping peer on non-controller host");
                continue;
            }
            let body = body.clone();
            calls.push(async move { (peer, self.peers.forward_batch(peer, path, body).await) });
        }

        // Every eligible peer is tried; join_all keeps directory order, so
        // the first-wins merge below is deterministic.
        let outcomes = join_all(calls).await;

        let wanted: HashSet<ServiceId> = remote.iter().map(|t| t.service_id).collect();
        let mut merged: Vec<TargetResult> = Vec::new();
        let mut answered: HashSet<ServiceId> = HashSet::new();
        let mut reachable = 0usize;

        for (peer, outcome) in outcomes {
            match outcome {
                Ok(results) => {
                    reachable += 1;
                    for result in results {
                        if !wanted.contains(&result.service_id) {
                            tracing::warn!(
                                host = %peer.host,
                                service = %result.service_id,
                                "peer answered unrequested service id, dropping"
                            );
                            continue;
                        }
                        if !answered.insert(result.service_id) {
                            // Two peers both claim this node; the first
                            // answer in directory order wins.
                            tracing::warn!(
                                host = %peer.host,
                                service = %result.service_id,
                                "duplicate peer answer ignored"
                            );
                            continue;
                        }
                        merged.push(result);
                    }
                }
                Err(err) => {
                    tracing::warn!(host = %peer.host, error = %err, "peer forwarding failed");
                }
            }
        }

        if reachable == 0 {
            return Ok(fail_all(remote, MSG_INSTANCE_NOT_STARTED.to_string()));
        }

        for target in remote {
            if !answered.contains(&target.service_id) {
                merged.push(TargetResult::failed(target.service_id, MSG_AGENT_NOT_RUNNING));
            }
        }
        Ok(merged)
    }
}

/// Group targets by node, first-seen order.
fn group_by_node<P>(targets: &[CommandTarget<P>]) -> Vec<(NodeId, Vec<&CommandTarget<P>>)> {
    let mut groups: Vec<(NodeId, Vec<&CommandTarget<P>>)> = Vec::new();
    for target in targets {
        match groups.iter_mut().find(|(node, _)| *node == target.node_id) {
            Some((_, group)) => group.push(target),
            None => groups.push((target.node_id.clone(), vec![target])),
        }
    }
    groups
}

fn single_target<P>(batch: &CommandBatch<P>) -> Result<&CommandTarget<P>, DispatchError> {
    match batch.targets.as_slice() {
        [target] => Ok(target),
        other => Err(DispatchError::InvalidBatch(format!(
            "{} requires exactly one target, got {}",
            batch.operation,
            other.len()
        ))),
    }
}

fn fail_all<P>(targets: &[&CommandTarget<P>], message: String) -> Vec<TargetResult> {
    targets
        .iter()
        .map(|t| TargetResult::failed(t.service_id, message.clone()))
        .collect()
}

/// Assemble the final answer: one result per requested id, in request order.
/// Duplicates are dropped (first-wins), absences backfilled as failures.
fn reconcile(requested: &[ServiceId], raw: Vec<TargetResult>) -> Vec<TargetResult> {
    let mut by_id: HashMap<ServiceId, TargetResult> = HashMap::with_capacity(raw.len());
    for result in raw {
        if by_id.contains_key(&result.service_id) {
            tracing::warn!(service = %result.service_id, "duplicate result dropped in reconciliation");
            continue;
        }
        by_id.insert(result.service_id, result);
    }
    requested
        .iter()
        .map(|id| {
            by_id
                .remove(id)
                .unwrap_or_else(|| TargetResult::failed(*id, MSG_AGENT_NOT_RUNNING))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockhive_core::{StatusPayload, TenantId};
    use serde_json::json;

    fn target(node: &str, id: i64) -> CommandTarget<StatusPayload> {
        CommandTarget::new(NodeId::new(node), ServiceId(id), StatusPayload {})
    }

    #[test]
    fn test_group_by_node_first_seen_order() {
        let targets = vec![
            target("b", 1),
            target("a", 2),
            target("b", 3),
            target("c", 4),
        ];
        let groups = group_by_node(&targets);

        assert_eq!(groups.len(), 3);
        assert_eq!(groups[0].0, NodeId::new("b"));
        assert_eq!(groups[0].1.len(), 2);
        assert_eq!(groups[1].0, NodeId::new("a"));
        assert_eq!(groups[2].0, NodeId::new("c"));
    }

    #[test]
    fn test_reconcile_orders_by_request() {
        let requested = vec![ServiceId(1), ServiceId(2), ServiceId(3)];
        let raw = vec![
            TargetResult::ok(ServiceId(3), "c"),
            TargetResult::ok(ServiceId(1), "a"),
            TargetResult::ok(ServiceId(2), "b"),
        ];
        let reconciled = reconcile(&requested, raw);
        let ids: Vec<ServiceId> = reconciled.iter().map(|r| r.service_id).collect();
        assert_eq!(ids, requested);
    }

    #[test]
    fn test_reconcile_backfills_missing() {
        let requested = vec![ServiceId(1), ServiceId(2)];
        let raw = vec![TargetResult::ok(ServiceId(1), "a")];
        let reconciled = reconcile(&requested, raw);

        assert_eq!(reconciled.len(), 2);
        assert!(reconciled[0].success);
        assert!(!reconciled[1].success);
        assert_eq!(reconciled[1].message, MSG_AGENT_NOT_RUNNING);
    }

    #[test]
    fn test_reconcile_drops_duplicates_first_wins() {
        let requested = vec![ServiceId(1)];
        let raw = vec![
            TargetResult::ok(ServiceId(1), "first"),
            TargetResult::failed(ServiceId(1), "second"),
        ];
        let reconciled = reconcile(&requested, raw);

        assert_eq!(reconciled.len(), 1);
        assert!(reconciled[0].success);
        assert_eq!(reconciled[0].message, "first");
    }

    #[test]
    fn test_reconcile_drops_unrequested_ids() {
        let requested = vec![ServiceId(1)];
        let raw = vec![
            TargetResult::ok(ServiceId(1), "a"),
            TargetResult::ok(ServiceId(99), "stray"),
        ];
        let reconciled = reconcile(&requested, raw);
        assert_eq!(reconciled.len(), 1);
        assert_eq!(reconciled[0].service_id, ServiceId(1));
    }

    #[test]
    fn test_single_target_rejects_multi() {
        let batch = CommandBatch::new(
            Operation::SyncApis,
            TenantId(1),
            vec![
                CommandTarget::new(NodeId::new("a"), ServiceId(1), json!({})),
                CommandTarget::new(NodeId::new("b"), ServiceId(2), json!({})),
            ],
            false,
        );
        let err = single_target(&batch).unwrap_err();
        assert!(matches!(err, DispatchError::InvalidBatch(_)));
        assert!(err.to_string().contains("exactly one target"));
    }

    #[test]
    fn test_single_target_rejects_empty() {
        let batch: CommandBatch<StatusPayload> =
            CommandBatch::new(Operation::DeleteApis, TenantId(1), vec![], true);
        assert!(single_target(&batch).is_err());
    }
}
