//! Execution roles and the statements granted to them.
//!
//! Grants are additive. Nothing here detects conflicts between statements;
//! conflicts are settled at evaluation time, where a deny always wins.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::info;

use enclave_core::{EnclaveError, ResourceGraph, ResourceKind, Result, RoleId};

use crate::statement::{Condition, Effect, PolicyStatement};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRole {
    pub id: RoleId,
    /// Service principal allowed to assume the role, e.g. `lambda.amazonaws.com`.
    pub assumed_by: String,
    pub managed_policies: Vec<String>,
    pub statements: Vec<PolicyStatement>,
}

#[derive(Debug, Clone, Default)]
pub struct RoleBinder {
    roles: BTreeMap<RoleId, ExecutionRole>,
}

impl RoleBinder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &RoleId) -> Option<&ExecutionRole> {
        self.roles.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ExecutionRole> + '_ {
        self.roles.values()
    }

    pub fn create_role(
        &mut self,
        graph: &mut ResourceGraph,
        id: RoleId,
        assumed_by: impl Into<String>,
        managed_policies: &[&str],
    ) -> Result<RoleId> {
        if self.roles.contains_key(&id) {
            return Err(EnclaveError::DuplicateResource(id.node_id()));
        }
        let role = ExecutionRole {
            id: id.clone(),
            assumed_by: assumed_by.into(),
            managed_policies: managed_policies.iter().map(|p| p.to_string()).collect(),
            statements: Vec::new(),
        };
        graph.add_resource(
            id.node_id(),
            ResourceKind::ExecutionRole,
            &serde_json::json!({
                "assumedBy": role.assumed_by,
                "managedPolicies": role.managed_policies,
            }),
        )?;
        info!(role = %id, assumed_by = %role.assumed_by, "Execution role created");
        self.roles.insert(id.clone(), role);
        Ok(id)
    }

    /// Append one statement to `role`. Returns the statement's index.
    pub fn grant(
        &mut self,
        graph: &mut ResourceGraph,
        role: &RoleId,
        effect: Effect,
        actions: &[&str],
        resources: &[&str],
        conditions: Vec<Condition>,
    ) -> Result<usize> {
        let statement = PolicyStatement::new(effect, actions.iter().copied(), resources.iter().copied())
            .with_conditions(conditions);
        self.grant_statement(graph, role, statement)
    }

    pub fn grant_statement(
        &mut self,
        graph: &mut ResourceGraph,
        role: &RoleId,
        statement: PolicyStatement,
    ) -> Result<usize> {
        let entry = self
            .roles
            .get_mut(role)
            .ok_or_else(|| EnclaveError::unknown("execution role", role.as_str()))?;

        let index = entry.statements.len();
        let node = format!("{}/statement/{index}", role.node_id());
        graph.add_child(&role.node_id(), node, ResourceKind::PolicyStatement, &statement)?;
        info!(
            role = %role,
            effect = ?statement.effect,
            actions = ?statement.actions,
            "Statement granted"
        );
        entry.statements.push(statement);
        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statement::actions;

    #[test]
    fn grants_are_additive_and_ordered() {
        let mut graph = ResourceGraph::new();
        let mut roles = RoleBinder::new();
        let role = roles
            .create_role(&mut graph, "runner".into(), "lambda.amazonaws.com", &[])
            .unwrap();

        let first = roles
            .grant(&mut graph, &role, Effect::Allow, &[actions::GET_OBJECT], &["*"], vec![])
            .unwrap();
        let second = roles
            .grant(&mut graph, &role, Effect::Deny, &[actions::GET_OBJECT], &["*"], vec![])
            .unwrap();

        assert_eq!((first, second), (0, 1));
        let stored = &roles.get(&role).unwrap().statements;
        assert_eq!(stored[0].effect, Effect::Allow);
        assert_eq!(stored[1].effect, Effect::Deny);
        assert_eq!(graph.nodes_of_kind(ResourceKind::PolicyStatement).count(), 2);
    }

    #[test]
    fn grant_to_unknown_role_fails() {
        let mut graph = ResourceGraph::new();
        let mut roles = RoleBinder::new();
        let err = roles
            .grant(&mut graph, &"ghost".into(), Effect::Allow, &["s3:*"], &["*"], vec![])
            .unwrap_err();
        assert!(matches!(err, EnclaveError::UnknownResource { .. }));
    }

    #[test]
    fn managed_policies_are_recorded() {
        let mut graph = ResourceGraph::new();
        let mut roles = RoleBinder::new();
        let role = roles
            .create_role(&mut graph, "host".into(), "ec2.amazonaws.com", &["AmazonSSMManagedInstanceCore"])
            .unwrap();
        assert_eq!(roles.get(&role).unwrap().managed_policies, vec!["AmazonSSMManagedInstanceCore"]);
        let node = graph.node(&role.node_id()).unwrap();
        assert_eq!(node.properties["assumedBy"], "ec2.amazonaws.com");
    }
}
