use praetor_core::{AppError, PrincipalId, RoleId, TenantId};
use praetor_domain::{AuditAction, Permission, SUPER_ADMIN_ROLE_NAME};

use crate::test_fakes::Fixture;
use crate::{CreateRoleInput, EngineConfig};

use super::RoleHierarchyService;

fn service(fixture: &Fixture) -> RoleHierarchyService {
    RoleHierarchyService::new(
        fixture.store.clone(),
        fixture.recorder.clone(),
        fixture.config,
    )
}

fn create_input(name: &str, permissions: &[&str]) -> CreateRoleInput {
    CreateRoleInput {
        name: name.to_owned(),
        description: format!("{name} role"),
        parent_role_id: None,
        permissions: permissions
            .iter()
            .map(|value| Permission::from_transport(value).unwrap_or_else(|_| unreachable!()))
            .collect(),
    }
}

#[tokio::test]
async fn create_role_rejects_duplicate_names() {
    let fixture = Fixture::new();
    let service = service(&fixture);
    let actor = PrincipalId::new();

    let first = service
        .create_role(actor, create_input("support_agent", &["order:read@global"]))
        .await;
    let second = service
        .create_role(actor, create_input("support_agent", &[]))
        .await;

    assert!(first.is_ok());
    assert!(matches!(second, Err(AppError::Conflict(_))));
    assert_eq!(fixture.audit.actions().await, vec![AuditAction::RoleCreated]);
}

#[tokio::test]
async fn create_role_requires_live_parent() {
    let fixture = Fixture::new();
    let service = service(&fixture);

    let result = service
        .create_role(
            PrincipalId::new(),
            CreateRoleInput {
                parent_role_id: Some(RoleId::new()),
                ..create_input("orphan", &[])
            },
        )
        .await;

    assert!(matches!(result, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn inherited_role_is_reported_as_ancestor() {
    let fixture = Fixture::new();
    let service = service(&fixture);
    let base = fixture
        .store
        .seed_role("read_only_base", None, &["order:read@global"])
        .await;
    let agent = fixture
        .store
        .seed_role("support_agent", Some(base.id), &[])
        .await;

    let is_ancestor = service.is_ancestor(base.id, agent.id).await;
    let reverse = service.is_ancestor(agent.id, base.id).await;
    let reflexive = service.is_ancestor(agent.id, agent.id).await;
    let ancestors = service.ancestors(agent.id).await;

    assert!(matches!(is_ancestor, Ok(true)));
    assert!(matches!(reverse, Ok(false)));
    assert!(matches!(reflexive, Ok(false)));
    assert!(matches!(ancestors, Ok(ref roles) if roles.len() == 1 && roles[0].id == base.id));
}

#[tokio::test]
async fn set_parent_rejects_reverse_edge_and_keeps_hierarchy() {
    let fixture = Fixture::new();
    let service = service(&fixture);
    let actor = PrincipalId::new();
    let role_a = fixture.store.seed_role("role_a", None, &[]).await;
    let role_b = fixture.store.seed_role("role_b", None, &[]).await;

    let first = service.set_parent(actor, role_a.id, Some(role_b.id)).await;
    let second = service.set_parent(actor, role_b.id, Some(role_a.id)).await;

    assert!(first.is_ok());
    assert!(matches!(
        second,
        Err(AppError::CyclicHierarchy { role_id, parent_id })
            if role_id == role_b.id && parent_id == role_a.id
    ));

    let stored_a = service.get_role(role_a.id).await;
    let stored_b = service.get_role(role_b.id).await;
    assert!(matches!(stored_a, Ok(ref role) if role.parent_role_id == Some(role_b.id)));
    assert!(matches!(stored_b, Ok(ref role) if role.parent_role_id.is_none()));
    assert_eq!(
        fixture.audit.actions().await,
        vec![AuditAction::RoleParentChanged]
    );
}

#[tokio::test]
async fn set_parent_rejects_self_parenting() {
    let fixture = Fixture::new();
    let service = service(&fixture);
    let role = fixture.store.seed_role("loop", None, &[]).await;

    let result = service
        .set_parent(PrincipalId::new(), role.id, Some(role.id))
        .await;

    assert!(matches!(result, Err(AppError::CyclicHierarchy { .. })));
}

#[tokio::test]
async fn set_parent_enforces_depth_bound() {
    let fixture = Fixture::with_config(EngineConfig {
        max_hierarchy_depth: 2,
        ..EngineConfig::default()
    });
    let service = service(&fixture);
    let root = fixture.store.seed_role("root", None, &[]).await;
    let middle = fixture.store.seed_role("middle", Some(root.id), &[]).await;
    let leaf = fixture.store.seed_role("leaf", Some(middle.id), &[]).await;
    let extra = fixture.store.seed_role("extra", None, &[]).await;

    let result = service
        .set_parent(PrincipalId::new(), extra.id, Some(leaf.id))
        .await;

    assert!(matches!(result, Err(AppError::Validation(_))));
}

#[tokio::test]
async fn system_roles_are_immutable() {
    let fixture = Fixture::new();
    let service = service(&fixture);
    let actor = PrincipalId::new();
    let seeded = service.seed_system_roles().await;
    let Ok(super_admin) = seeded else {
        panic!("super_admin should be seeded");
    };
    let parent = fixture.store.seed_role("parent", None, &[]).await;

    let reparent = service
        .set_parent(actor, super_admin.id, Some(parent.id))
        .await;
    let repermission = service
        .set_role_permissions(actor, super_admin.id, Vec::new())
        .await;
    let delete = service.delete_role(actor, super_admin.id).await;

    assert!(matches!(reparent, Err(AppError::Validation(_))));
    assert!(matches!(repermission, Err(AppError::Validation(_))));
    assert!(matches!(delete, Err(AppError::Validation(_))));
}

#[tokio::test]
async fn seed_system_roles_is_idempotent_and_covers_catalog() {
    let fixture = Fixture::new();
    let service = service(&fixture);

    let first = service.seed_system_roles().await;
    let second = service.seed_system_roles().await;
    let listed = service.list_roles().await;

    assert!(matches!(first, Ok(ref role) if role.permissions.len() == Permission::catalog().len()));
    assert!(matches!(second, Ok(ref role) if role.name.as_str() == SUPER_ADMIN_ROLE_NAME));
    assert!(matches!(listed, Ok(ref roles) if roles.len() == 1));
}

#[tokio::test]
async fn delete_role_detaches_children_and_hides_role() {
    let fixture = Fixture::new();
    let service = service(&fixture);
    let actor = PrincipalId::new();
    let parent = fixture.store.seed_role("parent", None, &[]).await;
    let child = fixture.store.seed_role("child", Some(parent.id), &[]).await;

    let deleted = service.delete_role(actor, parent.id).await;
    let lookup = service.get_role(parent.id).await;
    let by_name = service.get_role_by_name("parent").await;
    let child = service.get_role(child.id).await;

    assert!(deleted.is_ok());
    assert!(matches!(lookup, Err(AppError::NotFound(_))));
    assert!(matches!(by_name, Err(AppError::NotFound(_))));
    assert!(matches!(child, Ok(ref role) if role.parent_role_id.is_none()));
    assert_eq!(fixture.audit.actions().await, vec![AuditAction::RoleDeleted]);
}

#[tokio::test]
async fn permission_edits_bump_holder_versions() {
    let fixture = Fixture::new();
    let service = service(&fixture);
    let parent = fixture.store.seed_role("parent", None, &[]).await;
    let child = fixture.store.seed_role("child", Some(parent.id), &[]).await;
    let principal = fixture.store.seed_principal().await;
    fixture
        .store
        .seed_assignment(principal.id, child.id, None, None)
        .await;

    let updated = service
        .set_role_permissions(
            PrincipalId::new(),
            parent.id,
            vec![Permission::from_transport("order:read@global").unwrap_or_else(|_| unreachable!())],
        )
        .await;
    let refreshed = fixture.store.principal(principal.id).await;

    assert!(matches!(updated, Ok(ref role) if role.version == parent.version + 1));
    assert!(matches!(
        refreshed,
        Some(ref refreshed) if refreshed.assignment_version > principal.assignment_version
    ));
}

#[tokio::test]
async fn effective_permissions_include_ancestors() {
    let fixture = Fixture::new();
    let service = service(&fixture);
    let base = fixture
        .store
        .seed_role("base", None, &["order:read@global"])
        .await;
    let agent = fixture
        .store
        .seed_role("agent", Some(base.id), &["order:write@tenant"])
        .await;

    let permissions = service.effective_permissions(agent.id).await;

    assert!(matches!(permissions, Ok(ref set) if set.len() == 2));
}

#[tokio::test]
async fn corrupted_hierarchy_fails_closed_on_ancestor_walk() {
    let fixture = Fixture::new();
    let service = service(&fixture);
    let role_a = fixture.store.seed_role("role_a", None, &[]).await;
    let role_b = fixture.store.seed_role("role_b", Some(role_a.id), &[]).await;
    fixture.store.force_parent(role_a.id, Some(role_b.id)).await;

    let result = service.ancestors(role_a.id).await;

    assert!(matches!(result, Err(AppError::Internal(_))));
}

fn transport(values: &[&str]) -> Vec<Permission> {
    values
        .iter()
        .map(|value| Permission::from_transport(value).unwrap_or_else(|_| unreachable!()))
        .collect()
}

#[tokio::test]
async fn permission_edit_cannot_strand_a_global_assignment() {
    let fixture = Fixture::new();
    let service = service(&fixture);
    let mixed = fixture
        .store
        .seed_role("mixed", None, &["order:read@global", "order:write@tenant"])
        .await;
    let principal = fixture.store.seed_principal().await;
    fixture
        .store
        .seed_assignment(principal.id, mixed.id, None, None)
        .await;

    let result = service
        .set_role_permissions(PrincipalId::new(), mixed.id, transport(&["order:write@tenant"]))
        .await;
    let stored = service.get_role(mixed.id).await;

    assert!(matches!(result, Err(AppError::Validation(_))));
    assert!(matches!(
        stored,
        Ok(ref role) if role.version == mixed.version && role.permissions.len() == 2
    ));
    assert!(fixture.audit.actions().await.is_empty());
}

#[tokio::test]
async fn permission_edit_is_allowed_when_assignments_carry_a_tenant() {
    let fixture = Fixture::new();
    let service = service(&fixture);
    let mixed = fixture
        .store
        .seed_role("mixed", None, &["order:read@global", "order:write@tenant"])
        .await;
    let principal = fixture.store.seed_principal().await;
    fixture
        .store
        .seed_assignment(principal.id, mixed.id, Some(TenantId::new()), None)
        .await;

    let result = service
        .set_role_permissions(PrincipalId::new(), mixed.id, transport(&["order:write@tenant"]))
        .await;

    assert!(matches!(result, Ok(ref role) if role.permissions.len() == 1));
}

#[tokio::test]
async fn detaching_the_global_parent_cannot_strand_a_global_assignment() {
    let fixture = Fixture::new();
    let service = service(&fixture);
    let base = fixture
        .store
        .seed_role("base", None, &["order:read@global"])
        .await;
    let child = fixture
        .store
        .seed_role("child", Some(base.id), &["order:write@tenant"])
        .await;
    let principal = fixture.store.seed_principal().await;
    fixture
        .store
        .seed_assignment(principal.id, child.id, None, None)
        .await;

    let result = service.set_parent(PrincipalId::new(), child.id, None).await;
    let stored = service.get_role(child.id).await;

    assert!(matches!(result, Err(AppError::Validation(_))));
    assert!(matches!(stored, Ok(ref role) if role.parent_role_id == Some(base.id)));
}

#[tokio::test]
async fn deleting_the_global_parent_cannot_strand_a_global_assignment() {
    let fixture = Fixture::new();
    let service = service(&fixture);
    let base = fixture
        .store
        .seed_role("base", None, &["order:read@global"])
        .await;
    let child = fixture
        .store
        .seed_role("child", Some(base.id), &["order:write@tenant"])
        .await;
    let principal = fixture.store.seed_principal().await;
    fixture
        .store
        .seed_assignment(principal.id, child.id, None, None)
        .await;

    let result = service.delete_role(PrincipalId::new(), base.id).await;
    let parent = service.get_role(base.id).await;
    let stored = service.get_role(child.id).await;

    assert!(matches!(result, Err(AppError::Validation(_))));
    assert!(parent.is_ok());
    assert!(matches!(stored, Ok(ref role) if role.parent_role_id == Some(base.id)));
    assert!(fixture.audit.actions().await.is_empty());
}
